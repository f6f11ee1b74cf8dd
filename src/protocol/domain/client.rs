//! Connection-mode detection and per-class schema shaping.
//!
//! Classification is a pure function of handshake metadata. It only changes
//! how much schema detail is sent; the set and names of tools never depend on
//! the client class.

use super::error::ParseClientClassError;
use crate::discovery::domain::condense;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Header announcing a Claude Code client version.
pub const CLAUDE_CODE_VERSION_HEADER: &str = "x-claude-code-version";
/// Header naming the hosting IDE.
pub const IDE_NAME_HEADER: &str = "x-ide-name";
/// Header carrying an agent identifier.
pub const AGENT_ID_HEADER: &str = "x-agent-id";
/// Header carrying an agent type.
pub const AGENT_TYPE_HEADER: &str = "x-agent-type";

const IDE_MARKERS: [&str; 5] = ["vscode", "visual studio code", "cursor", "jetbrains", "zed"];
const AGENT_MARKERS: [&str; 2] = ["agent", "bot"];
const ENUM_LIMIT: usize = 10;

/// Known client classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientClass {
    /// Claude Code CLI.
    ClaudeCode,
    /// An editor integration.
    Ide,
    /// An autonomous agent runtime.
    Agent,
    /// Any other MCP client.
    #[default]
    StandardMcp,
}

impl ClientClass {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude_code",
            Self::Ide => "ide",
            Self::Agent => "agent",
            Self::StandardMcp => "standard_mcp",
        }
    }

    /// Returns the shaping profile for this class.
    #[must_use]
    pub const fn profile(self) -> ShapingProfile {
        match self {
            Self::ClaudeCode | Self::Ide => ShapingProfile {
                description_limit: 200,
                strip_large_enums: false,
            },
            Self::Agent => ShapingProfile {
                description_limit: 160,
                strip_large_enums: false,
            },
            Self::StandardMcp => ShapingProfile {
                description_limit: 120,
                strip_large_enums: true,
            },
        }
    }
}

impl fmt::Display for ClientClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ClientClass {
    type Error = ParseClientClassError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "claude_code" => Ok(Self::ClaudeCode),
            "ide" => Ok(Self::Ide),
            "agent" => Ok(Self::Agent),
            "standard_mcp" => Ok(Self::StandardMcp),
            other => Err(ParseClientClassError(other.to_owned())),
        }
    }
}

/// Metadata observed while the connection is established.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeMetadata {
    /// Request headers, keyed by lowercase name.
    pub headers: BTreeMap<String, String>,
    /// `clientInfo.name` from `initialize`, once seen.
    pub client_name: Option<String>,
}

impl HandshakeMetadata {
    /// Creates metadata from header pairs.
    #[must_use]
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.to_owned()))
                .collect(),
            client_name: None,
        }
    }

    /// Records the client name announced by `initialize`.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn user_agent(&self) -> String {
        self.header("user-agent").unwrap_or_default().to_lowercase()
    }
}

/// Classifies a caller from its handshake metadata.
///
/// Headers take precedence. The `initialize` client name only refines the
/// result when the headers say nothing.
#[must_use]
pub fn detect_client_class(metadata: &HandshakeMetadata) -> ClientClass {
    if let Some(class) = classify_headers(metadata) {
        return class;
    }
    metadata
        .client_name
        .as_deref()
        .map_or(ClientClass::StandardMcp, classify_name)
}

fn classify_headers(metadata: &HandshakeMetadata) -> Option<ClientClass> {
    let user_agent = metadata.user_agent();
    if metadata.header(CLAUDE_CODE_VERSION_HEADER).is_some() || user_agent.contains("claude-code")
    {
        return Some(ClientClass::ClaudeCode);
    }
    if metadata.header(IDE_NAME_HEADER).is_some()
        || IDE_MARKERS.iter().any(|marker| user_agent.contains(marker))
    {
        return Some(ClientClass::Ide);
    }
    if metadata.header(AGENT_ID_HEADER).is_some() || metadata.header(AGENT_TYPE_HEADER).is_some() {
        return Some(ClientClass::Agent);
    }
    None
}

fn classify_name(name: &str) -> ClientClass {
    let lowered = name.to_lowercase();
    if lowered.contains("claude-code") || lowered.contains("claude code") {
        ClientClass::ClaudeCode
    } else if IDE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        ClientClass::Ide
    } else if AGENT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        ClientClass::Agent
    } else {
        ClientClass::StandardMcp
    }
}

/// Presentation limits applied to `tools/list` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapingProfile {
    /// Maximum description length in characters.
    pub description_limit: usize,
    /// Whether enum lists over ten values are removed from schemas.
    pub strip_large_enums: bool,
}

impl ShapingProfile {
    /// Shortens a description to the profile's limit.
    #[must_use]
    pub fn shape_description(&self, description: &str) -> String {
        condense(description, self.description_limit)
    }

    /// Returns a copy of `schema` with the profile applied.
    #[must_use]
    pub fn shape_schema(&self, schema: &Value) -> Value {
        let mut shaped = schema.clone();
        if self.strip_large_enums {
            strip_large_enums(&mut shaped);
        }
        shaped
    }
}

fn strip_large_enums(schema: &mut Value) {
    match schema {
        Value::Object(object) => {
            let oversized = object
                .get("enum")
                .and_then(Value::as_array)
                .is_some_and(|values| values.len() > ENUM_LIMIT);
            if oversized {
                object.remove("enum");
            }
            object.values_mut().for_each(strip_large_enums);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_large_enums),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(&[("X-Claude-Code-Version", "1.0.3")], ClientClass::ClaudeCode)]
    #[case(&[("User-Agent", "claude-code/1.2 (node)")], ClientClass::ClaudeCode)]
    #[case(&[("X-IDE-Name", "neovim")], ClientClass::Ide)]
    #[case(&[("User-Agent", "Cursor/0.42")], ClientClass::Ide)]
    #[case(&[("X-Agent-ID", "build-bot-7")], ClientClass::Agent)]
    #[case(&[("X-Agent-Type", "planner")], ClientClass::Agent)]
    #[case(&[("User-Agent", "python-httpx/0.27")], ClientClass::StandardMcp)]
    #[case(&[], ClientClass::StandardMcp)]
    fn headers_select_the_client_class(
        #[case] headers: &[(&str, &str)],
        #[case] expected: ClientClass,
    ) {
        let metadata = HandshakeMetadata::from_headers(headers.iter().copied());
        assert_eq!(detect_client_class(&metadata), expected);
    }

    #[test]
    fn client_name_refines_silent_headers() {
        let metadata = HandshakeMetadata::default().with_client_name("Zed Editor");
        assert_eq!(detect_client_class(&metadata), ClientClass::Ide);
    }

    #[test]
    fn headers_outrank_client_name() {
        let metadata = HandshakeMetadata::from_headers([("X-Agent-ID", "a-1")])
            .with_client_name("claude-code");
        assert_eq!(detect_client_class(&metadata), ClientClass::Agent);
    }

    #[rstest]
    #[case(ClientClass::ClaudeCode, 200)]
    #[case(ClientClass::Ide, 200)]
    #[case(ClientClass::Agent, 160)]
    #[case(ClientClass::StandardMcp, 120)]
    fn descriptions_respect_the_class_limit(#[case] class: ClientClass, #[case] limit: usize) {
        let shaped = class.profile().shape_description(&"word ".repeat(100));
        assert_eq!(shaped.chars().count(), limit);
    }

    #[test]
    fn standard_clients_lose_large_enums_only() {
        let schema = json!({
            "type": "object",
            "properties": {
                "state": {"type": "string", "enum": ["open", "closed"]},
                "label": {
                    "type": "string",
                    "enum": ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k"]
                }
            }
        });

        let standard = ClientClass::StandardMcp.profile().shape_schema(&schema);
        let rich = ClientClass::ClaudeCode.profile().shape_schema(&schema);

        assert!(standard["properties"]["label"].get("enum").is_none());
        assert_eq!(standard["properties"]["state"]["enum"], json!(["open", "closed"]));
        assert_eq!(rich, schema);
    }

    #[test]
    fn class_names_round_trip_through_parsing() {
        for class in [
            ClientClass::ClaudeCode,
            ClientClass::Ide,
            ClientClass::Agent,
            ClientClass::StandardMcp,
        ] {
            assert_eq!(ClientClass::try_from(class.as_str()), Ok(class));
        }
        assert!(ClientClass::try_from("desktop").is_err());
    }
}
