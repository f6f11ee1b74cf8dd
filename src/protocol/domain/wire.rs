//! Wire tool names.

use super::ProtocolDomainError;
use crate::tool_registry::domain::ToolName;
use std::fmt;

/// A tool name as seen by agents: `<tool_name>.<operation_key>`.
///
/// Tool names never contain dots, so the name splits at the first dot and
/// the operation key keeps its own dotted segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireToolName {
    tool: ToolName,
    operation_key: String,
}

impl WireToolName {
    /// Joins a tool name and an operation key.
    #[must_use]
    pub fn new(tool: ToolName, operation_key: impl Into<String>) -> Self {
        Self {
            tool,
            operation_key: operation_key.into(),
        }
    }

    /// Parses a wire name.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolDomainError::InvalidToolName`] when either half is
    /// missing or the tool half is not a valid tool name.
    pub fn parse(value: &str) -> Result<Self, ProtocolDomainError> {
        let invalid = || ProtocolDomainError::InvalidToolName(value.to_owned());
        let (tool, operation_key) = value.split_once('.').ok_or_else(invalid)?;
        if operation_key.is_empty() {
            return Err(invalid());
        }
        let tool_name = ToolName::new(tool).map_err(|_| invalid())?;
        Ok(Self::new(tool_name, operation_key))
    }

    /// Returns the tool half.
    #[must_use]
    pub const fn tool(&self) -> &ToolName {
        &self.tool
    }

    /// Returns the operation half.
    #[must_use]
    pub fn operation_key(&self) -> &str {
        &self.operation_key
    }
}

impl fmt::Display for WireToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}", self.tool, self.operation_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn names_split_at_the_first_dot() {
        let name = WireToolName::parse("gh_main.github.repos.list").expect("valid name");
        assert_eq!(name.tool().as_str(), "gh_main");
        assert_eq!(name.operation_key(), "github.repos.list");
        assert_eq!(name.to_string(), "gh_main.github.repos.list");
    }

    #[rstest]
    #[case("no_dot")]
    #[case("tool.")]
    #[case(".github.repos.list")]
    #[case("Bad Tool.github.repos.list")]
    fn malformed_names_are_rejected(#[case] value: &str) {
        assert!(matches!(
            WireToolName::parse(value),
            Err(ProtocolDomainError::InvalidToolName(_))
        ));
    }
}
