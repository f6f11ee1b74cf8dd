//! Identifier and validated-name types for tenants, tools and executions.

use super::ToolRegistryDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length for a tool name, matching `VARCHAR(100)`.
const MAX_TOOL_NAME_LENGTH: usize = 100;

/// Maximum length for a tenant identifier.
const MAX_TENANT_ID_LENGTH: usize = 64;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $noun:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random ", $noun, " identifier.")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Creates a ", $noun, " identifier from an existing UUID.")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the wrapped UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a tool configuration.
    ToolId,
    "tool"
);

uuid_identifier!(
    /// Unique identifier for one execution record.
    ExecutionId,
    "execution"
);

/// Validated tenant identifier.
///
/// Tenants isolate tool configurations, credentials and circuit state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a validated tenant identifier.
    ///
    /// The input is trimmed and lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyTenantId);
        }

        let is_valid = normalized.len() <= MAX_TENANT_ID_LENGTH
            && normalized.chars().all(|character| {
                character.is_ascii_lowercase()
                    || character.is_ascii_digit()
                    || character == '_'
                    || character == '-'
            });
        if !is_valid {
            return Err(ToolRegistryDomainError::InvalidTenantId(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the tenant identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated tool name, unique per tenant.
///
/// Tool names never contain dots; the protocol layer joins a tool name and an
/// operation key with a dot to form the wire-level tool name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolName(String);

impl ToolName {
    /// Creates a validated tool name.
    ///
    /// The input is trimmed and lowercased. Only characters in `[a-z0-9_]`
    /// are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyToolName);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
        });
        if !is_valid {
            return Err(ToolRegistryDomainError::InvalidToolName(normalized));
        }

        if normalized.len() > MAX_TOOL_NAME_LENGTH {
            return Err(ToolRegistryDomainError::ToolNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the tool name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ToolName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("  GitHub_Main ", "github_main")]
    #[case("ci2", "ci2")]
    fn tool_names_are_normalized(#[case] input: &str, #[case] expected: &str) {
        let name = ToolName::new(input).expect("valid tool name");
        assert_eq!(name.as_str(), expected);
    }

    #[rstest]
    #[case("", ToolRegistryDomainError::EmptyToolName)]
    #[case("git.hub", ToolRegistryDomainError::InvalidToolName("git.hub".to_owned()))]
    #[case("my-tool", ToolRegistryDomainError::InvalidToolName("my-tool".to_owned()))]
    fn invalid_tool_names_are_rejected(
        #[case] input: &str,
        #[case] expected: ToolRegistryDomainError,
    ) {
        assert_eq!(ToolName::new(input), Err(expected));
    }

    #[rstest]
    #[case("acme", true)]
    #[case("acme-prod_2", true)]
    #[case("", false)]
    #[case("acme corp", false)]
    fn tenant_ids_are_validated(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(TenantId::new(input).is_ok(), valid);
    }

    #[test]
    fn tool_ids_round_trip_through_uuid() {
        let id = ToolId::new();
        assert_eq!(ToolId::from_uuid(id.into_inner()), id);
    }
}
