//! Validated provider names.

use super::ProviderDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_PROVIDER_NAME_LENGTH: usize = 64;

/// Name of an external provider, such as `github` or `gitlab`.
///
/// Provider names never contain dots, so they can be used as the first
/// segment of a dotted operation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderName(String);

impl ProviderName {
    /// Name of the provider used when no dedicated adapter is registered.
    pub const GENERIC: &'static str = "generic";

    /// Creates a validated provider name.
    ///
    /// The input is trimmed and lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(ProviderDomainError::EmptyProviderName);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || character == '_'
                || character == '-'
        });
        if !is_valid {
            return Err(ProviderDomainError::InvalidProviderName(normalized));
        }

        if normalized.len() > MAX_PROVIDER_NAME_LENGTH {
            return Err(ProviderDomainError::ProviderNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the generic fallback provider name.
    #[must_use]
    pub fn generic() -> Self {
        Self(Self::GENERIC.to_owned())
    }

    /// Returns the provider name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProviderName {
    type Error = ProviderDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProviderName> for String {
    fn from(value: ProviderName) -> Self {
        value.0
    }
}

impl AsRef<str> for ProviderName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
