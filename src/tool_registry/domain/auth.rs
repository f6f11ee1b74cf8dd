//! Authentication descriptors stored with tool configurations.

use super::{ParseAuthKindError, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a tool authenticates against its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// The provider needs no credential.
    None,
    /// Bearer token.
    Bearer,
    /// HTTP basic authentication.
    Basic,
    /// API key header.
    ApiKey,
}

impl AuthKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bearer => "bearer",
            Self::Basic => "basic",
            Self::ApiKey => "api_key",
        }
    }

    /// Returns whether calls need a credential.
    #[must_use]
    pub const fn requires_credential(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AuthKind {
    type Error = ParseAuthKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "bearer" | "token" => Ok(Self::Bearer),
            "basic" => Ok(Self::Basic),
            "api_key" | "api-key" => Ok(Self::ApiKey),
            _ => Err(ParseAuthKindError(value.to_owned())),
        }
    }
}

/// Authentication descriptor: a kind plus a reference to secret material.
///
/// The descriptor never holds the secret itself, so it is safe to log and
/// persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDescriptor {
    kind: AuthKind,
    secret_ref: Option<String>,
}

impl AuthDescriptor {
    /// Creates a descriptor for an unauthenticated provider.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            kind: AuthKind::None,
            secret_ref: None,
        }
    }

    /// Creates a validated descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::MissingSecretReference`] when an
    /// authenticated kind has no secret reference.
    pub fn new(
        kind: AuthKind,
        secret_ref: Option<String>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized = secret_ref
            .map(|reference| reference.trim().to_owned())
            .filter(|reference| !reference.is_empty());

        if kind.requires_credential() && normalized.is_none() {
            return Err(ToolRegistryDomainError::MissingSecretReference(
                kind.as_str().to_owned(),
            ));
        }

        Ok(Self {
            kind,
            secret_ref: if kind.requires_credential() {
                normalized
            } else {
                None
            },
        })
    }

    /// Returns the authentication kind.
    #[must_use]
    pub const fn kind(&self) -> AuthKind {
        self.kind
    }

    /// Returns the secret reference.
    #[must_use]
    pub fn secret_ref(&self) -> Option<&str> {
        self.secret_ref.as_deref()
    }
}

impl Default for AuthDescriptor {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_kinds_require_a_reference() {
        let result = AuthDescriptor::new(AuthKind::Bearer, Some("  ".to_owned()));
        assert_eq!(
            result,
            Err(ToolRegistryDomainError::MissingSecretReference(
                "bearer".to_owned()
            ))
        );
    }

    #[test]
    fn unauthenticated_descriptor_drops_reference() {
        let descriptor = AuthDescriptor::new(AuthKind::None, Some("ignored".to_owned()))
            .expect("descriptor should be valid");
        assert_eq!(descriptor.secret_ref(), None);
    }
}
