//! Credential material and caller-supplied passthrough bundles.

use super::{ProviderDomainError, ProviderName};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Shape of a credential, without any secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// HTTP basic authentication.
    Basic,
    /// API key sent in a provider-specific header.
    ApiKey,
}

impl CredentialKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
            Self::Basic => "basic",
            Self::ApiKey => "api_key",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Authentication material attached to one provider call.
///
/// Secrets are held as [`SecretString`], so `Debug` output is redacted.
/// Deserializes from the tagged form used by passthrough bundles, for
/// example `{"type": "bearer", "token": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "WireCredential")]
pub enum Credential {
    /// Bearer token.
    Bearer(SecretString),
    /// Username and password.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: SecretString,
    },
    /// API key, optionally naming the header it travels in.
    ApiKey {
        /// Header override. Adapters apply their own default when absent.
        header: Option<String>,
        /// Key material.
        key: SecretString,
    },
}

impl Credential {
    /// Creates a bearer credential.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(SecretString::from(token.into()))
    }

    /// Creates a basic-auth credential.
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Creates an API-key credential using the adapter's default header.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey {
            header: None,
            key: SecretString::from(key.into()),
        }
    }

    /// Returns the credential kind.
    #[must_use]
    pub const fn kind(&self) -> CredentialKind {
        match self {
            Self::Bearer(_) => CredentialKind::Bearer,
            Self::Basic { .. } => CredentialKind::Basic,
            Self::ApiKey { .. } => CredentialKind::ApiKey,
        }
    }

    /// Returns the primary secret (token, password or key).
    #[must_use]
    pub fn secret(&self) -> &str {
        match self {
            Self::Bearer(token) => token.expose_secret(),
            Self::Basic { password, .. } => password.expose_secret(),
            Self::ApiKey { key, .. } => key.expose_secret(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireCredential {
    #[serde(alias = "oauth")]
    Bearer { token: String },
    Basic { username: String, password: String },
    #[serde(alias = "api-key", alias = "x-api-key")]
    ApiKey {
        token: String,
        #[serde(default)]
        header: Option<String>,
    },
}

impl From<WireCredential> for Credential {
    fn from(value: WireCredential) -> Self {
        match value {
            WireCredential::Bearer { token } => Self::bearer(token),
            WireCredential::Basic { username, password } => Self::basic(username, password),
            WireCredential::ApiKey { token, header } => Self::ApiKey {
                header,
                key: SecretString::from(token),
            },
        }
    }
}

/// Ephemeral, per-invocation credentials keyed by provider.
///
/// A bundle is never persisted. When it holds a credential for the provider
/// a tool targets, that credential takes precedence over any stored one.
#[derive(Debug, Clone, Default)]
pub struct PassthroughCredentialBundle {
    credentials: HashMap<ProviderName, Credential>,
}

impl PassthroughCredentialBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bundle with a credential added for `provider`.
    #[must_use]
    pub fn with(mut self, provider: ProviderName, credential: Credential) -> Self {
        self.credentials.insert(provider, credential);
        self
    }

    /// Adds or replaces the credential for `provider`.
    pub fn insert(&mut self, provider: ProviderName, credential: Credential) {
        self.credentials.insert(provider, credential);
    }

    /// Returns the credential supplied for `provider`.
    #[must_use]
    pub fn get(&self, provider: &ProviderName) -> Option<&Credential> {
        self.credentials.get(provider)
    }

    /// Returns whether the bundle carries no credentials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Returns the number of providers covered by the bundle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Layers `self` over `base`; entries in `self` win for the same provider.
    #[must_use]
    pub fn layered_over(self, base: &Self) -> Self {
        let mut merged = base.clone();
        merged.credentials.extend(self.credentials);
        merged
    }

    /// Decodes a bundle from its JSON wire form.
    ///
    /// The expected shape is an object keyed by provider name, for example
    /// `{"github": {"type": "bearer", "token": "..."}}`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::InvalidPassthroughBundle`] when the value
    /// is not an object, an entry cannot be decoded, or a provider name is
    /// invalid.
    pub fn from_json(value: &Value) -> Result<Self, ProviderDomainError> {
        let Some(entries) = value.as_object() else {
            return Err(ProviderDomainError::InvalidPassthroughBundle(
                "expected an object keyed by provider".to_owned(),
            ));
        };

        let mut bundle = Self::new();
        for (provider, entry) in entries {
            let name = ProviderName::new(provider.as_str())?;
            let wire: WireCredential = serde_json::from_value(entry.clone()).map_err(|err| {
                ProviderDomainError::InvalidPassthroughBundle(format!("{provider}: {err}"))
            })?;
            bundle.insert(name, wire.into());
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(name: &str) -> ProviderName {
        ProviderName::new(name).expect("valid provider name")
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let credential = Credential::bearer("ghp_supersecret");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("ghp_supersecret"));
    }

    #[test]
    fn bundle_decodes_wire_credentials() {
        let bundle = PassthroughCredentialBundle::from_json(&json!({
            "github": {"type": "bearer", "token": "gh-token"},
            "gitlab": {"type": "api_key", "token": "gl-token", "header": "PRIVATE-TOKEN"},
            "nexus": {"type": "basic", "username": "ci", "password": "pw"}
        }))
        .expect("bundle should decode");

        assert_eq!(bundle.len(), 3);
        let github = bundle.get(&provider("github")).expect("github entry");
        assert_eq!(github.kind(), CredentialKind::Bearer);
        assert_eq!(github.secret(), "gh-token");
        assert!(matches!(
            bundle.get(&provider("gitlab")),
            Some(Credential::ApiKey { header: Some(header), .. }) if header == "PRIVATE-TOKEN"
        ));
        assert_eq!(
            bundle.get(&provider("nexus")).map(Credential::kind),
            Some(CredentialKind::Basic)
        );
    }

    #[test]
    fn bundle_rejects_non_object_payloads() {
        let result = PassthroughCredentialBundle::from_json(&json!(["github"]));
        assert!(matches!(
            result,
            Err(ProviderDomainError::InvalidPassthroughBundle(_))
        ));
    }

    #[test]
    fn bundle_rejects_unknown_credential_types() {
        let result = PassthroughCredentialBundle::from_json(&json!({
            "github": {"type": "kerberos", "token": "x"}
        }));
        assert!(matches!(
            result,
            Err(ProviderDomainError::InvalidPassthroughBundle(_))
        ));
    }

    #[test]
    fn layered_bundle_prefers_overlay_entries() {
        let base = PassthroughCredentialBundle::new()
            .with(provider("github"), Credential::bearer("from-header"))
            .with(provider("gitlab"), Credential::api_key("gitlab-header"));
        let overlay =
            PassthroughCredentialBundle::new().with(provider("github"), Credential::bearer("per-call"));

        let merged = overlay.layered_over(&base);

        assert_eq!(
            merged.get(&provider("github")).map(Credential::secret),
            Some("per-call")
        );
        assert_eq!(
            merged.get(&provider("gitlab")).map(Credential::secret),
            Some("gitlab-header")
        );
    }
}
