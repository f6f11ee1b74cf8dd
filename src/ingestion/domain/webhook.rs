//! Webhook authentication.
//!
//! GitHub signs the raw body with HMAC-SHA256; GitLab echoes a shared token.
//! Other providers pick either scheme in configuration.

use super::{ParseWebhookSchemeError, WebhookAuthError};
use crate::provider::domain::ProviderName;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How a provider authenticates its deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookScheme {
    /// `sha256=<hex>` HMAC over the raw body.
    HmacSha256,
    /// Shared secret echoed in a header.
    SharedToken,
}

impl WebhookScheme {
    /// Returns the canonical configuration representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HmacSha256 => "hmac_sha256",
            Self::SharedToken => "shared_token",
        }
    }
}

impl fmt::Display for WebhookScheme {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for WebhookScheme {
    type Error = ParseWebhookSchemeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "hmac_sha256" => Ok(Self::HmacSha256),
            "shared_token" => Ok(Self::SharedToken),
            other => Err(ParseWebhookSchemeError(other.to_owned())),
        }
    }
}

/// Header names a provider uses for its deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderConvention {
    /// Header carrying the signature or token.
    pub signature: &'static str,
    /// Header carrying the provider's delivery identifier.
    pub delivery_id: &'static str,
    /// Header carrying the provider's event type.
    pub event_type: &'static str,
}

impl HeaderConvention {
    /// Returns the convention for a provider and scheme.
    #[must_use]
    pub fn for_provider(provider: &ProviderName, scheme: WebhookScheme) -> Self {
        match (provider.as_str(), scheme) {
            ("github", WebhookScheme::HmacSha256) => Self {
                signature: "x-hub-signature-256",
                delivery_id: "x-github-delivery",
                event_type: "x-github-event",
            },
            ("gitlab", WebhookScheme::SharedToken) => Self {
                signature: "x-gitlab-token",
                delivery_id: "x-gitlab-event-uuid",
                event_type: "x-gitlab-event",
            },
            (_, WebhookScheme::HmacSha256) => Self {
                signature: "x-signature-256",
                delivery_id: "x-webhook-id",
                event_type: "x-webhook-event",
            },
            (_, WebhookScheme::SharedToken) => Self {
                signature: "x-webhook-token",
                delivery_id: "x-webhook-id",
                event_type: "x-webhook-event",
            },
        }
    }
}

/// Configured secret for one provider's webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    provider: ProviderName,
    scheme: WebhookScheme,
    secret: SecretString,
}

impl WebhookVerifier {
    /// Creates a verifier.
    #[must_use]
    pub const fn new(provider: ProviderName, scheme: WebhookScheme, secret: SecretString) -> Self {
        Self {
            provider,
            scheme,
            secret,
        }
    }

    /// Returns the provider.
    #[must_use]
    pub const fn provider(&self) -> &ProviderName {
        &self.provider
    }

    /// Returns the scheme.
    #[must_use]
    pub const fn scheme(&self) -> WebhookScheme {
        self.scheme
    }

    /// Returns the header names for this provider.
    #[must_use]
    pub fn headers(&self) -> HeaderConvention {
        HeaderConvention::for_provider(&self.provider, self.scheme)
    }

    /// Checks the presented signature or token against the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookAuthError`] when the header is missing, malformed or
    /// does not match.
    pub fn verify(&self, presented: Option<&str>, body: &[u8]) -> Result<(), WebhookAuthError> {
        let header = self.headers().signature;
        let value = presented
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(WebhookAuthError::MissingSignature(header))?;

        let matches = match self.scheme {
            WebhookScheme::SharedToken => value
                .as_bytes()
                .ct_eq(self.secret.expose_secret().as_bytes()),
            WebhookScheme::HmacSha256 => {
                let hex_digest = value.strip_prefix("sha256=").unwrap_or(value);
                let expected =
                    hex::decode(hex_digest).map_err(|_| WebhookAuthError::MalformedSignature)?;
                let actual = sign(self.secret.expose_secret(), body)
                    .ok_or(WebhookAuthError::SignatureMismatch)?;
                actual.ct_eq(&expected)
            }
        };
        if bool::from(matches) {
            Ok(())
        } else {
            Err(WebhookAuthError::SignatureMismatch)
        }
    }
}

/// Computes the raw HMAC-SHA256 of `body` under `secret`.
///
/// HMAC accepts keys of any length, so `None` never occurs in practice.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Formats a GitHub-style `sha256=<hex>` signature header value.
#[must_use]
pub fn signature_header(secret: &str, body: &[u8]) -> Option<String> {
    sign(secret, body).map(|digest| format!("sha256={}", hex::encode(digest)))
}
