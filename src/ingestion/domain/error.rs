//! Error types for ingestion domain validation and parsing.

use thiserror::Error;

/// Reasons a webhook delivery fails authentication.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum WebhookAuthError {
    /// The signature or token header is absent.
    #[error("missing webhook signature header '{0}'")]
    MissingSignature(&'static str),

    /// The header is present but not in the expected format.
    #[error("malformed webhook signature")]
    MalformedSignature,

    /// The signature or token does not match the configured secret.
    #[error("webhook signature mismatch")]
    SignatureMismatch,
}

/// Error returned while parsing a webhook authentication scheme.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown webhook scheme: {0}")]
pub struct ParseWebhookSchemeError(pub String);
