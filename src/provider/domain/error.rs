//! Error types for provider domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing provider domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderDomainError {
    /// The provider name is empty after trimming.
    #[error("provider name must not be empty")]
    EmptyProviderName,

    /// The provider name contains characters outside `[a-z0-9_-]`.
    #[error(
        "provider name '{0}' contains invalid characters (only lowercase alphanumeric, '-' and '_' allowed)"
    )]
    InvalidProviderName(String),

    /// The provider name exceeds the 64-character limit.
    #[error("provider name exceeds 64 character limit: {0}")]
    ProviderNameTooLong(String),

    /// A caller-supplied passthrough bundle could not be decoded.
    #[error("invalid passthrough credential bundle: {0}")]
    InvalidPassthroughBundle(String),
}

/// Error returned while parsing an HTTP method from a specification or storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported HTTP method: {0}")]
pub struct ParseHttpMethodError(pub String);
