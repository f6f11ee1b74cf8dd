//! Request, response and failure types exchanged with provider adapters.

use super::{Credential, ParseHttpMethodError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// HTTP method of a provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// All methods in specification order.
    pub const ALL: [Self; 6] = [
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
    ];

    /// Returns the canonical upper-case representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Returns whether the method changes provider state.
    #[must_use]
    pub const fn is_state_changing(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }

    /// Returns whether unplaced arguments travel in the query string.
    #[must_use]
    pub const fn prefers_query(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for HttpMethod {
    type Error = ParseHttpMethodError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ParseHttpMethodError(value.to_owned())),
        }
    }
}

/// One fully resolved call to a provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Base URL of the configured tool.
    pub base_url: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Path template with `{name}` placeholders.
    pub path_template: String,
    /// Values substituted into the path template.
    pub path_params: Map<String, Value>,
    /// Query string arguments.
    pub query: Map<String, Value>,
    /// JSON request body.
    pub body: Option<Value>,
    /// Credential selected for this call.
    pub credential: Option<Credential>,
}

impl ProviderRequest {
    /// Creates a request with no arguments and no credential.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        method: HttpMethod,
        path_template: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            method,
            path_template: path_template.into(),
            path_params: Map::new(),
            query: Map::new(),
            body: None,
            credential: None,
        }
    }

    /// Attaches a credential.
    #[must_use]
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }
}

/// Successful provider response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded response body; non-JSON bodies are returned as a string.
    pub body: Value,
}

impl ProviderResponse {
    /// Creates a response.
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// Failure reported by a provider adapter.
///
/// Transient failures (network errors, timeouts, `5xx` and `429`) count
/// against a tool's circuit breaker. Permanent failures mean the provider
/// was reachable and rejected the call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderFailure {
    /// The provider could not be reached or reported a server-side error.
    #[error("transient provider failure: {message}")]
    Transient {
        /// HTTP status when one was received.
        status: Option<u16>,
        /// Failure detail.
        message: String,
    },

    /// The provider rejected the request.
    #[error("provider rejected request with status {status}: {message}")]
    Permanent {
        /// HTTP status code.
        status: u16,
        /// Failure detail, usually the provider's error message.
        message: String,
    },

    /// The call exceeded the execution time budget.
    #[error("provider call timed out after {elapsed_ms} ms")]
    Timeout {
        /// Elapsed time budget in milliseconds.
        elapsed_ms: u64,
    },

    /// The request could not be constructed.
    #[error("invalid provider request: {0}")]
    InvalidRequest(String),
}

impl ProviderFailure {
    /// Creates a transient failure without a status code.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
        }
    }

    /// Returns whether the failure is transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Returns a stable classification string.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Permanent { .. } => "permanent",
            Self::Timeout { .. } => "timeout",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Classifies an HTTP status received from a provider.
    ///
    /// Returns `None` for success statuses.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        match status {
            200..=399 => None,
            429 | 500..=599 => Some(Self::Transient {
                status: Some(status),
                message: message.into(),
            }),
            _ => Some(Self::Permanent {
                status,
                message: message.into(),
            }),
        }
    }
}
