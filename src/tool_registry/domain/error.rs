//! Error types for tool registry domain validation and parsing.

use super::{ExecutionId, ToolId};
use thiserror::Error;

/// Errors returned while constructing tool registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRegistryDomainError {
    /// The tenant identifier is empty after trimming.
    #[error("tenant identifier must not be empty")]
    EmptyTenantId,

    /// The tenant identifier contains characters outside `[a-z0-9_-]`.
    #[error(
        "tenant identifier '{0}' contains invalid characters (only lowercase alphanumeric, '-' and '_' allowed)"
    )]
    InvalidTenantId(String),

    /// The tool name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// The tool name contains characters outside `[a-z0-9_]`.
    #[error(
        "tool name '{0}' contains invalid characters (only lowercase alphanumeric and underscores allowed)"
    )]
    InvalidToolName(String),

    /// The tool name exceeds the 100-character storage limit.
    #[error("tool name exceeds 100 character limit: {0}")]
    ToolNameTooLong(String),

    /// The base URL is not an absolute `http` or `https` URL.
    #[error("base URL '{0}' must be an absolute http:// or https:// URL")]
    InvalidBaseUrl(String),

    /// A discovery hint is neither an absolute path nor an `http(s)` URL.
    #[error("discovery hint '{0}' must be an absolute path or an http:// or https:// URL")]
    InvalidDiscoveryHint(String),

    /// An authenticated descriptor has no secret reference.
    #[error("authentication kind '{0}' requires a secret reference")]
    MissingSecretReference(String),

    /// The operation key is empty or contains invalid characters.
    #[error("invalid operation key '{0}' (expected dotted lowercase segments)")]
    InvalidOperationKey(String),

    /// The operation path template is empty or not absolute.
    #[error("operation path template '{0}' must start with '/'")]
    InvalidPathTemplate(String),

    /// The tool is inactive.
    #[error("tool {0} is inactive")]
    ToolInactive(ToolId),

    /// An execution record was finalized twice.
    #[error("execution record {0} is already finalized")]
    ExecutionAlreadyFinalized(ExecutionId),
}

/// Error returned while parsing health status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown tool health status: {0}")]
pub struct ParseHealthStatusError(pub String);

/// Error returned while parsing an authentication kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown authentication kind: {0}")]
pub struct ParseAuthKindError(pub String);

/// Error returned while parsing an operation classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown operation classification: {0}")]
pub struct ParseOperationClassError(pub String);

/// Error returned while parsing an execution status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown execution status: {0}")]
pub struct ParseExecutionStatusError(pub String);
