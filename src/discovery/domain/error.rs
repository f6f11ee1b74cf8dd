//! Error types for discovery domain validation and parsing.

use super::{DiscoverySessionId, DiscoveryState};
use thiserror::Error;

/// Errors returned while parsing specifications or building catalogs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryDomainError {
    /// The document is neither valid JSON nor valid YAML.
    #[error("specification is neither JSON nor YAML: {0}")]
    UnreadableDocument(String),

    /// The document parsed but does not describe an API.
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),

    /// A `$ref` points outside the document or at a missing component.
    #[error("unresolvable reference '{0}'")]
    UnresolvableReference(String),

    /// A session was moved out of a terminal state.
    #[error("discovery session {session_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Session being transitioned.
        session_id: DiscoverySessionId,
        /// Current state.
        from: DiscoveryState,
        /// Requested state.
        to: DiscoveryState,
    },
}

/// Error returned while parsing a discovery state from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown discovery state: {0}")]
pub struct ParseDiscoveryStateError(pub String);
