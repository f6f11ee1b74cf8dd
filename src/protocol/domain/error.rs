//! Error types for protocol session state and naming.

use super::SessionState;
use thiserror::Error;

/// Errors returned by protocol domain operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolDomainError {
    /// The session cannot move between the given states.
    #[error("session cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// A wire tool name lacks the `<tool>.<operation>` shape.
    #[error("tool name '{0}' must have the form '<tool>.<operation>'")]
    InvalidToolName(String),
}

/// Error returned while parsing a client class.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown client class: {0}")]
pub struct ParseClientClassError(pub String);
