//! Repository port for discovery sessions.

use crate::discovery::domain::{DiscoverySession, DiscoverySessionId};
use crate::tool_registry::domain::ToolId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for discovery session persistence.
pub type DiscoverySessionResult<T> = Result<T, DiscoverySessionError>;

/// Persistence contract for discovery sessions.
#[async_trait]
pub trait DiscoverySessionRepository: Send + Sync {
    /// Stores a new running session.
    ///
    /// The check for an existing running session and the insert are one
    /// atomic step, so at most one session per tool is ever running.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoverySessionError::AlreadyRunning`] when the tool
    /// already has a running session.
    async fn begin(&self, session: &DiscoverySession) -> DiscoverySessionResult<()>;

    /// Persists a state change of an existing session.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoverySessionError::NotFound`] when the session does not
    /// exist.
    async fn update(&self, session: &DiscoverySession) -> DiscoverySessionResult<()>;

    /// Finds a session by identifier.
    async fn find(&self, id: DiscoverySessionId)
    -> DiscoverySessionResult<Option<DiscoverySession>>;

    /// Returns the most recently started session for a tool.
    async fn latest_for_tool(&self, tool_id: ToolId)
    -> DiscoverySessionResult<Option<DiscoverySession>>;

    /// Returns the running session for a tool, if any.
    async fn running_for_tool(
        &self,
        tool_id: ToolId,
    ) -> DiscoverySessionResult<Option<DiscoverySession>>;
}

/// Errors returned by discovery session repositories.
#[derive(Debug, Clone, Error)]
pub enum DiscoverySessionError {
    /// Another discovery is already running for the tool.
    #[error("discovery {session_id} is already running for tool {tool_id}")]
    AlreadyRunning {
        /// Tool being discovered.
        tool_id: ToolId,
        /// The running session.
        session_id: DiscoverySessionId,
    },

    /// The session was not found.
    #[error("discovery session not found: {0}")]
    NotFound(DiscoverySessionId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl DiscoverySessionError {
    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
