//! In-memory discovery session repository.

use crate::discovery::{
    domain::{DiscoverySession, DiscoverySessionId},
    ports::{DiscoverySessionError, DiscoverySessionRepository, DiscoverySessionResult},
};
use crate::tool_registry::domain::ToolId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe in-memory discovery session repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDiscoverySessionRepository {
    state: Arc<RwLock<SessionState>>,
}

#[derive(Debug, Default)]
struct SessionState {
    sessions: HashMap<DiscoverySessionId, DiscoverySession>,
    by_tool: HashMap<ToolId, Vec<DiscoverySessionId>>,
}

impl SessionState {
    fn for_tool(&self, tool_id: ToolId) -> impl Iterator<Item = &DiscoverySession> {
        self.by_tool
            .get(&tool_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.sessions.get(id))
    }
}

impl InMemoryDiscoverySessionRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every session of a tool, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoverySessionError::Persistence`] when the lock is
    /// poisoned.
    pub fn history(&self, tool_id: ToolId) -> DiscoverySessionResult<Vec<DiscoverySession>> {
        Ok(self.read()?.for_tool(tool_id).cloned().collect())
    }

    fn read(&self) -> DiscoverySessionResult<RwLockReadGuard<'_, SessionState>> {
        self.state.read().map_err(|err| {
            DiscoverySessionError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> DiscoverySessionResult<RwLockWriteGuard<'_, SessionState>> {
        self.state.write().map_err(|err| {
            DiscoverySessionError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

#[async_trait]
impl DiscoverySessionRepository for InMemoryDiscoverySessionRepository {
    async fn begin(&self, session: &DiscoverySession) -> DiscoverySessionResult<()> {
        let mut state = self.write()?;
        if let Some(running) = state
            .for_tool(session.tool_id())
            .find(|existing| existing.is_running())
        {
            return Err(DiscoverySessionError::AlreadyRunning {
                tool_id: session.tool_id(),
                session_id: running.id(),
            });
        }
        state.sessions.insert(session.id(), session.clone());
        state
            .by_tool
            .entry(session.tool_id())
            .or_default()
            .push(session.id());
        Ok(())
    }

    async fn update(&self, session: &DiscoverySession) -> DiscoverySessionResult<()> {
        let mut state = self.write()?;
        let stored = state
            .sessions
            .get_mut(&session.id())
            .ok_or(DiscoverySessionError::NotFound(session.id()))?;
        *stored = session.clone();
        Ok(())
    }

    async fn find(
        &self,
        id: DiscoverySessionId,
    ) -> DiscoverySessionResult<Option<DiscoverySession>> {
        Ok(self.read()?.sessions.get(&id).cloned())
    }

    async fn latest_for_tool(
        &self,
        tool_id: ToolId,
    ) -> DiscoverySessionResult<Option<DiscoverySession>> {
        Ok(self.read()?.for_tool(tool_id).last().cloned())
    }

    async fn running_for_tool(
        &self,
        tool_id: ToolId,
    ) -> DiscoverySessionResult<Option<DiscoverySession>> {
        Ok(self
            .read()?
            .for_tool(tool_id)
            .find(|session| session.is_running())
            .cloned())
    }
}
