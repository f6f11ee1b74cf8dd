//! Discovery session lifecycle.

use super::{DiscoveryDomainError, ParseDiscoveryStateError};
use crate::tool_registry::domain::{TenantId, ToolId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoverySessionId(Uuid);

impl DiscoverySessionId {
    /// Creates a new random session identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a session identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for DiscoverySessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DiscoverySessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// State of a discovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    /// Discovery is fetching or parsing the specification.
    Running,
    /// A new catalog version was published.
    Completed,
    /// Discovery stopped; any prior catalog is untouched.
    Failed,
}

impl DiscoveryState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DiscoveryState {
    type Error = ParseDiscoveryStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseDiscoveryStateError(value.to_owned())),
        }
    }
}

/// One discovery run against one tool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySession {
    id: DiscoverySessionId,
    tenant: TenantId,
    tool_id: ToolId,
    state: DiscoveryState,
    operation_count: usize,
    catalog_version: Option<u32>,
    error: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted session.
#[derive(Debug, Clone)]
pub struct PersistedDiscoverySession {
    /// Session identifier.
    pub id: DiscoverySessionId,
    /// Owning tenant.
    pub tenant: TenantId,
    /// Tool being discovered.
    pub tool_id: ToolId,
    /// Current state.
    pub state: DiscoveryState,
    /// Number of operations in the published catalog.
    pub operation_count: usize,
    /// Published catalog version, for completed sessions.
    pub catalog_version: Option<u32>,
    /// Failure cause, for failed sessions.
    pub error: Option<String>,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// Completion timestamp.
    pub finished_at: Option<DateTime<Utc>>,
}

impl DiscoverySession {
    /// Starts a running session for `tool_id`.
    #[must_use]
    pub fn start(tenant: TenantId, tool_id: ToolId, clock: &impl Clock) -> Self {
        Self {
            id: DiscoverySessionId::new(),
            tenant,
            tool_id,
            state: DiscoveryState::Running,
            operation_count: 0,
            catalog_version: None,
            error: None,
            started_at: clock.utc(),
            finished_at: None,
        }
    }

    /// Reconstructs a session from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedDiscoverySession) -> Self {
        Self {
            id: data.id,
            tenant: data.tenant,
            tool_id: data.tool_id,
            state: data.state,
            operation_count: data.operation_count,
            catalog_version: data.catalog_version,
            error: data.error,
            started_at: data.started_at,
            finished_at: data.finished_at,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> DiscoverySessionId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Returns the tool being discovered.
    #[must_use]
    pub const fn tool_id(&self) -> ToolId {
        self.tool_id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Returns the number of operations published.
    #[must_use]
    pub const fn operation_count(&self) -> usize {
        self.operation_count
    }

    /// Returns the published catalog version.
    #[must_use]
    pub const fn catalog_version(&self) -> Option<u32> {
        self.catalog_version
    }

    /// Returns the failure cause.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the completion timestamp.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns whether the session is still running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, DiscoveryState::Running)
    }

    /// Marks the session completed with the published catalog version.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::InvalidTransition`] when the session
    /// has already finished.
    pub fn complete(
        &mut self,
        catalog_version: u32,
        operation_count: usize,
        clock: &impl Clock,
    ) -> Result<(), DiscoveryDomainError> {
        self.finish(DiscoveryState::Completed)?;
        self.catalog_version = Some(catalog_version);
        self.operation_count = operation_count;
        self.finished_at = Some(clock.utc());
        Ok(())
    }

    /// Marks the session failed with `cause`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::InvalidTransition`] when the session
    /// has already finished.
    pub fn fail(
        &mut self,
        cause: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), DiscoveryDomainError> {
        self.finish(DiscoveryState::Failed)?;
        self.error = Some(cause.into());
        self.finished_at = Some(clock.utc());
        Ok(())
    }

    fn finish(&mut self, to: DiscoveryState) -> Result<(), DiscoveryDomainError> {
        if self.state.is_terminal() {
            return Err(DiscoveryDomainError::InvalidTransition {
                session_id: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
