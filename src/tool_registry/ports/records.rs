//! Port for appending and querying execution records.

use crate::tool_registry::domain::{ExecutionId, ExecutionRecord, ToolId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for execution record operations.
pub type ExecutionRecordResult<T> = Result<T, ExecutionRecordError>;

/// Append-only store of execution records.
#[async_trait]
pub trait ExecutionRecordStore: Send + Sync {
    /// Stores a pending record.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionRecordError::Duplicate`] when the ID already exists.
    async fn begin(&self, record: &ExecutionRecord) -> ExecutionRecordResult<()>;

    /// Replaces a pending record with its finalized form.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionRecordError::NotFound`] for an unknown record and
    /// [`ExecutionRecordError::AlreadyFinalized`] when the stored record is no
    /// longer pending.
    async fn finalize(&self, record: &ExecutionRecord) -> ExecutionRecordResult<()>;

    /// Finds a record by identifier.
    async fn find(&self, id: ExecutionId) -> ExecutionRecordResult<Option<ExecutionRecord>>;

    /// Returns up to `limit` most recent records for a tool, newest first.
    async fn recent(&self, tool_id: ToolId, limit: usize)
    -> ExecutionRecordResult<Vec<ExecutionRecord>>;
}

/// Errors returned by execution record stores.
#[derive(Debug, Clone, Error)]
pub enum ExecutionRecordError {
    /// A record with the same identifier already exists.
    #[error("duplicate execution record: {0}")]
    Duplicate(ExecutionId),

    /// The record was not found.
    #[error("execution record not found: {0}")]
    NotFound(ExecutionId),

    /// The stored record has already been finalized.
    #[error("execution record {0} is already finalized")]
    AlreadyFinalized(ExecutionId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ExecutionRecordError {
    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
