//! In-memory execution record log.

use crate::tool_registry::{
    domain::{ExecutionId, ExecutionRecord, ToolId},
    ports::{ExecutionRecordError, ExecutionRecordResult, ExecutionRecordStore},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory execution record store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutionRecordStore {
    state: Arc<RwLock<RecordState>>,
}

#[derive(Debug, Default)]
struct RecordState {
    records: HashMap<ExecutionId, ExecutionRecord>,
    order: Vec<ExecutionId>,
}

impl InMemoryExecutionRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionRecordError::Persistence`] when the lock is poisoned.
    pub fn all(&self) -> ExecutionRecordResult<Vec<ExecutionRecord>> {
        let state = self.state.read().map_err(|err| {
            ExecutionRecordError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExecutionRecordStore for InMemoryExecutionRecordStore {
    async fn begin(&self, record: &ExecutionRecord) -> ExecutionRecordResult<()> {
        let mut state = self.state.write().map_err(|err| {
            ExecutionRecordError::persistence(std::io::Error::other(err.to_string()))
        })?;
        if state.records.contains_key(&record.id()) {
            return Err(ExecutionRecordError::Duplicate(record.id()));
        }
        state.order.push(record.id());
        state.records.insert(record.id(), record.clone());
        Ok(())
    }

    async fn finalize(&self, record: &ExecutionRecord) -> ExecutionRecordResult<()> {
        let mut state = self.state.write().map_err(|err| {
            ExecutionRecordError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let stored = state
            .records
            .get_mut(&record.id())
            .ok_or(ExecutionRecordError::NotFound(record.id()))?;
        if stored.is_finalized() {
            return Err(ExecutionRecordError::AlreadyFinalized(record.id()));
        }
        *stored = record.clone();
        Ok(())
    }

    async fn find(&self, id: ExecutionId) -> ExecutionRecordResult<Option<ExecutionRecord>> {
        let state = self.state.read().map_err(|err| {
            ExecutionRecordError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.records.get(&id).cloned())
    }

    async fn recent(
        &self,
        tool_id: ToolId,
        limit: usize,
    ) -> ExecutionRecordResult<Vec<ExecutionRecord>> {
        let state = self.state.read().map_err(|err| {
            ExecutionRecordError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.records.get(id))
            .filter(|record| record.tool_id() == tool_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
