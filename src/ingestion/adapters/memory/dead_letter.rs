//! In-memory dead-letter store.

use crate::ingestion::{
    domain::{DeadLetterEntry, EventId},
    ports::{DeadLetterError, DeadLetterResult, DeadLetterStore},
};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory dead-letter store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterStore {
    entries: Arc<RwLock<Vec<DeadLetterEntry>>>,
}

impl InMemoryDeadLetterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: impl ToString) -> DeadLetterError {
    DeadLetterError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn put(&self, entry: &DeadLetterEntry) -> DeadLetterResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.retain(|existing| existing.event.id() != entry.event.id());
        entries.push(entry.clone());
        Ok(())
    }

    async fn list(&self) -> DeadLetterResult<Vec<DeadLetterEntry>> {
        Ok(self.entries.read().map_err(poisoned)?.clone())
    }

    async fn find(&self, id: EventId) -> DeadLetterResult<Option<DeadLetterEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|entry| entry.event.id() == id)
            .cloned())
    }
}
