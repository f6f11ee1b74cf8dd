//! Dead-letter store port.

use crate::ingestion::domain::{DeadLetterEntry, EventId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for dead-letter store operations.
pub type DeadLetterResult<T> = Result<T, DeadLetterError>;

/// Holding area for events that exhausted their retry budget.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Stores an entry. Storing the same event again replaces it.
    async fn put(&self, entry: &DeadLetterEntry) -> DeadLetterResult<()>;

    /// Returns every entry, oldest first.
    async fn list(&self) -> DeadLetterResult<Vec<DeadLetterEntry>>;

    /// Finds an entry by event identifier.
    async fn find(&self, id: EventId) -> DeadLetterResult<Option<DeadLetterEntry>>;
}

/// Errors returned by dead-letter stores.
#[derive(Debug, Clone, Error)]
pub enum DeadLetterError {
    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl DeadLetterError {
    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
