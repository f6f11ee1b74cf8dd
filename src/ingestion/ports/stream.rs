//! Durable event stream port.

use crate::ingestion::domain::{EventId, WebhookEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for event stream operations.
pub type EventStreamResult<T> = Result<T, EventStreamError>;

/// Append-only stream drained by a consumer group.
///
/// Claims are leases: an entry claimed but neither acknowledged nor failed
/// before its visibility timeout becomes claimable again.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Appends a received event. The event is durable once this returns.
    async fn append(&self, event: &WebhookEvent) -> EventStreamResult<()>;

    /// Leases up to `max` available entries to `consumer`.
    async fn claim(
        &self,
        consumer: &str,
        max: usize,
        visibility: Duration,
    ) -> EventStreamResult<Vec<WebhookEvent>>;

    /// Removes a processed entry.
    ///
    /// # Errors
    ///
    /// Returns [`EventStreamError::NotFound`] when the entry is gone, for
    /// example because another consumer already acknowledged it.
    async fn ack(&self, id: EventId) -> EventStreamResult<()>;

    /// Records a failed attempt, releases the lease and hides the entry
    /// until `retry_at`. Returns the entry with its updated history.
    async fn fail(
        &self,
        id: EventId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> EventStreamResult<WebhookEvent>;

    /// Removes an exhausted entry and returns it verbatim.
    async fn dead_letter(&self, id: EventId) -> EventStreamResult<WebhookEvent>;

    /// Returns the number of entries not yet acknowledged or dead-lettered.
    async fn pending_count(&self) -> EventStreamResult<usize>;
}

/// Errors returned by event streams.
#[derive(Debug, Clone, Error)]
pub enum EventStreamError {
    /// The entry is not in the stream.
    #[error("event {0} not found in stream")]
    NotFound(EventId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl EventStreamError {
    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
