//! In-memory event stream with claim leases.

use crate::ingestion::{
    domain::{EventId, WebhookEvent},
    ports::{EventStream, EventStreamError, EventStreamResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Thread-safe in-memory event stream.
///
/// Entries are claimed in append order. Lease expiry and retry delays are
/// evaluated against the injected clock.
pub struct InMemoryEventStream<C: Clock + Send + Sync> {
    state: Arc<RwLock<StreamState>>,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> Clone for InMemoryEventStream<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

#[derive(Debug, Default)]
struct StreamState {
    next_sequence: u64,
    entries: BTreeMap<u64, StreamEntry>,
    by_id: HashMap<EventId, u64>,
}

#[derive(Debug)]
struct StreamEntry {
    event: WebhookEvent,
    lease: Option<Lease>,
    available_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Lease {
    consumer: String,
    expires_at: DateTime<Utc>,
}

impl StreamEntry {
    fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.available_at <= now && self.lease.as_ref().is_none_or(|lease| lease.expires_at <= now)
    }
}

impl StreamState {
    fn entry_mut(&mut self, id: EventId) -> EventStreamResult<&mut StreamEntry> {
        let sequence = self.by_id.get(&id).ok_or(EventStreamError::NotFound(id))?;
        self.entries
            .get_mut(sequence)
            .ok_or(EventStreamError::NotFound(id))
    }

    fn remove(&mut self, id: EventId) -> EventStreamResult<StreamEntry> {
        let sequence = self.by_id.remove(&id).ok_or(EventStreamError::NotFound(id))?;
        self.entries
            .remove(&sequence)
            .ok_or(EventStreamError::NotFound(id))
    }
}

impl<C: Clock + Send + Sync> InMemoryEventStream<C> {
    /// Creates an empty stream.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            state: Arc::new(RwLock::new(StreamState::default())),
            clock,
        }
    }

    /// Returns the consumer currently holding a live lease on an entry.
    ///
    /// # Errors
    ///
    /// Returns [`EventStreamError::NotFound`] when the entry is gone.
    pub fn lease_holder(&self, id: EventId) -> EventStreamResult<Option<String>> {
        let now = self.clock.utc();
        let state = self.read()?;
        let sequence = state.by_id.get(&id).ok_or(EventStreamError::NotFound(id))?;
        Ok(state
            .entries
            .get(sequence)
            .and_then(|entry| entry.lease.as_ref())
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.consumer.clone()))
    }

    fn read(&self) -> EventStreamResult<RwLockReadGuard<'_, StreamState>> {
        self.state
            .read()
            .map_err(|err| EventStreamError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> EventStreamResult<RwLockWriteGuard<'_, StreamState>> {
        self.state
            .write()
            .map_err(|err| EventStreamError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> EventStream for InMemoryEventStream<C> {
    async fn append(&self, event: &WebhookEvent) -> EventStreamResult<()> {
        let now = self.clock.utc();
        let mut state = self.write()?;
        if state.by_id.contains_key(&event.id()) {
            return Ok(());
        }
        let sequence = state.next_sequence;
        state.next_sequence = sequence.saturating_add(1);
        state.by_id.insert(event.id(), sequence);
        state.entries.insert(
            sequence,
            StreamEntry {
                event: event.clone(),
                lease: None,
                available_at: now,
            },
        );
        Ok(())
    }

    async fn claim(
        &self,
        consumer: &str,
        max: usize,
        visibility: Duration,
    ) -> EventStreamResult<Vec<WebhookEvent>> {
        let now = self.clock.utc();
        let expires_at = chrono::Duration::from_std(visibility)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut state = self.write()?;
        let claimed = state
            .entries
            .values_mut()
            .filter(|entry| entry.is_claimable(now))
            .take(max)
            .map(|entry| {
                entry.lease = Some(Lease {
                    consumer: consumer.to_owned(),
                    expires_at,
                });
                entry.event.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn ack(&self, id: EventId) -> EventStreamResult<()> {
        self.write()?.remove(id).map(drop)
    }

    async fn fail(
        &self,
        id: EventId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> EventStreamResult<WebhookEvent> {
        let mut state = self.write()?;
        let entry = state.entry_mut(id)?;
        entry.event.record_failure(error, &*self.clock);
        entry.lease = None;
        entry.available_at = retry_at;
        Ok(entry.event.clone())
    }

    async fn dead_letter(&self, id: EventId) -> EventStreamResult<WebhookEvent> {
        Ok(self.write()?.remove(id)?.event)
    }

    async fn pending_count(&self) -> EventStreamResult<usize> {
        Ok(self.read()?.entries.len())
    }
}
