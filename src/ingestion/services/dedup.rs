//! Duplicate-delivery suppression.

use crate::ingestion::{
    domain::WebhookEvent,
    ports::{EventHandler, HandlerResult},
};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Default number of remembered deliveries.
pub const DEFAULT_DEDUP_CAPACITY: NonZeroUsize = match NonZeroUsize::new(10_000) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Wraps a handler so redelivered events are processed once.
///
/// Keys are remembered only after the inner handler succeeds, so a failed
/// attempt is retried normally. The memory is bounded; a duplicate arriving
/// after its key was evicted is handled again.
pub struct DedupHandler<H: EventHandler> {
    inner: H,
    seen: Mutex<LruCache<String, ()>>,
}

impl<H: EventHandler> DedupHandler<H> {
    /// Wraps `inner`, remembering up to `capacity` processed deliveries.
    #[must_use]
    pub fn new(inner: H, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the wrapped handler.
    #[must_use]
    pub const fn inner(&self) -> &H {
        &self.inner
    }

    fn seen(&self) -> MutexGuard<'_, LruCache<String, ()>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<H: EventHandler> EventHandler for DedupHandler<H> {
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult<()> {
        let key = event.dedup_key();
        if self.seen().get(&key).is_some() {
            debug!(event_id = %event.id(), dedup_key = %key, "skipping duplicate delivery");
            return Ok(());
        }
        self.inner.handle(event).await?;
        self.seen().put(key, ());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::ports::{HandlerError, MockEventHandler};
    use crate::provider::domain::ProviderName;
    use mockable::DefaultClock;
    use serde_json::json;

    fn delivery(id: &str) -> WebhookEvent {
        WebhookEvent::received(
            ProviderName::new("github").expect("valid provider"),
            Some(id.to_owned()),
            Some("push".to_owned()),
            json!({}),
            &DefaultClock,
        )
    }

    fn capacity(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).expect("non-zero capacity")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn redelivered_events_reach_the_handler_once() {
        let mut inner = MockEventHandler::new();
        inner.expect_handle().times(1).returning(|_| Ok(()));
        let handler = DedupHandler::new(inner, capacity(8));

        handler.handle(&delivery("d-1")).await.expect("first delivery");
        handler.handle(&delivery("d-1")).await.expect("second delivery");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_attempts_are_not_remembered() {
        let mut inner = MockEventHandler::new();
        let mut sequence = mockall::Sequence::new();
        inner
            .expect_handle()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Err(HandlerError::Invalid("boom".to_owned())));
        inner
            .expect_handle()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        let handler = DedupHandler::new(inner, capacity(8));
        let event = delivery("d-2");

        assert!(handler.handle(&event).await.is_err());
        handler.handle(&event).await.expect("retry should reach the handler");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn evicted_keys_are_handled_again() {
        let mut inner = MockEventHandler::new();
        inner.expect_handle().times(3).returning(|_| Ok(()));
        let handler = DedupHandler::new(inner, capacity(1));

        handler.handle(&delivery("a")).await.expect("a");
        handler.handle(&delivery("b")).await.expect("b evicts a");
        handler.handle(&delivery("a")).await.expect("a again");
    }
}
