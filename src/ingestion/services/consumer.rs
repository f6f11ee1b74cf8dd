//! Consumer group draining the event stream.

use crate::ingestion::{
    domain::{DeadLetterEntry, RetryPolicy, WebhookEvent},
    ports::{
        DeadLetterError, DeadLetterStore, EventHandler, EventStream, EventStreamError,
    },
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tuning for a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Prefix for worker consumer names.
    pub group: String,
    /// Number of worker tasks.
    pub workers: usize,
    /// Entries claimed per poll.
    pub batch_size: usize,
    /// Lease length for claimed entries.
    pub visibility: Duration,
    /// Sleep between polls of an empty stream.
    pub poll_interval: Duration,
    /// Retry budget and backoff.
    pub retry: RetryPolicy,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            group: "meshgate".to_owned(),
            workers: 5,
            batch_size: 10,
            visibility: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

/// Errors that stop a single poll.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The stream failed.
    #[error(transparent)]
    Stream(#[from] EventStreamError),

    /// The dead-letter store failed.
    #[error(transparent)]
    DeadLetter(#[from] DeadLetterError),
}

/// Counts for one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Entries claimed.
    pub claimed: usize,
    /// Entries handled and acknowledged.
    pub acknowledged: usize,
    /// Entries scheduled for another attempt.
    pub retried: usize,
    /// Entries moved to the dead-letter store.
    pub dead_lettered: usize,
}

/// Workers that claim, handle and acknowledge stream entries.
///
/// Delivery is at least once: an entry is removed only after its handler
/// succeeds, so a worker dying mid-event leaves the entry to be reclaimed
/// when its lease lapses.
pub struct ConsumerGroup<S, D, H, C>
where
    S: EventStream,
    D: DeadLetterStore,
    H: EventHandler,
    C: Clock + Send + Sync,
{
    stream: Arc<S>,
    dead_letters: Arc<D>,
    handler: Arc<H>,
    clock: Arc<C>,
    settings: ConsumerSettings,
}

impl<S, D, H, C> Clone for ConsumerGroup<S, D, H, C>
where
    S: EventStream,
    D: DeadLetterStore,
    H: EventHandler,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            stream: Arc::clone(&self.stream),
            dead_letters: Arc::clone(&self.dead_letters),
            handler: Arc::clone(&self.handler),
            clock: Arc::clone(&self.clock),
            settings: self.settings.clone(),
        }
    }
}

impl<S, D, H, C> ConsumerGroup<S, D, H, C>
where
    S: EventStream + 'static,
    D: DeadLetterStore + 'static,
    H: EventHandler + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a consumer group.
    #[must_use]
    pub const fn new(
        stream: Arc<S>,
        dead_letters: Arc<D>,
        handler: Arc<H>,
        clock: Arc<C>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            stream,
            dead_letters,
            handler,
            clock,
            settings,
        }
    }

    /// Returns the group settings.
    #[must_use]
    pub const fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Claims one batch as `consumer` and processes it.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] when the stream or dead-letter store fails.
    /// Handler failures are not errors; they schedule a retry.
    pub async fn run_once(&self, consumer: &str) -> Result<PollSummary, ConsumerError> {
        let batch = self
            .stream
            .claim(consumer, self.settings.batch_size, self.settings.visibility)
            .await?;
        let mut summary = PollSummary {
            claimed: batch.len(),
            ..PollSummary::default()
        };

        for event in batch {
            match self.handler.handle(&event).await {
                Ok(()) => {
                    self.acknowledge(&event).await?;
                    summary.acknowledged += 1;
                }
                Err(err) => {
                    if self.record_failure(&event, &err.to_string()).await? {
                        summary.dead_lettered += 1;
                    } else {
                        summary.retried += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    async fn acknowledge(&self, event: &WebhookEvent) -> Result<(), ConsumerError> {
        match self.stream.ack(event.id()).await {
            Ok(()) => Ok(()),
            Err(EventStreamError::NotFound(id)) => {
                debug!(event_id = %id, "event already acknowledged");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Records a failed attempt. Returns whether the event was dead-lettered.
    async fn record_failure(
        &self,
        event: &WebhookEvent,
        error: &str,
    ) -> Result<bool, ConsumerError> {
        let attempt = event.attempts().saturating_add(1);
        let retry_at = self.retry_at(self.settings.retry.backoff(attempt));
        let failed = self.stream.fail(event.id(), error, retry_at).await?;

        if !self.settings.retry.is_exhausted(failed.attempts()) {
            warn!(
                event_id = %failed.id(),
                attempt = failed.attempts(),
                retry_at = %retry_at,
                error,
                "event processing failed; retry scheduled"
            );
            return Ok(false);
        }

        // Store before removing so the event is never absent from both.
        let entry = DeadLetterEntry::new(failed, &*self.clock);
        self.dead_letters.put(&entry).await?;
        self.stream.dead_letter(entry.event.id()).await?;
        warn!(
            event_id = %entry.event.id(),
            provider = %entry.event.provider(),
            attempts = entry.event.attempts(),
            "event dead-lettered"
        );
        Ok(true)
    }

    fn retry_at(&self, delay: Duration) -> DateTime<Utc> {
        let now = self.clock.utc();
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now)
    }

    /// Starts the worker tasks.
    ///
    /// Workers stop once `shutdown` carries `true` or its sender is dropped.
    /// An event being handled when the signal arrives is finished first.
    #[must_use]
    pub fn spawn(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.settings.workers)
            .map(|index| {
                let group = self.clone();
                let consumer = format!("{}-{index}", self.settings.group);
                let signal = shutdown.clone();
                tokio::spawn(async move { group.work(&consumer, signal).await })
            })
            .collect()
    }

    async fn work(&self, consumer: &str, mut shutdown: watch::Receiver<bool>) {
        info!(consumer = %consumer, "consumer started");
        while !*shutdown.borrow() {
            let idle = match self.run_once(consumer).await {
                Ok(summary) => summary.claimed == 0,
                Err(err) => {
                    warn!(consumer = %consumer, error = %err, "poll failed");
                    true
                }
            };
            if !idle {
                continue;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        info!(consumer = %consumer, "consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::adapters::memory::{InMemoryDeadLetterStore, InMemoryEventStream};
    use crate::ingestion::ports::{HandlerError, MockEventHandler};
    use crate::provider::domain::ProviderName;
    use mockable::DefaultClock;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Group<H> =
        ConsumerGroup<InMemoryEventStream<DefaultClock>, InMemoryDeadLetterStore, H, DefaultClock>;

    struct Harness<H: EventHandler> {
        group: Group<H>,
        stream: Arc<InMemoryEventStream<DefaultClock>>,
        dead_letters: Arc<InMemoryDeadLetterStore>,
    }

    fn settings(max_attempts: u32) -> ConsumerSettings {
        ConsumerSettings {
            workers: 2,
            poll_interval: Duration::from_millis(5),
            retry: RetryPolicy {
                max_attempts,
                base_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
            },
            ..ConsumerSettings::default()
        }
    }

    fn harness<H: EventHandler + 'static>(handler: H, max_attempts: u32) -> Harness<H> {
        let clock = Arc::new(DefaultClock);
        let stream = Arc::new(InMemoryEventStream::new(Arc::clone(&clock)));
        let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
        let group = ConsumerGroup::new(
            Arc::clone(&stream),
            Arc::clone(&dead_letters),
            Arc::new(handler),
            clock,
            settings(max_attempts),
        );
        Harness {
            group,
            stream,
            dead_letters,
        }
    }

    async fn append(stream: &InMemoryEventStream<DefaultClock>, delivery: &str) -> WebhookEvent {
        let event = WebhookEvent::received(
            ProviderName::new("github").expect("valid provider"),
            Some(delivery.to_owned()),
            Some("push".to_owned()),
            json!({"delivery": delivery}),
            &DefaultClock,
        );
        stream.append(&event).await.expect("append should succeed");
        event
    }

    fn failing_handler() -> MockEventHandler {
        let mut handler = MockEventHandler::new();
        handler
            .expect_handle()
            .returning(|_| Err(HandlerError::Invalid("unprocessable".to_owned())));
        handler
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn handled_events_are_acknowledged() {
        let mut handler = MockEventHandler::new();
        handler.expect_handle().times(1).returning(|_| Ok(()));
        let harness = harness(handler, 3);
        append(&harness.stream, "d-1").await;

        let summary = harness.group.run_once("c-0").await.expect("poll should succeed");

        assert_eq!(summary.acknowledged, 1);
        assert_eq!(harness.stream.pending_count().await.expect("count"), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[tokio::test(flavor = "multi_thread")]
    async fn events_failing_k_times_are_dead_lettered(#[case] budget: u32) {
        let harness = harness(failing_handler(), budget);
        let original = append(&harness.stream, "d-2").await;

        for _ in 1..budget {
            let summary = harness.group.run_once("c-0").await.expect("poll should succeed");
            assert_eq!(summary.retried, 1);
        }
        let last = harness.group.run_once("c-0").await.expect("poll should succeed");

        assert_eq!(last.dead_lettered, 1);
        assert_eq!(harness.stream.pending_count().await.expect("count"), 0);
        let entries = harness.dead_letters.list().await.expect("list should succeed");
        let entry = entries.first().expect("one dead letter");
        assert_eq!(entry.event.id(), original.id());
        assert_eq!(entry.event.payload(), original.payload());
        assert_eq!(entry.history().len(), usize::try_from(budget).expect("small budget"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_poison_event_does_not_block_later_entries() {
        let mut handler = MockEventHandler::new();
        handler.expect_handle().returning(|event| {
            if event.delivery_id() == Some("poison") {
                Err(HandlerError::Invalid("bad payload".to_owned()))
            } else {
                Ok(())
            }
        });
        let harness = harness(handler, 3);
        append(&harness.stream, "poison").await;
        append(&harness.stream, "fine").await;

        let summary = harness.group.run_once("c-0").await.expect("poll should succeed");

        assert_eq!(summary.acknowledged, 1);
        assert_eq!(summary.retried, 1);
        assert_eq!(harness.stream.pending_count().await.expect("count"), 1);
    }

    struct CountingHandler(AtomicUsize);

    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &WebhookEvent) -> crate::ingestion::ports::HandlerResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawned_workers_drain_the_stream_and_stop_on_shutdown() {
        let harness = harness(CountingHandler(AtomicUsize::new(0)), 3);
        for delivery in ["a", "b", "c", "d"] {
            append(&harness.stream, delivery).await;
        }
        let (stop, shutdown) = watch::channel(false);

        let workers = harness.group.spawn(&shutdown);
        for _ in 0..200 {
            if harness.stream.pending_count().await.expect("count") == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stop.send(true).expect("workers should be listening");
        for worker in workers {
            worker.await.expect("worker should stop cleanly");
        }

        assert_eq!(handled_count(&harness), 4);
        assert_eq!(harness.stream.pending_count().await.expect("count"), 0);
    }

    fn handled_count(harness: &Harness<CountingHandler>) -> usize {
        harness.group.handler.0.load(Ordering::SeqCst)
    }
}
