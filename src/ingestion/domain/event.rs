//! Webhook events and their delivery history.

use crate::provider::domain::ProviderName;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Stream-assigned identifier for one received delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event identifier from an existing UUID.
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

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One failed processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Handler error message.
    pub error: String,
    /// When the attempt failed.
    pub failed_at: DateTime<Utc>,
}

/// An inbound provider callback held by the event stream.
///
/// The payload is opaque to the pipeline and kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    id: EventId,
    provider: ProviderName,
    delivery_id: Option<String>,
    event_type: Option<String>,
    payload: Value,
    received_at: DateTime<Utc>,
    failures: Vec<FailureRecord>,
}

/// Parameter object for reconstructing a persisted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEventData {
    /// Stream identifier.
    pub id: EventId,
    /// Sending provider.
    pub provider: ProviderName,
    /// Provider delivery identifier.
    pub delivery_id: Option<String>,
    /// Provider event type.
    pub event_type: Option<String>,
    /// Verbatim payload.
    pub payload: Value,
    /// Receipt timestamp.
    pub received_at: DateTime<Utc>,
    /// Failure history, oldest first.
    pub failures: Vec<FailureRecord>,
}

impl WebhookEvent {
    /// Reconstructs an event read back from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedEventData) -> Self {
        Self {
            id: data.id,
            provider: data.provider,
            delivery_id: data.delivery_id,
            event_type: data.event_type,
            payload: data.payload,
            received_at: data.received_at,
            failures: data.failures,
        }
    }

    /// Creates a freshly received event.
    #[must_use]
    pub fn received(
        provider: ProviderName,
        delivery_id: Option<String>,
        event_type: Option<String>,
        payload: Value,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id: EventId::new(),
            provider,
            delivery_id,
            event_type,
            payload,
            received_at: clock.utc(),
            failures: Vec::new(),
        }
    }

    /// Returns the stream identifier.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Returns the sending provider.
    #[must_use]
    pub const fn provider(&self) -> &ProviderName {
        &self.provider
    }

    /// Returns the provider's own delivery identifier, when it sent one.
    #[must_use]
    pub fn delivery_id(&self) -> Option<&str> {
        self.delivery_id.as_deref()
    }

    /// Returns the provider's event type, when it sent one.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns when the gateway received the delivery.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Returns the number of failed processing attempts.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        u32::try_from(self.failures.len()).unwrap_or(u32::MAX)
    }

    /// Returns every failed attempt, oldest first.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Returns the key consumers deduplicate on.
    ///
    /// Redeliveries from the provider reuse its delivery identifier, so that
    /// identifier wins over the stream identifier when present.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        match &self.delivery_id {
            Some(delivery) => format!("{}:{delivery}", self.provider),
            None => format!("{}:{}", self.provider, self.id),
        }
    }

    /// Appends a failed attempt to the history.
    pub fn record_failure(&mut self, error: impl Into<String>, clock: &impl Clock) {
        let attempt = self.attempts().saturating_add(1);
        self.failures.push(FailureRecord {
            attempt,
            error: error.into(),
            failed_at: clock.utc(),
        });
    }
}

/// An event that exhausted its retry budget, kept for manual inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// The event exactly as it left the stream, history included.
    pub event: WebhookEvent,
    /// When the event was moved aside.
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Wraps an exhausted event.
    #[must_use]
    pub fn new(event: WebhookEvent, clock: &impl Clock) -> Self {
        Self {
            event,
            dead_lettered_at: clock.utc(),
        }
    }

    /// Returns the failure history.
    #[must_use]
    pub fn history(&self) -> &[FailureRecord] {
        self.event.failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;
    use serde_json::json;

    fn event(delivery_id: Option<&str>) -> WebhookEvent {
        WebhookEvent::received(
            ProviderName::new("github").expect("valid provider"),
            delivery_id.map(str::to_owned),
            Some("push".to_owned()),
            json!({"ref": "main"}),
            &DefaultClock,
        )
    }

    #[test]
    fn failures_are_numbered_in_order() {
        let mut received = event(None);
        received.record_failure("first", &DefaultClock);
        received.record_failure("second", &DefaultClock);

        let attempts: Vec<_> = received.failures().iter().map(|f| f.attempt).collect();
        assert_eq!(attempts, vec![1, 2]);
        assert_eq!(received.attempts(), 2);
    }

    #[test]
    fn provider_delivery_ids_drive_deduplication() {
        assert_eq!(event(Some("abc")).dedup_key(), "github:abc");
        assert_eq!(
            event(Some("abc")).dedup_key(),
            event(Some("abc")).dedup_key()
        );
        assert_ne!(event(None).dedup_key(), event(None).dedup_key());
    }
}
