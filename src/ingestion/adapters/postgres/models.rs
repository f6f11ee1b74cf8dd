//! Diesel row models for the webhook event stream.

use super::schema::{webhook_dead_letters, webhook_events};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result for stream entries.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = webhook_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventRow {
    /// Stream identifier.
    pub id: uuid::Uuid,
    /// Append order.
    pub stream_position: i64,
    /// Sending provider.
    pub provider: String,
    /// Provider delivery identifier.
    pub delivery_id: Option<String>,
    /// Provider event type.
    pub event_type: Option<String>,
    /// Verbatim payload.
    pub payload: Value,
    /// Receipt timestamp.
    pub received_at: DateTime<Utc>,
    /// Failure history.
    pub failures: Value,
    /// Earliest claim time.
    pub available_at: DateTime<Utc>,
    /// Lease holder.
    pub claimed_by: Option<String>,
    /// Lease expiry.
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// Insert row for newly appended entries. The position is assigned by
/// the database.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_events)]
pub struct NewEventRow {
    /// Stream identifier.
    pub id: uuid::Uuid,
    /// Sending provider.
    pub provider: String,
    /// Provider delivery identifier.
    pub delivery_id: Option<String>,
    /// Provider event type.
    pub event_type: Option<String>,
    /// Verbatim payload.
    pub payload: Value,
    /// Receipt timestamp.
    pub received_at: DateTime<Utc>,
    /// Failure history.
    pub failures: Value,
    /// Earliest claim time.
    pub available_at: DateTime<Utc>,
}

/// Query result and insert row for dead-lettered events.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = webhook_dead_letters)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeadLetterRow {
    /// Stream identifier of the event.
    pub event_id: uuid::Uuid,
    /// Sending provider.
    pub provider: String,
    /// Serialized event.
    pub event: Value,
    /// When the event was moved aside.
    pub dead_lettered_at: DateTime<Utc>,
}
