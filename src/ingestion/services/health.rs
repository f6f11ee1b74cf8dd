//! Tool health updates derived from webhook events.

use crate::ingestion::{
    domain::WebhookEvent,
    ports::{EventHandler, HandlerError, HandlerResult},
};
use crate::tool_registry::{
    domain::{HealthSnapshot, HealthStatus, ToolId},
    ports::{ExecutionRecordStore, ToolRepository},
    services::{ToolRegistryService, ToolRegistryServiceError},
};
use async_trait::async_trait;
use mockable::Clock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Payload fields read as the status of the reporting system, in order.
const STATUS_FIELDS: [&str; 3] = ["status", "state", "conclusion"];

/// Maps a provider status word onto a tool health status.
///
/// Unrecognised words yield `None`; the event carries no health signal.
#[must_use]
pub fn status_from_word(word: &str) -> Option<HealthStatus> {
    match word.trim().to_ascii_lowercase().as_str() {
        "success" | "succeeded" | "healthy" | "ok" | "passed" => Some(HealthStatus::Healthy),
        "degraded" | "warning" | "unstable" => Some(HealthStatus::Degraded),
        "failure" | "failed" | "error" | "unhealthy" | "down" => Some(HealthStatus::Unhealthy),
        _ => None,
    }
}

/// Reads the `tool_id` hint from `payload.tool_id` or
/// `payload.meshgate.tool_id`.
fn tool_hint(payload: &Value) -> Option<&str> {
    payload
        .get("tool_id")
        .or_else(|| payload.get("meshgate").and_then(|nested| nested.get("tool_id")))
        .and_then(Value::as_str)
}

fn status_word(payload: &Value) -> Option<&str> {
    STATUS_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_str))
}

/// Records tool health reported by external systems.
///
/// Events without a `tool_id` hint or without a recognisable status are
/// acknowledged without effect.
pub struct ToolHealthHandler<R, E, C>
where
    R: ToolRepository,
    E: ExecutionRecordStore,
    C: Clock + Send + Sync,
{
    registry: Arc<ToolRegistryService<R, E, C>>,
    clock: Arc<C>,
}

impl<R, E, C> ToolHealthHandler<R, E, C>
where
    R: ToolRepository,
    E: ExecutionRecordStore,
    C: Clock + Send + Sync,
{
    /// Creates a handler over the shared registry service.
    #[must_use]
    pub const fn new(registry: Arc<ToolRegistryService<R, E, C>>, clock: Arc<C>) -> Self {
        Self { registry, clock }
    }
}

#[async_trait]
impl<R, E, C> EventHandler for ToolHealthHandler<R, E, C>
where
    R: ToolRepository + 'static,
    E: ExecutionRecordStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult<()> {
        let payload = event.payload();
        let Some(hint) = tool_hint(payload) else {
            debug!(event_id = %event.id(), "event carries no tool hint");
            return Ok(());
        };
        let Some(status) = status_word(payload).and_then(status_from_word) else {
            debug!(event_id = %event.id(), "event carries no health signal");
            return Ok(());
        };
        let tool_id = Uuid::parse_str(hint)
            .map(ToolId::from_uuid)
            .map_err(|_| HandlerError::Invalid(format!("malformed tool id '{hint}'")))?;

        let mut snapshot = HealthSnapshot::new(status, self.clock.utc());
        if let Some(kind) = event.event_type() {
            snapshot = snapshot.with_message(format!("reported by {} {kind}", event.provider()));
        }
        match self.registry.record_health(tool_id, snapshot).await {
            Ok(_) => {
                info!(event_id = %event.id(), tool_id = %tool_id, status = %status, "tool health recorded");
                Ok(())
            }
            Err(ToolRegistryServiceError::NotFound(_)) => {
                Err(HandlerError::Invalid(format!("tool {tool_id} not found")))
            }
            Err(err) => Err(HandlerError::downstream(err)),
        }
    }
}
