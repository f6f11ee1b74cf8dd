//! Consumer-side event handling port.

use crate::ingestion::domain::WebhookEvent;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for event handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Processes one claimed event.
///
/// Handlers must tolerate duplicate delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles an event. An error schedules a retry.
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult<()>;
}

/// Errors returned by event handlers.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The payload cannot be processed as sent.
    #[error("invalid event: {0}")]
    Invalid(String),

    /// A downstream dependency failed.
    #[error("downstream failure: {0}")]
    Downstream(Arc<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps a downstream failure.
    pub fn downstream(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Downstream(Arc::new(err))
    }
}
