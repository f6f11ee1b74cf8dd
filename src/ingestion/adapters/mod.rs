//! Adapter implementations for ingestion ports.

pub mod memory;
pub mod postgres;
pub mod webhook;

pub use webhook::{MAX_WEBHOOK_BODY_BYTES, WebhookReceiver, WebhookRejection};
