//! Event ingestion pipeline.
//!
//! Webhook deliveries are authenticated, appended to a durable stream and
//! acknowledged to the sender at once. A consumer group drains the stream
//! with at-least-once delivery; events that keep failing are moved to a
//! dead-letter store with their failure history.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
