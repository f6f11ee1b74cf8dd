//! Event processing services: the consumer group and its handlers.

mod consumer;
mod dedup;
mod health;

pub use consumer::{ConsumerError, ConsumerGroup, ConsumerSettings, PollSummary};
pub use dedup::{DEFAULT_DEDUP_CAPACITY, DedupHandler};
pub use health::{ToolHealthHandler, status_from_word};
