//! Port contracts for the event ingestion pipeline.

mod dead_letter;
mod handler;
mod stream;

pub use dead_letter::{DeadLetterError, DeadLetterResult, DeadLetterStore};
#[cfg(test)]
pub use handler::MockEventHandler;
pub use handler::{EventHandler, HandlerError, HandlerResult};
pub use stream::{EventStream, EventStreamError, EventStreamResult};
