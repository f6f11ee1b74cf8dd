//! In-memory adapters for ingestion ports.

mod dead_letter;
mod stream;

pub use dead_letter::InMemoryDeadLetterStore;
pub use stream::InMemoryEventStream;
