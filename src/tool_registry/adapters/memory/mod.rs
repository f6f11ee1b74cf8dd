//! In-memory adapters for tool registry ports.

mod credentials;
mod records;
mod repository;

pub use credentials::InMemoryCredentialStore;
pub use records::InMemoryExecutionRecordStore;
pub use repository::InMemoryToolRepository;
