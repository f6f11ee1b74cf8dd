//! Port contracts for tool persistence, credentials and execution records.

mod credentials;
mod records;
mod repository;

pub use credentials::{CredentialStore, CredentialStoreError, CredentialStoreResult};
pub use records::{ExecutionRecordError, ExecutionRecordResult, ExecutionRecordStore};
pub use repository::{ToolRepository, ToolRepositoryError, ToolRepositoryResult};
