//! Domain model for configured tools, their catalogs and executions.
//!
//! The tool registry domain models tenant-scoped tool configurations,
//! versioned operation catalogs, execution records, per-tool circuit state
//! and argument validation. Infrastructure concerns remain outside this
//! boundary.

mod auth;
mod catalog;
mod circuit;
mod enablement;
mod error;
mod execution;
mod health;
mod ids;
mod operation;
mod schema;
mod tool;

pub use auth::{AuthDescriptor, AuthKind};
pub use catalog::{CatalogDraft, OperationCatalog};
pub use circuit::{CircuitBreakerPolicy, CircuitDecision, CircuitPhase, CircuitState};
pub use enablement::ToolsetEnablement;
pub use error::{
    ParseAuthKindError, ParseExecutionStatusError, ParseHealthStatusError,
    ParseOperationClassError, ToolRegistryDomainError,
};
pub use execution::{ExecutionRecord, ExecutionStatus, digest_arguments};
pub use health::{HealthSnapshot, HealthStatus};
pub use ids::{ExecutionId, TenantId, ToolId, ToolName};
pub use operation::{Operation, OperationClass, OperationKey, ParameterLocation, PlacedArguments};
pub use schema::{EXPAND_KEY, FieldViolation, validate_arguments};
pub use tool::{PersistedToolData, ToolConfiguration, ToolDefinition};
