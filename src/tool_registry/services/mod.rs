//! Application services for tool registration and execution.

mod bulkhead;
mod circuit_breaker;
mod execution;
mod registry;

pub use bulkhead::TenantBulkhead;
pub use circuit_breaker::{CircuitBreakerRegistry, CircuitPermit};
pub use execution::{
    ExecuteRequest, ExecutionEngine, ExecutionError, ExecutionOutcome, ExecutionResult,
    ExecutionSettings,
};
pub use registry::{
    DEFAULT_HEALTH_WINDOW, ExposedTool, RegisterToolRequest, ToolRegistryService,
    ToolRegistryServiceError, ToolRegistryServiceResult,
};
