//! Catalog and execution port used by MCP sessions.

use crate::protocol::domain::WireToolName;
use crate::provider::domain::PassthroughCredentialBundle;
use crate::tool_registry::domain::{TenantId, ToolName, ToolsetEnablement};
use crate::tool_registry::services::{ExecutionError, ExecutionOutcome};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// One entry of `tools/list`, before client shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    /// Wire name of the operation.
    pub name: WireToolName,
    /// Condensed description.
    pub description: String,
    /// Minimized input schema.
    pub input_schema: Value,
    /// Whether the operation is classified destructive.
    pub destructive: bool,
}

/// One `tools/call` forwarded to execution.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Calling tenant.
    pub tenant: TenantId,
    /// Tenant enablement in force for the session.
    pub enablement: ToolsetEnablement,
    /// Target operation.
    pub name: WireToolName,
    /// Call arguments.
    pub arguments: Value,
    /// Effective passthrough credentials for this call.
    pub passthrough: PassthroughCredentialBundle,
}

/// Everything a session needs from the registry and execution engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Lists the operations the tenant may see, across its active tools.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Registry`] when the catalog cannot be read.
    async fn list_tools(
        &self,
        tenant: &TenantId,
        enablement: &ToolsetEnablement,
    ) -> GatewayResult<Vec<ToolDescriptor>>;

    /// Executes one operation.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownTool`] when the name does not resolve to
    /// an exposed operation, or [`GatewayError::Execution`] when the engine
    /// rejects or fails the call.
    async fn call_tool(&self, call: ToolCall) -> GatewayResult<ExecutionOutcome>;

    /// Returns the full schema behind an `$expand` placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownSchema`] when the tool's catalog has no
    /// expansion with that name.
    async fn expand_schema(
        &self,
        tenant: &TenantId,
        tool: &ToolName,
        name: &str,
    ) -> GatewayResult<Value>;
}

/// Errors returned by gateway implementations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No exposed operation has this name.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// The tool has no expansion with this name.
    #[error("tool '{tool}' has no schema named '{name}'")]
    UnknownSchema {
        /// Tool queried.
        tool: String,
        /// Requested placeholder name.
        name: String,
    },

    /// Execution was attempted and failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Catalog lookup failed.
    #[error("registry error: {0}")]
    Registry(Arc<dyn std::error::Error + Send + Sync>),
}

impl GatewayError {
    /// Wraps a registry-layer failure.
    pub fn registry(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Registry(Arc::new(err))
    }
}
