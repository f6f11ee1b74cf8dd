//! Gateway backed by the tool registry and execution engine.

use crate::protocol::{
    domain::WireToolName,
    ports::{GatewayError, GatewayResult, ToolCall, ToolDescriptor, ToolGateway},
};
use crate::tool_registry::{
    domain::{
        OperationCatalog, OperationKey, TenantId, ToolConfiguration, ToolName, ToolsetEnablement,
    },
    ports::{CredentialStore, ExecutionRecordStore, ToolRepository},
    services::{ExecuteRequest, ExecutionEngine, ExecutionOutcome, ToolRegistryService},
};
use async_trait::async_trait;
use mockable::Clock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Routes session requests to [`ToolRegistryService`] and [`ExecutionEngine`].
///
/// An operation is listed only when its tool is active, the tenant's
/// enablement exposes it and the provider's adapter can execute it.
pub struct RegistryToolGateway<R, S, E, C>
where
    R: ToolRepository,
    S: CredentialStore,
    E: ExecutionRecordStore,
    C: Clock + Send + Sync,
{
    registry: Arc<ToolRegistryService<R, E, C>>,
    engine: Arc<ExecutionEngine<R, S, E, C>>,
}

impl<R, S, E, C> Clone for RegistryToolGateway<R, S, E, C>
where
    R: ToolRepository,
    S: CredentialStore,
    E: ExecutionRecordStore,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<R, S, E, C> RegistryToolGateway<R, S, E, C>
where
    R: ToolRepository,
    S: CredentialStore,
    E: ExecutionRecordStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a gateway over shared services.
    #[must_use]
    pub const fn new(
        registry: Arc<ToolRegistryService<R, E, C>>,
        engine: Arc<ExecutionEngine<R, S, E, C>>,
    ) -> Self {
        Self { registry, engine }
    }

    fn executable(
        &self,
        tool: &ToolConfiguration,
        catalog: &OperationCatalog,
    ) -> BTreeSet<OperationKey> {
        self.engine
            .providers()
            .resolve(tool.provider())
            .map(|adapter| adapter.list_operations(catalog).into_iter().collect())
            .unwrap_or_default()
    }

    async fn owned_tool(
        &self,
        tenant: &TenantId,
        name: &ToolName,
    ) -> GatewayResult<Option<ToolConfiguration>> {
        self.registry
            .repository()
            .find_by_name(tenant, name)
            .await
            .map_err(GatewayError::registry)
    }
}

#[async_trait]
impl<R, S, E, C> ToolGateway for RegistryToolGateway<R, S, E, C>
where
    R: ToolRepository + 'static,
    S: CredentialStore + 'static,
    E: ExecutionRecordStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn list_tools(
        &self,
        tenant: &TenantId,
        enablement: &ToolsetEnablement,
    ) -> GatewayResult<Vec<ToolDescriptor>> {
        let exposed = self
            .registry
            .catalog_for_tenant(tenant, enablement)
            .await
            .map_err(GatewayError::registry)?;

        let mut descriptors = Vec::new();
        for entry in exposed {
            let executable = self.executable(&entry.tool, &entry.catalog);
            descriptors.extend(
                entry
                    .operations
                    .iter()
                    .filter(|operation| executable.contains(operation.key()))
                    .map(|operation| ToolDescriptor {
                        name: WireToolName::new(entry.tool.name().clone(), operation.key().as_str()),
                        description: operation.description().to_owned(),
                        input_schema: operation.input_schema().clone(),
                        destructive: operation.is_destructive(),
                    }),
            );
        }
        Ok(descriptors)
    }

    async fn call_tool(&self, call: ToolCall) -> GatewayResult<ExecutionOutcome> {
        let ToolCall {
            tenant,
            enablement,
            name,
            arguments,
            passthrough,
        } = call;
        let unknown = || GatewayError::UnknownTool(name.to_string());

        let tool = self
            .owned_tool(&tenant, name.tool())
            .await?
            .filter(|tool| enablement.allows_provider(tool.provider()))
            .ok_or_else(unknown)?;

        // Hidden operations are unknown to the session, not merely forbidden.
        let catalog = self
            .registry
            .repository()
            .current_catalog(tool.id())
            .await
            .map_err(GatewayError::registry)?;
        if let Some(operation) = catalog
            .as_ref()
            .and_then(|current| current.operation(name.operation_key()))
            && !enablement.exposes(tool.provider(), operation)
        {
            return Err(unknown());
        }

        let mut request = ExecuteRequest::new(tenant, tool.id(), name.operation_key(), arguments);
        if !passthrough.is_empty() {
            request = request.with_passthrough(passthrough);
        }
        Ok(self.engine.execute(request).await?)
    }

    async fn expand_schema(
        &self,
        tenant: &TenantId,
        tool: &ToolName,
        name: &str,
    ) -> GatewayResult<Value> {
        let unknown = || GatewayError::UnknownSchema {
            tool: tool.to_string(),
            name: name.to_owned(),
        };
        let Some(configured) = self.owned_tool(tenant, tool).await? else {
            return Err(GatewayError::UnknownTool(tool.to_string()));
        };
        let catalog = self
            .registry
            .repository()
            .current_catalog(configured.id())
            .await
            .map_err(GatewayError::registry)?
            .ok_or_else(unknown)?;
        catalog.expand(name).cloned().ok_or_else(unknown)
    }
}
