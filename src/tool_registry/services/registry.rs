//! Service layer for tool registration, catalogs and health.

use crate::provider::domain::{ProviderDomainError, ProviderName};
use crate::tool_registry::{
    domain::{
        AuthDescriptor, AuthKind, ExecutionStatus, HealthSnapshot, HealthStatus, Operation,
        OperationCatalog, TenantId, ToolConfiguration, ToolDefinition, ToolId, ToolName,
        ToolRegistryDomainError, ToolsetEnablement,
    },
    ports::{ExecutionRecordError, ExecutionRecordStore, ToolRepository, ToolRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Number of recent executions considered by [`ToolRegistryService::refresh_health`].
pub const DEFAULT_HEALTH_WINDOW: usize = 20;

/// Request payload for registering a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterToolRequest {
    /// Owning tenant.
    pub tenant: TenantId,
    /// Tenant-unique tool name.
    pub name: String,
    /// Provider type, such as `github`.
    pub provider: String,
    /// Base URL of the provider API.
    pub base_url: String,
    /// Authentication kind.
    pub auth_kind: AuthKind,
    /// Reference to stored secret material.
    pub secret_ref: Option<String>,
    /// Explicit location of the API specification.
    pub spec_url: Option<String>,
    /// Extra specification paths or URLs tried after the well-known paths.
    pub discovery_hints: Vec<String>,
}

impl RegisterToolRequest {
    /// Creates an unauthenticated registration request.
    #[must_use]
    pub fn new(
        tenant: TenantId,
        name: impl Into<String>,
        provider: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            tenant,
            name: name.into(),
            provider: provider.into(),
            base_url: base_url.into(),
            auth_kind: AuthKind::None,
            secret_ref: None,
            spec_url: None,
            discovery_hints: Vec::new(),
        }
    }

    /// Sets the authentication kind and secret reference.
    #[must_use]
    pub fn with_auth(mut self, kind: AuthKind, secret_ref: impl Into<String>) -> Self {
        self.auth_kind = kind;
        self.secret_ref = Some(secret_ref.into());
        self
    }

    /// Sets the explicit specification URL.
    #[must_use]
    pub fn with_spec_url(mut self, spec_url: impl Into<String>) -> Self {
        self.spec_url = Some(spec_url.into());
        self
    }

    /// Sets the discovery hints.
    #[must_use]
    pub fn with_discovery_hints(mut self, hints: Vec<String>) -> Self {
        self.discovery_hints = hints;
        self
    }
}

/// An active tool with the operations its tenant may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedTool {
    /// Tool configuration.
    pub tool: ToolConfiguration,
    /// Current catalog version.
    pub catalog: OperationCatalog,
    /// Operations passing the tenant's enablement.
    pub operations: Vec<Operation>,
}

/// Service-level errors for tool registry operations.
#[derive(Debug, Error)]
pub enum ToolRegistryServiceError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] ToolRegistryDomainError),
    /// Provider name validation failed.
    #[error(transparent)]
    Provider(#[from] ProviderDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] ToolRepositoryError),
    /// Execution record lookup failed.
    #[error(transparent)]
    Records(#[from] ExecutionRecordError),
    /// No tool with the given identifier exists for the tenant.
    #[error("tool {0} not found")]
    NotFound(ToolId),
}

/// Result type for tool registry service operations.
pub type ToolRegistryServiceResult<T> = Result<T, ToolRegistryServiceError>;

/// Tool registration and catalog service.
#[derive(Clone)]
pub struct ToolRegistryService<R, E, C>
where
    R: ToolRepository,
    E: ExecutionRecordStore,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    records: Arc<E>,
    clock: Arc<C>,
}

impl<R, E, C> ToolRegistryService<R, E, C>
where
    R: ToolRepository,
    E: ExecutionRecordStore,
    C: Clock + Send + Sync,
{
    /// Creates a new registry service.
    #[must_use]
    pub const fn new(repository: Arc<R>, records: Arc<E>, clock: Arc<C>) -> Self {
        Self {
            repository,
            records,
            clock,
        }
    }

    /// Returns the underlying repository.
    #[must_use]
    pub const fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    async fn find_tool_or_error(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
    ) -> ToolRegistryServiceResult<ToolConfiguration> {
        self.repository
            .find_by_id(tool_id)
            .await?
            .filter(|tool| tool.belongs_to(tenant))
            .ok_or(ToolRegistryServiceError::NotFound(tool_id))
    }

    /// Registers a new tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryServiceError`] when validation fails or
    /// persistence rejects registration.
    pub async fn register(
        &self,
        request: RegisterToolRequest,
    ) -> ToolRegistryServiceResult<ToolConfiguration> {
        let definition = ToolDefinition {
            tenant: request.tenant,
            name: ToolName::new(request.name)?,
            provider: ProviderName::new(request.provider)?,
            base_url: request.base_url,
            auth: AuthDescriptor::new(request.auth_kind, request.secret_ref)?,
            spec_url: request.spec_url,
            discovery_hints: request.discovery_hints,
        };
        let tool = ToolConfiguration::new(definition, &*self.clock)?;
        self.repository.register(&tool).await?;
        info!(
            tenant = %tool.tenant(),
            tool_id = %tool.id(),
            provider = %tool.provider(),
            auth = %tool.auth().kind(),
            "registered tool"
        );
        Ok(tool)
    }

    /// Reactivates a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryServiceError::NotFound`] when the tenant has no
    /// such tool, or persistence errors.
    pub async fn activate(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
    ) -> ToolRegistryServiceResult<ToolConfiguration> {
        self.find_tool_or_error(tenant, tool_id).await?;
        let tool = self
            .repository
            .set_active(tool_id, true, self.clock.utc())
            .await?;
        Ok(tool)
    }

    /// Soft-deactivates a tool. Its catalog and records are retained.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryServiceError::NotFound`] when the tenant has no
    /// such tool, or persistence errors.
    pub async fn deactivate(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
    ) -> ToolRegistryServiceResult<ToolConfiguration> {
        self.find_tool_or_error(tenant, tool_id).await?;
        let tool = self
            .repository
            .set_active(tool_id, false, self.clock.utc())
            .await?;
        info!(tenant = %tenant, tool_id = %tool_id, "deactivated tool");
        Ok(tool)
    }

    /// Finds a tool owned by `tenant`.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the repository.
    pub async fn find(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
    ) -> ToolRegistryServiceResult<Option<ToolConfiguration>> {
        Ok(self
            .repository
            .find_by_id(tool_id)
            .await?
            .filter(|tool| tool.belongs_to(tenant)))
    }

    /// Lists every tool owned by `tenant`.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the repository.
    pub async fn list_for_tenant(
        &self,
        tenant: &TenantId,
    ) -> ToolRegistryServiceResult<Vec<ToolConfiguration>> {
        Ok(self.repository.list_for_tenant(tenant).await?)
    }

    /// Returns the tenant's active tools with their enabled operations.
    ///
    /// Tools without a published catalog are omitted.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the repository.
    pub async fn catalog_for_tenant(
        &self,
        tenant: &TenantId,
        enablement: &ToolsetEnablement,
    ) -> ToolRegistryServiceResult<Vec<ExposedTool>> {
        let mut exposed = Vec::new();
        for tool in self.repository.list_for_tenant(tenant).await? {
            if !tool.is_active() || !enablement.allows_provider(tool.provider()) {
                continue;
            }
            let Some(catalog) = self.repository.current_catalog(tool.id()).await? else {
                continue;
            };
            let operations = catalog
                .operations()
                .iter()
                .filter(|operation| enablement.exposes(tool.provider(), operation))
                .cloned()
                .collect();
            exposed.push(ExposedTool {
                tool,
                catalog,
                operations,
            });
        }
        Ok(exposed)
    }

    /// Recomputes health from the most recent finalized executions.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryServiceError::NotFound`] when the tenant has no
    /// such tool, or persistence errors.
    pub async fn refresh_health(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
        window: usize,
    ) -> ToolRegistryServiceResult<ToolConfiguration> {
        self.find_tool_or_error(tenant, tool_id).await?;
        let recent = self.records.recent(tool_id, window).await?;
        let finalized: Vec<_> = recent.iter().filter(|record| record.is_finalized()).collect();
        let failures = finalized
            .iter()
            .filter(|record| record.status() == ExecutionStatus::Failed)
            .count();

        let status = HealthStatus::from_outcomes(finalized.len(), failures);
        let snapshot = HealthSnapshot::new(status, self.clock.utc()).with_message(format!(
            "{failures} of {} recent executions failed",
            finalized.len()
        ));
        let tool = self
            .repository
            .set_health(tool_id, &snapshot, self.clock.utc())
            .await?;
        Ok(tool)
    }

    /// Stores an externally observed health snapshot, such as one derived
    /// from a webhook event.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryServiceError::NotFound`] when the tool does not
    /// exist, or persistence errors.
    pub async fn record_health(
        &self,
        tool_id: ToolId,
        snapshot: HealthSnapshot,
    ) -> ToolRegistryServiceResult<ToolConfiguration> {
        self.repository
            .set_health(tool_id, &snapshot, self.clock.utc())
            .await
            .map_err(|err| match err {
                ToolRepositoryError::NotFound(id) => ToolRegistryServiceError::NotFound(id),
                other => other.into(),
            })
    }
}
