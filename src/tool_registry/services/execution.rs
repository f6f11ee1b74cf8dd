//! Execution engine: the control point every tool invocation passes through.

use super::{CircuitBreakerRegistry, TenantBulkhead};
use crate::provider::{
    domain::{
        Credential, PassthroughCredentialBundle, ProviderFailure, ProviderName, ProviderRequest,
    },
    services::ProviderDirectory,
};
use crate::tool_registry::{
    domain::{
        CircuitBreakerPolicy, ExecutionId, ExecutionRecord, FieldViolation, TenantId,
        ToolConfiguration, ToolId, ToolRegistryDomainError, validate_arguments,
    },
    ports::{
        CredentialStore, CredentialStoreError, ExecutionRecordError, ExecutionRecordStore,
        ToolRepository, ToolRepositoryError,
    },
};
use mockable::Clock;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Tunables for the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Upper bound for one provider call, including the wait for a tenant slot.
    pub timeout: Duration,
    /// Circuit breaker thresholds.
    pub policy: CircuitBreakerPolicy,
    /// Concurrent executions admitted per tenant.
    pub max_concurrency_per_tenant: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            policy: CircuitBreakerPolicy::default(),
            max_concurrency_per_tenant: 16,
        }
    }
}

/// One tool invocation.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Calling tenant.
    pub tenant: TenantId,
    /// Target tool.
    pub tool_id: ToolId,
    /// Operation key within the tool's catalog.
    pub operation_key: String,
    /// Arguments, validated against the operation's minimized schema.
    pub arguments: Value,
    /// Caller-supplied credentials for this call only.
    pub passthrough: Option<PassthroughCredentialBundle>,
}

impl ExecuteRequest {
    /// Creates a request without passthrough credentials.
    #[must_use]
    pub fn new(
        tenant: TenantId,
        tool_id: ToolId,
        operation_key: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            tenant,
            tool_id,
            operation_key: operation_key.into(),
            arguments,
            passthrough: None,
        }
    }

    /// Attaches a passthrough bundle.
    #[must_use]
    pub fn with_passthrough(mut self, bundle: PassthroughCredentialBundle) -> Self {
        self.passthrough = Some(bundle);
        self
    }
}

/// Successful invocation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Audit record identifier.
    pub execution_id: ExecutionId,
    /// Provider HTTP status.
    pub status: u16,
    /// Provider response body.
    pub body: Value,
}

/// Invocation failures, by taxonomy class.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The tool does not exist for the calling tenant.
    #[error("tool {0} not found")]
    ToolNotFound(ToolId),

    /// The tool has been deactivated.
    #[error("tool {0} is inactive")]
    ToolInactive(ToolId),

    /// The tool's current catalog has no such operation.
    #[error("operation '{operation_key}' not found for tool {tool_id}")]
    OperationNotFound {
        /// Target tool.
        tool_id: ToolId,
        /// Requested key.
        operation_key: String,
    },

    /// The arguments do not satisfy the operation's schema.
    #[error("arguments failed validation ({} violation(s))", .0.len())]
    SchemaValidationFailed(Vec<FieldViolation>),

    /// Neither a passthrough nor a stored credential resolved.
    #[error("no credential available for provider '{0}'")]
    AuthenticationMissing(ProviderName),

    /// No adapter is registered for the tool's provider.
    #[error("no adapter available for provider '{0}'")]
    ProviderUnavailable(ProviderName),

    /// The tenant's execution pool stayed saturated for the whole time budget.
    #[error("tenant '{0}' has too many executions in flight")]
    TenantSaturated(TenantId),

    /// The tool's circuit is open.
    #[error("circuit open for tool {tool_id}; retry after {} ms", .retry_after.as_millis())]
    CircuitOpen {
        /// Target tool.
        tool_id: ToolId,
        /// Time until the circuit admits a trial call.
        retry_after: Duration,
    },

    /// The provider failed or rejected the call.
    #[error(transparent)]
    Provider(ProviderFailure),

    /// Tool lookup failed.
    #[error(transparent)]
    Repository(#[from] ToolRepositoryError),

    /// Credential lookup failed.
    #[error(transparent)]
    Credentials(#[from] CredentialStoreError),

    /// Execution record persistence failed.
    #[error(transparent)]
    Records(#[from] ExecutionRecordError),

    /// Domain invariant violated.
    #[error(transparent)]
    Domain(#[from] ToolRegistryDomainError),
}

impl ExecutionError {
    /// Returns a stable snake-case identifier for the error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ToolNotFound(_) => "tool_not_found",
            Self::ToolInactive(_) => "tool_inactive",
            Self::OperationNotFound { .. } => "operation_not_found",
            Self::SchemaValidationFailed(_) => "schema_validation_failed",
            Self::AuthenticationMissing(_) => "authentication_missing",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::TenantSaturated(_) => "tenant_saturated",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Provider(_) => "provider_error",
            Self::Repository(_) | Self::Credentials(_) | Self::Records(_) | Self::Domain(_) => {
                "internal"
            }
        }
    }

    /// Returns the retry-after hint for resilience errors.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Returns field-level detail for validation errors.
    #[must_use]
    pub fn violations(&self) -> Option<&[FieldViolation]> {
        match self {
            Self::SchemaValidationFailed(violations) => Some(violations),
            _ => None,
        }
    }

    /// Returns the provider failure class, when the provider failed.
    #[must_use]
    pub const fn provider_class(&self) -> Option<&'static str> {
        match self {
            Self::Provider(failure) => Some(failure.class()),
            _ => None,
        }
    }
}

/// Result type for execution engine operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Resolves, guards and records tool invocations.
///
/// At most one provider call is made per invocation. The engine never
/// retries; retries are a caller concern.
pub struct ExecutionEngine<R, S, E, C>
where
    R: ToolRepository,
    S: CredentialStore,
    E: ExecutionRecordStore,
    C: Clock + Send + Sync,
{
    tools: Arc<R>,
    credentials: Arc<S>,
    records: Arc<E>,
    providers: Arc<ProviderDirectory>,
    circuits: CircuitBreakerRegistry<C>,
    bulkhead: TenantBulkhead,
    clock: Arc<C>,
    timeout: Duration,
}

impl<R, S, E, C> ExecutionEngine<R, S, E, C>
where
    R: ToolRepository,
    S: CredentialStore,
    E: ExecutionRecordStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an engine with default settings.
    #[must_use]
    pub fn new(
        tools: Arc<R>,
        credentials: Arc<S>,
        records: Arc<E>,
        providers: Arc<ProviderDirectory>,
        clock: Arc<C>,
    ) -> Self {
        Self::with_settings(
            tools,
            credentials,
            records,
            providers,
            clock,
            ExecutionSettings::default(),
        )
    }

    /// Creates an engine with explicit settings.
    #[must_use]
    pub fn with_settings(
        tools: Arc<R>,
        credentials: Arc<S>,
        records: Arc<E>,
        providers: Arc<ProviderDirectory>,
        clock: Arc<C>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            tools,
            credentials,
            records,
            providers,
            circuits: CircuitBreakerRegistry::new(settings.policy, Arc::clone(&clock)),
            bulkhead: TenantBulkhead::new(settings.max_concurrency_per_tenant),
            clock,
            timeout: settings.timeout,
        }
    }

    /// Returns the circuit registry.
    #[must_use]
    pub const fn circuits(&self) -> &CircuitBreakerRegistry<C> {
        &self.circuits
    }

    /// Returns the provider directory.
    #[must_use]
    pub const fn providers(&self) -> &Arc<ProviderDirectory> {
        &self.providers
    }

    /// Executes one operation.
    ///
    /// Checks run in order: tool ownership, active flag, operation lookup,
    /// schema validation, credential selection, adapter resolution, tenant
    /// slot, circuit admission. Nothing reaches the provider or the circuit
    /// until every check before it has passed.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as an [`ExecutionError`], or the
    /// provider's failure wrapped in [`ExecutionError::Provider`].
    pub async fn execute(&self, request: ExecuteRequest) -> ExecutionResult<ExecutionOutcome> {
        let ExecuteRequest {
            tenant,
            tool_id,
            operation_key,
            arguments,
            passthrough,
        } = request;

        let tool = self
            .tools
            .find_by_id(tool_id)
            .await?
            .filter(|tool| tool.belongs_to(&tenant))
            .ok_or(ExecutionError::ToolNotFound(tool_id))?;
        if tool.ensure_active().is_err() {
            return Err(ExecutionError::ToolInactive(tool_id));
        }

        let catalog = self.tools.current_catalog(tool_id).await?;
        let operation = catalog
            .as_ref()
            .and_then(|catalog| catalog.operation(&operation_key))
            .ok_or_else(|| ExecutionError::OperationNotFound {
                tool_id,
                operation_key: operation_key.clone(),
            })?;

        validate_arguments(operation.input_schema(), &arguments)
            .map_err(ExecutionError::SchemaValidationFailed)?;

        let credential = self
            .select_credential(&tenant, &tool, passthrough.as_ref())
            .await?;

        let adapter = self
            .providers
            .resolve(tool.provider())
            .ok_or_else(|| ExecutionError::ProviderUnavailable(tool.provider().clone()))?;

        let _slot = tokio::time::timeout(self.timeout, self.bulkhead.acquire(&tenant))
            .await
            .ok()
            .flatten()
            .ok_or_else(|| ExecutionError::TenantSaturated(tenant.clone()))?;

        let permit = self
            .circuits
            .acquire(&tenant, tool_id)
            .map_err(|retry_after| {
                debug!(tenant = %tenant, tool_id = %tool_id, "circuit rejected call");
                ExecutionError::CircuitOpen {
                    tool_id,
                    retry_after,
                }
            })?;

        let mut record = ExecutionRecord::begin(
            tenant.clone(),
            tool_id,
            operation.key().as_str(),
            &arguments,
            &*self.clock,
        );
        self.records.begin(&record).await?;
        let mut pending = PendingRecord::new(
            record.clone(),
            Arc::clone(&self.records),
            Arc::clone(&self.clock),
        );

        let empty = Map::new();
        let placed = operation.place_arguments(arguments.as_object().unwrap_or(&empty));
        let mut provider_request =
            ProviderRequest::new(tool.base_url(), operation.method(), operation.path_template())
                .with_credential(credential);
        provider_request.path_params = placed.path;
        provider_request.query = placed.query;
        provider_request.body = placed.body;

        let outcome = tokio::time::timeout(self.timeout, adapter.execute(provider_request))
            .await
            .unwrap_or_else(|_| {
                Err(ProviderFailure::Timeout {
                    elapsed_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            });

        pending.settle();
        match outcome {
            Ok(response) => {
                permit.succeed();
                record.complete(&*self.clock)?;
                self.records.finalize(&record).await?;
                info!(
                    tenant = %tenant,
                    tool_id = %tool_id,
                    operation = %operation.key(),
                    status = response.status,
                    "tool execution succeeded"
                );
                Ok(ExecutionOutcome {
                    execution_id: record.id(),
                    status: response.status,
                    body: response.body,
                })
            }
            Err(failure) => {
                if failure.is_transient() {
                    permit.fail();
                } else {
                    permit.succeed();
                }
                record.fail(failure.class(), failure.to_string(), &*self.clock)?;
                self.records.finalize(&record).await?;
                warn!(
                    tenant = %tenant,
                    tool_id = %tool_id,
                    operation = %operation.key(),
                    class = failure.class(),
                    "tool execution failed"
                );
                Err(ExecutionError::Provider(failure))
            }
        }
    }

    /// Picks the credential for a call: a passthrough entry for the tool's
    /// provider always wins over the stored credential.
    async fn select_credential(
        &self,
        tenant: &TenantId,
        tool: &ToolConfiguration,
        passthrough: Option<&PassthroughCredentialBundle>,
    ) -> ExecutionResult<Option<Credential>> {
        if let Some(credential) = passthrough.and_then(|bundle| bundle.get(tool.provider())) {
            debug!(
                tenant = %tenant,
                tool_id = %tool.id(),
                kind = %credential.kind(),
                "using passthrough credential"
            );
            return Ok(Some(credential.clone()));
        }

        if !tool.auth().kind().requires_credential() {
            return Ok(None);
        }

        self.credentials
            .resolve(tenant, tool.auth())
            .await?
            .map(Some)
            .ok_or_else(|| ExecutionError::AuthenticationMissing(tool.provider().clone()))
    }
}

/// Pending record owned by an in-flight call.
///
/// A call dropped before [`PendingRecord::settle`] (session close or
/// `notifications/cancelled` aborting its task) finalizes its copy of the
/// record as `cancelled` on a detached task.
struct PendingRecord<E, C>
where
    E: ExecutionRecordStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    record: Option<ExecutionRecord>,
    records: Arc<E>,
    clock: Arc<C>,
}

impl<E, C> PendingRecord<E, C>
where
    E: ExecutionRecordStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    const fn new(record: ExecutionRecord, records: Arc<E>, clock: Arc<C>) -> Self {
        Self {
            record: Some(record),
            records,
            clock,
        }
    }

    /// Marks the provider call as returned; the caller finalizes the record.
    fn settle(&mut self) {
        self.record = None;
    }
}

impl<E, C> Drop for PendingRecord<E, C>
where
    E: ExecutionRecordStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let Some(mut record) = self.record.take() else {
            return;
        };
        if record
            .fail("cancelled", "call abandoned before the provider answered", &*self.clock)
            .is_err()
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(execution_id = %record.id(), "no runtime to finalize cancelled execution");
            return;
        };
        let records = Arc::clone(&self.records);
        runtime.spawn(async move {
            if let Err(err) = records.finalize(&record).await {
                warn!(execution_id = %record.id(), error = %err, "failed to finalize cancelled execution");
            }
        });
    }
}
