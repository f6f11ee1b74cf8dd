//! Composition root: wires adapters and services into a running gateway.

use super::{
    AppState, GatewayStack, InMemoryStack, PostgresStack, StackParts, TenantDirectory, router,
};
use crate::config::{ConfigError, GatewayConfig, TenantConfig};
use crate::discovery::{
    adapters::{HttpSpecFetcher, memory::InMemoryDiscoverySessionRepository},
    services::DiscoveryService,
};
use crate::ingestion::{
    adapters::{
        WebhookReceiver,
        memory::{InMemoryDeadLetterStore, InMemoryEventStream},
        postgres::{PostgresDeadLetterStore, PostgresEventStream},
    },
    services::{ConsumerGroup, DedupHandler, ToolHealthHandler},
};
use crate::protocol::adapters::RegistryToolGateway;
use crate::provider::services::ProviderDirectory;
use crate::tool_registry::{
    adapters::{
        memory::{InMemoryCredentialStore, InMemoryExecutionRecordStore, InMemoryToolRepository},
        postgres::PostgresToolRepository,
    },
    services::{ExecutionEngine, ToolRegistryService},
};
use axum::Router;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Errors raised while assembling the gateway.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    /// The `PostgreSQL` pool could not be created.
    #[error("failed to create database pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

/// Consumer group that feeds tool health from webhook events.
pub type HealthConsumers<K> = ConsumerGroup<
    <K as GatewayStack>::Stream,
    <K as GatewayStack>::DeadLetters,
    DedupHandler<
        ToolHealthHandler<
            <K as GatewayStack>::Tools,
            <K as GatewayStack>::Records,
            <K as GatewayStack>::Clock,
        >,
    >,
    <K as GatewayStack>::Clock,
>;

/// A fully wired gateway.
pub struct Gateway<K: GatewayStack> {
    state: AppState<K>,
    webhooks: WebhookReceiver<K::Stream, K::Clock>,
    consumers: HealthConsumers<K>,
    mcp_path: String,
}

impl<K: GatewayStack> Gateway<K> {
    /// Wires services over `parts` according to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid tenants, webhooks or ingestion
    /// settings.
    pub fn assemble(
        parts: StackParts<K>,
        providers: ProviderDirectory,
        config: &GatewayConfig,
    ) -> Result<Self, ConfigError> {
        let StackParts {
            tools,
            credentials,
            records,
            sessions,
            fetcher,
            stream,
            dead_letters,
            clock,
        } = parts;

        let registry = Arc::new(ToolRegistryService::new(
            Arc::clone(&tools),
            Arc::clone(&records),
            Arc::clone(&clock),
        ));
        let engine = Arc::new(ExecutionEngine::with_settings(
            Arc::clone(&tools),
            credentials,
            records,
            Arc::new(providers),
            Arc::clone(&clock),
            config.execution_settings(),
        ));
        let discovery = Arc::new(
            DiscoveryService::new(tools, sessions, fetcher, Arc::clone(&clock))
                .with_settings(config.discovery.settings()),
        );
        let gateway = Arc::new(RegistryToolGateway::new(Arc::clone(&registry), engine));

        let webhooks = WebhookReceiver::new(
            Arc::clone(&stream),
            config.webhook_verifiers()?,
            Arc::clone(&clock),
        );
        let handler = DedupHandler::new(
            ToolHealthHandler::new(Arc::clone(&registry), Arc::clone(&clock)),
            config.ingestion.dedup_capacity()?,
        );
        let consumers = ConsumerGroup::new(
            stream,
            dead_letters,
            Arc::new(handler),
            Arc::clone(&clock),
            config.ingestion.consumer_settings(),
        );

        Ok(Self {
            state: AppState {
                tenants: Arc::new(TenantDirectory::from_config(&config.tenants)?),
                registry,
                discovery,
                gateway,
                clock,
            },
            webhooks,
            consumers,
            mcp_path: config.server.mcp_path.clone(),
        })
    }

    /// Returns the route state.
    #[must_use]
    pub const fn state(&self) -> &AppState<K> {
        &self.state
    }

    /// Returns the ingestion consumer group.
    #[must_use]
    pub const fn consumers(&self) -> &HealthConsumers<K> {
        &self.consumers
    }

    /// Builds the HTTP router.
    pub fn router(&self) -> Router {
        router(
            self.state.clone(),
            &self.mcp_path,
            self.webhooks.clone().router(),
        )
    }

    /// Starts the ingestion workers.
    #[must_use]
    pub fn spawn_consumers(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.consumers.spawn(shutdown)
    }
}

/// Loads each tenant's stored credentials into `store`.
///
/// # Errors
///
/// Returns [`ConfigError`] for an invalid tenant id or when the store
/// rejects an entry.
pub fn seed_credentials(
    store: &InMemoryCredentialStore,
    tenants: &[TenantConfig],
) -> Result<(), ConfigError> {
    for tenant in tenants {
        let tenant_id = tenant.tenant_id()?;
        for (secret_ref, credential) in &tenant.credentials {
            store
                .insert(tenant_id.clone(), secret_ref.as_str(), credential.clone())
                .map_err(|err| ConfigError::InvalidValue {
                    field: "tenants.credentials".to_owned(),
                    message: err.to_string(),
                })?;
        }
    }
    Ok(())
}

fn shared_parts(
    config: &GatewayConfig,
) -> Result<(Arc<InMemoryCredentialStore>, Arc<HttpSpecFetcher>), BootstrapError> {
    let credentials = InMemoryCredentialStore::new();
    seed_credentials(&credentials, &config.tenants)?;
    let fetcher = HttpSpecFetcher::with_default_client(config.discovery.fetch_timeout())?
        .with_paths(config.discovery.well_known_paths.clone());
    Ok((Arc::new(credentials), Arc::new(fetcher)))
}

/// Builds a gateway whose state lives in process memory.
///
/// # Errors
///
/// Returns [`BootstrapError`] for invalid configuration or when an HTTP
/// client cannot be built.
pub fn in_memory_gateway(config: &GatewayConfig) -> Result<Gateway<InMemoryStack>, BootstrapError> {
    let (credentials, fetcher) = shared_parts(config)?;
    let clock = Arc::new(DefaultClock);
    let parts = StackParts::<InMemoryStack> {
        tools: Arc::new(InMemoryToolRepository::new()),
        credentials,
        records: Arc::new(InMemoryExecutionRecordStore::new()),
        sessions: Arc::new(InMemoryDiscoverySessionRepository::new()),
        fetcher,
        stream: Arc::new(InMemoryEventStream::new(Arc::clone(&clock))),
        dead_letters: Arc::new(InMemoryDeadLetterStore::new()),
        clock,
    };
    let providers = ProviderDirectory::http(&config.execution.provider_names()?)?;
    Ok(Gateway::assemble(parts, providers, config)?)
}

/// Builds a gateway that keeps tool configurations, webhook events and
/// dead letters in `PostgreSQL`.
///
/// # Errors
///
/// Returns [`BootstrapError`] for invalid configuration, when an HTTP client
/// cannot be built or when the pool cannot connect.
pub fn postgres_gateway(
    config: &GatewayConfig,
    database_url: &str,
) -> Result<Gateway<PostgresStack>, BootstrapError> {
    let pool = Pool::builder()
        .max_size(config.storage.max_connections)
        .build(ConnectionManager::<PgConnection>::new(database_url))?;
    let (credentials, fetcher) = shared_parts(config)?;
    let clock = Arc::new(DefaultClock);
    let parts = StackParts::<PostgresStack> {
        tools: Arc::new(PostgresToolRepository::new(pool.clone())),
        credentials,
        records: Arc::new(InMemoryExecutionRecordStore::new()),
        sessions: Arc::new(InMemoryDiscoverySessionRepository::new()),
        fetcher,
        stream: Arc::new(PostgresEventStream::new(pool.clone(), Arc::clone(&clock))),
        dead_letters: Arc::new(PostgresDeadLetterStore::new(pool)),
        clock,
    };
    let providers = ProviderDirectory::http(&config.execution.provider_names()?)?;
    Ok(Gateway::assemble(parts, providers, config)?)
}
