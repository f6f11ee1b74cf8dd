//! Shared wiring for in-memory gateway integration tests.

use meshgate::discovery::{
    adapters::memory::{InMemoryDiscoverySessionRepository, StaticSpecFetcher},
    services::{DiscoveryReport, DiscoveryService, DiscoverySource},
};
use meshgate::protocol::{
    adapters::RegistryToolGateway,
    domain::{HandshakeMetadata, JsonRpcResponse, McpSession},
    services::McpConnection,
};
use meshgate::provider::{
    adapters::InMemoryProviderAdapter,
    domain::{PassthroughCredentialBundle, ProviderName},
    services::ProviderDirectory,
};
use meshgate::tool_registry::{
    adapters::memory::{
        InMemoryCredentialStore, InMemoryExecutionRecordStore, InMemoryToolRepository,
    },
    domain::{CircuitBreakerPolicy, TenantId, ToolConfiguration, ToolId, ToolsetEnablement},
    services::{ExecutionEngine, ExecutionSettings, RegisterToolRequest, ToolRegistryService},
};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Base URL every test tool points at.
pub const BASE_URL: &str = "https://api.github.test";

/// Cool-down applied after the circuit first opens.
pub const COOLDOWN: Duration = Duration::from_millis(150);

/// Registry service over in-memory adapters.
pub type Registry =
    ToolRegistryService<InMemoryToolRepository, InMemoryExecutionRecordStore, DefaultClock>;

/// Execution engine over in-memory adapters.
pub type Engine = ExecutionEngine<
    InMemoryToolRepository,
    InMemoryCredentialStore,
    InMemoryExecutionRecordStore,
    DefaultClock,
>;

/// Discovery service serving static documents.
pub type Discovery = DiscoveryService<
    InMemoryToolRepository,
    InMemoryDiscoverySessionRepository,
    StaticSpecFetcher,
    DefaultClock,
>;

/// Gateway handed to MCP connections.
pub type Gateway = RegistryToolGateway<
    InMemoryToolRepository,
    InMemoryCredentialStore,
    InMemoryExecutionRecordStore,
    DefaultClock,
>;

/// Every in-memory service the gateway needs, sharing one set of stores.
pub struct Platform {
    /// Tenant used by the helpers.
    pub tenant: TenantId,
    /// Tool configurations and catalogs.
    pub tools: Arc<InMemoryToolRepository>,
    /// Stored credentials.
    pub credentials: Arc<InMemoryCredentialStore>,
    /// Execution records.
    pub records: Arc<InMemoryExecutionRecordStore>,
    /// Specification source.
    pub fetcher: Arc<StaticSpecFetcher>,
    /// Scripted `github` provider.
    pub adapter: Arc<InMemoryProviderAdapter>,
    /// Registry service.
    pub registry: Arc<Registry>,
    /// Discovery service.
    pub discovery: Discovery,
    /// Execution engine.
    pub engine: Arc<Engine>,
}

impl Platform {
    /// Wires a platform whose circuit opens after five failures.
    pub fn new() -> Self {
        let clock = Arc::new(DefaultClock);
        let tools = Arc::new(InMemoryToolRepository::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let records = Arc::new(InMemoryExecutionRecordStore::new());
        let fetcher = Arc::new(StaticSpecFetcher::new());
        let adapter = Arc::new(InMemoryProviderAdapter::new(github()));

        let registry = Arc::new(ToolRegistryService::new(
            Arc::clone(&tools),
            Arc::clone(&records),
            Arc::clone(&clock),
        ));
        let discovery = DiscoveryService::new(
            Arc::clone(&tools),
            Arc::new(InMemoryDiscoverySessionRepository::new()),
            Arc::clone(&fetcher),
            Arc::clone(&clock),
        );
        let engine = Arc::new(ExecutionEngine::with_settings(
            Arc::clone(&tools),
            Arc::clone(&credentials),
            Arc::clone(&records),
            Arc::new(ProviderDirectory::new().with_adapter(adapter.clone())),
            clock,
            ExecutionSettings {
                timeout: Duration::from_secs(2),
                policy: CircuitBreakerPolicy {
                    failure_threshold: 5,
                    rolling_window: Duration::from_secs(60),
                    cooldown: COOLDOWN,
                    max_cooldown: Duration::from_secs(1),
                },
                max_concurrency_per_tenant: 4,
            },
        ));

        Self {
            tenant: TenantId::new("acme").expect("valid tenant"),
            tools,
            credentials,
            records,
            fetcher,
            adapter,
            registry,
            discovery,
            engine,
        }
    }

    /// Registers an unauthenticated `github` tool called `name`.
    pub async fn register_tool(&self, name: &str) -> ToolConfiguration {
        self.registry
            .register(RegisterToolRequest::new(
                self.tenant.clone(),
                name,
                "github",
                BASE_URL,
            ))
            .await
            .expect("registration should succeed")
    }

    /// Runs discovery against an inline document.
    pub async fn discover(&self, tool_id: ToolId, document: &str) -> DiscoveryReport {
        self.discovery
            .discover(
                &self.tenant,
                tool_id,
                DiscoverySource::Inline(document.to_owned()),
            )
            .await
            .expect("discovery should succeed")
    }

    /// Registers a tool and publishes the repository document for it.
    pub async fn tool_with_repos(&self, name: &str) -> ToolConfiguration {
        let tool = self.register_tool(name).await;
        self.discover(tool.id(), &repos_spec()).await;
        tool
    }

    /// Builds the gateway MCP connections use.
    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::new(RegistryToolGateway::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.engine),
        ))
    }

    /// Opens an MCP connection for the platform tenant.
    pub fn connect(
        &self,
        enablement: ToolsetEnablement,
    ) -> (
        McpConnection<Gateway>,
        mpsc::UnboundedReceiver<JsonRpcResponse>,
    ) {
        let session = McpSession::connect(
            self.tenant.clone(),
            enablement,
            HandshakeMetadata::default(),
            &DefaultClock,
        );
        McpConnection::new(session, self.gateway(), PassthroughCredentialBundle::new())
    }
}

/// Provides a fresh platform for each test.
#[fixture]
pub fn platform() -> Platform {
    Platform::new()
}

/// Returns the `github` provider name.
pub fn github() -> ProviderName {
    ProviderName::new("github").expect("valid provider")
}

/// Completes the MCP handshake on `connection`.
pub async fn initialize(connection: &mut McpConnection<Gateway>) {
    let response = connection
        .handle_frame(r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#)
        .await
        .expect("initialize should be answered");
    assert!(response.error.is_none(), "initialize failed: {response:?}");
    let acknowledged = connection
        .handle_frame(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    assert!(acknowledged.is_none());
}

/// Waits for the next background response.
pub async fn next_response(
    receiver: &mut mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> JsonRpcResponse {
    tokio::time::timeout(Duration::from_secs(2), receiver.recv())
        .await
        .expect("response should arrive")
        .expect("channel should be open")
}

/// A document with one read operation, `github.repos.get`.
pub fn repos_spec() -> String {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Repositories", "version": "1.0.0"},
        "paths": {
            "/repos/{owner}/{repo}": {
                "get": {
                    "operationId": "get",
                    "summary": "Get a repository",
                    "parameters": [
                        {"name": "owner", "in": "path", "required": true, "schema": {"type": "string"}},
                        {"name": "repo", "in": "path", "required": true, "schema": {"type": "string"}}
                    ],
                    "responses": {"200": {"description": "The repository"}}
                }
            }
        }
    })
    .to_string()
}

/// A document with `safe` read operations and `destructive` purge
/// operations, each on its own path.
pub fn mixed_spec(safe: usize, destructive: usize) -> String {
    let mut paths = Map::new();
    for index in 0..safe {
        paths.insert(
            format!("/reports{index}"),
            json!({"get": {
                "operationId": format!("listReports{index}"),
                "summary": "List reports",
                "description": "Returns every report visible to the caller.",
                "responses": {"200": {"description": "Reports"}}
            }}),
        );
    }
    for index in 0..destructive {
        paths.insert(
            format!("/caches{index}/purge"),
            json!({"post": {
                "operationId": format!("purgeCache{index}"),
                "summary": "Purge a cache",
                "responses": {"204": {"description": "Purged"}}
            }}),
        );
    }
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Mixed", "version": "1.0.0"},
        "paths": Value::Object(paths)
    })
    .to_string()
}
