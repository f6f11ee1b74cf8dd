//! HTTP routes: health, the MCP endpoint and tool administration.

use super::{GatewayStack, TenantContext, TenantDirectory};
use crate::discovery::services::{DiscoveryError, DiscoveryService, DiscoverySource};
use crate::protocol::{
    adapters::{RegistryToolGateway, handshake_metadata, passthrough_from_headers, serve_socket},
    domain::McpSession,
    services::McpConnection,
};
use crate::tool_registry::{
    domain::{AuthKind, ToolConfiguration, ToolId},
    ports::ToolRepositoryError,
    services::{RegisterToolRequest, ToolRegistryService, ToolRegistryServiceError},
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, State, WebSocketUpgrade,
        rejection::JsonRejection,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Registry service for a stack.
pub type StackRegistry<K> = ToolRegistryService<
    <K as GatewayStack>::Tools,
    <K as GatewayStack>::Records,
    <K as GatewayStack>::Clock,
>;

/// Discovery service for a stack.
pub type StackDiscovery<K> = DiscoveryService<
    <K as GatewayStack>::Tools,
    <K as GatewayStack>::Sessions,
    <K as GatewayStack>::Fetcher,
    <K as GatewayStack>::Clock,
>;

/// Tool gateway for a stack.
pub type StackGateway<K> = RegistryToolGateway<
    <K as GatewayStack>::Tools,
    <K as GatewayStack>::Credentials,
    <K as GatewayStack>::Records,
    <K as GatewayStack>::Clock,
>;

/// Shared state of the HTTP routes.
pub struct AppState<K: GatewayStack> {
    /// API-key directory.
    pub tenants: Arc<TenantDirectory>,
    /// Tool registry.
    pub registry: Arc<StackRegistry<K>>,
    /// Discovery engine.
    pub discovery: Arc<StackDiscovery<K>>,
    /// Gateway used by MCP sessions.
    pub gateway: Arc<StackGateway<K>>,
    /// Clock for session timestamps.
    pub clock: Arc<K::Clock>,
}

impl<K: GatewayStack> Clone for AppState<K> {
    fn clone(&self) -> Self {
        Self {
            tenants: Arc::clone(&self.tenants),
            registry: Arc::clone(&self.registry),
            discovery: Arc::clone(&self.discovery),
            gateway: Arc::clone(&self.gateway),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<K: GatewayStack> AppState<K> {
    fn authenticate(&self, headers: &HeaderMap) -> Result<TenantContext, ApiError> {
        self.tenants
            .authenticate_headers(headers)
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Errors returned by the HTTP routes as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unknown API key.
    #[error("missing or invalid API key")]
    Unauthorized,

    /// The request is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The resource does not exist for the tenant.
    #[error("{0}")]
    NotFound(String),

    /// The request conflicts with current state.
    #[error("{0}")]
    Conflict(String),

    /// The request was valid but the work failed.
    #[error("{0}")]
    Unprocessable(String),

    /// An internal failure; details are logged, not returned.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(error = %detail, "request failed");
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ToolRegistryServiceError> for ApiError {
    fn from(err: ToolRegistryServiceError) -> Self {
        match err {
            ToolRegistryServiceError::Domain(_) | ToolRegistryServiceError::Provider(_) => {
                Self::BadRequest(err.to_string())
            }
            ToolRegistryServiceError::NotFound(_)
            | ToolRegistryServiceError::Repository(ToolRepositoryError::NotFound(_)) => {
                Self::NotFound(err.to_string())
            }
            ToolRegistryServiceError::Repository(
                ToolRepositoryError::DuplicateTool(_) | ToolRepositoryError::DuplicateToolName { .. },
            ) => Self::Conflict(err.to_string()),
            ToolRegistryServiceError::Repository(_) | ToolRegistryServiceError::Records(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::ToolNotFound(_) => Self::NotFound(err.to_string()),
            DiscoveryError::AlreadyRunning { .. } => Self::Conflict(err.to_string()),
            DiscoveryError::Failed { .. } => Self::Unprocessable(err.to_string()),
            DiscoveryError::Sessions(_)
            | DiscoveryError::Repository(_)
            | DiscoveryError::Domain(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Builds the gateway router.
///
/// `webhooks` is merged as is; it carries its own state and body limit.
pub fn router<K: GatewayStack>(state: AppState<K>, mcp_path: &str, webhooks: Router) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(mcp_path, get(mcp_endpoint::<K>))
        .route("/tools", post(register_tool::<K>))
        .route("/tools/{id}/deactivate", post(deactivate_tool::<K>))
        .route(
            "/tools/{id}/discovery",
            post(trigger_discovery::<K>).get(discovery_status::<K>),
        )
        .with_state(state)
        .merge(webhooks)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn mcp_endpoint<K: GatewayStack>(
    State(state): State<AppState<K>>,
    headers: HeaderMap,
    upgrade_request: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let context = match state.authenticate(&headers) {
        Ok(context) => context,
        Err(rejection) => return rejection.into_response(),
    };
    let passthrough = match passthrough_from_headers(&headers) {
        Ok(bundle) => bundle,
        Err(err) => return ApiError::BadRequest(err.to_string()).into_response(),
    };
    let upgrade = match upgrade_request {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let session = McpSession::connect(
        context.tenant,
        context.enablement,
        handshake_metadata(&headers),
        &*state.clock,
    );
    let (connection, responses) =
        McpConnection::new(session, Arc::clone(&state.gateway), passthrough);
    upgrade.on_upgrade(move |socket| serve_socket(socket, connection, responses))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterToolBody {
    name: String,
    provider: String,
    base_url: String,
    #[serde(default)]
    auth_kind: Option<String>,
    #[serde(default)]
    secret_ref: Option<String>,
    #[serde(default)]
    spec_url: Option<String>,
    #[serde(default)]
    discovery_hints: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ToolView {
    id: ToolId,
    name: String,
    provider: String,
    base_url: String,
    auth_kind: &'static str,
    active: bool,
    health: &'static str,
}

impl From<&ToolConfiguration> for ToolView {
    fn from(tool: &ToolConfiguration) -> Self {
        Self {
            id: tool.id(),
            name: tool.name().to_string(),
            provider: tool.provider().to_string(),
            base_url: tool.base_url().to_owned(),
            auth_kind: tool.auth().kind().as_str(),
            active: tool.is_active(),
            health: tool.health().status().as_str(),
        }
    }
}

async fn register_tool<K: GatewayStack>(
    State(state): State<AppState<K>>,
    headers: HeaderMap,
    body: Result<Json<RegisterToolBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ToolView>), ApiError> {
    let context = state.authenticate(&headers)?;
    let Json(registration) = body?;

    let mut request = RegisterToolRequest::new(
        context.tenant,
        registration.name,
        registration.provider,
        registration.base_url,
    );
    if let Some(kind) = registration.auth_kind {
        let auth_kind =
            AuthKind::try_from(kind.as_str()).map_err(|err| ApiError::BadRequest(err.to_string()))?;
        request = request.with_auth(auth_kind, registration.secret_ref.unwrap_or_default());
    }
    if let Some(spec_url) = registration.spec_url {
        request = request.with_spec_url(spec_url);
    }
    request = request.with_discovery_hints(registration.discovery_hints);

    let tool = state.registry.register(request).await?;
    Ok((StatusCode::CREATED, Json(ToolView::from(&tool))))
}

async fn deactivate_tool<K: GatewayStack>(
    State(state): State<AppState<K>>,
    headers: HeaderMap,
    Path(tool_id): Path<ToolId>,
) -> Result<Json<ToolView>, ApiError> {
    let context = state.authenticate(&headers)?;
    let tool = state.registry.deactivate(&context.tenant, tool_id).await?;
    Ok(Json(ToolView::from(&tool)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TriggerBody {
    #[serde(default)]
    spec: Option<String>,
}

/// Starts discovery in the background, or runs it inline when the body
/// carries a `spec` document.
async fn trigger_discovery<K: GatewayStack>(
    State(state): State<AppState<K>>,
    headers: HeaderMap,
    Path(tool_id): Path<ToolId>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let context = state.authenticate(&headers)?;
    let trigger: TriggerBody = if body.is_empty() {
        TriggerBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| ApiError::BadRequest(err.to_string()))?
    };

    if let Some(document) = trigger.spec {
        let report = state
            .discovery
            .discover(&context.tenant, tool_id, DiscoverySource::Inline(document))
            .await?;
        info!(tool_id = %tool_id, operations = report.catalog.operations().len(), "inline discovery completed");
        return Ok((StatusCode::OK, Json(report.session)).into_response());
    }

    let session = state.discovery.trigger(&context.tenant, tool_id).await?;
    Ok((StatusCode::ACCEPTED, Json(session)).into_response())
}

async fn discovery_status<K: GatewayStack>(
    State(state): State<AppState<K>>,
    headers: HeaderMap,
    Path(tool_id): Path<ToolId>,
) -> Result<Response, ApiError> {
    let context = state.authenticate(&headers)?;
    let session = state
        .discovery
        .status(&context.tenant, tool_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no discovery has run for tool {tool_id}")))?;
    Ok(Json(session).into_response())
}
