//! Per-connection MCP request handling.

use crate::protocol::{
    domain::{
        JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, McpSession, SessionState,
        WireToolName, codes, methods, tool_execution_error,
    },
    ports::{GatewayError, ToolCall, ToolGateway},
};
use crate::provider::domain::PassthroughCredentialBundle;
use crate::tool_registry::domain::ToolName;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Server name announced in `initialize`.
pub const SERVER_NAME: &str = "meshgate";

type InFlight = Arc<Mutex<HashMap<JsonRpcId, AbortHandle>>>;

/// Drives one [`McpSession`] over a framed transport.
///
/// Frames are fed in with [`McpConnection::handle_frame`]. Immediate answers
/// are returned from that call; `tools/call` runs as its own task and posts
/// its response to the outbound channel, so independent calls may complete
/// out of issuance order.
pub struct McpConnection<G>
where
    G: ToolGateway + 'static,
{
    session: McpSession,
    gateway: Arc<G>,
    passthrough: PassthroughCredentialBundle,
    outbound: mpsc::UnboundedSender<JsonRpcResponse>,
    in_flight: InFlight,
}

impl<G> McpConnection<G>
where
    G: ToolGateway + 'static,
{
    /// Creates a connection and the receiver for responses produced by
    /// background calls.
    ///
    /// `passthrough` holds the credentials captured from the connection's
    /// handshake headers.
    #[must_use]
    pub fn new(
        session: McpSession,
        gateway: Arc<G>,
        passthrough: PassthroughCredentialBundle,
    ) -> (Self, mpsc::UnboundedReceiver<JsonRpcResponse>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        info!(
            session_id = %session.id(),
            tenant = %session.tenant(),
            client_class = %session.client_class(),
            "MCP session connected"
        );
        (
            Self {
                session,
                gateway,
                passthrough,
                outbound,
                in_flight: Arc::new(Mutex::new(HashMap::new())),
            },
            receiver,
        )
    }

    /// Returns the session.
    #[must_use]
    pub const fn session(&self) -> &McpSession {
        &self.session
    }

    /// Returns a sender feeding the same outbound channel as background
    /// calls.
    #[must_use]
    pub fn outbound(&self) -> mpsc::UnboundedSender<JsonRpcResponse> {
        self.outbound.clone()
    }

    /// Returns the number of calls still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Handles one inbound text frame.
    ///
    /// Returns the immediate response, or `None` for notifications and for
    /// calls that answer through the outbound channel.
    pub async fn handle_frame(&mut self, text: &str) -> Option<JsonRpcResponse> {
        match JsonRpcRequest::parse(text) {
            Ok(request) => self.handle_request(request).await,
            Err(response) => Some(*response),
        }
    }

    /// Handles one decoded request or notification.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest { id, method, params } = request;
        let Some(id) = id else {
            self.handle_notification(&method, &params);
            return None;
        };

        if is_initialized(&method) {
            return Some(match self.session.mark_ready() {
                Ok(()) => JsonRpcResponse::success(id, json!({})),
                Err(_) => sequencing(id, &method, self.session.state()),
            });
        }
        if !self.session.admits(&method) {
            debug!(
                session_id = %self.session.id(),
                method = %method,
                state = %self.session.state(),
                "request rejected by session state"
            );
            return Some(sequencing(id, &method, self.session.state()));
        }

        match method.as_str() {
            methods::INITIALIZE => Some(self.initialize(id, &params)),
            methods::PING => Some(JsonRpcResponse::success(id, json!({}))),
            methods::TOOLS_LIST => Some(self.list_tools(id).await),
            methods::TOOLS_CALL => self.call_tool(id, &params),
            methods::SCHEMAS_EXPAND => Some(self.expand_schema(id, &params).await),
            _ => Some(JsonRpcResponse::error(
                id,
                JsonRpcError::new(codes::METHOD_NOT_FOUND, format!("method '{method}' not found")),
            )),
        }
    }

    /// Closes the session and aborts every call still running.
    pub fn close(&mut self) {
        if self.session.state() == SessionState::Closed {
            return;
        }
        self.session.close();
        let aborted: Vec<_> = lock(&self.in_flight).drain().collect();
        for (_, handle) in &aborted {
            handle.abort();
        }
        info!(
            session_id = %self.session.id(),
            aborted_calls = aborted.len(),
            "MCP session closed"
        );
    }

    fn handle_notification(&mut self, method: &str, params: &Value) {
        if self.session.state() == SessionState::Closed {
            return;
        }
        if is_initialized(method) {
            if let Err(err) = self.session.mark_ready() {
                warn!(session_id = %self.session.id(), error = %err, "ignoring early initialized");
            }
            return;
        }
        if method == methods::NOTIFICATIONS_CANCELLED {
            let Some(request_id) = params.get("requestId").and_then(JsonRpcId::from_value) else {
                return;
            };
            if let Some(handle) = lock(&self.in_flight).remove(&request_id) {
                handle.abort();
                debug!(session_id = %self.session.id(), request_id = %request_id, "call cancelled");
            }
            return;
        }
        debug!(session_id = %self.session.id(), method = %method, "ignoring notification");
    }

    fn initialize(&mut self, id: JsonRpcId, params: &Value) -> JsonRpcResponse {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let client_name = params
            .get("clientInfo")
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str);

        match self.session.initialize(requested, client_name) {
            Ok(version) => {
                info!(
                    session_id = %self.session.id(),
                    protocol_version = version,
                    client_class = %self.session.client_class(),
                    "MCP session initializing"
                );
                JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": version,
                        "capabilities": {"tools": {"listChanged": false}},
                        "serverInfo": {
                            "name": SERVER_NAME,
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                )
            }
            Err(_) => sequencing(id, methods::INITIALIZE, self.session.state()),
        }
    }

    async fn list_tools(&self, id: JsonRpcId) -> JsonRpcResponse {
        let descriptors = match self
            .gateway
            .list_tools(self.session.tenant(), self.session.enablement())
            .await
        {
            Ok(descriptors) => descriptors,
            Err(err) => return gateway_error(id, &err),
        };

        let profile = self.session.client_class().profile();
        let tools: Vec<Value> = descriptors
            .iter()
            .map(|descriptor| {
                json!({
                    "name": descriptor.name.to_string(),
                    "description": profile.shape_description(&descriptor.description),
                    "inputSchema": profile.shape_schema(&descriptor.input_schema),
                    "annotations": {
                        "readOnlyHint": !descriptor.destructive,
                        "destructiveHint": descriptor.destructive,
                    },
                })
            })
            .collect();
        debug!(session_id = %self.session.id(), tools = tools.len(), "listed tools");
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    fn call_tool(&self, id: JsonRpcId, params: &Value) -> Option<JsonRpcResponse> {
        let call = match self.tool_call(params) {
            Ok(call) => call,
            Err(error) => return Some(JsonRpcResponse::error(id, error)),
        };

        let mut in_flight = lock(&self.in_flight);
        if in_flight.contains_key(&id) {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::new(
                    codes::INVALID_REQUEST,
                    "a request with this id is already in flight",
                ),
            ));
        }

        let gateway = Arc::clone(&self.gateway);
        let outbound = self.outbound.clone();
        let registry = Arc::clone(&self.in_flight);
        let request_id = id.clone();
        let session_id = self.session.id();
        let handle = tokio::spawn(async move {
            let name = call.name.to_string();
            let response = match gateway.call_tool(call).await {
                Ok(outcome) => JsonRpcResponse::success(
                    request_id.clone(),
                    call_result(outcome.status, outcome.body),
                ),
                Err(err) => {
                    warn!(session_id = %session_id, tool = %name, error = %err, "tool call failed");
                    gateway_error(request_id.clone(), &err)
                }
            };
            lock(&registry).remove(&request_id);
            if outbound.send(response).is_err() {
                debug!(session_id = %session_id, "connection gone before call completed");
            }
        });
        // The task cannot deregister itself until this guard drops.
        in_flight.insert(id, handle.abort_handle());
        None
    }

    fn tool_call(&self, params: &Value) -> Result<ToolCall, JsonRpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_params("'name' must be a string"))?;
        let wire = WireToolName::parse(name).map_err(|err| invalid_params(err.to_string()))?;
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(arguments @ Value::Object(_)) => arguments.clone(),
            Some(_) => return Err(invalid_params("'arguments' must be an object")),
        };

        let passthrough = match params.pointer("/_meta/passthroughCredentials") {
            None | Some(Value::Null) => self.passthrough.clone(),
            Some(value) => PassthroughCredentialBundle::from_json(value)
                .map_err(|err| invalid_params(err.to_string()))?
                .layered_over(&self.passthrough),
        };

        Ok(ToolCall {
            tenant: self.session.tenant().clone(),
            enablement: self.session.enablement().clone(),
            name: wire,
            arguments,
            passthrough,
        })
    }

    async fn expand_schema(&self, id: JsonRpcId, params: &Value) -> JsonRpcResponse {
        let (Some(tool), Some(name)) = (
            params.get("tool").and_then(Value::as_str),
            params.get("name").and_then(Value::as_str),
        ) else {
            return JsonRpcResponse::error(id, invalid_params("'tool' and 'name' must be strings"));
        };
        let Ok(tool_name) = ToolName::new(tool) else {
            return JsonRpcResponse::error(id, invalid_params(format!("invalid tool name '{tool}'")));
        };

        match self
            .gateway
            .expand_schema(self.session.tenant(), &tool_name, name)
            .await
        {
            Ok(schema) => JsonRpcResponse::success(id, json!({ "name": name, "schema": schema })),
            Err(err) => gateway_error(id, &err),
        }
    }
}

impl<G> Drop for McpConnection<G>
where
    G: ToolGateway + 'static,
{
    fn drop(&mut self) {
        self.close();
    }
}

fn is_initialized(method: &str) -> bool {
    method == methods::INITIALIZED || method == methods::NOTIFICATIONS_INITIALIZED
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashMap<JsonRpcId, AbortHandle>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sequencing(id: JsonRpcId, method: &str, state: SessionState) -> JsonRpcResponse {
    JsonRpcResponse::error(id, JsonRpcError::sequencing(method, state))
}

fn invalid_params(message: impl Into<String>) -> JsonRpcError {
    JsonRpcError::new(codes::INVALID_PARAMS, message)
}

fn gateway_error(id: JsonRpcId, err: &GatewayError) -> JsonRpcResponse {
    let error = match err {
        GatewayError::UnknownTool(_) | GatewayError::UnknownSchema { .. } => {
            invalid_params(err.to_string())
        }
        GatewayError::Execution(execution) => tool_execution_error(execution),
        GatewayError::Registry(_) => JsonRpcError::new(codes::INTERNAL_ERROR, err.to_string()),
    };
    JsonRpcResponse::error(id, error)
}

fn call_result(status: u16, body: Value) -> Value {
    let text = match &body {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let mut result = json!({
        "content": [{"type": "text", "text": text}],
        "isError": false,
        "_meta": {"status": status},
    });
    if body.is_object()
        && let Some(object) = result.as_object_mut()
    {
        object.insert("structuredContent".to_owned(), body);
    }
    result
}
