//! WebSocket transport for MCP sessions.

use crate::protocol::{
    domain::{HandshakeMetadata, JsonRpcResponse},
    ports::ToolGateway,
    services::McpConnection,
};
use crate::provider::domain::{
    Credential, PassthroughCredentialBundle, ProviderDomainError, ProviderName,
};
use axum::extract::ws::{Message, WebSocket};
use axum::http::HeaderMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Header carrying a GitHub token for the connection.
pub const GITHUB_TOKEN_HEADER: &str = "x-github-token";
/// Header carrying a GitLab token for the connection.
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";
/// Header carrying a JSON passthrough bundle keyed by provider.
pub const PASSTHROUGH_AUTH_HEADER: &str = "x-passthrough-auth";

/// Collects handshake headers for client classification.
#[must_use]
pub fn handshake_metadata(headers: &HeaderMap) -> HandshakeMetadata {
    HandshakeMetadata::from_headers(
        headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
    )
}

/// Builds the connection's passthrough bundle from handshake headers.
///
/// Dedicated provider headers win over entries of the JSON bundle header.
///
/// # Errors
///
/// Returns [`ProviderDomainError::InvalidPassthroughBundle`] when the bundle
/// header is not valid JSON or does not decode.
pub fn passthrough_from_headers(
    headers: &HeaderMap,
) -> Result<PassthroughCredentialBundle, ProviderDomainError> {
    let base = match header(headers, PASSTHROUGH_AUTH_HEADER) {
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(raw).map_err(|err| {
                ProviderDomainError::InvalidPassthroughBundle(err.to_string())
            })?;
            PassthroughCredentialBundle::from_json(&value)?
        }
        None => PassthroughCredentialBundle::new(),
    };

    let mut dedicated = PassthroughCredentialBundle::new();
    if let Some(token) = header(headers, GITHUB_TOKEN_HEADER) {
        dedicated.insert(ProviderName::new("github")?, Credential::bearer(token));
    }
    if let Some(token) = header(headers, GITLAB_TOKEN_HEADER) {
        dedicated.insert(ProviderName::new("gitlab")?, Credential::api_key(token));
    }
    Ok(dedicated.layered_over(&base))
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Runs one upgraded socket until either side closes it.
///
/// Immediate answers and background call results share one writer task, so
/// frames never interleave. Closing the socket closes the session and aborts
/// its outstanding calls.
pub async fn serve_socket<G>(
    socket: WebSocket,
    mut connection: McpConnection<G>,
    mut responses: mpsc::UnboundedReceiver<JsonRpcResponse>,
) where
    G: ToolGateway + 'static,
{
    let session_id = connection.session().id();
    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(response) = responses.recv().await {
            if let Err(err) = sink.send(Message::Text(response.to_frame().into())).await {
                debug!(session_id = %session_id, error = %err, "socket write failed");
                break;
            }
        }
    });

    let immediate = connection.outbound();
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!(session_id = %session_id, "ignoring binary frame");
                continue;
            }
            Ok(_) => continue,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "socket read failed");
                break;
            }
        };
        if let Some(response) = connection.handle_frame(text.as_str()).await
            && immediate.send(response).is_err()
        {
            break;
        }
    }

    connection.close();
    drop(immediate);
    drop(connection);
    writer.abort();
}
