//! HTTP webhook receiver.

use crate::ingestion::{
    domain::{EventId, WebhookAuthError, WebhookEvent, WebhookVerifier},
    ports::{EventStream, EventStreamError},
};
use crate::provider::domain::ProviderName;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use mockable::Clock;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Largest accepted webhook body.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

/// Why a delivery was refused.
#[derive(Debug, Error)]
pub enum WebhookRejection {
    /// No verifier is configured for the provider.
    #[error("no webhook endpoint configured for provider '{0}'")]
    UnknownProvider(String),

    /// The delivery failed authentication.
    #[error(transparent)]
    Unauthorized(#[from] WebhookAuthError),

    /// The stream could not store the delivery.
    #[error(transparent)]
    Stream(#[from] EventStreamError),
}

impl WebhookRejection {
    /// Returns the HTTP status for the rejection.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnknownProvider(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Stream(_) => "event could not be stored".to_owned(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Authenticates deliveries and appends them to the event stream.
///
/// The receiver answers as soon as the append returns; processing happens
/// later in the consumer group.
pub struct WebhookReceiver<S, C>
where
    S: EventStream,
    C: Clock + Send + Sync,
{
    stream: Arc<S>,
    verifiers: Arc<HashMap<ProviderName, WebhookVerifier>>,
    clock: Arc<C>,
}

impl<S, C> Clone for WebhookReceiver<S, C>
where
    S: EventStream,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            stream: Arc::clone(&self.stream),
            verifiers: Arc::clone(&self.verifiers),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, C> WebhookReceiver<S, C>
where
    S: EventStream + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a receiver for the configured providers.
    #[must_use]
    pub fn new(
        stream: Arc<S>,
        verifiers: impl IntoIterator<Item = WebhookVerifier>,
        clock: Arc<C>,
    ) -> Self {
        let by_provider = verifiers
            .into_iter()
            .map(|verifier| (verifier.provider().clone(), verifier))
            .collect();
        Self {
            stream,
            verifiers: Arc::new(by_provider),
            clock,
        }
    }

    /// Verifies and stores one delivery.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookRejection`] when the provider is not configured, the
    /// delivery fails authentication, or the append fails.
    pub async fn receive(
        &self,
        provider: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<EventId, WebhookRejection> {
        let verifier = ProviderName::new(provider)
            .ok()
            .and_then(|name| self.verifiers.get(&name))
            .ok_or_else(|| WebhookRejection::UnknownProvider(provider.to_owned()))?;
        let convention = verifier.headers();

        if let Err(err) = verifier.verify(header(headers, convention.signature), body) {
            warn!(provider, error = %err, "webhook rejected");
            return Err(err.into());
        }

        let payload = serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
        let event = WebhookEvent::received(
            verifier.provider().clone(),
            header(headers, convention.delivery_id).map(str::to_owned),
            header(headers, convention.event_type).map(str::to_owned),
            payload,
            &*self.clock,
        );
        self.stream.append(&event).await?;
        info!(
            provider,
            event_id = %event.id(),
            delivery_id = event.delivery_id().unwrap_or("-"),
            event_type = event.event_type().unwrap_or("-"),
            "webhook accepted"
        );
        Ok(event.id())
    }

    /// Returns the `POST /webhooks/{provider}` route.
    pub fn router(self) -> Router {
        Router::new()
            .route("/webhooks/{provider}", post(receive_webhook::<S, C>))
            .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES))
            .with_state(self)
    }
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn receive_webhook<S, C>(
    State(receiver): State<WebhookReceiver<S, C>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: EventStream + 'static,
    C: Clock + Send + Sync + 'static,
{
    match receiver.receive(&provider, &headers, &body).await {
        Ok(event_id) => (
            StatusCode::ACCEPTED,
            Json(json!({ "eventId": event_id.to_string() })),
        )
            .into_response(),
        Err(rejection) => {
            if let WebhookRejection::Stream(err) = &rejection {
                error!(provider = %provider, error = %err, "webhook append failed");
            }
            rejection.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::adapters::memory::InMemoryEventStream;
    use crate::ingestion::domain::{WebhookScheme, signature_header};
    use axum::body::Body;
    use axum::http::Request;
    use mockable::DefaultClock;
    use secrecy::SecretString;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        stream: Arc<InMemoryEventStream<DefaultClock>>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(DefaultClock);
        let stream = Arc::new(InMemoryEventStream::new(Arc::clone(&clock)));
        let verifiers = [
            WebhookVerifier::new(
                ProviderName::new("github").expect("valid provider"),
                WebhookScheme::HmacSha256,
                SecretString::from("gh-secret"),
            ),
            WebhookVerifier::new(
                ProviderName::new("gitlab").expect("valid provider"),
                WebhookScheme::SharedToken,
                SecretString::from("gl-secret"),
            ),
        ];
        let app = WebhookReceiver::new(Arc::clone(&stream), verifiers, clock).router();
        Harness { app, stream }
    }

    fn delivery(uri: &str, headers: &[(&str, &str)], body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body)).expect("request should build")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn signed_github_deliveries_are_accepted_and_stored() {
        let harness = harness();
        let body = br#"{"action":"completed"}"#.to_vec();
        let signature = signature_header("gh-secret", &body).expect("HMAC accepts any key");

        let response = harness
            .app
            .oneshot(delivery(
                "/webhooks/github",
                &[
                    ("X-Hub-Signature-256", signature.as_str()),
                    ("X-GitHub-Delivery", "d-1"),
                    ("X-GitHub-Event", "check_run"),
                ],
                body,
            ))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let claimed = harness
            .stream
            .claim("test", 10, std::time::Duration::from_secs(30))
            .await
            .expect("claim should succeed");
        let event = claimed.first().expect("one stored event");
        assert_eq!(event.delivery_id(), Some("d-1"));
        assert_eq!(event.event_type(), Some("check_run"));
        assert_eq!(event.payload(), &json!({"action": "completed"}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bad_signatures_are_unauthorized_and_not_stored() {
        let harness = harness();

        let response = harness
            .app
            .oneshot(delivery(
                "/webhooks/github",
                &[("X-Hub-Signature-256", "sha256=00")],
                b"{}".to_vec(),
            ))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(harness.stream.pending_count().await.expect("count"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gitlab_tokens_are_checked() {
        let harness = harness();

        let response = harness
            .app
            .oneshot(delivery(
                "/webhooks/gitlab",
                &[("X-Gitlab-Token", "gl-secret"), ("X-Gitlab-Event-UUID", "u-1")],
                b"{}".to_vec(),
            ))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unconfigured_providers_are_not_found() {
        let harness = harness();

        let response = harness
            .app
            .oneshot(delivery("/webhooks/jenkins", &[], b"{}".to_vec()))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_bodies_are_refused() {
        let harness = harness();

        let response = harness
            .app
            .oneshot(delivery(
                "/webhooks/gitlab",
                &[("X-Gitlab-Token", "gl-secret")],
                vec![b'a'; MAX_WEBHOOK_BODY_BYTES + 1],
            ))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(harness.stream.pending_count().await.expect("count"), 0);
    }
}
