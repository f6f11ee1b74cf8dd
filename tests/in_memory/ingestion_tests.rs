//! Webhook deliveries flowing through the stream into tool health, with
//! retries and dead-lettering.

use super::helpers::{Platform, github, platform};
use axum::http::HeaderMap;
use meshgate::ingestion::{
    adapters::{
        WebhookReceiver,
        memory::{InMemoryDeadLetterStore, InMemoryEventStream},
    },
    domain::{RetryPolicy, WebhookScheme, WebhookVerifier, signature_header},
    ports::{DeadLetterStore, EventStream},
    services::{ConsumerGroup, ConsumerSettings, DEFAULT_DEDUP_CAPACITY, DedupHandler, ToolHealthHandler},
};
use meshgate::tool_registry::{
    adapters::memory::{InMemoryExecutionRecordStore, InMemoryToolRepository},
    domain::HealthStatus,
};
use mockable::DefaultClock;
use rstest::rstest;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SECRET: &str = "hook-secret";

type Handler = DedupHandler<
    ToolHealthHandler<InMemoryToolRepository, InMemoryExecutionRecordStore, DefaultClock>,
>;

struct Pipeline {
    receiver: WebhookReceiver<InMemoryEventStream<DefaultClock>, DefaultClock>,
    stream: Arc<InMemoryEventStream<DefaultClock>>,
    dead_letters: Arc<InMemoryDeadLetterStore>,
    group: ConsumerGroup<
        InMemoryEventStream<DefaultClock>,
        InMemoryDeadLetterStore,
        Handler,
        DefaultClock,
    >,
}

fn pipeline(platform: &Platform, max_attempts: u32) -> Pipeline {
    let clock = Arc::new(DefaultClock);
    let stream = Arc::new(InMemoryEventStream::new(Arc::clone(&clock)));
    let dead_letters = Arc::new(InMemoryDeadLetterStore::new());
    let receiver = WebhookReceiver::new(
        Arc::clone(&stream),
        [WebhookVerifier::new(
            github(),
            WebhookScheme::HmacSha256,
            SecretString::from(SECRET),
        )],
        Arc::clone(&clock),
    );
    let handler = DedupHandler::new(
        ToolHealthHandler::new(Arc::clone(&platform.registry), Arc::clone(&clock)),
        DEFAULT_DEDUP_CAPACITY,
    );
    let group = ConsumerGroup::new(
        Arc::clone(&stream),
        Arc::clone(&dead_letters),
        Arc::new(handler),
        clock,
        ConsumerSettings {
            workers: 1,
            retry: RetryPolicy {
                max_attempts,
                base_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
            },
            ..ConsumerSettings::default()
        },
    );
    Pipeline {
        receiver,
        stream,
        dead_letters,
        group,
    }
}

async fn deliver(pipeline: &Pipeline, delivery_id: &str, payload: &Value) {
    let body = payload.to_string().into_bytes();
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-hub-signature-256",
        signature_header(SECRET, &body)
            .expect("HMAC accepts any key")
            .parse()
            .expect("valid header value"),
    );
    headers.insert(
        "x-github-delivery",
        delivery_id.parse().expect("valid header value"),
    );
    headers.insert("x-github-event", "check_run".parse().expect("valid header value"));
    pipeline
        .receiver
        .receive("github", &headers, &body)
        .await
        .expect("signed delivery should be accepted");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_checks_mark_the_tool_unhealthy(platform: Platform) {
    let tool = platform.register_tool("repos").await;
    let pipeline = pipeline(&platform, 3);
    deliver(
        &pipeline,
        "d-1",
        &json!({"tool_id": tool.id().to_string(), "conclusion": "failure"}),
    )
    .await;

    let summary = pipeline
        .group
        .run_once("worker-0")
        .await
        .expect("poll should succeed");

    assert_eq!(summary.acknowledged, 1);
    let stored = platform
        .registry
        .find(&platform.tenant, tool.id())
        .await
        .expect("lookup should succeed")
        .expect("tool exists");
    assert_eq!(stored.health().status(), HealthStatus::Unhealthy);
    assert_eq!(pipeline.stream.pending_count().await.expect("count"), 0);
}

#[rstest]
#[case::single_attempt(1)]
#[case::three_attempts(3)]
#[tokio::test(flavor = "multi_thread")]
async fn events_failing_every_attempt_are_dead_lettered(
    platform: Platform,
    #[case] max_attempts: u32,
) {
    let pipeline = pipeline(&platform, max_attempts);
    let ghost = Uuid::new_v4().to_string();
    deliver(
        &pipeline,
        "d-ghost",
        &json!({"tool_id": ghost, "status": "success"}),
    )
    .await;

    for _ in 0..max_attempts {
        pipeline
            .group
            .run_once("worker-0")
            .await
            .expect("poll should succeed");
    }

    let entries = pipeline.dead_letters.list().await.expect("list should succeed");
    let entry = entries.first().expect("one dead-lettered event");
    assert_eq!(entries.len(), 1);
    assert_eq!(entry.history().len(), usize::try_from(max_attempts).expect("small count"));
    assert_eq!(entry.event.delivery_id(), Some("d-ghost"));
    assert_eq!(pipeline.stream.pending_count().await.expect("count"), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn poison_events_do_not_block_later_deliveries(platform: Platform) {
    let tool = platform.register_tool("repos").await;
    let pipeline = pipeline(&platform, 2);
    deliver(&pipeline, "d-bad", &json!({"tool_id": "not-a-uuid", "state": "ok"})).await;
    deliver(
        &pipeline,
        "d-good",
        &json!({"meshgate": {"tool_id": tool.id().to_string()}, "state": "degraded"}),
    )
    .await;

    let first = pipeline
        .group
        .run_once("worker-0")
        .await
        .expect("poll should succeed");
    let second = pipeline
        .group
        .run_once("worker-0")
        .await
        .expect("poll should succeed");

    assert_eq!(first.acknowledged, 1);
    assert_eq!(first.retried, 1);
    assert_eq!(second.dead_lettered, 1);
    let stored = platform
        .registry
        .find(&platform.tenant, tool.id())
        .await
        .expect("lookup should succeed")
        .expect("tool exists");
    assert_eq!(stored.health().status(), HealthStatus::Degraded);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn redelivered_webhooks_are_processed_once(platform: Platform) {
    let tool = platform.register_tool("repos").await;
    let pipeline = pipeline(&platform, 3);
    let payload = json!({"tool_id": tool.id().to_string(), "conclusion": "success"});
    deliver(&pipeline, "d-same", &payload).await;
    deliver(&pipeline, "d-same", &payload).await;

    let summary = pipeline
        .group
        .run_once("worker-0")
        .await
        .expect("poll should succeed");

    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.acknowledged, 2);
    assert_eq!(pipeline.stream.pending_count().await.expect("count"), 0);
}
