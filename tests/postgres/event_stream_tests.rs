//! Webhook stream leases, retries and dead letters in `PostgreSQL`.

use super::helpers::{TestDatabase, test_runtime};
use meshgate::ingestion::{
    domain::{DeadLetterEntry, WebhookEvent},
    ports::{DeadLetterStore, EventStream, EventStreamError},
};
use meshgate::provider::domain::ProviderName;
use mockable::{Clock, DefaultClock};
use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use rstest::rstest;
use serde_json::json;
use std::time::Duration;

const LEASE: Duration = Duration::from_secs(30);

fn event(n: u32) -> WebhookEvent {
    WebhookEvent::received(
        ProviderName::new("github").expect("valid provider"),
        Some(format!("delivery-{n}")),
        Some("check_run".to_owned()),
        json!({"n": n}),
        &DefaultClock,
    )
}

#[rstest]
fn claims_lease_entries_in_append_order(shared_test_cluster: &'static TestCluster) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let stream = database.stream().expect("stream setup");
    let rt = test_runtime();
    let first = event(1);
    let second = event(2);
    rt.block_on(stream.append(&first)).expect("append should succeed");
    rt.block_on(stream.append(&second)).expect("append should succeed");
    rt.block_on(stream.append(&first)).expect("re-append is a no-op");

    let worker_a = rt
        .block_on(stream.claim("worker-a", 1, LEASE))
        .expect("claim should succeed");
    let worker_b = rt
        .block_on(stream.claim("worker-b", 10, LEASE))
        .expect("claim should succeed");
    let worker_c = rt
        .block_on(stream.claim("worker-c", 10, LEASE))
        .expect("claim should succeed");

    assert_eq!(worker_a.iter().map(WebhookEvent::id).collect::<Vec<_>>(), vec![first.id()]);
    assert_eq!(worker_b.iter().map(WebhookEvent::id).collect::<Vec<_>>(), vec![second.id()]);
    assert!(worker_c.is_empty());
    assert_eq!(
        rt.block_on(stream.lease_holder(first.id()))
            .expect("entry exists")
            .as_deref(),
        Some("worker-a")
    );
    assert_eq!(rt.block_on(stream.pending_count()).expect("count"), 2);
}

#[rstest]
fn expired_leases_are_reclaimable(shared_test_cluster: &'static TestCluster) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let stream = database.stream().expect("stream setup");
    let rt = test_runtime();
    let received = event(1);
    rt.block_on(stream.append(&received)).expect("append should succeed");

    rt.block_on(stream.claim("worker-a", 1, Duration::ZERO))
        .expect("claim should succeed");
    let reclaimed = rt
        .block_on(stream.claim("worker-b", 1, LEASE))
        .expect("claim should succeed");

    assert_eq!(reclaimed.first().map(WebhookEvent::id), Some(received.id()));
}

#[rstest]
fn failures_delay_redelivery_and_keep_history(shared_test_cluster: &'static TestCluster) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let stream = database.stream().expect("stream setup");
    let rt = test_runtime();
    let received = event(1);
    rt.block_on(stream.append(&received)).expect("append should succeed");
    rt.block_on(stream.claim("worker-a", 1, LEASE))
        .expect("claim should succeed");

    let failed = rt
        .block_on(stream.fail(
            received.id(),
            "tool lookup timed out",
            DefaultClock.utc() + chrono::Duration::hours(1),
        ))
        .expect("fail should succeed");
    let hidden = rt
        .block_on(stream.claim("worker-b", 1, LEASE))
        .expect("claim should succeed");

    assert_eq!(failed.attempts(), 1);
    assert_eq!(
        failed.failures().first().map(|failure| failure.error.as_str()),
        Some("tool lookup timed out")
    );
    assert!(hidden.is_empty());
    assert_eq!(
        rt.block_on(stream.lease_holder(received.id()))
            .expect("entry exists"),
        None
    );
}

#[rstest]
fn exhausted_events_move_to_dead_letters_with_history(shared_test_cluster: &'static TestCluster) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let stream = database.stream().expect("stream setup");
    let dead_letters = database.dead_letters().expect("dead-letter setup");
    let rt = test_runtime();
    let received = event(1);
    rt.block_on(stream.append(&received)).expect("append should succeed");
    for attempt in ["first", "second"] {
        rt.block_on(stream.fail(received.id(), attempt, DefaultClock.utc()))
            .expect("fail should succeed");
    }

    let exhausted = rt
        .block_on(stream.dead_letter(received.id()))
        .expect("dead letter should succeed");
    rt.block_on(dead_letters.put(&DeadLetterEntry::new(exhausted, &DefaultClock)))
        .expect("put should succeed");

    let stored = rt
        .block_on(dead_letters.find(received.id()))
        .expect("lookup should succeed")
        .expect("entry should exist");
    assert_eq!(stored.event.payload(), received.payload());
    assert_eq!(stored.history().len(), 2);
    assert_eq!(rt.block_on(dead_letters.list()).expect("list").len(), 1);
    assert_eq!(rt.block_on(stream.pending_count()).expect("count"), 0);
    assert!(matches!(
        rt.block_on(stream.ack(received.id())),
        Err(EventStreamError::NotFound(_))
    ));
}
