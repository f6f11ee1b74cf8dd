//! Tool registration, column-scoped updates and catalog versioning.

use super::helpers::{TestDatabase, test_runtime, tool};
use meshgate::provider::domain::HttpMethod;
use meshgate::tool_registry::{
    domain::{
        CatalogDraft, HealthSnapshot, HealthStatus, Operation, OperationKey, TenantId, ToolId,
    },
    ports::{ToolRepository, ToolRepositoryError},
};
use mockable::{Clock, DefaultClock};
use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use rstest::rstest;
use serde_json::json;

fn draft(keys: &[&str]) -> CatalogDraft {
    CatalogDraft {
        operations: keys
            .iter()
            .map(|key| {
                Operation::new(
                    OperationKey::new(*key).expect("valid key"),
                    HttpMethod::Get,
                    "/repos/{owner}",
                    json!({"type": "object", "properties": {"owner": {"type": "string"}}}),
                )
                .expect("valid operation")
            })
            .collect(),
        ..CatalogDraft::default()
    }
}

#[rstest]
fn registered_tools_are_found_by_id_and_name(shared_test_cluster: &'static TestCluster) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let repo = database.tools().expect("repository setup");
    let rt = test_runtime();
    let registered = tool("acme", "github_main");

    rt.block_on(repo.register(&registered))
        .expect("register should succeed");

    let by_id = rt
        .block_on(repo.find_by_id(registered.id()))
        .expect("lookup should succeed")
        .expect("tool should exist");
    let by_name = rt
        .block_on(repo.find_by_name(registered.tenant(), registered.name()))
        .expect("lookup should succeed")
        .expect("tool should exist");

    assert_eq!(by_id.id(), registered.id());
    assert_eq!(by_name.id(), registered.id());
    assert_eq!(by_id.base_url(), "https://api.github.test");
    assert_eq!(by_id.discovery_hints(), ["/internal/openapi.json"]);
    assert!(by_id.is_active());
    assert_eq!(by_id.health().status(), HealthStatus::Unknown);
    assert!(
        rt.block_on(repo.find_by_id(ToolId::new()))
            .expect("lookup should succeed")
            .is_none()
    );
}

#[rstest]
fn duplicate_names_are_rejected_within_a_tenant(shared_test_cluster: &'static TestCluster) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let repo = database.tools().expect("repository setup");
    let rt = test_runtime();

    rt.block_on(repo.register(&tool("acme", "github_main")))
        .expect("register should succeed");
    let duplicate = rt.block_on(repo.register(&tool("acme", "github_main")));
    let other_tenant = rt.block_on(repo.register(&tool("globex", "github_main")));

    assert!(matches!(
        duplicate,
        Err(ToolRepositoryError::DuplicateToolName { .. })
    ));
    assert!(other_tenant.is_ok());
    let listed = rt
        .block_on(repo.list_for_tenant(&TenantId::new("acme").expect("valid tenant")))
        .expect("list should succeed");
    assert_eq!(listed.len(), 1);
}

#[rstest]
fn updates_persist_and_missing_tools_are_reported(shared_test_cluster: &'static TestCluster) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let repo = database.tools().expect("repository setup");
    let rt = test_runtime();
    let mut registered = tool("acme", "github_main");
    rt.block_on(repo.register(&registered))
        .expect("register should succeed");

    registered.deactivate(&DefaultClock);
    rt.block_on(repo.update(&registered))
        .expect("update should succeed");
    let stored = rt
        .block_on(repo.find_by_id(registered.id()))
        .expect("lookup should succeed")
        .expect("tool should exist");
    let missing = rt.block_on(repo.update(&tool("acme", "never_registered")));

    assert!(!stored.is_active());
    assert!(matches!(missing, Err(ToolRepositoryError::NotFound(_))));
}

#[rstest]
fn health_writes_leave_the_active_flag_alone(shared_test_cluster: &'static TestCluster) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let repo = database.tools().expect("repository setup");
    let rt = test_runtime();
    let registered = tool("acme", "github_main");
    rt.block_on(repo.register(&registered))
        .expect("register should succeed");

    rt.block_on(repo.set_active(registered.id(), false, DefaultClock.utc()))
        .expect("deactivate should succeed");
    let snapshot = HealthSnapshot::new(HealthStatus::Degraded, DefaultClock.utc())
        .with_message("1 of 4 recent executions failed");
    let after_health = rt
        .block_on(repo.set_health(registered.id(), &snapshot, DefaultClock.utc()))
        .expect("health write should succeed");

    assert!(!after_health.is_active());
    assert_eq!(after_health.health().status(), HealthStatus::Degraded);
    assert_eq!(
        after_health.health().message(),
        Some("1 of 4 recent executions failed")
    );

    let reactivated = rt
        .block_on(repo.set_active(registered.id(), true, DefaultClock.utc()))
        .expect("activate should succeed");
    assert!(reactivated.is_active());
    assert_eq!(reactivated.health().status(), HealthStatus::Degraded);
    assert!(matches!(
        rt.block_on(repo.set_active(ToolId::new(), true, DefaultClock.utc())),
        Err(ToolRepositoryError::NotFound(_))
    ));
}

#[rstest]
fn catalog_versions_increase_and_the_latest_is_current(
    shared_test_cluster: &'static TestCluster,
) {
    let database = TestDatabase::create(shared_test_cluster).expect("database setup");
    let repo = database.tools().expect("repository setup");
    let rt = test_runtime();
    let registered = tool("acme", "github_main");
    rt.block_on(repo.register(&registered))
        .expect("register should succeed");

    assert!(
        rt.block_on(repo.current_catalog(registered.id()))
            .expect("lookup should succeed")
            .is_none()
    );
    let first = rt
        .block_on(repo.publish_catalog(
            registered.id(),
            draft(&["github.repos.get"]),
            DefaultClock.utc(),
        ))
        .expect("publish should succeed");
    let second = rt
        .block_on(repo.publish_catalog(
            registered.id(),
            draft(&["github.repos.get", "github.repos.list"]),
            DefaultClock.utc(),
        ))
        .expect("publish should succeed");
    let current = rt
        .block_on(repo.current_catalog(registered.id()))
        .expect("lookup should succeed")
        .expect("catalog should exist");

    assert_eq!(first.version(), 1);
    assert_eq!(second.version(), 2);
    assert_eq!(current.version(), 2);
    assert_eq!(current.len(), 2);
    assert_eq!(current.operations(), second.operations());
    assert!(matches!(
        rt.block_on(repo.publish_catalog(ToolId::new(), draft(&[]), DefaultClock.utc())),
        Err(ToolRepositoryError::NotFound(_))
    ));
}
