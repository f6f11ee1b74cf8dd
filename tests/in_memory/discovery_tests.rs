//! Discovery runs against stored tools: classification, minimization and
//! catalog versioning.

use super::helpers::{BASE_URL, Platform, mixed_spec, platform, repos_spec};
use meshgate::discovery::{
    domain::{ApiDocument, DiscoveryState},
    services::{DiscoveryError, DiscoverySource},
};
use meshgate::tool_registry::domain::{OperationClass, ToolsetEnablement};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fifty_operations_with_twelve_destructive_are_classified(platform: Platform) {
    let tool = platform.register_tool("reports").await;

    let report = platform.discover(tool.id(), &mixed_spec(38, 12)).await;

    assert_eq!(report.catalog.len(), 50);
    assert_eq!(report.catalog.count_by_class(OperationClass::Destructive), 12);
    assert_eq!(report.catalog.count_by_class(OperationClass::Safe), 38);
    assert_eq!(report.session.state(), DiscoveryState::Completed);
    assert_eq!(report.session.operation_count(), 50);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn minimized_schemas_are_smaller_than_their_source(platform: Platform) {
    let tool = platform.register_tool("reports").await;

    let report = platform.discover(tool.id(), &mixed_spec(10, 2)).await;

    assert_eq!(report.footprints.len(), 12);
    assert!(
        report
            .footprints
            .iter()
            .all(|footprint| footprint.minimized_bytes < footprint.original_bytes)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn read_only_tenants_see_only_safe_operations(platform: Platform) {
    let tool = platform.register_tool("reports").await;
    platform.discover(tool.id(), &mixed_spec(38, 12)).await;

    let read_only = platform
        .registry
        .catalog_for_tenant(&platform.tenant, &ToolsetEnablement::read_only())
        .await
        .expect("catalog should load");
    let everything = platform
        .registry
        .catalog_for_tenant(&platform.tenant, &ToolsetEnablement::all())
        .await
        .expect("catalog should load");

    let visible = |exposed: &[meshgate::tool_registry::services::ExposedTool]| {
        exposed.iter().map(|entry| entry.operations.len()).sum::<usize>()
    };
    assert_eq!(visible(&read_only), 38);
    assert_eq!(visible(&everything), 50);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_rediscovery_keeps_the_previous_catalog(platform: Platform) {
    let tool = platform.register_tool("repos").await;
    let first = platform.discover(tool.id(), &repos_spec()).await;

    let result = platform
        .discovery
        .discover(&platform.tenant, tool.id(), DiscoverySource::Fetch)
        .await;

    assert!(matches!(result, Err(DiscoveryError::Failed { .. })));
    let history = platform
        .tools
        .catalog_history(tool.id())
        .expect("history should load");
    assert_eq!(history.len(), 1);
    assert_eq!(
        history.first().map(meshgate::tool_registry::domain::OperationCatalog::version),
        Some(first.catalog.version())
    );
    let status = platform
        .discovery
        .status(&platform.tenant, tool.id())
        .await
        .expect("status should load")
        .expect("session recorded");
    assert_eq!(status.state(), DiscoveryState::Failed);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fetched_documents_publish_a_new_version(platform: Platform) {
    let tool = platform.register_tool("repos").await;
    let first = platform.discover(tool.id(), &repos_spec()).await;
    platform.fetcher.insert(
        BASE_URL,
        ApiDocument::parse(&mixed_spec(3, 1)).expect("valid document"),
    );

    let second = platform
        .discovery
        .discover(&platform.tenant, tool.id(), DiscoverySource::Fetch)
        .await
        .expect("fetch discovery should succeed");

    assert_eq!(second.catalog.version(), first.catalog.version() + 1);
    assert_eq!(second.catalog.len(), 4);
    assert_eq!(platform.fetcher.fetch_count(), 1);
}
