//! Execution through the engine: lifecycle gates, credential selection and
//! circuit breaking with a scripted provider.

use super::helpers::{COOLDOWN, Platform, github, platform};
use meshgate::provider::domain::{Credential, PassthroughCredentialBundle, ProviderFailure};
use meshgate::tool_registry::{
    domain::{AuthKind, CircuitPhase, ExecutionStatus, ToolId},
    services::{ExecuteRequest, ExecutionError, RegisterToolRequest},
};
use rstest::rstest;
use serde_json::json;

fn get_repo(platform: &Platform, tool_id: ToolId) -> ExecuteRequest {
    ExecuteRequest::new(
        platform.tenant.clone(),
        tool_id,
        "github.repos.get",
        json!({"owner": "octo", "repo": "hello"}),
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn inactive_tools_are_rejected_without_a_provider_call(platform: Platform) {
    let tool = platform.tool_with_repos("repos").await;
    platform
        .registry
        .deactivate(&platform.tenant, tool.id())
        .await
        .expect("deactivation should succeed");

    let result = platform.engine.execute(get_repo(&platform, tool.id())).await;

    assert!(matches!(result, Err(ExecutionError::ToolInactive(id)) if id == tool.id()));
    assert_eq!(platform.adapter.call_count(), 0);
    let circuit = platform
        .engine
        .circuits()
        .snapshot(&platform.tenant, tool.id());
    assert_eq!(circuit.phase(), CircuitPhase::Closed);
    assert_eq!(circuit.consecutive_failures(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn successful_calls_reach_the_provider_and_are_recorded(platform: Platform) {
    let tool = platform.tool_with_repos("repos").await;

    let outcome = platform
        .engine
        .execute(get_repo(&platform, tool.id()))
        .await
        .expect("execution should succeed");

    assert_eq!(outcome.status, 200);
    let calls = platform.adapter.calls();
    let call = calls.first().expect("one provider call");
    assert_eq!(call.request.path_params.get("owner"), Some(&json!("octo")));
    let records = platform.records.all().expect("records should load");
    assert_eq!(records.len(), 1);
    assert!(
        records
            .iter()
            .all(|record| record.status() == ExecutionStatus::Success)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn passthrough_credentials_win_over_stored_ones(platform: Platform) {
    platform
        .credentials
        .insert(platform.tenant.clone(), "gh-token", Credential::bearer("stored"))
        .expect("insert should succeed");
    let tool = platform
        .registry
        .register(
            RegisterToolRequest::new(
                platform.tenant.clone(),
                "authed",
                "github",
                super::helpers::BASE_URL,
            )
            .with_auth(AuthKind::Bearer, "gh-token"),
        )
        .await
        .expect("registration should succeed");
    platform
        .discover(tool.id(), &super::helpers::repos_spec())
        .await;

    platform
        .engine
        .execute(get_repo(&platform, tool.id()))
        .await
        .expect("stored credential call should succeed");
    let bundle =
        PassthroughCredentialBundle::new().with(github(), Credential::bearer("per-call"));
    platform
        .engine
        .execute(get_repo(&platform, tool.id()).with_passthrough(bundle))
        .await
        .expect("passthrough call should succeed");

    let secrets: Vec<_> = platform
        .adapter
        .calls()
        .into_iter()
        .map(|call| call.credential_secret)
        .collect();
    assert_eq!(
        secrets,
        vec![Some("stored".to_owned()), Some("per-call".to_owned())]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn schema_violations_never_reach_the_provider(platform: Platform) {
    let tool = platform.tool_with_repos("repos").await;

    let result = platform
        .engine
        .execute(ExecuteRequest::new(
            platform.tenant.clone(),
            tool.id(),
            "github.repos.get",
            json!({"owner": "octo"}),
        ))
        .await;

    let error = result.expect_err("missing field should fail");
    assert!(error.violations().is_some_and(|violations| !violations.is_empty()));
    assert_eq!(platform.adapter.call_count(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn five_failures_open_the_circuit_until_the_cooldown_elapses(platform: Platform) {
    let tool = platform.tool_with_repos("repos").await;
    platform
        .adapter
        .push_failures(&ProviderFailure::transient("503 Service Unavailable"), 5);

    for _ in 0..5 {
        let error = platform
            .engine
            .execute(get_repo(&platform, tool.id()))
            .await
            .expect_err("provider should fail");
        assert!(matches!(error, ExecutionError::Provider(_)));
    }

    let rejected = platform
        .engine
        .execute(get_repo(&platform, tool.id()))
        .await
        .expect_err("circuit should be open");
    assert!(matches!(rejected, ExecutionError::CircuitOpen { .. }));
    assert!(rejected.retry_after().is_some());
    assert_eq!(platform.adapter.call_count(), 5);

    tokio::time::sleep(COOLDOWN * 2).await;
    platform
        .engine
        .execute(get_repo(&platform, tool.id()))
        .await
        .expect("half-open trial should pass through");

    assert_eq!(platform.adapter.call_count(), 6);
    assert_eq!(
        platform
            .engine
            .circuits()
            .snapshot(&platform.tenant, tool.id())
            .phase(),
        CircuitPhase::Closed
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn circuits_are_isolated_per_tool(platform: Platform) {
    let failing = platform.tool_with_repos("failing").await;
    let healthy = platform.tool_with_repos("healthy").await;
    platform
        .adapter
        .push_failures(&ProviderFailure::transient("connection reset"), 5);
    for _ in 0..5 {
        platform
            .engine
            .execute(get_repo(&platform, failing.id()))
            .await
            .expect_err("provider should fail");
    }

    platform
        .engine
        .execute(get_repo(&platform, healthy.id()))
        .await
        .expect("other tools keep working");
}
