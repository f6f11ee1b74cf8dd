//! Discovery orchestration: fetch, minimize, classify and publish.

use crate::discovery::{
    domain::{
        ApiDocument, DEFAULT_DEPTH_LIMIT, DiscoveredCatalog, DiscoveryDomainError, DiscoverySession,
        DiscoverySessionId, OperationFootprint, build_catalog,
    },
    ports::{
        DiscoverySessionError, DiscoverySessionRepository, SpecFetchError, SpecFetcher,
        SpecLocation,
    },
};
use crate::tool_registry::{
    domain::{HealthSnapshot, OperationCatalog, TenantId, ToolConfiguration, ToolId},
    ports::{ToolRepository, ToolRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Retry and minimization settings for discovery runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Fetch attempts before a transient failure fails the session.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub base_backoff: Duration,
    /// Upper bound on any single backoff.
    pub max_backoff: Duration,
    /// Nesting depth below which named schemas are inlined.
    pub depth_limit: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }
}

impl DiscoverySettings {
    /// Returns the backoff after `attempt` failed attempts.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Where the specification for a run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Fetch from the tool's spec URL or well-known paths.
    Fetch,
    /// Use a document supplied by the caller.
    Inline(String),
}

/// Result of a completed discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    /// The completed session.
    pub session: DiscoverySession,
    /// The newly published catalog.
    pub catalog: OperationCatalog,
    /// Per-operation size report.
    pub footprints: Vec<OperationFootprint>,
}

/// Service-level discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No tool with the given identifier exists for the tenant.
    #[error("tool {0} not found")]
    ToolNotFound(ToolId),

    /// Another discovery is already running for the tool.
    #[error("discovery {session_id} is already running for tool {tool_id}")]
    AlreadyRunning {
        /// Tool being discovered.
        tool_id: ToolId,
        /// The running session.
        session_id: DiscoverySessionId,
    },

    /// The run failed; any prior catalog is untouched.
    #[error("discovery {session_id} failed: {cause}")]
    Failed {
        /// The failed session.
        session_id: DiscoverySessionId,
        /// Precise failure cause.
        cause: String,
    },

    /// Session persistence failed.
    #[error(transparent)]
    Sessions(#[from] DiscoverySessionError),

    /// Tool persistence failed.
    #[error(transparent)]
    Repository(#[from] ToolRepositoryError),

    /// A session transition was rejected.
    #[error(transparent)]
    Domain(#[from] DiscoveryDomainError),
}

/// Result type for discovery service operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Runs discovery for registered tools.
pub struct DiscoveryService<R, S, F, C>
where
    R: ToolRepository + 'static,
    S: DiscoverySessionRepository + 'static,
    F: SpecFetcher + 'static,
    C: Clock + Send + Sync + 'static,
{
    tools: Arc<R>,
    sessions: Arc<S>,
    fetcher: Arc<F>,
    clock: Arc<C>,
    settings: DiscoverySettings,
}

impl<R, S, F, C> Clone for DiscoveryService<R, S, F, C>
where
    R: ToolRepository + 'static,
    S: DiscoverySessionRepository + 'static,
    F: SpecFetcher + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            tools: Arc::clone(&self.tools),
            sessions: Arc::clone(&self.sessions),
            fetcher: Arc::clone(&self.fetcher),
            clock: Arc::clone(&self.clock),
            settings: self.settings,
        }
    }
}

impl<R, S, F, C> DiscoveryService<R, S, F, C>
where
    R: ToolRepository + 'static,
    S: DiscoverySessionRepository + 'static,
    F: SpecFetcher + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a discovery service with default settings.
    #[must_use]
    pub fn new(tools: Arc<R>, sessions: Arc<S>, fetcher: Arc<F>, clock: Arc<C>) -> Self {
        Self {
            tools,
            sessions,
            fetcher,
            clock,
            settings: DiscoverySettings::default(),
        }
    }

    /// Replaces the retry and minimization settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: DiscoverySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the active settings.
    #[must_use]
    pub const fn settings(&self) -> DiscoverySettings {
        self.settings
    }

    /// Runs discovery to completion.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::AlreadyRunning`] when a run is in flight for
    /// the tool and [`DiscoveryError::Failed`] when this run failed. A failed
    /// run never alters the tool's current catalog.
    pub async fn discover(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
        source: DiscoverySource,
    ) -> DiscoveryResult<DiscoveryReport> {
        let tool = self.owned_tool(tenant, tool_id).await?;
        let session = self.begin(&tool).await?;
        self.run(session, tool, source).await
    }

    /// Starts discovery in the background unless one is already running.
    ///
    /// Calling this again while a run is in flight returns the running
    /// session instead of starting another.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::ToolNotFound`] or persistence errors.
    pub async fn trigger(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
    ) -> DiscoveryResult<DiscoverySession> {
        let tool = self.owned_tool(tenant, tool_id).await?;
        if let Some(running) = self.sessions.running_for_tool(tool_id).await? {
            return Ok(running);
        }

        let session = match self.begin(&tool).await {
            Ok(session) => session,
            Err(DiscoveryError::AlreadyRunning { session_id, .. }) => {
                return self
                    .sessions
                    .find(session_id)
                    .await?
                    .ok_or(DiscoveryError::Sessions(DiscoverySessionError::NotFound(
                        session_id,
                    )));
            }
            Err(err) => return Err(err),
        };

        let service = self.clone();
        let running = session.clone();
        tokio::spawn(async move {
            if let Err(err) = service.run(running, tool, DiscoverySource::Fetch).await {
                debug!(error = %err, "background discovery ended with an error");
            }
        });
        Ok(session)
    }

    /// Returns the most recent discovery session for a tool.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::ToolNotFound`] or persistence errors.
    pub async fn status(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
    ) -> DiscoveryResult<Option<DiscoverySession>> {
        self.owned_tool(tenant, tool_id).await?;
        Ok(self.sessions.latest_for_tool(tool_id).await?)
    }

    async fn owned_tool(
        &self,
        tenant: &TenantId,
        tool_id: ToolId,
    ) -> DiscoveryResult<ToolConfiguration> {
        self.tools
            .find_by_id(tool_id)
            .await?
            .filter(|tool| tool.belongs_to(tenant))
            .ok_or(DiscoveryError::ToolNotFound(tool_id))
    }

    async fn begin(&self, tool: &ToolConfiguration) -> DiscoveryResult<DiscoverySession> {
        let session = DiscoverySession::start(tool.tenant().clone(), tool.id(), &*self.clock);
        match self.sessions.begin(&session).await {
            Ok(()) => Ok(session),
            Err(DiscoverySessionError::AlreadyRunning {
                tool_id,
                session_id,
            }) => Err(DiscoveryError::AlreadyRunning {
                tool_id,
                session_id,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn run(
        &self,
        mut session: DiscoverySession,
        tool: ToolConfiguration,
        source: DiscoverySource,
    ) -> DiscoveryResult<DiscoveryReport> {
        info!(
            tenant = %tool.tenant(),
            tool_id = %tool.id(),
            session_id = %session.id(),
            "discovery started"
        );
        let mut unfinished = UnfinishedSession::new(
            session.clone(),
            Arc::clone(&self.sessions),
            Arc::clone(&self.clock),
        );

        let published = match self.build(&tool, source).await {
            Ok(discovered) => self.publish(&tool, discovered).await,
            Err(cause) => Err(cause),
        };

        match published {
            Ok((catalog, footprints)) => {
                session.complete(catalog.version(), catalog.len(), &*self.clock)?;
                self.sessions.update(&session).await?;
                unfinished.settle();
                let (original, minimized): (usize, usize) = footprints
                    .iter()
                    .map(|footprint| (footprint.original_bytes, footprint.minimized_bytes))
                    .fold((0, 0), |(a, b), (c, d)| (a + c, b + d));
                info!(
                    tool_id = %tool.id(),
                    session_id = %session.id(),
                    version = catalog.version(),
                    operations = catalog.len(),
                    original_bytes = original,
                    minimized_bytes = minimized,
                    "discovery completed"
                );
                Ok(DiscoveryReport {
                    session,
                    catalog,
                    footprints,
                })
            }
            Err(cause) => {
                session.fail(cause.clone(), &*self.clock)?;
                self.sessions.update(&session).await?;
                unfinished.settle();
                warn!(
                    tool_id = %tool.id(),
                    session_id = %session.id(),
                    cause = %cause,
                    "discovery failed"
                );
                Err(DiscoveryError::Failed {
                    session_id: session.id(),
                    cause,
                })
            }
        }
    }

    async fn build(
        &self,
        tool: &ToolConfiguration,
        source: DiscoverySource,
    ) -> Result<DiscoveredCatalog, String> {
        let document = match source {
            DiscoverySource::Inline(text) => {
                ApiDocument::parse(&text).map_err(|err| err.to_string())?
            }
            DiscoverySource::Fetch => {
                let location = SpecLocation {
                    base_url: tool.base_url().to_owned(),
                    spec_url: tool.spec_url().map(str::to_owned),
                    hints: tool.discovery_hints().to_vec(),
                };
                self.fetch_with_retry(&location)
                    .await
                    .map_err(|err| err.to_string())?
            }
        };
        build_catalog(&document, tool.provider(), self.settings.depth_limit)
            .map_err(|err| err.to_string())
    }

    async fn fetch_with_retry(&self, location: &SpecLocation) -> Result<ApiDocument, SpecFetchError> {
        let mut attempt = 1;
        loop {
            match self.fetcher.fetch(location).await {
                Ok(fetched) => return Ok(fetched.document),
                Err(err) if err.is_transient() && attempt < self.settings.max_attempts => {
                    let delay = self.settings.backoff(attempt);
                    debug!(
                        base_url = %location.base_url,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "retrying specification fetch"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn publish(
        &self,
        tool: &ToolConfiguration,
        discovered: DiscoveredCatalog,
    ) -> Result<(OperationCatalog, Vec<OperationFootprint>), String> {
        let now = self.clock.utc();
        let catalog = self
            .tools
            .publish_catalog(tool.id(), discovered.draft, now)
            .await
            .map_err(|err| err.to_string())?;

        self.tools
            .set_health(
                tool.id(),
                &HealthSnapshot::unknown(now).with_message("new catalog published"),
                now,
            )
            .await
            .map_err(|err| err.to_string())?;
        Ok((catalog, discovered.footprints))
    }
}

/// Fails a running session that is dropped before it is finalized.
///
/// Any exit from a run that skips [`UnfinishedSession::settle`] fails the
/// session on a detached task so the tool can be discovered again.
struct UnfinishedSession<S, C>
where
    S: DiscoverySessionRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    session: Option<DiscoverySession>,
    sessions: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> UnfinishedSession<S, C>
where
    S: DiscoverySessionRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    const fn new(session: DiscoverySession, sessions: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            session: Some(session),
            sessions,
            clock,
        }
    }

    fn settle(&mut self) {
        self.session = None;
    }
}

impl<S, C> Drop for UnfinishedSession<S, C>
where
    S: DiscoverySessionRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if session
            .fail("discovery run ended before it was finalized", &*self.clock)
            .is_err()
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(session_id = %session.id(), "no runtime to fail abandoned discovery");
            return;
        };
        let sessions = Arc::clone(&self.sessions);
        runtime.spawn(async move {
            match sessions.update(&session).await {
                Ok(()) => warn!(
                    tool_id = %session.tool_id(),
                    session_id = %session.id(),
                    "abandoned discovery marked failed"
                ),
                Err(err) => warn!(
                    session_id = %session.id(),
                    error = %err,
                    "failed to finalize abandoned discovery"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::adapters::memory::{
        InMemoryDiscoverySessionRepository, StaticSpecFetcher,
    };
    use crate::discovery::domain::DiscoveryState;
    use crate::tool_registry::{
        adapters::memory::{InMemoryExecutionRecordStore, InMemoryToolRepository},
        domain::HealthStatus,
        services::{RegisterToolRequest, ToolRegistryService},
    };
    use mockable::DefaultClock;
    use rstest::rstest;
    use serde_json::json;

    const BASE_URL: &str = "https://ci.example.com";

    type TestService = DiscoveryService<
        InMemoryToolRepository,
        InMemoryDiscoverySessionRepository,
        StaticSpecFetcher,
        DefaultClock,
    >;

    struct Harness {
        service: TestService,
        tools: Arc<InMemoryToolRepository>,
        fetcher: Arc<StaticSpecFetcher>,
        tool: ToolConfiguration,
    }

    fn tenant() -> TenantId {
        TenantId::new("acme").expect("valid tenant")
    }

    fn document() -> ApiDocument {
        ApiDocument::from_value(json!({
            "openapi": "3.0.0",
            "paths": {
                "/pipelines": {"get": {"summary": "List pipelines"}},
                "/pipelines/{id}": {"delete": {"summary": "Delete a pipeline"}}
            }
        }))
        .expect("valid document")
    }

    async fn harness() -> Harness {
        let tools = Arc::new(InMemoryToolRepository::new());
        let registry = ToolRegistryService::new(
            Arc::clone(&tools),
            Arc::new(InMemoryExecutionRecordStore::new()),
            Arc::new(DefaultClock),
        );
        let tool = registry
            .register(RegisterToolRequest::new(tenant(), "ci", "generic", BASE_URL))
            .await
            .expect("registration should succeed");
        let fetcher = Arc::new(StaticSpecFetcher::new());
        let service = DiscoveryService::new(
            Arc::clone(&tools),
            Arc::new(InMemoryDiscoverySessionRepository::new()),
            Arc::clone(&fetcher),
            Arc::new(DefaultClock),
        )
        .with_settings(DiscoverySettings {
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..DiscoverySettings::default()
        });
        Harness {
            service,
            tools,
            fetcher,
            tool,
        }
    }

    fn transient() -> SpecFetchError {
        SpecFetchError::Transient {
            url: format!("{BASE_URL}/openapi.json"),
            message: "connection reset".to_owned(),
        }
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn discovery_publishes_a_catalog_and_resets_health() {
        let harness = harness().await;
        harness.fetcher.insert(BASE_URL, document());

        let report = harness
            .service
            .discover(&tenant(), harness.tool.id(), DiscoverySource::Fetch)
            .await
            .expect("discovery should succeed");

        assert_eq!(report.session.state(), DiscoveryState::Completed);
        assert_eq!(report.catalog.version(), 1);
        assert_eq!(report.catalog.len(), 2);
        let stored = harness
            .tools
            .find_by_id(harness.tool.id())
            .await
            .expect("lookup should succeed")
            .expect("tool exists");
        assert_eq!(stored.health().status(), HealthStatus::Unknown);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn transient_fetch_failures_are_retried() {
        let harness = harness().await;
        harness.fetcher.insert(BASE_URL, document());
        harness.fetcher.push_failure(BASE_URL, transient());
        harness.fetcher.push_failure(BASE_URL, transient());

        harness
            .service
            .discover(&tenant(), harness.tool.id(), DiscoverySource::Fetch)
            .await
            .expect("third attempt should succeed");

        assert_eq!(harness.fetcher.fetch_count(), 3);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn failed_rediscovery_keeps_the_prior_catalog() {
        let harness = harness().await;
        harness.fetcher.insert(BASE_URL, document());
        let first = harness
            .service
            .discover(&tenant(), harness.tool.id(), DiscoverySource::Fetch)
            .await
            .expect("first discovery should succeed");

        harness.fetcher.remove(BASE_URL);
        for _ in 0..3 {
            harness.fetcher.push_failure(BASE_URL, transient());
        }
        let result = harness
            .service
            .discover(&tenant(), harness.tool.id(), DiscoverySource::Fetch)
            .await;

        let Err(DiscoveryError::Failed { session_id, cause }) = result else {
            panic!("expected a failed discovery, got {result:?}");
        };
        assert!(cause.contains("connection reset"));
        let current = harness
            .tools
            .current_catalog(harness.tool.id())
            .await
            .expect("lookup should succeed")
            .expect("prior catalog retained");
        assert_eq!(current, first.catalog);
        let status = harness
            .service
            .status(&tenant(), harness.tool.id())
            .await
            .expect("status should succeed")
            .expect("session recorded");
        assert_eq!(status.id(), session_id);
        assert_eq!(status.state(), DiscoveryState::Failed);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn structural_errors_are_not_retried() {
        let harness = harness().await;

        let result = harness
            .service
            .discover(
                &tenant(),
                harness.tool.id(),
                DiscoverySource::Inline("{\"openapi\": \"3.0.0\"}".to_owned()),
            )
            .await;

        assert!(matches!(result, Err(DiscoveryError::Failed { .. })));
        assert_eq!(harness.fetcher.fetch_count(), 0);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn other_tenants_cannot_discover_the_tool() {
        let harness = harness().await;
        let foreign = TenantId::new("globex").expect("valid tenant");

        let result = harness
            .service
            .discover(&foreign, harness.tool.id(), DiscoverySource::Fetch)
            .await;

        assert!(matches!(result, Err(DiscoveryError::ToolNotFound(_))));
    }

    /// Fetcher whose runs never finish normally.
    enum StuckFetcher {
        Panics,
        Hangs,
    }

    #[async_trait::async_trait]
    impl SpecFetcher for StuckFetcher {
        async fn fetch(
            &self,
            _location: &SpecLocation,
        ) -> crate::discovery::ports::SpecFetchResult<crate::discovery::ports::FetchedSpec>
        {
            match self {
                Self::Panics => panic!("fetcher crashed"),
                Self::Hangs => std::future::pending().await,
            }
        }
    }

    async fn stuck_service(
        fetcher: StuckFetcher,
    ) -> (
        DiscoveryService<
            InMemoryToolRepository,
            InMemoryDiscoverySessionRepository,
            StuckFetcher,
            DefaultClock,
        >,
        ToolId,
    ) {
        let tools = Arc::new(InMemoryToolRepository::new());
        let registry = ToolRegistryService::new(
            Arc::clone(&tools),
            Arc::new(InMemoryExecutionRecordStore::new()),
            Arc::new(DefaultClock),
        );
        let tool = registry
            .register(RegisterToolRequest::new(tenant(), "ci", "generic", BASE_URL))
            .await
            .expect("registration should succeed");
        let service = DiscoveryService::new(
            tools,
            Arc::new(InMemoryDiscoverySessionRepository::new()),
            Arc::new(fetcher),
            Arc::new(DefaultClock),
        );
        (service, tool.id())
    }

    async fn wait_until_not_running<R, F>(
        service: &DiscoveryService<R, InMemoryDiscoverySessionRepository, F, DefaultClock>,
        tool_id: ToolId,
    ) -> DiscoverySession
    where
        R: ToolRepository + 'static,
        F: SpecFetcher + 'static,
    {
        for _ in 0..50 {
            let latest = service
                .status(&tenant(), tool_id)
                .await
                .expect("status should succeed")
                .expect("session recorded");
            if latest.state() != DiscoveryState::Running {
                return latest;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session should leave the running state");
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_background_runs_release_the_tool() {
        let (service, tool_id) = stuck_service(StuckFetcher::Panics).await;

        let first = service
            .trigger(&tenant(), tool_id)
            .await
            .expect("trigger should succeed");
        let finished = wait_until_not_running(&service, tool_id).await;

        assert_eq!(finished.id(), first.id());
        assert_eq!(finished.state(), DiscoveryState::Failed);
        let second = service
            .trigger(&tenant(), tool_id)
            .await
            .expect("trigger should succeed");
        assert_ne!(second.id(), first.id());
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn aborted_runs_are_marked_failed() {
        let (built, tool_id) = stuck_service(StuckFetcher::Hangs).await;
        let service = Arc::new(built);

        let worker = Arc::clone(&service);
        let running = tokio::spawn(async move {
            worker
                .discover(&tenant(), tool_id, DiscoverySource::Fetch)
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        running.abort();
        assert!(running.await.is_err_and(|err| err.is_cancelled()));

        let finished = wait_until_not_running(&service, tool_id).await;
        assert_eq!(finished.state(), DiscoveryState::Failed);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let settings = DiscoverySettings::default();
        assert_eq!(settings.backoff(1), Duration::from_millis(200));
        assert_eq!(settings.backoff(2), Duration::from_millis(400));
        assert_eq!(settings.backoff(10), Duration::from_secs(2));
    }
}
