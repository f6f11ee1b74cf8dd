//! Deterministic in-memory provider adapter.

use crate::provider::{
    domain::{CredentialKind, ProviderFailure, ProviderName, ProviderRequest, ProviderResponse},
    ports::ProviderAdapter,
};
use crate::tool_registry::domain::{OperationCatalog, OperationKey};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A call observed by [`InMemoryProviderAdapter`].
#[derive(Debug, Clone)]
pub struct RecordedProviderCall {
    /// The request as it reached the adapter.
    pub request: ProviderRequest,
    /// Kind of the attached credential.
    pub credential_kind: Option<CredentialKind>,
    /// Secret of the attached credential.
    pub credential_secret: Option<String>,
}

#[derive(Debug, Default)]
struct AdapterState {
    scripted: VecDeque<Result<ProviderResponse, ProviderFailure>>,
    calls: Vec<RecordedProviderCall>,
}

/// Provider adapter that records calls and replays scripted outcomes.
///
/// Outcomes are consumed in order; once the script is exhausted every call
/// succeeds with `200 {"ok": true}`. This adapter performs no network I/O and
/// backs local runs and tests.
#[derive(Debug, Clone)]
pub struct InMemoryProviderAdapter {
    provider: ProviderName,
    latency: Option<Duration>,
    state: Arc<Mutex<AdapterState>>,
}

impl InMemoryProviderAdapter {
    /// Creates an adapter for `provider`.
    #[must_use]
    pub fn new(provider: ProviderName) -> Self {
        Self {
            provider,
            latency: None,
            state: Arc::new(Mutex::new(AdapterState::default())),
        }
    }

    /// Delays every call by `latency` before answering.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Appends an outcome to the script.
    pub fn push_outcome(&self, outcome: Result<ProviderResponse, ProviderFailure>) {
        self.lock().scripted.push_back(outcome);
    }

    /// Appends `count` copies of a failure to the script.
    pub fn push_failures(&self, failure: &ProviderFailure, count: usize) {
        let mut state = self.lock();
        for _ in 0..count {
            state.scripted.push_back(Err(failure.clone()));
        }
    }

    /// Returns every call observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedProviderCall> {
        self.lock().calls.clone()
    }

    /// Returns the number of calls observed so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProviderAdapter for InMemoryProviderAdapter {
    fn provider(&self) -> ProviderName {
        self.provider.clone()
    }

    fn list_operations(&self, catalog: &OperationCatalog) -> Vec<OperationKey> {
        catalog
            .operations()
            .iter()
            .map(|operation| operation.key().clone())
            .collect()
    }

    async fn execute(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderFailure> {
        let outcome = {
            let mut state = self.lock();
            state.calls.push(RecordedProviderCall {
                credential_kind: request.credential.as_ref().map(|credential| credential.kind()),
                credential_secret: request
                    .credential
                    .as_ref()
                    .map(|credential| credential.secret().to_owned()),
                request,
            });
            state.scripted.pop_front()
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        outcome.unwrap_or_else(|| Ok(ProviderResponse::new(200, json!({"ok": true}))))
    }
}
