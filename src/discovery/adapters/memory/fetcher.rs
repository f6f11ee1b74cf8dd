//! Specification fetcher serving documents from memory.

use crate::discovery::{
    domain::ApiDocument,
    ports::{FetchedSpec, SpecFetchError, SpecFetchResult, SpecFetcher, SpecLocation},
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Fetcher keyed by base URL.
///
/// Queued failures are returned first, then the stored document. A base URL
/// with neither is reported as [`SpecFetchError::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct StaticSpecFetcher {
    state: Arc<Mutex<FetcherState>>,
}

#[derive(Debug, Default)]
struct FetcherState {
    documents: HashMap<String, ApiDocument>,
    failures: HashMap<String, VecDeque<SpecFetchError>>,
    fetches: usize,
}

impl StaticSpecFetcher {
    /// Creates a fetcher with no documents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `document` for `base_url`.
    pub fn insert(&self, base_url: impl Into<String>, document: ApiDocument) {
        self.lock().documents.insert(base_url.into(), document);
    }

    /// Stops serving a document for `base_url`.
    pub fn remove(&self, base_url: &str) {
        self.lock().documents.remove(base_url);
    }

    /// Queues `failure` for the next fetch of `base_url`.
    pub fn push_failure(&self, base_url: impl Into<String>, failure: SpecFetchError) {
        self.lock()
            .failures
            .entry(base_url.into())
            .or_default()
            .push_back(failure);
    }

    /// Returns how many fetches were attempted.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FetcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SpecFetcher for StaticSpecFetcher {
    async fn fetch(&self, location: &SpecLocation) -> SpecFetchResult<FetchedSpec> {
        let mut state = self.lock();
        state.fetches += 1;
        if let Some(failure) = state
            .failures
            .get_mut(&location.base_url)
            .and_then(VecDeque::pop_front)
        {
            return Err(failure);
        }
        state
            .documents
            .get(&location.base_url)
            .cloned()
            .map(|document| FetchedSpec {
                url: location
                    .spec_url
                    .clone()
                    .unwrap_or_else(|| location.base_url.clone()),
                document,
            })
            .ok_or_else(|| SpecFetchError::NotFound {
                base_url: location.base_url.clone(),
            })
    }
}
