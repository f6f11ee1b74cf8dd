//! Immutable map from provider names to adapters.

use crate::provider::{adapters::HttpProviderAdapter, domain::ProviderName, ports::ProviderAdapter};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves provider names to adapters.
///
/// The directory is assembled once at start-up and then shared read-only.
/// Lookups for providers without a dedicated adapter fall back to the
/// configured fallback adapter, when one is present.
#[derive(Clone, Default)]
pub struct ProviderDirectory {
    adapters: HashMap<ProviderName, Arc<dyn ProviderAdapter>>,
    fallback: Option<Arc<dyn ProviderAdapter>>,
}

impl ProviderDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory of HTTP adapters for `providers`, plus a generic
    /// HTTP fallback.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] when an HTTP client cannot be built.
    pub fn http(providers: &[ProviderName]) -> Result<Self, reqwest::Error> {
        let mut directory =
            Self::new().with_fallback(Arc::new(HttpProviderAdapter::with_default_client(
                ProviderName::generic(),
            )?));
        for provider in providers {
            directory = directory.with_adapter(Arc::new(
                HttpProviderAdapter::with_default_client(provider.clone())?,
            ));
        }
        Ok(directory)
    }

    /// Returns the directory with `adapter` registered under its provider.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    /// Returns the directory with a fallback adapter.
    #[must_use]
    pub fn with_fallback(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.fallback = Some(adapter);
        self
    }

    /// Resolves the adapter for `provider`.
    #[must_use]
    pub fn resolve(&self, provider: &ProviderName) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(provider)
            .or(self.fallback.as_ref())
            .cloned()
    }

    /// Returns the providers with a dedicated adapter.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderName> {
        let mut names: Vec<_> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ProviderDirectory {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProviderDirectory")
            .field("providers", &self.providers())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::adapters::InMemoryProviderAdapter;

    fn name(value: &str) -> ProviderName {
        ProviderName::new(value).expect("valid provider name")
    }

    #[test]
    fn resolves_dedicated_adapter_before_fallback() {
        let directory = ProviderDirectory::new()
            .with_adapter(Arc::new(InMemoryProviderAdapter::new(name("github"))))
            .with_fallback(Arc::new(InMemoryProviderAdapter::new(name("generic"))));

        let github = directory.resolve(&name("github")).expect("adapter exists");
        let other = directory.resolve(&name("nexus")).expect("fallback exists");

        assert_eq!(github.provider(), name("github"));
        assert_eq!(other.provider(), name("generic"));
    }

    #[test]
    fn missing_adapter_without_fallback_resolves_to_none() {
        let directory = ProviderDirectory::new();
        assert!(directory.resolve(&name("github")).is_none());
    }
}
