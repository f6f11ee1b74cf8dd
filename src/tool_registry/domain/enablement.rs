//! Per-tenant toolset enablement.

use super::Operation;
use crate::provider::domain::ProviderName;
use std::collections::BTreeSet;

/// Immutable selection of which operations a tenant's catalog exposes.
///
/// Enablement is built once from configuration and passed into catalog
/// construction. It filters exposure only; it never grants capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolsetEnablement {
    include_destructive: bool,
    providers: Option<BTreeSet<ProviderName>>,
}

impl ToolsetEnablement {
    /// Exposes every operation of every provider.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            include_destructive: true,
            providers: None,
        }
    }

    /// Exposes only safe operations of every provider.
    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            include_destructive: false,
            providers: None,
        }
    }

    /// Restricts exposure to the given providers.
    #[must_use]
    pub fn with_providers(mut self, providers: impl IntoIterator<Item = ProviderName>) -> Self {
        self.providers = Some(providers.into_iter().collect());
        self
    }

    /// Sets whether destructive operations are exposed.
    #[must_use]
    pub const fn with_destructive(mut self, include_destructive: bool) -> Self {
        self.include_destructive = include_destructive;
        self
    }

    /// Returns whether destructive operations are exposed.
    #[must_use]
    pub const fn includes_destructive(&self) -> bool {
        self.include_destructive
    }

    /// Returns whether tools of `provider` are exposed.
    #[must_use]
    pub fn allows_provider(&self, provider: &ProviderName) -> bool {
        self.providers
            .as_ref()
            .is_none_or(|providers| providers.contains(provider))
    }

    /// Returns whether `operation` of a `provider` tool is exposed.
    #[must_use]
    pub fn exposes(&self, provider: &ProviderName, operation: &Operation) -> bool {
        self.allows_provider(provider) && (self.include_destructive || !operation.is_destructive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::domain::HttpMethod;
    use crate::tool_registry::domain::{OperationClass, OperationKey};
    use serde_json::json;

    fn operation(class: OperationClass) -> Operation {
        Operation::new(
            OperationKey::new("github.repos.delete").expect("valid key"),
            HttpMethod::Delete,
            "/repos/{owner}/{repo}",
            json!({"type": "object"}),
        )
        .expect("valid operation")
        .with_classification(class)
    }

    fn provider(name: &str) -> ProviderName {
        ProviderName::new(name).expect("valid provider")
    }

    #[test]
    fn read_only_hides_destructive_operations() {
        let enablement = ToolsetEnablement::read_only();
        let github = provider("github");

        assert!(enablement.exposes(&github, &operation(OperationClass::Safe)));
        assert!(!enablement.exposes(&github, &operation(OperationClass::Destructive)));
    }

    #[test]
    fn provider_filter_limits_exposure() {
        let enablement = ToolsetEnablement::all().with_providers([provider("gitlab")]);

        assert!(!enablement.exposes(&provider("github"), &operation(OperationClass::Safe)));
        assert!(enablement.exposes(&provider("gitlab"), &operation(OperationClass::Destructive)));
    }
}
