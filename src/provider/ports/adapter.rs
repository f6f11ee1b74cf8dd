//! Capability contract shared by every provider adapter.

use crate::provider::domain::{ProviderFailure, ProviderName, ProviderRequest, ProviderResponse};
use crate::tool_registry::domain::{OperationCatalog, OperationKey};
use async_trait::async_trait;

/// Uniform interface to one external provider.
///
/// The execution engine and the protocol layer only ever see this trait;
/// they never depend on a concrete provider type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the provider this adapter serves.
    fn provider(&self) -> ProviderName;

    /// Lists the catalog operations this adapter is able to execute.
    fn list_operations(&self, catalog: &OperationCatalog) -> Vec<OperationKey>;

    /// Executes one operation.
    ///
    /// Implementations perform at most one network call and never retry.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderFailure`] when the provider is unreachable or
    /// rejects the request.
    async fn execute(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderFailure>;
}
