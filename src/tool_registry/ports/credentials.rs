//! Port for resolving stored credentials.

use crate::provider::domain::Credential;
use crate::tool_registry::domain::{AuthDescriptor, TenantId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for credential store operations.
pub type CredentialStoreResult<T> = Result<T, CredentialStoreError>;

/// Resolves a tool's secret reference to credential material.
///
/// Lookups are always scoped to a tenant; a reference registered for one
/// tenant never resolves for another.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolves the credential behind `auth` for `tenant`.
    ///
    /// Returns `Ok(None)` when the descriptor needs no credential or the
    /// reference is unknown.
    async fn resolve(
        &self,
        tenant: &TenantId,
        auth: &AuthDescriptor,
    ) -> CredentialStoreResult<Option<Credential>>;
}

/// Errors returned by credential store implementations.
#[derive(Debug, Clone, Error)]
pub enum CredentialStoreError {
    /// Backend failure while reading secret material.
    #[error("credential backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl CredentialStoreError {
    /// Wraps a backend failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
