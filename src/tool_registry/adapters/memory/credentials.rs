//! In-memory credential store keyed by tenant and secret reference.

use crate::provider::domain::Credential;
use crate::tool_registry::{
    domain::{AuthDescriptor, TenantId},
    ports::{CredentialStore, CredentialStoreError, CredentialStoreResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory credential store.
///
/// Entries are keyed by `(tenant, secret_ref)`, so the same reference name
/// may hold different material for different tenants.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    secrets: Arc<RwLock<HashMap<(TenantId, String), Credential>>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `credential` under `secret_ref` for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialStoreError::Backend`] when the lock is poisoned.
    pub fn insert(
        &self,
        tenant: TenantId,
        secret_ref: impl Into<String>,
        credential: Credential,
    ) -> CredentialStoreResult<()> {
        let mut secrets = self.secrets.write().map_err(|err| {
            CredentialStoreError::backend(std::io::Error::other(err.to_string()))
        })?;
        secrets.insert((tenant, secret_ref.into()), credential);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn resolve(
        &self,
        tenant: &TenantId,
        auth: &AuthDescriptor,
    ) -> CredentialStoreResult<Option<Credential>> {
        let Some(secret_ref) = auth.secret_ref() else {
            return Ok(None);
        };
        let secrets = self.secrets.read().map_err(|err| {
            CredentialStoreError::backend(std::io::Error::other(err.to_string()))
        })?;
        Ok(secrets
            .get(&(tenant.clone(), secret_ref.to_owned()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::domain::AuthKind;

    fn tenant(value: &str) -> TenantId {
        TenantId::new(value).expect("valid tenant")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn references_do_not_resolve_across_tenants() {
        let store = InMemoryCredentialStore::new();
        store
            .insert(tenant("acme"), "github-token", Credential::bearer("acme-secret"))
            .expect("insert should succeed");
        let auth = AuthDescriptor::new(AuthKind::Bearer, Some("github-token".to_owned()))
            .expect("valid descriptor");

        let own = store
            .resolve(&tenant("acme"), &auth)
            .await
            .expect("resolve should succeed");
        let foreign = store
            .resolve(&tenant("globex"), &auth)
            .await
            .expect("resolve should succeed");

        assert_eq!(own.map(|credential| credential.secret().to_owned()), Some("acme-secret".to_owned()));
        assert!(foreign.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unauthenticated_descriptors_resolve_to_nothing() {
        let store = InMemoryCredentialStore::new();
        let resolved = store
            .resolve(&tenant("acme"), &AuthDescriptor::none())
            .await
            .expect("resolve should succeed");
        assert!(resolved.is_none());
    }
}
