//! Per-tenant concurrency limits for tool execution.

use crate::tool_registry::domain::TenantId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds concurrent executions per tenant so one tenant cannot starve
/// another.
#[derive(Debug, Clone)]
pub struct TenantBulkhead {
    limit: usize,
    pools: Arc<Mutex<HashMap<TenantId, Arc<Semaphore>>>>,
}

impl TenantBulkhead {
    /// Creates a bulkhead admitting `limit` concurrent executions per tenant.
    ///
    /// A zero limit is treated as one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the per-tenant limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Waits for an execution slot for `tenant`.
    ///
    /// Returns `None` only if the tenant's pool has been closed.
    pub async fn acquire(&self, tenant: &TenantId) -> Option<OwnedSemaphorePermit> {
        self.pool(tenant).acquire_owned().await.ok()
    }

    /// Returns the number of free slots for `tenant`.
    #[must_use]
    pub fn available(&self, tenant: &TenantId) -> usize {
        self.pool(tenant).available_permits()
    }

    fn pool(&self, tenant: &TenantId) -> Arc<Semaphore> {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            pools
                .entry(tenant.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(self.limit))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn tenants_have_independent_pools() {
        let bulkhead = TenantBulkhead::new(1);
        let acme = TenantId::new("acme").expect("valid tenant");
        let globex = TenantId::new("globex").expect("valid tenant");

        let held = bulkhead.acquire(&acme).await.expect("slot should be free");
        assert_eq!(bulkhead.available(&acme), 0);
        assert_eq!(bulkhead.available(&globex), 1);

        drop(held);
        assert_eq!(bulkhead.available(&acme), 1);
    }
}
