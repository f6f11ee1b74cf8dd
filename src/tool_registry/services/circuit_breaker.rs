//! Shared registry of per-(tenant, tool) circuits.
//!
//! Transitions are linearized by a short critical section around each
//! [`CircuitState`] update. The lock is never held across a provider call.

use crate::tool_registry::domain::{
    CircuitBreakerPolicy, CircuitDecision, CircuitState, TenantId, ToolId,
};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::warn;

type CircuitKey = (TenantId, ToolId);

struct Shared<C> {
    policy: CircuitBreakerPolicy,
    clock: Arc<C>,
    circuits: Mutex<HashMap<CircuitKey, CircuitState>>,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, HashMap<CircuitKey, CircuitState>> {
        self.circuits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of circuits keyed by tenant and tool.
pub struct CircuitBreakerRegistry<C: Clock + Send + Sync> {
    shared: Arc<Shared<C>>,
}

impl<C: Clock + Send + Sync> Clone for CircuitBreakerRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Clock + Send + Sync> CircuitBreakerRegistry<C> {
    /// Creates a registry applying `policy` to every circuit.
    #[must_use]
    pub fn new(policy: CircuitBreakerPolicy, clock: Arc<C>) -> Self {
        Self {
            shared: Arc::new(Shared {
                policy,
                clock,
                circuits: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> CircuitBreakerPolicy {
        self.shared.policy
    }

    /// Asks the circuit for `(tenant, tool_id)` to admit one call.
    ///
    /// # Errors
    ///
    /// Returns the retry-after hint when the circuit rejects the call.
    pub fn acquire(&self, tenant: &TenantId, tool_id: ToolId) -> Result<CircuitPermit<C>, Duration> {
        let key = (tenant.clone(), tool_id);
        let now = self.shared.clock.utc();
        let decision = self
            .shared
            .lock()
            .entry(key.clone())
            .or_default()
            .try_acquire(&self.shared.policy, now);

        match decision {
            CircuitDecision::Allowed { trial } => Ok(CircuitPermit {
                shared: Arc::clone(&self.shared),
                key,
                trial,
                resolved: false,
            }),
            CircuitDecision::Rejected { retry_after } => Err(retry_after),
        }
    }

    /// Returns a copy of the circuit state for `(tenant, tool_id)`.
    #[must_use]
    pub fn snapshot(&self, tenant: &TenantId, tool_id: ToolId) -> CircuitState {
        self.shared
            .lock()
            .get(&(tenant.clone(), tool_id))
            .cloned()
            .unwrap_or_default()
    }
}

/// Admission to call a provider, resolved with the call's verdict.
///
/// Dropping an unresolved permit releases a half-open trial without a
/// verdict, so a cancelled call never wedges the circuit.
#[must_use = "a permit must be resolved with succeed() or fail()"]
pub struct CircuitPermit<C: Clock + Send + Sync> {
    shared: Arc<Shared<C>>,
    key: CircuitKey,
    trial: bool,
    resolved: bool,
}

impl<C: Clock + Send + Sync> CircuitPermit<C> {
    /// Returns whether this call is the half-open trial.
    #[must_use]
    pub const fn is_trial(&self) -> bool {
        self.trial
    }

    /// Records a successful call.
    pub fn succeed(mut self) {
        self.resolved = true;
        self.shared
            .lock()
            .entry(self.key.clone())
            .or_default()
            .record_success(self.trial);
    }

    /// Records a failed call.
    pub fn fail(mut self) {
        self.resolved = true;
        let now = self.shared.clock.utc();
        let mut circuits = self.shared.lock();
        let state = circuits.entry(self.key.clone()).or_default();
        state.record_failure(&self.shared.policy, now, self.trial);
        if let Some(open_until) = state.open_until()
            && open_until > now
        {
            warn!(
                tenant = %self.key.0,
                tool_id = %self.key.1,
                open_until = %open_until,
                "circuit open"
            );
        }
    }
}

impl<C: Clock + Send + Sync> Drop for CircuitPermit<C> {
    fn drop(&mut self) {
        if !self.resolved
            && self.trial
            && let Some(state) = self.shared.lock().get_mut(&self.key)
        {
            state.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::domain::CircuitPhase;
    use mockable::DefaultClock;

    fn registry(threshold: u32) -> CircuitBreakerRegistry<DefaultClock> {
        CircuitBreakerRegistry::new(
            CircuitBreakerPolicy {
                failure_threshold: threshold,
                ..CircuitBreakerPolicy::default()
            },
            Arc::new(DefaultClock),
        )
    }

    fn tenant(value: &str) -> TenantId {
        TenantId::new(value).expect("valid tenant")
    }

    #[test]
    fn circuits_are_isolated_per_tenant() {
        let registry = registry(2);
        let tool = ToolId::new();

        for _ in 0..2 {
            registry
                .acquire(&tenant("acme"), tool)
                .expect("closed circuit admits calls")
                .fail();
        }

        assert_eq!(registry.snapshot(&tenant("acme"), tool).phase(), CircuitPhase::Open);
        assert!(registry.acquire(&tenant("acme"), tool).is_err());
        assert!(registry.acquire(&tenant("globex"), tool).is_ok());
    }

    #[test]
    fn success_keeps_the_circuit_closed() {
        let registry = registry(2);
        let tool = ToolId::new();

        registry
            .acquire(&tenant("acme"), tool)
            .expect("closed circuit admits calls")
            .fail();
        registry
            .acquire(&tenant("acme"), tool)
            .expect("closed circuit admits calls")
            .succeed();

        let state = registry.snapshot(&tenant("acme"), tool);
        assert_eq!(state.phase(), CircuitPhase::Closed);
        assert_eq!(state.consecutive_failures(), 0);
    }
}
