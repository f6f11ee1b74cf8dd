//! Per-tool circuit breaker state machine.
//!
//! The state machine is pure: every transition takes the current time as an
//! argument, so callers decide where time comes from and tests can drive it
//! deterministically.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Largest exponent applied to the cool-down on repeated trips.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Thresholds and intervals governing a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerPolicy {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Failures older than this no longer count towards the threshold.
    pub rolling_window: Duration,
    /// Cool-down after the first trip.
    pub cooldown: Duration,
    /// Upper bound for the cool-down after repeated trips.
    pub max_cooldown: Duration,
}

impl CircuitBreakerPolicy {
    /// Returns the cool-down for the given number of consecutive re-trips.
    ///
    /// The first trip uses the base cool-down; each failed half-open trial
    /// doubles it, capped at `max_cooldown`.
    #[must_use]
    pub fn cooldown_for(&self, retrips: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retrips.min(MAX_BACKOFF_EXPONENT));
        self.cooldown.saturating_mul(factor).min(self.max_cooldown)
    }
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            rolling_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
        }
    }
}

/// Phase of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    /// Calls pass through.
    Closed,
    /// Calls fail fast until the cool-down elapses.
    Open,
    /// One trial call decides whether the circuit closes again.
    HalfOpen,
}

impl CircuitPhase {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Outcome of asking a circuit for permission to call the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// The call may proceed.
    Allowed {
        /// Whether this call is the half-open trial.
        trial: bool,
    },
    /// The call must fail fast.
    Rejected {
        /// Time until the circuit will admit a trial.
        retry_after: Duration,
    },
}

/// State of one circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    phase: CircuitPhase,
    consecutive_failures: u32,
    streak_started_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    open_until: Option<DateTime<Utc>>,
    retrips: u32,
    trial_in_flight: bool,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::closed()
    }
}

impl CircuitState {
    /// Creates a closed circuit with no recorded failures.
    #[must_use]
    pub const fn closed() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            consecutive_failures: 0,
            streak_started_at: None,
            last_failure_at: None,
            open_until: None,
            retrips: 0,
            trial_in_flight: false,
        }
    }

    /// Returns the phase.
    #[must_use]
    pub const fn phase(&self) -> CircuitPhase {
        self.phase
    }

    /// Returns the consecutive failure count.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the last failure timestamp.
    #[must_use]
    pub const fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.last_failure_at
    }

    /// Returns the end of the current cool-down.
    #[must_use]
    pub const fn open_until(&self) -> Option<DateTime<Utc>> {
        self.open_until
    }

    /// Asks for permission to call the provider at `now`.
    ///
    /// An open circuit whose cool-down has elapsed moves to half-open and
    /// admits exactly one trial. Further calls are rejected until that trial
    /// resolves.
    pub fn try_acquire(&mut self, policy: &CircuitBreakerPolicy, now: DateTime<Utc>) -> CircuitDecision {
        match self.phase {
            CircuitPhase::Closed => CircuitDecision::Allowed { trial: false },
            CircuitPhase::Open => {
                let open_until = self.open_until.unwrap_or(now);
                if now >= open_until {
                    self.phase = CircuitPhase::HalfOpen;
                    self.trial_in_flight = true;
                    CircuitDecision::Allowed { trial: true }
                } else {
                    CircuitDecision::Rejected {
                        retry_after: (open_until - now).to_std().unwrap_or_default(),
                    }
                }
            }
            CircuitPhase::HalfOpen if self.trial_in_flight => CircuitDecision::Rejected {
                retry_after: policy.cooldown_for(self.retrips),
            },
            CircuitPhase::HalfOpen => {
                self.trial_in_flight = true;
                CircuitDecision::Allowed { trial: true }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&mut self, trial: bool) {
        if trial {
            *self = Self::closed();
            return;
        }
        if self.phase == CircuitPhase::Closed {
            self.consecutive_failures = 0;
            self.streak_started_at = None;
        }
    }

    /// Records a failed call at `now`.
    pub fn record_failure(&mut self, policy: &CircuitBreakerPolicy, now: DateTime<Utc>, trial: bool) {
        self.last_failure_at = Some(now);

        if trial {
            self.trial_in_flight = false;
            self.retrips = self.retrips.saturating_add(1);
            self.open(policy, now);
            return;
        }

        if self.phase != CircuitPhase::Closed {
            return;
        }

        let streak_expired = self
            .streak_started_at
            .is_some_and(|started| now - started > to_delta(policy.rolling_window));
        if streak_expired || self.streak_started_at.is_none() {
            self.consecutive_failures = 0;
            self.streak_started_at = Some(now);
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= policy.failure_threshold {
            self.open(policy, now);
        }
    }

    /// Releases an abandoned trial without a verdict.
    ///
    /// The circuit stays half-open and the next call becomes the trial.
    pub fn release_trial(&mut self) {
        if self.phase == CircuitPhase::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    fn open(&mut self, policy: &CircuitBreakerPolicy, now: DateTime<Utc>) {
        let cooldown = to_delta(policy.cooldown_for(self.retrips));
        self.phase = CircuitPhase::Open;
        self.open_until = Some(now.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC));
        self.consecutive_failures = 0;
        self.streak_started_at = None;
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
