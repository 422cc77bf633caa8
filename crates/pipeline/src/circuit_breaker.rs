//! C5 — Circuit Breaker (§4.5).
//!
//! Keyed by (workspace, hostname, provider). State lives as a JSON blob in
//! the shared [`StateStore`], mutated under a [`DistributedLock`] so the
//! closed→open transition (and its `openCount` increment) is atomic across
//! worker replicas — the same guarded load/modify/save shape as the rate
//! limiter (C3), since this crate has exactly one primitive for "read then
//! conditionally write shared JSON state" and reuses it everywhere that
//! applies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use watchloop_core::classify::Outcome;
use watchloop_core::ids::{ProviderId, WorkspaceId};
use watchloop_state::{DistributedLock, StateKey, StateStore};

const MUTATION_LOCK_TTL: Duration = Duration::from_secs(2);
const IDLE_TTL: Duration = Duration::from_secs(24 * 3600);
const FAILURE_WINDOW: Duration = Duration::from_secs(10 * 60);
const FAILURE_THRESHOLD: u32 = 3;

const COOLDOWN_TIERS_SECS: [i64; 3] = [15 * 60, 60 * 60, 6 * 3600];

fn cooldown_for(open_count: u32) -> i64 {
    let tier = open_count.saturating_sub(1).min(2) as usize;
    COOLDOWN_TIERS_SECS[tier]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CircuitState {
    state: State,
    failures: u32,
    last_failure_at_ms: i64,
    open_count: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self { state: State::Closed, failures: 0, last_failure_at_ms: 0, open_count: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// A half-open probe has been granted; exactly one caller gets this per
    /// cooldown expiry, the rest see `Rejected` until the probe resolves.
    Probe,
    Rejected { remaining_secs: i64 },
}

pub struct CircuitBreaker {
    store: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, lock: Arc<dyn DistributedLock>) -> Self {
        Self { store, lock }
    }

    /// `canExecute()` — may fetches proceed against this (workspace,
    /// hostname, provider)? Transitions `open` → `half-open` exactly once
    /// per cooldown expiry, admitting a single probe.
    pub async fn can_execute(
        &self,
        workspace: &WorkspaceId,
        hostname: &str,
        provider: &ProviderId,
    ) -> Admission {
        let key = StateKey::circuit_breaker(workspace, hostname, provider);
        let lock_name = format!("lock:{key}");

        let Ok(Some(guard)) = self.lock.try_acquire(&lock_name, MUTATION_LOCK_TTL).await else {
            // Lock contention or backend failure during admission check:
            // fail open, the breaker is advisory, not a hard safety gate.
            return Admission::Allowed;
        };

        let mut state = self.load(&key).await;
        let now = Utc::now().timestamp_millis();

        let result = match state.state {
            State::Closed => Admission::Allowed,
            State::HalfOpen => Admission::Rejected { remaining_secs: 0 },
            State::Open => {
                let elapsed_secs = (now - state.last_failure_at_ms) / 1000;
                let cooldown = cooldown_for(state.open_count);
                if elapsed_secs >= cooldown {
                    state.state = State::HalfOpen;
                    self.save(&key, &state).await;
                    info!(%workspace, %hostname, %provider, "circuit breaker cooldown elapsed, admitting probe");
                    Admission::Probe
                } else {
                    Admission::Rejected { remaining_secs: cooldown - elapsed_secs }
                }
            }
        };

        let _ = guard.release().await;
        if let Admission::Rejected { remaining_secs } = result {
            debug!(%workspace, %hostname, %provider, remaining_secs, "circuit breaker rejected");
        }
        result
    }

    /// Feed a fetch outcome to the breaker. Non-failure outcomes (`ok`,
    /// `rate_limited`, `preferred_unavailable`, `interstitial_geo`, per
    /// [`Outcome::is_circuit_breaker_failure`]) are ignored entirely when
    /// the circuit is closed with zero failures, but a success while
    /// `half-open` still must close the circuit, so success is handled
    /// unconditionally for state transitions, only skipped for the failure
    /// counter.
    pub async fn record_outcome(
        &self,
        workspace: &WorkspaceId,
        hostname: &str,
        provider: &ProviderId,
        outcome: Outcome,
    ) {
        let key = StateKey::circuit_breaker(workspace, hostname, provider);
        let lock_name = format!("lock:{key}");
        let Ok(Some(guard)) = self.lock.try_acquire(&lock_name, MUTATION_LOCK_TTL).await else {
            warn!(%workspace, %hostname, %provider, "circuit breaker lock unavailable, outcome dropped");
            return;
        };

        let mut state = self.load(&key).await;
        let now = Utc::now().timestamp_millis();

        if outcome.is_circuit_breaker_failure() {
            match state.state {
                State::HalfOpen => {
                    state.state = State::Open;
                    state.open_count += 1;
                    state.last_failure_at_ms = now;
                    state.failures = 1;
                    warn!(%workspace, %hostname, %provider, open_count = state.open_count, "half-open probe failed, reopening");
                }
                State::Closed | State::Open => {
                    let within_window = now - state.last_failure_at_ms < FAILURE_WINDOW.as_millis() as i64;
                    if within_window && state.failures > 0 {
                        state.failures += 1;
                    } else {
                        state.failures = 1;
                    }
                    state.last_failure_at_ms = now;
                    if state.failures >= FAILURE_THRESHOLD && state.state == State::Closed {
                        state.state = State::Open;
                        state.open_count += 1;
                        warn!(%workspace, %hostname, %provider, open_count = state.open_count, "circuit breaker opened");
                    }
                }
            }
        } else {
            match state.state {
                State::HalfOpen => {
                    state.state = State::Closed;
                    state.failures = 0;
                    info!(%workspace, %hostname, %provider, "half-open probe succeeded, circuit closed");
                }
                State::Closed if state.failures != 0 => {
                    state.failures = 0;
                }
                State::Closed | State::Open => {}
            }
        }

        self.save(&key, &state).await;
        let _ = guard.release().await;
    }

    async fn load(&self, key: &StateKey) -> CircuitState {
        match self.store.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            _ => CircuitState::default(),
        }
    }

    async fn save(&self, key: &StateKey, state: &CircuitState) {
        if let Ok(json) = serde_json::to_string(state) {
            if let Err(e) = self.store.set(key, &json, Some(IDLE_TTL)).await {
                warn!(%key, error = %e, "failed to persist circuit breaker state");
            }
        }
    }
}
