//! C4 — Concurrency Semaphore (§4.4).
//!
//! Paid providers only. A lease is acquired against the provider's global
//! bucket, then against its per-(provider, hostname) bucket; if the
//! per-hostname acquire is denied, the global lease is released so it
//! doesn't leak. Both buckets live in the shared [`LeaseStore`] as
//! sorted sets scored by expiry, evicted lazily on every check.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use watchloop_core::ids::ProviderId;
use watchloop_state::{LeaseAcquireResult, LeaseStore, StateKey};

/// Global and per-hostname concurrency caps plus lease TTL, per §4.4's
/// worked examples. TTL must exceed the provider's own fetch timeout plus
/// a buffer so a crashed worker's lease self-releases rather than wedging
/// the bucket shut.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyConfig {
    pub global_max: u64,
    pub per_hostname_max: u64,
    pub lease_ttl: Duration,
}

impl ConcurrencyConfig {
    #[must_use]
    pub fn for_provider(provider: &ProviderId) -> Option<Self> {
        match provider.as_str() {
            "brightdata" => Some(Self { global_max: 2, per_hostname_max: 2, lease_ttl: Duration::from_secs(180) }),
            "scraping_browser" => {
                Some(Self { global_max: 2, per_hostname_max: 1, lease_ttl: Duration::from_secs(210) })
            }
            "twocaptcha_proxy" | "twocaptcha_datadome" => {
                Some(Self { global_max: 4, per_hostname_max: 2, lease_ttl: Duration::from_secs(270) })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseResult {
    Acquired(Lease),
    Denied { current_count: u64, wait_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    id: String,
    provider: ProviderId,
    hostname: String,
}

pub struct ConcurrencySemaphore {
    leases: Arc<dyn LeaseStore>,
}

impl ConcurrencySemaphore {
    #[must_use]
    pub fn new(leases: Arc<dyn LeaseStore>) -> Self {
        Self { leases }
    }

    /// Returns `None` if the provider has no concurrency limits configured
    /// (i.e. it's a free provider, or a paid provider with no cap) — the
    /// orchestrator treats `None` as "no gate, proceed".
    #[must_use]
    pub fn config_for(&self, provider: &ProviderId) -> Option<ConcurrencyConfig> {
        ConcurrencyConfig::for_provider(provider)
    }

    /// Acquire global then per-hostname leases. On per-hostname denial the
    /// global lease is released before returning (§4.4).
    pub async fn try_acquire(
        &self,
        provider: &ProviderId,
        hostname: &str,
        cfg: ConcurrencyConfig,
    ) -> Result<LeaseResult, watchloop_state::StateError> {
        let lease_id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let expires_at = now + i64::try_from(cfg.lease_ttl.as_millis()).unwrap_or(i64::MAX);

        let global_key = StateKey::concurrency(provider, None);
        let global = self.leases.try_acquire(&global_key, &lease_id, now, expires_at, cfg.global_max).await?;
        let LeaseAcquireResult::Acquired = global else {
            return Ok(as_denied(global));
        };

        let host_key = StateKey::concurrency(provider, Some(hostname));
        let per_host = self.leases.try_acquire(&host_key, &lease_id, now, expires_at, cfg.per_hostname_max).await?;
        match per_host {
            LeaseAcquireResult::Acquired => Ok(LeaseResult::Acquired(Lease {
                id: lease_id,
                provider: provider.clone(),
                hostname: hostname.to_owned(),
            })),
            LeaseAcquireResult::Denied { .. } => {
                self.leases.release(&global_key, &lease_id).await?;
                debug!(%provider, %hostname, "per-hostname concurrency denied, released global lease");
                Ok(as_denied(per_host))
            }
        }
    }

    pub async fn release(&self, lease: &Lease) -> Result<(), watchloop_state::StateError> {
        let global_key = StateKey::concurrency(&lease.provider, None);
        let host_key = StateKey::concurrency(&lease.provider, Some(&lease.hostname));
        self.leases.release(&global_key, &lease.id).await?;
        self.leases.release(&host_key, &lease.id).await?;
        Ok(())
    }
}

fn as_denied(result: LeaseAcquireResult) -> LeaseResult {
    match result {
        LeaseAcquireResult::Acquired => unreachable!("caller already matched Acquired"),
        LeaseAcquireResult::Denied { current_count, oldest_expiry_ms } => {
            let now = Utc::now().timestamp_millis();
            let wait_ms = oldest_expiry_ms.map_or(0, |expiry| (expiry - now).max(0) as u64);
            LeaseResult::Denied { current_count, wait_ms }
        }
    }
}
