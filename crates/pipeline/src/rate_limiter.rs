//! C3 — Rate Limiter (§4.3).
//!
//! A per-(provider, hostname) token bucket stored as JSON in the shared
//! [`StateStore`], mutated under a short-lived [`DistributedLock`] so the
//! load-refill-decrement-save sequence is atomic across worker replicas —
//! the same guarded read-modify-write shape the circuit breaker (C5) uses,
//! since neither `StateStore::compare_and_swap` nor a Lua script is needed
//! twice over for the same atomicity requirement.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use watchloop_core::ids::ProviderId;
use watchloop_state::{DistributedLock, StateKey, StateStore};

const MUTATION_LOCK_TTL: Duration = Duration::from_secs(2);
const BUCKET_TTL: Duration = Duration::from_secs(3600);

/// Refill rate and burst for one provider class, per §4.3's table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub refill_per_sec: f64,
    pub burst: f64,
}

impl RateLimitConfig {
    pub const HTTP: Self = Self { refill_per_sec: 12.0 / 60.0, burst: 3.0 };
    pub const HEADLESS: Self = Self { refill_per_sec: 4.0 / 60.0, burst: 3.0 };
    pub const PAID: Self = Self { refill_per_sec: 2.0 / 60.0, burst: 1.0 };

    /// Default config for a provider id. Paid providers are named
    /// explicitly; `flaresolverr`/`headless` get the slower free tier;
    /// anything else (namely `http`) gets the fast free tier.
    #[must_use]
    pub fn for_provider(provider: &ProviderId) -> Self {
        match provider.as_str() {
            "flaresolverr" | "headless" => Self::HEADLESS,
            "brightdata" | "scraping_browser" | "twocaptcha_proxy" | "twocaptcha_datadome" => Self::PAID,
            _ => Self::HTTP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketState {
    tokens: f64,
    last_refill_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsumeResult {
    Allowed { remaining: f64 },
    Denied { remaining: f64, wait_ms: u64 },
}

impl ConsumeResult {
    #[must_use]
    pub fn is_denied(self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, lock: Arc<dyn DistributedLock>) -> Self {
        Self { store, lock }
    }

    /// `ratelimit:config:{hostname}` override, if one has been configured
    /// for this hostname (§4.3, §6).
    async fn config_for(&self, provider: &ProviderId, hostname: &str) -> RateLimitConfig {
        let key = StateKey::rate_limit_config(hostname);
        match self.store.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|_| RateLimitConfig::for_provider(provider)),
            _ => RateLimitConfig::for_provider(provider),
        }
    }

    /// Atomic check-and-decrement with refill (§4.3). On backend
    /// unavailability: fail-closed for paid providers (cost containment),
    /// fail-open for free providers (availability).
    pub async fn consume(&self, provider: &ProviderId, hostname: &str, is_paid: bool) -> ConsumeResult {
        let key = StateKey::rate_limit(provider, hostname);
        let cfg = self.config_for(provider, hostname).await;

        let lock_name = format!("lock:{key}");
        let guard = match self.lock.try_acquire(&lock_name, MUTATION_LOCK_TTL).await {
            Ok(Some(guard)) => guard,
            Ok(None) => return self.fail_result(provider, hostname, is_paid, cfg, "lock contended"),
            Err(e) => return self.fail_result(provider, hostname, is_paid, cfg, &e.to_string()),
        };

        let now = Utc::now().timestamp_millis();
        let mut state = match self.store.get(&key).await {
            Ok(Some(raw)) => {
                serde_json::from_str(&raw).unwrap_or(BucketState { tokens: cfg.burst, last_refill_ms: now })
            }
            Ok(None) => BucketState { tokens: cfg.burst, last_refill_ms: now },
            Err(e) => {
                let _ = guard.release().await;
                return self.fail_result(provider, hostname, is_paid, cfg, &e.to_string());
            }
        };

        let elapsed_secs = f64::from((now - state.last_refill_ms).max(0) as u32) / 1000.0;
        state.tokens = (state.tokens + elapsed_secs * cfg.refill_per_sec).min(cfg.burst);
        state.last_refill_ms = now;

        let result = if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            ConsumeResult::Allowed { remaining: state.tokens }
        } else {
            let wait_secs = (1.0 - state.tokens) / cfg.refill_per_sec;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let wait_ms = (wait_secs * 1000.0).round().max(0.0) as u64;
            ConsumeResult::Denied { remaining: state.tokens, wait_ms }
        };

        if let Ok(json) = serde_json::to_string(&state) {
            if let Err(e) = self.store.set(&key, &json, Some(BUCKET_TTL)).await {
                warn!(%provider, %hostname, error = %e, "failed to persist rate limiter bucket");
            }
        }
        let _ = guard.release().await;

        if result.is_denied() {
            debug!(%provider, %hostname, ?result, "rate limiter denied");
        }
        result
    }

    /// Read-only projection of the bucket's current token count, without
    /// consuming one. Used for introspection/health endpoints.
    pub async fn check(&self, provider: &ProviderId, hostname: &str) -> ConsumeResult {
        let key = StateKey::rate_limit(provider, hostname);
        let cfg = self.config_for(provider, hostname).await;
        let now = Utc::now().timestamp_millis();
        let state = match self.store.get(&key).await {
            Ok(Some(raw)) => {
                serde_json::from_str(&raw).unwrap_or(BucketState { tokens: cfg.burst, last_refill_ms: now })
            }
            _ => BucketState { tokens: cfg.burst, last_refill_ms: now },
        };
        let elapsed_secs = f64::from((now - state.last_refill_ms).max(0) as u32) / 1000.0;
        let tokens = (state.tokens + elapsed_secs * cfg.refill_per_sec).min(cfg.burst);
        if tokens >= 1.0 {
            ConsumeResult::Allowed { remaining: tokens }
        } else {
            let wait_secs = (1.0 - tokens) / cfg.refill_per_sec;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let wait_ms = (wait_secs * 1000.0).round().max(0.0) as u64;
            ConsumeResult::Denied { remaining: tokens, wait_ms }
        }
    }

    fn fail_result(
        &self,
        provider: &ProviderId,
        hostname: &str,
        is_paid: bool,
        cfg: RateLimitConfig,
        detail: &str,
    ) -> ConsumeResult {
        if is_paid {
            warn!(%provider, %hostname, detail, "rate limiter backend unavailable, denying paid provider");
            ConsumeResult::Denied { remaining: 0.0, wait_ms: 60_000 }
        } else {
            debug!(%provider, %hostname, detail, "rate limiter backend unavailable, failing open for free provider");
            ConsumeResult::Allowed { remaining: cfg.burst }
        }
    }
}

#[cfg(test)]
mod tests {
    use watchloop_state_memory::{MemoryDistributedLock, MemoryStateStore};

    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStateStore::new()), Arc::new(MemoryDistributedLock::new()))
    }

    #[tokio::test]
    async fn burst_then_deny_on_empty_bucket() {
        let limiter = limiter();
        let provider = ProviderId::new("brightdata");
        // paid burst is 1.0
        let first = limiter.consume(&provider, "etsy.com", true).await;
        assert!(matches!(first, ConsumeResult::Allowed { .. }));
        let second = limiter.consume(&provider, "etsy.com", true).await;
        assert!(second.is_denied());
    }

    #[tokio::test]
    async fn free_provider_has_larger_burst() {
        let limiter = limiter();
        let provider = ProviderId::new("http");
        for _ in 0..3 {
            let result = limiter.consume(&provider, "shop.example", false).await;
            assert!(matches!(result, ConsumeResult::Allowed { .. }));
        }
        let fourth = limiter.consume(&provider, "shop.example", false).await;
        assert!(fourth.is_denied());
    }

    #[tokio::test]
    async fn denial_reports_nonzero_wait() {
        let limiter = limiter();
        let provider = ProviderId::new("scraping_browser");
        limiter.consume(&provider, "host", true).await;
        let denied = limiter.consume(&provider, "host", true).await;
        match denied {
            ConsumeResult::Denied { wait_ms, .. } => assert!(wait_ms > 0),
            ConsumeResult::Allowed { .. } => panic!("expected denial with burst 1"),
        }
    }

    #[tokio::test]
    async fn per_hostname_config_override_is_honored() {
        let store = Arc::new(MemoryStateStore::new());
        let lock = Arc::new(MemoryDistributedLock::new());
        let limiter = RateLimiter::new(store.clone(), lock);
        let override_cfg = RateLimitConfig { refill_per_sec: 1.0, burst: 10.0 };
        store
            .set(
                &StateKey::rate_limit_config("big-burst.example"),
                &serde_json::to_string(&override_cfg).unwrap(),
                None,
            )
            .await
            .unwrap();
        let provider = ProviderId::new("http");
        for _ in 0..10 {
            let result = limiter.consume(&provider, "big-burst.example", false).await;
            assert!(matches!(result, ConsumeResult::Allowed { .. }));
        }
        assert!(limiter.consume(&provider, "big-burst.example", false).await.is_denied());
    }
}
