//! Shared-cache key construction (§6: "Shared cache keys").
//!
//! Every key the circuit breaker, rate limiter, and concurrency semaphore
//! touch is built here so the wire format (`cb:{ws}:{hostname}:{provider}`,
//! `ratelimit:{provider}:{hostname}`, …) lives in exactly one place.

use std::fmt;

use serde::{Deserialize, Serialize};
use watchloop_core::ids::{ProviderId, WorkspaceId};

/// The kind of state being stored, used only to pick the canonical prefix —
/// the TTL and value shape for each kind are owned by the component that
/// reads/writes it (C3, C4, C5), not by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// `cb:{workspaceId}:{hostname}:{providerId}` — §4.5, §6.
    CircuitBreaker,
    /// `ratelimit:{providerId}:{hostname}` — §4.3, §6.
    RateLimit,
    /// `ratelimit:config:{hostname}` — per-host rate limit override, §4.3.
    RateLimitConfig,
    /// `concurrency:{providerId}:{hostname}` or
    /// `concurrency:{providerId}:__global__` — §4.4, §6.
    Concurrency,
}

impl KeyKind {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::CircuitBreaker => "cb",
            Self::RateLimit => "ratelimit",
            Self::RateLimitConfig => "ratelimit:config",
            Self::Concurrency => "concurrency",
        }
    }
}

/// A fully-qualified shared-cache key. `canonical()` is what actually
/// crosses the wire to Redis (or the in-memory map's key space).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    #[must_use]
    pub fn circuit_breaker(workspace: &WorkspaceId, hostname: &str, provider: &ProviderId) -> Self {
        Self { kind: KeyKind::CircuitBreaker, id: format!("{workspace}:{hostname}:{provider}") }
    }

    #[must_use]
    pub fn rate_limit(provider: &ProviderId, hostname: &str) -> Self {
        Self { kind: KeyKind::RateLimit, id: format!("{provider}:{hostname}") }
    }

    #[must_use]
    pub fn rate_limit_config(hostname: &str) -> Self {
        Self { kind: KeyKind::RateLimitConfig, id: hostname.to_owned() }
    }

    /// `hostname = None` addresses the provider's global bucket
    /// (`concurrency:{providerId}:__global__`) per §4.4.
    #[must_use]
    pub fn concurrency(provider: &ProviderId, hostname: Option<&str>) -> Self {
        Self {
            kind: KeyKind::Concurrency,
            id: format!("{provider}:{}", hostname.unwrap_or("__global__")),
        }
    }

    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.kind.prefix(), self.id)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}
