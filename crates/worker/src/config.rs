//! Worker bootstrap configuration (§5, §6).
//!
//! Every knob the worker binary needs is an environment variable with a
//! `clap` CLI override, mirroring how `acteon-server` reads its own
//! settings — except this binary has no config file, only env/flags, since
//! it has no HTTP surface of its own to version a config schema against.

use std::collections::HashSet;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use watchloop_core::ids::WorkspaceId;
use watchloop_crypto::{CryptoError, ExposeSecret, MasterKey};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StateBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LedgerBackendKind {
    Memory,
    Postgres,
}

/// Background worker configuration. Everything is an env var with a
/// sensible single-process default, so `watchloop-worker` runs out of the
/// box against in-memory backends and no notification channels wired up.
#[derive(Parser, Debug)]
#[command(name = "watchloop-worker", about = "watchloop background worker")]
pub struct WorkerConfig {
    /// Shared-cache backend for the rate limiter, circuit breaker, and
    /// concurrency semaphore (C3-C5).
    #[arg(long, env = "STATE_BACKEND", value_enum, default_value = "memory")]
    pub state_backend: StateBackendKind,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    #[arg(long, env = "REDIS_PREFIX", default_value = "watchloop")]
    pub redis_prefix: String,

    /// Backend for fetch attempts, domain stats, observations, and alerts.
    #[arg(long, env = "LEDGER_BACKEND", value_enum, default_value = "memory")]
    pub ledger_backend: LedgerBackendKind,

    #[arg(long, env = "DATABASE_URL", default_value = "")]
    pub postgres_url: String,

    #[arg(long, env = "POSTGRES_PREFIX", default_value = "watchloop_")]
    pub postgres_prefix: String,

    /// Max in-flight `rules:run` jobs.
    #[arg(long, env = "WORKER_CONCURRENCY_RULES", default_value_t = 5)]
    pub run_concurrency: usize,

    /// Max in-flight `alerts:dispatch` jobs.
    #[arg(long, env = "WORKER_CONCURRENCY_ALERTS", default_value_t = 10)]
    pub dispatch_concurrency: usize,

    /// §6 tier policy feature flag. When disabled, every workspace keeps
    /// legacy behavior (paid providers always eligible).
    #[arg(long, env = "TIER_POLICY_ENABLED", default_value_t = false)]
    pub tier_policy_enabled: bool,

    /// Comma-separated workspace ids the tier policy applies to. Empty
    /// means "global rollout" once `tier_policy_enabled` is set.
    #[arg(long, env = "CANARY_WORKSPACE_IDS", default_value = "")]
    pub canary_workspace_ids: String,

    #[arg(long, env = "MAX_ATTEMPTS_PER_RUN", default_value_t = 5)]
    pub max_attempts_per_run: u32,

    #[arg(long, env = "TIER_ALLOW_PAID", default_value_t = true)]
    pub allow_paid: bool,

    /// 32-byte AES key (hex or base64) used to decrypt provider API keys
    /// stored as `ENC[AES256-GCM,...]`. Required only when a paid provider
    /// endpoint is configured with an encrypted key; no fallback exists —
    /// an encrypted key with no `ENCRYPTION_KEY` set is a startup error.
    #[arg(long, env = "ENCRYPTION_KEY")]
    pub encryption_key: Option<String>,

    #[arg(long, env = "BRIGHTDATA_ENDPOINT")]
    pub brightdata_endpoint: Option<String>,
    #[arg(long, env = "BRIGHTDATA_API_KEY")]
    pub brightdata_api_key: Option<String>,
    #[arg(long, env = "BRIGHTDATA_ZONE", default_value = "watchloop")]
    pub brightdata_zone: String,

    #[arg(long, env = "SCRAPING_BROWSER_ENDPOINT")]
    pub scraping_browser_endpoint: Option<String>,
    #[arg(long, env = "SCRAPING_BROWSER_API_KEY")]
    pub scraping_browser_api_key: Option<String>,

    #[arg(long, env = "TWOCAPTCHA_PROXY_ENDPOINT")]
    pub twocaptcha_proxy_endpoint: Option<String>,
    #[arg(long, env = "TWOCAPTCHA_PROXY_API_KEY")]
    pub twocaptcha_proxy_api_key: Option<String>,

    #[arg(long, env = "FLARESOLVERR_ENDPOINT")]
    pub flaresolverr_endpoint: Option<String>,

    #[arg(long, env = "HEADLESS_RENDER_ENDPOINT")]
    pub headless_endpoint: Option<String>,

    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,
    #[arg(long, env = "WEBHOOK_BEARER_TOKEN")]
    pub webhook_bearer_token: Option<String>,

    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,
    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,
    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,
    #[arg(long, env = "SMTP_PASSWORD")]
    pub smtp_password: Option<String>,
    #[arg(long, env = "EMAIL_FROM", default_value = "alerts@watchloop.invalid")]
    pub email_from: String,
    #[arg(long, env = "EMAIL_TO")]
    pub email_to: Option<String>,

    /// How long to wait for in-flight jobs to finish once a shutdown
    /// signal arrives before the process exits anyway.
    #[arg(long, env = "SHUTDOWN_DRAIN_SECONDS", default_value_t = 30)]
    pub shutdown_drain_seconds: u64,
}

impl WorkerConfig {
    #[must_use]
    pub fn canary_workspaces(&self) -> HashSet<WorkspaceId> {
        self.canary_workspace_ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(WorkspaceId::new)
            .collect()
    }

    #[must_use]
    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_seconds)
    }

    /// Parse `ENCRYPTION_KEY`, if decrypting a provider secret requires it.
    pub fn master_key(&self) -> Result<MasterKey, CryptoError> {
        let raw = self
            .encryption_key
            .as_deref()
            .ok_or_else(|| CryptoError::InvalidKey("ENCRYPTION_KEY is not set".to_owned()))?;
        watchloop_crypto::parse_master_key(raw)
    }

    /// Decrypt `value` if it's in `ENC[...]` form, otherwise return it
    /// unchanged (a plaintext credential, e.g. in local development).
    pub fn resolve_secret(&self, value: &str) -> Result<String, CryptoError> {
        if watchloop_crypto::is_encrypted(value) {
            let key = self.master_key()?;
            Ok(watchloop_crypto::decrypt_value(value, &key)?.expose_secret().to_owned())
        } else {
            Ok(value.to_owned())
        }
    }
}
