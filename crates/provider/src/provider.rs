use async_trait::async_trait;
use watchloop_core::ids::ProviderId;

use crate::error::ProviderError;
use crate::request::{FetchRequest, FetchResult};

/// A fetch strategy: `http`, `flaresolverr`, `headless` (free); `brightdata`,
/// `scraping_browser`, `twocaptcha_proxy` (paid). The orchestrator (C8)
/// holds a `Vec<Arc<dyn FetchProvider>>` and walks it in cost order, so this
/// trait is object-safe by construction rather than via a blanket impl over
/// a separate static trait — every concrete provider here is always reached
/// through the registry, never called directly.
#[async_trait]
pub trait FetchProvider: Send + Sync {
    /// Stable identifier used as the provider component of cache keys
    /// (`cb:{ws}:{host}:{provider}`) and ledger rows.
    fn id(&self) -> ProviderId;

    /// Whether this provider incurs real spend, gating it behind the
    /// budget guard (C6) and concurrency semaphore (C4).
    fn is_paid(&self) -> bool {
        false
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError>;

    /// Lightweight liveness probe, independent of any particular rule.
    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
