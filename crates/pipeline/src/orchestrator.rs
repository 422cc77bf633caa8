//! C8 — Fetch Orchestrator (§4.8).
//!
//! The scheduler: builds provider candidate order, applies the C3–C6 gates
//! to each candidate in turn, invokes the provider, classifies the result
//! via C1, logs via C7, and feeds the outcome to the circuit breaker. The
//! candidate loop is sequential by design (§5: "the ordering *is* the
//! policy").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use watchloop_core::classify::{classify, ClassifyInput, Outcome};
use watchloop_core::ids::{Hostname, ProviderId, RuleId, WorkspaceId};
use watchloop_core::FetchAttempt;
use watchloop_ledger::Ledger;
use watchloop_provider::{FetchRequest, ProviderRegistry};

use crate::budget::{BudgetGuard, BudgetQuery};
use crate::circuit_breaker::{Admission, CircuitBreaker};
use crate::rate_limiter::{ConsumeResult, RateLimiter};
use crate::semaphore::{ConcurrencySemaphore, LeaseResult};

const FREE_ORDER: [&str; 3] = ["http", "flaresolverr", "headless"];
const PAID_ORDER: [&str; 3] = ["brightdata", "scraping_browser", "twocaptcha_proxy"];

/// One `rules:run` job's request into the orchestrator, built by C11 from
/// the rule's fetch policy (§4.8).
pub struct OrchestratorRequest {
    pub workspace_id: WorkspaceId,
    pub rule_id: RuleId,
    pub url: String,
    pub hostname: Hostname,
    pub headers: HashMap<String, String>,
    pub user_agent: Option<String>,
    pub timeout_ms: u64,
    pub render_wait_ms: Option<u64>,
    pub flaresolverr_wait_seconds: Option<u64>,
    pub preferred_provider: Option<ProviderId>,
    pub disabled_providers: Vec<ProviderId>,
    pub stop_after_preferred_failure: bool,
    pub geo_country: Option<String>,
}

pub struct OrchestratorConfig {
    pub max_attempts_per_run: u32,
    pub allow_paid: bool,
    pub estimated_cost_usd: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_attempts_per_run: 5, allow_paid: true, estimated_cost_usd: 0.01 }
    }
}

/// The orchestrator's result: the last (or synthesized) [`FetchAttempt`],
/// plus the successful body and geo-context that [`FetchAttempt`] itself
/// doesn't carry (it stores only `body_bytes`, for ledger compactness) —
/// propagated up to C11 for the extractor call per §4.8's closing note.
pub struct OrchestratorOutcome {
    pub attempt: FetchAttempt,
    pub ok_body: Option<String>,
    pub country_used: Option<String>,
    /// Suggested re-run delay when `attempt.outcome == RateLimited` (§4.11
    /// step 4); `None` for every other outcome. Bounded by C11 before it's
    /// handed to the queue.
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SkipReason {
    CircuitBreaker,
    RateLimit { wait_ms: u64 },
    Budget,
    Concurrency { wait_ms: u64 },
}

pub struct FetchOrchestrator {
    providers: ProviderRegistry,
    rate_limiter: RateLimiter,
    semaphore: ConcurrencySemaphore,
    circuit_breaker: CircuitBreaker,
    budget_guard: BudgetGuard,
    ledger: Arc<dyn Ledger>,
}

impl FetchOrchestrator {
    #[must_use]
    pub fn new(
        providers: ProviderRegistry,
        rate_limiter: RateLimiter,
        semaphore: ConcurrencySemaphore,
        circuit_breaker: CircuitBreaker,
        budget_guard: BudgetGuard,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self { providers, rate_limiter, semaphore, circuit_breaker, budget_guard, ledger }
    }

    fn candidate_order(&self, request: &OrchestratorRequest, config: &OrchestratorConfig) -> Vec<ProviderId> {
        let mut candidates: Vec<ProviderId> = FREE_ORDER
            .iter()
            .map(|id| ProviderId::new(*id))
            .filter(|id| self.providers.contains(id))
            .collect();

        if config.allow_paid {
            candidates.extend(
                PAID_ORDER.iter().map(|id| ProviderId::new(*id)).filter(|id| self.providers.contains(id)),
            );
        }

        candidates.retain(|id| !request.disabled_providers.contains(id));

        if config.allow_paid {
            if let Some(preferred) = &request.preferred_provider {
                if let Some(pos) = candidates.iter().position(|id| id == preferred) {
                    let preferred = candidates.remove(pos);
                    candidates.insert(0, preferred);
                }
            }
        }

        candidates
    }

    #[instrument(skip(self, request), fields(rule_id = %request.rule_id, hostname = %request.hostname))]
    pub async fn run(&self, request: OrchestratorRequest, config: OrchestratorConfig) -> OrchestratorOutcome {
        let candidates = self.candidate_order(&request, &config);

        if request.stop_after_preferred_failure {
            let preferred_missing = request
                .preferred_provider
                .as_ref()
                .is_some_and(|preferred| !candidates.contains(preferred));
            if preferred_missing {
                let attempt = self.synthesize(&request, Outcome::PreferredUnavailable, vec!["preferred_unavailable".into()]);
                self.log_attempt(attempt.clone()).await;
                return OrchestratorOutcome { attempt, ok_body: None, country_used: None, retry_after_ms: None };
            }
        }

        let mut attempts: Vec<FetchAttempt> = Vec::new();
        let mut ok_body: Option<String> = None;
        let mut country_used: Option<String> = None;
        let mut raw_sample_stored = false;
        let mut skips: Vec<SkipReason> = Vec::new();

        for provider_id in &candidates {
            if attempts.len() as u32 >= config.max_attempts_per_run {
                break;
            }
            let Some(provider) = self.providers.get(provider_id) else { continue };
            let is_paid = provider.is_paid();

            let admission = self.circuit_breaker.can_execute(&request.workspace_id, &request.hostname, provider_id).await;
            if matches!(admission, Admission::Rejected { .. }) {
                skips.push(SkipReason::CircuitBreaker);
                debug!(provider = %provider_id, "skipped: circuit breaker open");
                continue;
            }

            let consume = self.rate_limiter.consume(provider_id, &request.hostname, is_paid).await;
            if let ConsumeResult::Denied { wait_ms, .. } = consume {
                skips.push(SkipReason::RateLimit { wait_ms });
                debug!(provider = %provider_id, "skipped: rate limited");
                continue;
            }

            if is_paid {
                let query = BudgetQuery {
                    workspace_id: &request.workspace_id,
                    hostname: &request.hostname,
                    provider: provider_id,
                    rule_id: &request.rule_id,
                    estimated_cost_usd: config.estimated_cost_usd,
                };
                match self.budget_guard.can_spend_paid(&query).await {
                    Ok(decision) if !decision.can_spend_paid => {
                        skips.push(SkipReason::Budget);
                        debug!(provider = %provider_id, "skipped: budget exceeded");
                        continue;
                    }
                    Err(e) => {
                        warn!(provider = %provider_id, error = %e, "budget guard unavailable, denying paid provider");
                        skips.push(SkipReason::Budget);
                        continue;
                    }
                    Ok(_) => {}
                }
            }

            let lease = if is_paid {
                if let Some(cfg) = self.semaphore.config_for(provider_id) {
                    match self.semaphore.try_acquire(provider_id, &request.hostname, cfg).await {
                        Ok(LeaseResult::Acquired(lease)) => Some(lease),
                        Ok(LeaseResult::Denied { wait_ms, .. }) => {
                            skips.push(SkipReason::Concurrency { wait_ms });
                            debug!(provider = %provider_id, "skipped: concurrency limit");
                            continue;
                        }
                        Err(e) => {
                            warn!(provider = %provider_id, error = %e, "concurrency semaphore unavailable, failing open");
                            None
                        }
                    }
                } else {
                    None
                }
            } else {
                None
            };

            let fetch_request = FetchRequest {
                url: request.url.clone(),
                hostname: request.hostname.clone(),
                headers: request.headers.clone(),
                user_agent: request.user_agent.clone(),
                timeout_ms: request.timeout_ms,
                render_wait_ms: request.render_wait_ms,
                flaresolverr_wait_seconds: request.flaresolverr_wait_seconds,
                geo_country: request.geo_country.clone(),
            };

            let start = Instant::now();
            let outcome_raw = provider.fetch(&fetch_request).await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            let (classify_result, http_status, body, content_type, final_url, cost_usd, cost_units, country, error_detail) =
                match outcome_raw {
                    Ok(result) => {
                        let input = ClassifyInput {
                            http_status: result.http_status,
                            body: result.body.as_deref(),
                            content_type: result.content_type.as_deref(),
                            error_detail: result.error_detail.as_deref(),
                        };
                        (
                            classify(&input),
                            result.http_status,
                            result.body,
                            result.content_type,
                            result.final_url,
                            result.cost_usd,
                            result.cost_units,
                            result.country_used,
                            result.error_detail,
                        )
                    }
                    Err(e) => {
                        let detail = e.to_string();
                        let input = ClassifyInput { error_detail: Some(&detail), ..Default::default() };
                        (classify(&input), None, None, None, None, 0.0, None, None, Some(detail))
                    }
                };

            let raw_sample = if classify_result.outcome != Outcome::Ok && !raw_sample_stored {
                body.as_deref().map(|b| {
                    raw_sample_stored = true;
                    FetchAttempt::truncate_sample(b)
                })
            } else {
                None
            };

            let attempt = FetchAttempt {
                workspace_id: request.workspace_id.clone(),
                rule_id: request.rule_id.clone(),
                url: request.url.clone(),
                hostname: request.hostname.clone(),
                provider: provider_id.clone(),
                outcome: classify_result.outcome,
                block_kind: classify_result.block_kind,
                http_status,
                final_url,
                body_bytes: body.as_ref().map(String::len),
                content_type,
                latency_ms,
                signals: classify_result.signals,
                error_detail,
                cost_usd,
                cost_units,
                raw_sample,
                attempted_at: chrono::Utc::now(),
            };

            self.log_attempt(attempt.clone()).await;
            self.circuit_breaker
                .record_outcome(&request.workspace_id, &request.hostname, provider_id, classify_result.outcome)
                .await;

            if let Some(lease) = &lease {
                let _ = self.semaphore.release(lease).await;
            }

            let is_preferred_failure =
                request.preferred_provider.as_ref() == Some(provider_id) && classify_result.outcome != Outcome::Ok;

            let body_present = body.is_some();
            attempts.push(attempt);

            if classify_result.outcome == Outcome::Ok && body_present {
                ok_body = body;
                country_used = country;
                break;
            }

            if request.stop_after_preferred_failure && is_preferred_failure {
                break;
            }
        }

        let mut retry_after_ms = None;
        let final_attempt = if let Some(last) = attempts.last().cloned() {
            last
        } else {
            let (outcome, signal, wait_ms) = synthesize_reason(&skips);
            retry_after_ms = wait_ms;
            self.synthesize(&request, outcome, vec![signal.to_owned()])
        };

        if attempts.is_empty() {
            self.log_attempt(final_attempt.clone()).await;
        }

        info!(outcome = ?final_attempt.outcome, attempts = attempts.len(), "fetch orchestrator run complete");
        OrchestratorOutcome { attempt: final_attempt, ok_body, country_used, retry_after_ms }
    }

    fn synthesize(&self, request: &OrchestratorRequest, outcome: Outcome, signals: Vec<String>) -> FetchAttempt {
        FetchAttempt {
            workspace_id: request.workspace_id.clone(),
            rule_id: request.rule_id.clone(),
            url: request.url.clone(),
            hostname: request.hostname.clone(),
            provider: ProviderId::new("none"),
            outcome,
            block_kind: None,
            http_status: None,
            final_url: None,
            body_bytes: None,
            content_type: None,
            latency_ms: 0,
            signals,
            error_detail: None,
            cost_usd: 0.0,
            cost_units: None,
            raw_sample: None,
            attempted_at: chrono::Utc::now(),
        }
    }

    async fn log_attempt(&self, attempt: FetchAttempt) {
        let workspace_id = attempt.workspace_id.clone();
        let hostname = attempt.hostname.clone();
        let outcome = attempt.outcome;
        let latency_ms = attempt.latency_ms;
        let cost_usd = attempt.cost_usd;

        if let Err(e) = self.ledger.log_attempt(attempt).await {
            warn!(error = %e, "failed to log fetch attempt");
        }

        let ledger = self.ledger.clone();
        tokio::spawn(async move {
            let day = chrono::Utc::now().date_naive();
            if let Err(e) = ledger.record_domain_stats(&workspace_id, &hostname, day, outcome, latency_ms, cost_usd).await {
                warn!(error = %e, "failed to update domain stats");
            }
        });
    }
}

/// §4.8's final-result-synthesis priority, in the order the spec lists it.
/// The wait returned is the max over every rate-limit/concurrency skip —
/// the longest suggested backoff among the candidates that denied us.
fn synthesize_reason(skips: &[SkipReason]) -> (Outcome, &'static str, Option<u64>) {
    let rate_or_concurrency_wait = skips
        .iter()
        .filter_map(|s| match s {
            SkipReason::RateLimit { wait_ms } | SkipReason::Concurrency { wait_ms } => Some(*wait_ms),
            _ => None,
        })
        .max();

    if let Some(wait_ms) = rate_or_concurrency_wait {
        (Outcome::RateLimited, "deferred_retry", Some(wait_ms))
    } else if skips.iter().any(|s| matches!(s, SkipReason::Budget)) {
        (Outcome::NetworkError, "budget_exceeded", None)
    } else if skips.iter().any(|s| matches!(s, SkipReason::CircuitBreaker)) {
        (Outcome::NetworkError, "circuit_breaker_open", None)
    } else {
        (Outcome::NetworkError, "no_providers_available", None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use watchloop_ledger_memory::MemoryLedger;
    use watchloop_provider::{FetchResult, ProviderError};
    use watchloop_state_memory::{MemoryDistributedLock, MemoryLeaseStore, MemoryStateStore};

    use crate::budget::StaticBudgetPolicy;

    use super::*;

    struct ScriptedProvider {
        id: &'static str,
        paid: bool,
        responses: parking_lot::Mutex<Vec<Result<FetchResult, ProviderError>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl watchloop_provider::FetchProvider for ScriptedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new(self.id)
        }

        fn is_paid(&self) -> bool {
            self.paid
        }

        async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Ok(FetchResult::default());
            }
            responses.remove(0)
        }
    }

    fn ok_result() -> FetchResult {
        FetchResult {
            http_status: Some(200),
            body: Some(format!("<!doctype html><html><body>{}</body></html>", "x".repeat(3000))),
            content_type: Some("text/html".into()),
            ..Default::default()
        }
    }

    fn request() -> OrchestratorRequest {
        OrchestratorRequest {
            workspace_id: WorkspaceId::new("ws1"),
            rule_id: RuleId::new("r1"),
            url: "https://shop.example/widget".into(),
            hostname: "shop.example".into(),
            headers: HashMap::new(),
            user_agent: None,
            timeout_ms: 30_000,
            render_wait_ms: None,
            flaresolverr_wait_seconds: None,
            preferred_provider: None,
            disabled_providers: vec![],
            stop_after_preferred_failure: false,
            geo_country: None,
        }
    }

    fn orchestrator(providers: ProviderRegistry) -> FetchOrchestrator {
        let store: Arc<dyn watchloop_state::StateStore> = Arc::new(MemoryStateStore::new());
        let lock: Arc<dyn watchloop_state::DistributedLock> = Arc::new(MemoryDistributedLock::new());
        let leases: Arc<dyn watchloop_state::LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
        FetchOrchestrator::new(
            providers,
            RateLimiter::new(store.clone(), lock.clone()),
            ConcurrencySemaphore::new(leases),
            CircuitBreaker::new(store, lock),
            BudgetGuard::new(ledger.clone(), Arc::new(StaticBudgetPolicy::new())),
            ledger,
        )
    }

    #[tokio::test]
    async fn first_successful_provider_stops_the_loop() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ScriptedProvider {
            id: "http",
            paid: false,
            responses: parking_lot::Mutex::new(vec![Ok(ok_result())]),
            calls: AtomicUsize::new(0),
        }));
        let orchestrator = orchestrator(registry);
        let outcome = orchestrator.run(request(), OrchestratorConfig::default()).await;
        assert_eq!(outcome.attempt.outcome, Outcome::Ok);
        assert!(outcome.ok_body.is_some());
    }

    #[tokio::test]
    async fn falls_through_to_next_candidate_on_failure() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ScriptedProvider {
            id: "http",
            paid: false,
            responses: parking_lot::Mutex::new(vec![Ok(FetchResult { error_detail: Some("ETIMEDOUT".into()), ..Default::default() })]),
            calls: AtomicUsize::new(0),
        }));
        registry.register(Arc::new(ScriptedProvider {
            id: "flaresolverr",
            paid: false,
            responses: parking_lot::Mutex::new(vec![Ok(ok_result())]),
            calls: AtomicUsize::new(0),
        }));
        let orchestrator = orchestrator(registry);
        let outcome = orchestrator.run(request(), OrchestratorConfig::default()).await;
        assert_eq!(outcome.attempt.outcome, Outcome::Ok);
    }

    #[tokio::test]
    async fn no_candidates_synthesizes_no_providers_available() {
        let registry = ProviderRegistry::new();
        let orchestrator = orchestrator(registry);
        let outcome = orchestrator.run(request(), OrchestratorConfig::default()).await;
        assert_eq!(outcome.attempt.outcome, Outcome::NetworkError);
        assert_eq!(outcome.attempt.signals, vec!["no_providers_available".to_string()]);
    }

    #[tokio::test]
    async fn disabled_provider_is_never_invoked() {
        let mut registry = ProviderRegistry::new();
        let provider = Arc::new(ScriptedProvider {
            id: "http",
            paid: false,
            responses: parking_lot::Mutex::new(vec![Ok(ok_result())]),
            calls: AtomicUsize::new(0),
        });
        registry.register(provider.clone());
        let orchestrator = orchestrator(registry);
        let mut req = request();
        req.disabled_providers = vec![ProviderId::new("http")];
        let outcome = orchestrator.run(req, OrchestratorConfig::default()).await;
        assert_eq!(outcome.attempt.outcome, Outcome::NetworkError);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    /// Preflight early-exit per §4.8.
    #[tokio::test]
    async fn stop_after_preferred_failure_with_missing_preferred_synthesizes_unavailable() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ScriptedProvider {
            id: "http",
            paid: false,
            responses: parking_lot::Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        }));
        let orchestrator = orchestrator(registry);
        let mut req = request();
        req.stop_after_preferred_failure = true;
        req.preferred_provider = Some(ProviderId::new("brightdata"));
        let outcome = orchestrator.run(req, OrchestratorConfig::default()).await;
        assert_eq!(outcome.attempt.outcome, Outcome::PreferredUnavailable);
    }

    /// S4: an exhausted bucket with no other candidates synthesizes
    /// `rate_limited` with a suggested retry delay, not a hard failure.
    #[tokio::test]
    async fn exhausted_bucket_synthesizes_rate_limited_with_retry_after() {
        let store: Arc<dyn watchloop_state::StateStore> = Arc::new(MemoryStateStore::new());
        let lock: Arc<dyn watchloop_state::DistributedLock> = Arc::new(MemoryDistributedLock::new());
        let leases: Arc<dyn watchloop_state::LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
        let rate_limiter = RateLimiter::new(store.clone(), lock.clone());

        // Drain the http bucket's burst of 3 tokens.
        for _ in 0..3 {
            rate_limiter.consume(&ProviderId::new("http"), "shop.example", false).await;
        }

        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ScriptedProvider {
            id: "http",
            paid: false,
            responses: parking_lot::Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        }));
        let orchestrator = FetchOrchestrator::new(
            registry,
            rate_limiter,
            ConcurrencySemaphore::new(leases),
            CircuitBreaker::new(store, lock),
            BudgetGuard::new(ledger.clone(), Arc::new(StaticBudgetPolicy::new())),
            ledger,
        );

        let mut req = request();
        req.hostname = "shop.example".into();
        let outcome = orchestrator.run(req, OrchestratorConfig { allow_paid: false, ..OrchestratorConfig::default() }).await;

        assert_eq!(outcome.attempt.outcome, Outcome::RateLimited);
        assert!(outcome.retry_after_ms.is_some());
        assert!(outcome.retry_after_ms.unwrap() > 0);
    }
}
