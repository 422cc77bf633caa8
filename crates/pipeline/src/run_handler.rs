//! C11 — Run Handler (§4.11).
//!
//! Top-level `rules:run` job handler: loads the rule and last observation,
//! calls the Fetch Orchestrator (C8), hands a successful body to the
//! extractor boundary, runs the Change Detector (C2) and condition
//! evaluator, consults the Dedupe Gate (C9), and — when warranted —
//! persists an Alert (C10) and enqueues its dispatch (C12). Every early
//! return point is one of the spec's named outcomes; nothing here retries
//! or loops beyond what the queue's own retry policy provides (§6).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use watchloop_core::ids::WorkspaceId;
use watchloop_core::{Alert, AlertDispatchJob, JobTrigger, Observation, RunJob};
use watchloop_ledger::Ledger;

use crate::alert_gen;
use crate::condition::ConditionEvaluator;
use crate::dedupe::DedupeGate;
use crate::error::PipelineError;
use crate::extractor::Extractor;
use crate::orchestrator::{FetchOrchestrator, OrchestratorConfig, OrchestratorRequest};
use crate::queue::{DispatchQueue, RunQueue};
use crate::rule_source::RuleSource;

/// Lower and upper bound on the deferred re-run delay (§4.11 step 4: "bounded
/// e.g. 30s-5min"), applied to whatever the rate limiter/semaphore
/// suggested as `retry_after_ms`.
const MIN_DEFER_DELAY: Duration = Duration::from_secs(30);
const MAX_DEFER_DELAY: Duration = Duration::from_secs(5 * 60);

/// Tier policy resolution (§6: `TIER_POLICY_ENABLED`, `CANARY_WORKSPACE_IDS`).
/// The policy engine proper — per-tier timeout/attempt tables, per-workspace
/// overrides — is pluggable configuration outside the core's scope; this is
/// just the feature-flag gate the run handler checks before trusting a
/// rule's own fetch policy to allow paid providers.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    pub enabled: bool,
    pub canary_workspaces: HashSet<WorkspaceId>,
    pub default_max_attempts_per_run: u32,
    pub default_allow_paid: bool,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            canary_workspaces: HashSet::new(),
            default_max_attempts_per_run: OrchestratorConfig::default().max_attempts_per_run,
            default_allow_paid: OrchestratorConfig::default().allow_paid,
        }
    }
}

impl TierPolicy {
    /// Whether `workspace_id` gets the tier-aware policy at all. An empty
    /// `canary_workspaces` set means "global rollout" per §6/GLOSSARY.
    #[must_use]
    pub fn applies_to(&self, workspace_id: &WorkspaceId) -> bool {
        self.enabled && (self.canary_workspaces.is_empty() || self.canary_workspaces.contains(workspace_id))
    }
}

pub struct RunHandler {
    rule_source: Arc<dyn RuleSource>,
    ledger: Arc<dyn Ledger>,
    orchestrator: Arc<FetchOrchestrator>,
    extractor: Arc<dyn Extractor>,
    condition_evaluator: Arc<dyn ConditionEvaluator>,
    dedupe_gate: DedupeGate,
    run_queue: Arc<dyn RunQueue>,
    dispatch_queue: Arc<dyn DispatchQueue>,
    tier_policy: TierPolicy,
}

impl RunHandler {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rule_source: Arc<dyn RuleSource>,
        ledger: Arc<dyn Ledger>,
        orchestrator: Arc<FetchOrchestrator>,
        extractor: Arc<dyn Extractor>,
        condition_evaluator: Arc<dyn ConditionEvaluator>,
        run_queue: Arc<dyn RunQueue>,
        dispatch_queue: Arc<dyn DispatchQueue>,
        tier_policy: TierPolicy,
    ) -> Self {
        let dedupe_gate = DedupeGate::new(ledger.clone());
        Self {
            rule_source,
            ledger,
            orchestrator,
            extractor,
            condition_evaluator,
            dedupe_gate,
            run_queue,
            dispatch_queue,
            tier_policy,
        }
    }

    #[instrument(skip(self, job), fields(rule_id = %job.rule_id, trigger = ?job.trigger))]
    pub async fn handle(&self, job: RunJob) -> Result<(), PipelineError> {
        // Step 1: load rule + last observation.
        let rule = self
            .rule_source
            .get_rule(&job.rule_id)
            .await?
            .ok_or_else(|| PipelineError::RuleNotFound(job.rule_id.clone()))?;
        let old_observation = self.ledger.get_observation(&rule.id).await?;

        // Step 2: resolve fetch policy. Workspaces the tier policy doesn't
        // cover keep legacy behavior (paid providers always eligible);
        // covered workspaces get the configured default.
        let allow_paid = if self.tier_policy.applies_to(&rule.workspace_id) {
            self.tier_policy.default_allow_paid
        } else {
            true
        };
        let hostname = url::Url::parse(&rule.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .ok_or_else(|| PipelineError::InvalidUrl(rule.url.clone()))?;

        let request = OrchestratorRequest {
            workspace_id: rule.workspace_id.clone(),
            rule_id: rule.id.clone(),
            url: rule.url.clone(),
            hostname,
            headers: rule.fetch_policy.headers.clone(),
            user_agent: rule.fetch_policy.user_agent.clone(),
            timeout_ms: rule.fetch_policy.timeout_ms,
            render_wait_ms: rule.fetch_policy.render_wait_ms,
            flaresolverr_wait_seconds: rule.fetch_policy.flaresolverr_wait_seconds,
            preferred_provider: rule.fetch_policy.preferred_provider.clone(),
            disabled_providers: rule.fetch_policy.disabled_providers.clone(),
            stop_after_preferred_failure: rule.fetch_policy.stop_after_preferred_failure,
            geo_country: rule.fetch_policy.geo_country.clone(),
        };
        let config = OrchestratorConfig {
            max_attempts_per_run: self.tier_policy.default_max_attempts_per_run,
            allow_paid,
            ..OrchestratorConfig::default()
        };

        // Step 3: fetch.
        let outcome = self.orchestrator.run(request, config).await;

        // Step 4: rate_limited defers instead of failing the run.
        if outcome.attempt.outcome == watchloop_core::classify::Outcome::RateLimited {
            let delay = outcome
                .retry_after_ms
                .map(Duration::from_millis)
                .unwrap_or(MIN_DEFER_DELAY)
                .clamp(MIN_DEFER_DELAY, MAX_DEFER_DELAY);
            let deferred = RunJob { rule_id: rule.id.clone(), trigger: JobTrigger::Deferred, scheduled_at: Utc::now() };
            self.run_queue.enqueue_delayed(deferred, delay).await?;
            info!(delay_ms = delay.as_millis() as u64, "deferred rule run after rate limit");
            return Ok(());
        }

        // Step 5: any other non-ok outcome is a failed run; record health
        // and stop. Rule health storage is part of the tenant layer (§1,
        // out of scope) — recorded here as a structured log event only.
        if outcome.attempt.outcome != watchloop_core::classify::Outcome::Ok {
            warn!(
                workspace_id = %rule.workspace_id,
                rule_id = %rule.id,
                outcome = ?outcome.attempt.outcome,
                "rule health: fetch did not succeed"
            );
            return Ok(());
        }

        let Some(body) = outcome.ok_body else {
            warn!(rule_id = %rule.id, "ok outcome carried no body; treating as fetch failure");
            return Ok(());
        };

        // Step 6: extraction. Failure or null-yield is non-fatal but
        // leaves the observation untouched.
        let extraction = self
            .extractor
            .extract(&body, rule.rule_type, &rule.extraction_spec, outcome.country_used.as_deref())
            .await;
        let new_value = match extraction {
            Ok(Some(value)) => value,
            Ok(None) => {
                warn!(rule_id = %rule.id, "rule health: extraction yielded no value");
                return Ok(());
            }
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "rule health: extraction failed");
                return Ok(());
            }
        };

        // Step 7: change detection.
        let old_value = old_observation.as_ref().map(|o| &o.value);
        let change = watchloop_core::detect_change(old_value, Some(&new_value), rule.rule_type);

        // Step 8: condition evaluation.
        let triggered = self.condition_evaluator.evaluate(old_value, &new_value, &rule.conditions).await;

        let now = Utc::now();
        let observation =
            Observation { rule_id: rule.id.clone(), workspace_id: rule.workspace_id.clone(), value: new_value.clone(), observed_at: now };

        // Step 9: no conditions fired — the change (if any) isn't
        // alert-worthy. Advance the observation and stop.
        if triggered.is_empty() {
            self.ledger.put_observation(observation).await?;
            return Ok(());
        }

        // Step 10: dedupe gate.
        let dedupe_key = alert_gen::dedupe_key(&rule, &triggered, &new_value, now);
        let decision = self.dedupe_gate.check(&rule.id, &dedupe_key, rule.cooldown_seconds).await?;
        if !decision.is_allowed() {
            self.ledger.put_observation(observation).await?;
            return Ok(());
        }

        // Step 11: generate, persist, enqueue dispatch.
        let alert = alert_gen::generate_alert(
            &rule,
            &triggered,
            new_value,
            old_observation.map(|o| o.value),
            change.change_kind,
            change.diff_summary,
            now,
        );
        self.persist_and_dispatch(alert, observation).await
    }

    async fn persist_and_dispatch(&self, alert: Alert, observation: Observation) -> Result<(), PipelineError> {
        let dedupe_key = alert.dedupe_key.clone();
        let alert_id = alert.id.clone();
        let channels = alert.channels.clone();

        match self.ledger.insert_alert(alert).await {
            Ok(()) => {}
            Err(watchloop_ledger::LedgerError::DuplicateDedupeKey(_)) => {
                // Lost a race with another replica inserting the same key
                // (P9). The other run already enqueued dispatch; just
                // advance the observation and stop.
                self.ledger.put_observation(observation).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.ledger.put_observation(observation).await?;

        let job = AlertDispatchJob { alert_id, channels, dedupe_key: dedupe_key.clone() };
        let job_id = AlertDispatchJob::job_id(&dedupe_key, Utc::now());
        self.dispatch_queue.enqueue(job_id, job).await?;
        Ok(())
    }
}
