use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;

use watchloop_core::classify::Outcome;
use watchloop_core::ids::{Hostname, RuleId, WorkspaceId};
use watchloop_core::{Alert, DomainStats, FetchAttempt, Observation};
use watchloop_ledger::error::LedgerError;
use watchloop_ledger::store::Ledger;

fn stats_key(workspace_id: &WorkspaceId, hostname: &str, day: NaiveDate) -> String {
    format!("{workspace_id}:{hostname}:{day}")
}

/// Single-process in-memory [`Ledger`], used by the worker binary when no
/// Postgres URL is configured, and as the default test double elsewhere in
/// the workspace.
#[derive(Default)]
pub struct MemoryLedger {
    attempts: Mutex<Vec<FetchAttempt>>,
    domain_stats: DashMap<String, DomainStats>,
    observations: DashMap<String, Observation>,
    alerts_by_id: DashMap<String, Alert>,
    alerts_by_dedupe_key: DashMap<String, String>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts recorded so far, in invocation order. Not part of the
    /// [`Ledger`] trait — exposed for tests that assert on the ledger's
    /// append-only log directly.
    pub fn attempts(&self) -> Vec<FetchAttempt> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn log_attempt(&self, attempt: FetchAttempt) -> Result<(), LedgerError> {
        self.attempts.lock().push(attempt);
        Ok(())
    }

    async fn record_domain_stats(
        &self,
        workspace_id: &WorkspaceId,
        hostname: &Hostname,
        day: NaiveDate,
        outcome: Outcome,
        latency_ms: u64,
        cost_usd: f64,
    ) -> Result<(), LedgerError> {
        let key = stats_key(workspace_id, hostname, day);
        let mut entry = self
            .domain_stats
            .entry(key)
            .or_insert_with(|| DomainStats::new(workspace_id.clone(), hostname.clone(), day));
        entry.record(outcome, latency_ms, cost_usd);
        Ok(())
    }

    async fn get_domain_stats(
        &self,
        workspace_id: &WorkspaceId,
        hostname: &Hostname,
        day: NaiveDate,
    ) -> Result<Option<DomainStats>, LedgerError> {
        let key = stats_key(workspace_id, hostname, day);
        Ok(self.domain_stats.get(&key).map(|e| e.clone()))
    }

    async fn get_observation(&self, rule_id: &RuleId) -> Result<Option<Observation>, LedgerError> {
        Ok(self.observations.get(rule_id.as_str()).map(|e| e.clone()))
    }

    async fn put_observation(&self, observation: Observation) -> Result<(), LedgerError> {
        self.observations.insert(observation.rule_id.as_str().to_owned(), observation);
        Ok(())
    }

    async fn get_alert_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<Alert>, LedgerError> {
        let Some(id) = self.alerts_by_dedupe_key.get(dedupe_key).map(|e| e.clone()) else {
            return Ok(None);
        };
        Ok(self.alerts_by_id.get(&id).map(|e| e.clone()))
    }

    async fn get_latest_alert_for_rule(&self, rule_id: &RuleId) -> Result<Option<Alert>, LedgerError> {
        Ok(self
            .alerts_by_id
            .iter()
            .filter(|e| e.rule_id == *rule_id)
            .map(|e| e.clone())
            .max_by_key(|a| a.triggered_at))
    }

    async fn insert_alert(&self, alert: Alert) -> Result<(), LedgerError> {
        if self.alerts_by_dedupe_key.contains_key(&alert.dedupe_key) {
            return Err(LedgerError::DuplicateDedupeKey(alert.dedupe_key));
        }
        self.alerts_by_dedupe_key.insert(alert.dedupe_key.clone(), alert.id.clone());
        self.alerts_by_id.insert(alert.id.clone(), alert);
        Ok(())
    }
}
