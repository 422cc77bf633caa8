//! The [`Ledger`] trait: the transactional side of the data model (§5,
//! "Shared resource policy") — append-only attempt log, domain stats,
//! observations, and alerts. Distinct from the shared-cache state crate,
//! which holds circuit breaker state, token buckets, and leases.

use async_trait::async_trait;
use chrono::NaiveDate;

use watchloop_core::{Alert, DomainStats, FetchAttempt, Observation};
use watchloop_core::classify::Outcome;
use watchloop_core::ids::{Hostname, RuleId, WorkspaceId};

use crate::error::LedgerError;

/// Trait for ledger storage backends (C7's backing store, and the
/// Observation/Alert tables C9–C11 read and write).
///
/// Implementations must be `Send + Sync` to be shared across async tasks.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append a [`FetchAttempt`] row. Written synchronously so the record
    /// exists before the orchestrator moves on (§4.7). Must never raise —
    /// callers that can't tolerate a write failure should still continue
    /// the fetch; see [`watchloop_core`] invariant P7.
    async fn log_attempt(&self, attempt: FetchAttempt) -> Result<(), LedgerError>;

    /// Fold one attempt's outcome, latency, and cost into the
    /// `(workspace, hostname, day)` rolling aggregate (§4.7, fire-and-forget
    /// on the caller's side — the call itself is ordinary and fallible,
    /// only the *scheduling* of it is fire-and-forget).
    async fn record_domain_stats(
        &self,
        workspace_id: &WorkspaceId,
        hostname: &Hostname,
        day: NaiveDate,
        outcome: Outcome,
        latency_ms: u64,
        cost_usd: f64,
    ) -> Result<(), LedgerError>;

    /// Read the current rolling aggregate, if any attempts have been
    /// recorded for that domain/day yet.
    async fn get_domain_stats(
        &self,
        workspace_id: &WorkspaceId,
        hostname: &Hostname,
        day: NaiveDate,
    ) -> Result<Option<DomainStats>, LedgerError>;

    /// Last stable normalized value recorded for a rule, used as the
    /// "old" side of C2's change detection.
    async fn get_observation(&self, rule_id: &RuleId) -> Result<Option<Observation>, LedgerError>;

    /// Overwrite the rule's observation. Last-write-wins is acceptable
    /// (§5, "Ordering guarantees") — repeated identical observations are
    /// idempotent.
    async fn put_observation(&self, observation: Observation) -> Result<(), LedgerError>;

    /// Look up an alert by its unique dedupe key (C9 key-uniqueness check).
    async fn get_alert_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<Alert>, LedgerError>;

    /// Most recently triggered alert for a rule, for the C9 cooldown check.
    /// Callers compare `triggered_at` against `now - cooldown_seconds`
    /// themselves so this trait stays free of wall-clock concerns.
    async fn get_latest_alert_for_rule(&self, rule_id: &RuleId) -> Result<Option<Alert>, LedgerError>;

    /// Persist a new alert.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateDedupeKey`] if `dedupe_key` already
    /// exists (P9: dedupe key is unique across all alerts).
    async fn insert_alert(&self, alert: Alert) -> Result<(), LedgerError>;
}
