//! C6 — Budget Guard (§4.6).
//!
//! Paid-provider-only spend gate. The cap policy itself is pluggable
//! configuration per the spec's note that "the invariant the orchestrator
//! relies on is that the result is authoritative and cheap to query" —
//! [`BudgetPolicy`] is the seam, and [`StaticBudgetPolicy`] is the
//! reference implementation backed by per-workspace/hostname/rule caps
//! read from a rolling window of [`DomainStats`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use watchloop_core::ids::{Hostname, ProviderId, RuleId, WorkspaceId};
use watchloop_ledger::{Ledger, LedgerError};

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetDecision {
    pub can_spend_paid: bool,
    pub reason: Option<String>,
}

impl BudgetDecision {
    #[must_use]
    pub fn allow() -> Self {
        Self { can_spend_paid: true, reason: None }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { can_spend_paid: false, reason: Some(reason.into()) }
    }
}

/// One request to the budget guard (§4.6: workspace, hostname, provider,
/// ruleId, optional policy).
pub struct BudgetQuery<'a> {
    pub workspace_id: &'a WorkspaceId,
    pub hostname: &'a Hostname,
    pub provider: &'a ProviderId,
    pub rule_id: &'a RuleId,
    pub estimated_cost_usd: f64,
}

/// Pluggable cap policy. Implementations decide per-workspace/hostname/rule
/// caps; this crate only supplies the query shape and a reference
/// implementation.
pub trait BudgetPolicy: Send + Sync {
    fn workspace_cap_usd(&self, workspace_id: &WorkspaceId) -> Option<f64>;
    fn hostname_cap_usd(&self, workspace_id: &WorkspaceId, hostname: &Hostname) -> Option<f64>;
    fn rule_cap_usd(&self, rule_id: &RuleId) -> Option<f64>;
}

/// Caps keyed by workspace and by (workspace, hostname); no per-rule caps.
/// Good enough as the worker binary's default and for tests — a production
/// deployment swaps in a policy backed by the tenant config store.
#[derive(Default)]
pub struct StaticBudgetPolicy {
    workspace_caps: HashMap<String, f64>,
    hostname_caps: HashMap<(String, String), f64>,
}

impl StaticBudgetPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_workspace_cap(mut self, workspace_id: &WorkspaceId, cap_usd: f64) -> Self {
        self.workspace_caps.insert(workspace_id.as_str().to_owned(), cap_usd);
        self
    }

    #[must_use]
    pub fn with_hostname_cap(mut self, workspace_id: &WorkspaceId, hostname: &str, cap_usd: f64) -> Self {
        self.hostname_caps.insert((workspace_id.as_str().to_owned(), hostname.to_owned()), cap_usd);
        self
    }
}

impl BudgetPolicy for StaticBudgetPolicy {
    fn workspace_cap_usd(&self, workspace_id: &WorkspaceId) -> Option<f64> {
        self.workspace_caps.get(workspace_id.as_str()).copied()
    }

    fn hostname_cap_usd(&self, workspace_id: &WorkspaceId, hostname: &Hostname) -> Option<f64> {
        self.hostname_caps.get(&(workspace_id.as_str().to_owned(), hostname.clone())).copied()
    }

    fn rule_cap_usd(&self, _rule_id: &RuleId) -> Option<f64> {
        None
    }
}

pub struct BudgetGuard {
    ledger: Arc<dyn Ledger>,
    policy: Arc<dyn BudgetPolicy>,
}

impl BudgetGuard {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, policy: Arc<dyn BudgetPolicy>) -> Self {
        Self { ledger, policy }
    }

    /// Decide whether a paid-provider attempt may proceed. Only the
    /// hostname cap is currently backed by live `DomainStats` (workspace
    /// and rule caps would require a cross-hostname/cross-rule rollup this
    /// crate's ledger trait doesn't expose yet — see `DESIGN.md`).
    pub async fn can_spend_paid(&self, query: &BudgetQuery<'_>) -> Result<BudgetDecision, LedgerError> {
        if let Some(cap) = self.policy.hostname_cap_usd(query.workspace_id, query.hostname) {
            let today = Utc::now().date_naive();
            let spent = self
                .ledger
                .get_domain_stats(query.workspace_id, query.hostname, today)
                .await?
                .map_or(0.0, |stats| stats.cost_usd);
            if spent + query.estimated_cost_usd > cap {
                return Ok(BudgetDecision::deny(format!(
                    "hostname budget exceeded: {spent:.4} + {:.4} > {cap:.4}",
                    query.estimated_cost_usd
                )));
            }
        }

        if let Some(cap) = self.policy.workspace_cap_usd(query.workspace_id) {
            // Without a cross-hostname rollup this is a best-effort check
            // against the same day's hostname spend only.
            let today = Utc::now().date_naive();
            let spent = self
                .ledger
                .get_domain_stats(query.workspace_id, query.hostname, today)
                .await?
                .map_or(0.0, |stats| stats.cost_usd);
            if spent + query.estimated_cost_usd > cap {
                return Ok(BudgetDecision::deny(format!(
                    "workspace budget exceeded: {spent:.4} + {:.4} > {cap:.4}",
                    query.estimated_cost_usd
                )));
            }
        }

        let _ = self.policy.rule_cap_usd(query.rule_id);
        Ok(BudgetDecision::allow())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use watchloop_core::classify::Outcome;
    use watchloop_ledger_memory::MemoryLedger;

    use super::*;

    fn ids() -> (WorkspaceId, Hostname, ProviderId, RuleId) {
        (WorkspaceId::new("ws1"), "etsy.com".to_string(), ProviderId::new("brightdata"), RuleId::new("r1"))
    }

    #[tokio::test]
    async fn no_policy_cap_allows() {
        let ledger = Arc::new(MemoryLedger::new());
        let guard = BudgetGuard::new(ledger, Arc::new(StaticBudgetPolicy::new()));
        let (ws, host, provider, rule) = ids();
        let query = BudgetQuery {
            workspace_id: &ws,
            hostname: &host,
            provider: &provider,
            rule_id: &rule,
            estimated_cost_usd: 0.01,
        };
        assert!(guard.can_spend_paid(&query).await.unwrap().can_spend_paid);
    }

    #[tokio::test]
    async fn hostname_cap_denies_once_exceeded() {
        let ledger = Arc::new(MemoryLedger::new());
        let (ws, host, provider, rule) = ids();
        ledger
            .record_domain_stats(&ws, &host, Utc::now().date_naive(), Outcome::Ok, 100, 4.99)
            .await
            .unwrap();
        let policy = StaticBudgetPolicy::new().with_hostname_cap(&ws, &host, 5.0);
        let guard = BudgetGuard::new(ledger, Arc::new(policy));
        let query =
            BudgetQuery { workspace_id: &ws, hostname: &host, provider: &provider, rule_id: &rule, estimated_cost_usd: 0.5 };
        let decision = guard.can_spend_paid(&query).await.unwrap();
        assert!(!decision.can_spend_paid);
        assert!(decision.reason.is_some());
    }

    #[tokio::test]
    async fn hostname_cap_allows_under_threshold() {
        let ledger = Arc::new(MemoryLedger::new());
        let (ws, host, provider, rule) = ids();
        let policy = StaticBudgetPolicy::new().with_hostname_cap(&ws, &host, 5.0);
        let guard = BudgetGuard::new(ledger, Arc::new(policy));
        let query =
            BudgetQuery { workspace_id: &ws, hostname: &host, provider: &provider, rule_id: &rule, estimated_cost_usd: 0.5 };
        assert!(guard.can_spend_paid(&query).await.unwrap().can_spend_paid);
    }
}
