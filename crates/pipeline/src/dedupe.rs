//! C9 — Dedupe Gate (§4.9).
//!
//! Two checks, short-circuit on first denial: dedupe-key uniqueness, then
//! per-rule cooldown. Both read through the ledger; neither mutates
//! anything — the caller (C11) persists the alert only after this gate
//! allows.

use std::sync::Arc;

use chrono::Utc;

use watchloop_core::ids::RuleId;
use watchloop_ledger::{Ledger, LedgerError};

#[derive(Debug, Clone, PartialEq)]
pub enum DedupeDecision {
    Allow,
    Deny { reason: String },
}

impl DedupeDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

pub struct DedupeGate {
    ledger: Arc<dyn Ledger>,
}

impl DedupeGate {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn check(
        &self,
        rule_id: &RuleId,
        dedupe_key: &str,
        cooldown_seconds: u64,
    ) -> Result<DedupeDecision, LedgerError> {
        if let Some(existing) = self.ledger.get_alert_by_dedupe_key(dedupe_key).await? {
            let age_secs = (Utc::now() - existing.triggered_at).num_seconds().max(0);
            return Ok(DedupeDecision::Deny { reason: format!("duplicate (age: {age_secs}s)") });
        }

        if cooldown_seconds > 0 {
            if let Some(latest) = self.ledger.get_latest_alert_for_rule(rule_id).await? {
                let cooldown_until = latest.triggered_at + chrono::Duration::seconds(cooldown_seconds as i64);
                if cooldown_until > Utc::now() {
                    let remaining = (cooldown_until - Utc::now()).num_seconds().max(0);
                    return Ok(DedupeDecision::Deny {
                        reason: format!("cooldown active ({remaining}s remaining)"),
                    });
                }
            }
        }

        Ok(DedupeDecision::Allow)
    }
}
