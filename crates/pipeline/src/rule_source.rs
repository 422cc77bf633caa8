//! Rule lookup boundary.
//!
//! `spec.md` treats Rule storage as part of the out-of-scope persistence
//! layer, but the Run Handler (C11) still needs *some* way to resolve a
//! `RunJob`'s `ruleId` into a `Rule`. This is a small, separate trait from
//! [`watchloop_ledger::Ledger`] because the ledger owns the entities C7/C9/
//! C11 write (attempts, domain stats, observations, alerts) — Rule is
//! read-only here and comes from elsewhere (the tenant/workspace CRUD
//! layer, explicitly out of scope per spec §1).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use watchloop_core::ids::RuleId;
use watchloop_core::Rule;

#[derive(Debug, Error)]
pub enum RuleSourceError {
    #[error("rule source backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn get_rule(&self, rule_id: &RuleId) -> Result<Option<Rule>, RuleSourceError>;
}

/// In-memory rule source: the test/single-process double, and what a
/// worker falls back to when no external rule-config source is wired up.
#[derive(Default)]
pub struct MemoryRuleSource {
    rules: Arc<DashMap<String, Rule>>,
}

impl MemoryRuleSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, rule: Rule) {
        self.rules.insert(rule.id.as_str().to_owned(), rule);
    }
}

#[async_trait]
impl RuleSource for MemoryRuleSource {
    async fn get_rule(&self, rule_id: &RuleId) -> Result<Option<Rule>, RuleSourceError> {
        Ok(self.rules.get(rule_id.as_str()).map(|r| r.clone()))
    }
}
