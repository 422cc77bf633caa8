//! Rule entity: the tenant-defined monitor the rest of the pipeline serves.
//! Owned and edited externally; the core only ever reads one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::alert::Severity;
use crate::ids::{ProviderId, RuleId, WorkspaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Price,
    Availability,
    Number,
    Text,
    JsonField,
}

/// A condition's `type` is defined by the (external) condition evaluator's
/// plugin set — `price_below`, `price_drop_percent`, `availability_changed`,
/// and so on — so the core treats it as an opaque identifier rather than a
/// closed enum, same as the extraction spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionKind(pub String);

impl ConditionKind {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConditionKind {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    pub value: serde_json::Value,
    pub severity: Severity,
}

/// The fetch profile carried on a rule: provider preference, disablement,
/// and per-request tuning. `stop_after_preferred_failure` and the provider
/// fields feed directly into the Fetch Orchestrator's `FetchRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchPolicy {
    pub preferred_provider: Option<ProviderId>,
    #[serde(default)]
    pub disabled_providers: Vec<ProviderId>,
    #[serde(default)]
    pub stop_after_preferred_failure: bool,
    pub geo_country: Option<String>,
    pub timeout_ms: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub user_agent: Option<String>,
    pub render_wait_ms: Option<u64>,
    pub flaresolverr_wait_seconds: Option<u64>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            preferred_provider: None,
            disabled_providers: Vec::new(),
            stop_after_preferred_failure: false,
            geo_country: None,
            timeout_ms: 30_000,
            headers: HashMap::new(),
            user_agent: None,
            render_wait_ms: None,
            flaresolverr_wait_seconds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub workspace_id: WorkspaceId,
    pub rule_type: RuleType,
    pub name: String,
    pub url: String,
    /// Selector/attribute/fallback-selector/fingerprint payload. Opaque to
    /// the core — only the extractor boundary interprets it.
    pub extraction_spec: serde_json::Value,
    pub fetch_policy: FetchPolicy,
    pub conditions: Vec<AlertCondition>,
    pub cooldown_seconds: u64,
    /// Notification channel ids an alert on this rule dispatches to (C12).
    #[serde(default)]
    pub channels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_kind_round_trips_as_plain_string() {
        let kind = ConditionKind::new("price_below");
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"price_below\"");
    }

    #[test]
    fn default_fetch_policy_does_not_stop_after_preferred_failure() {
        assert!(!FetchPolicy::default().stop_after_preferred_failure);
    }
}
