//! C10 — Alert Generator (§4.10).
//!
//! Pure composition: given a rule, the triggered conditions, and the new
//! (and optionally old) normalized value, produce an [`Alert`]'s title,
//! body, severity rollup, and canonical dedupe key. Nothing here touches
//! the ledger — C11 persists what this returns.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use watchloop_core::alert::Severity;
use watchloop_core::change::ChangeKind;
use watchloop_core::rule::Rule;
use watchloop_core::{Alert, NormalizedValue};

use crate::condition::TriggeredCondition;

const DEDUPE_KEY_HEX_LEN: usize = 16;

/// `sha256(ruleId | sortedConditionTypes | stableJSON(normalizedValue) |
/// floor(now / 300s))`, truncated to 16 hex chars (§4.10).
#[must_use]
pub fn dedupe_key(rule: &Rule, triggered: &[TriggeredCondition], new_value: &NormalizedValue, now: DateTime<Utc>) -> String {
    let mut kinds: Vec<&str> = triggered.iter().map(|t| t.condition.kind.as_str()).collect();
    kinds.sort_unstable();
    let bucket = now.timestamp() / 300;
    let material = format!("{}|{}|{}|{bucket}", rule.id.as_str(), kinds.join(","), new_value.stable_json());

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..DEDUPE_KEY_HEX_LEN].to_owned()
}

fn format_value(value: &NormalizedValue) -> String {
    match value {
        NormalizedValue::Price { value_low, currency, value, .. } => {
            format!("{:.2} {currency}", value.unwrap_or(*value_low))
        }
        NormalizedValue::Availability { status, lead_time_days } => match lead_time_days {
            Some(days) => format!("{status} (lead time {days}d)"),
            None => status.clone(),
        },
        NormalizedValue::Number { value } => value.to_string(),
        NormalizedValue::Text { snippet } => snippet.clone(),
        NormalizedValue::Json { raw } => raw.to_string(),
    }
}

fn title_for(triggered: &[TriggeredCondition]) -> String {
    let Some(primary) = triggered.first() else {
        return "Rule condition triggered".to_owned();
    };
    match primary.condition.kind.as_str() {
        "price_below" => "Price dropped below threshold".to_owned(),
        "price_drop_percent" => "Price dropped sharply".to_owned(),
        "availability_equals" => "Availability changed".to_owned(),
        "number_above" | "number_below" => "Tracked number crossed threshold".to_owned(),
        "text_contains" => "Tracked text matched".to_owned(),
        "json_field_equals" => "Tracked field changed".to_owned(),
        other => format!("Condition \"{other}\" triggered"),
    }
}

fn body_for(
    rule: &Rule,
    triggered: &[TriggeredCondition],
    new_value: &NormalizedValue,
    diff_summary: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let mut lines = vec![
        format!("Rule: {}", rule.name),
        format!("URL: {}", rule.url),
        format!("Current value: {}", format_value(new_value)),
    ];
    if let Some(diff) = diff_summary {
        lines.push(format!("Change: {diff}"));
    }
    lines.push("Triggered conditions:".to_owned());
    for t in triggered {
        lines.push(format!("  - {} [{:?}]", t.condition.kind.as_str(), t.condition.severity));
    }
    lines.push(format!("Triggered at: {}", now.to_rfc3339()));
    lines.push(format!("Rule id: {}", rule.id.as_str()));
    lines.join("\n")
}

/// Compose the full alert for a rule whose conditions just fired. Severity
/// is the max across `triggered` (`Severity::highest`); callers only call
/// this once at least one condition has fired (§4.11 step 11).
#[must_use]
pub fn generate_alert(
    rule: &Rule,
    triggered: &[TriggeredCondition],
    new_value: NormalizedValue,
    previous_value: Option<NormalizedValue>,
    change_kind: Option<ChangeKind>,
    diff_summary: Option<String>,
    now: DateTime<Utc>,
) -> Alert {
    let severity = Severity::highest(triggered.iter().map(|t| t.condition.severity)).unwrap_or(Severity::Info);
    let title = title_for(triggered);
    let body = body_for(rule, triggered, &new_value, diff_summary.as_deref(), now);
    let key = dedupe_key(rule, triggered, &new_value, now);

    Alert {
        id: uuid::Uuid::new_v4().to_string(),
        dedupe_key: key,
        rule_id: rule.id.clone(),
        workspace_id: rule.workspace_id.clone(),
        severity,
        title,
        body,
        triggered_at: now,
        current_value: new_value,
        previous_value,
        change_kind,
        diff_summary,
        channels: rule.channels.clone(),
    }
}

#[cfg(test)]
mod tests {
    use watchloop_core::ids::{RuleId, WorkspaceId};
    use watchloop_core::rule::{AlertCondition, ConditionKind, FetchPolicy, RuleType};

    use super::*;

    fn rule() -> Rule {
        Rule {
            id: RuleId::new("r1"),
            workspace_id: WorkspaceId::new("ws1"),
            rule_type: RuleType::Price,
            name: "Widget".into(),
            url: "https://shop.example/widget".into(),
            extraction_spec: serde_json::json!({}),
            fetch_policy: FetchPolicy::default(),
            conditions: vec![],
            cooldown_seconds: 0,
            channels: vec!["webhook".into(), "email".into()],
        }
    }

    fn triggered(kind: &str, severity: Severity) -> Vec<TriggeredCondition> {
        vec![TriggeredCondition {
            condition: AlertCondition { id: "c1".into(), kind: ConditionKind::new(kind), value: serde_json::json!(1), severity },
        }]
    }

    fn price(low: f64) -> NormalizedValue {
        NormalizedValue::Price { value_low: low, value_high: None, currency: "USD".into(), value: None }
    }

    #[test]
    fn dedupe_key_is_stable_within_same_five_minute_bucket() {
        let rule = rule();
        let triggered = triggered("price_below", Severity::Warning);
        let now = Utc::now();
        let a = dedupe_key(&rule, &triggered, &price(799.0), now);
        let b = dedupe_key(&rule, &triggered, &price(799.0), now + chrono::Duration::seconds(10));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn dedupe_key_differs_for_different_values() {
        let rule = rule();
        let triggered = triggered("price_below", Severity::Warning);
        let now = Utc::now();
        let a = dedupe_key(&rule, &triggered, &price(799.0), now);
        let b = dedupe_key(&rule, &triggered, &price(750.0), now);
        assert_ne!(a, b);
    }

    #[test]
    fn generated_alert_carries_rule_channels_and_highest_severity() {
        let rule = rule();
        let triggered = triggered("price_below", Severity::Critical);
        let alert = generate_alert(&rule, &triggered, price(799.0), Some(price(999.0)), Some(ChangeKind::ValueChanged), Some("dropped".into()), Utc::now());
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.channels, vec!["webhook".to_string(), "email".to_string()]);
        assert!(alert.body.contains("Widget"));
        assert!(alert.body.contains("dropped"));
    }
}
