//! §4.14 — Condition evaluator boundary (reference implementation).
//!
//! `spec.md` §4.11 step 8 names an external condition evaluator without
//! specifying its condition-type vocabulary. This module implements the
//! types implied by §8's S1/S2 scenarios — `price_below`,
//! `price_drop_percent`, and a generic equality/threshold check usable
//! across `Number`/`Text`/`Json` values — behind a trait so a production
//! evaluator with a richer plugin set can replace it without touching C9.

use async_trait::async_trait;

use watchloop_core::rule::AlertCondition;
use watchloop_core::NormalizedValue;

#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredCondition {
    pub condition: AlertCondition,
}

#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// Which of `conditions` fire for `new_value`, given `old_value` for
    /// diff-relative checks like `price_drop_percent`. Order of the
    /// returned list matches the order conditions were declared on the
    /// rule.
    async fn evaluate(
        &self,
        old_value: Option<&NormalizedValue>,
        new_value: &NormalizedValue,
        conditions: &[AlertCondition],
    ) -> Vec<TriggeredCondition>;
}

pub struct StandardConditionEvaluator;

impl StandardConditionEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn fires(old: Option<&NormalizedValue>, new: &NormalizedValue, condition: &AlertCondition) -> bool {
        match condition.kind.as_str() {
            "price_below" => {
                let Some(threshold) = condition.value.as_f64() else { return false };
                new.price_low().is_some_and(|price| price <= threshold)
            }
            "price_drop_percent" => {
                let Some(threshold_pct) = condition.value.as_f64() else { return false };
                let (Some(old_price), Some(new_price)) = (old.and_then(NormalizedValue::price_low), new.price_low())
                else {
                    return false;
                };
                if old_price <= 0.0 {
                    return false;
                }
                let drop_pct = (old_price - new_price) / old_price * 100.0;
                drop_pct >= threshold_pct
            }
            "availability_equals" => {
                let Some(expected) = condition.value.as_str() else { return false };
                matches!(new, NormalizedValue::Availability { status, .. } if status == expected)
            }
            "number_above" => {
                let Some(threshold) = condition.value.as_f64() else { return false };
                matches!(new, NormalizedValue::Number { value } if *value >= threshold)
            }
            "number_below" => {
                let Some(threshold) = condition.value.as_f64() else { return false };
                matches!(new, NormalizedValue::Number { value } if *value <= threshold)
            }
            "text_contains" => {
                let Some(needle) = condition.value.as_str() else { return false };
                matches!(new, NormalizedValue::Text { snippet } if snippet.contains(needle))
            }
            "json_field_equals" => match new {
                NormalizedValue::Json { raw } => path_equals(raw, &condition.value),
                _ => false,
            },
            _ => false,
        }
    }
}

impl Default for StandardConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// `condition.value` shaped `{"path": "a.b.c", "equals": <json>}`.
fn path_equals(raw: &serde_json::Value, spec: &serde_json::Value) -> bool {
    let (Some(path), Some(expected)) = (spec.get("path").and_then(serde_json::Value::as_str), spec.get("equals"))
    else {
        return false;
    };
    let mut cursor = raw;
    for segment in path.split('.') {
        let Some(next) = cursor.get(segment) else { return false };
        cursor = next;
    }
    cursor == expected
}

#[async_trait]
impl ConditionEvaluator for StandardConditionEvaluator {
    async fn evaluate(
        &self,
        old_value: Option<&NormalizedValue>,
        new_value: &NormalizedValue,
        conditions: &[AlertCondition],
    ) -> Vec<TriggeredCondition> {
        conditions
            .iter()
            .filter(|c| Self::fires(old_value, new_value, c))
            .cloned()
            .map(|condition| TriggeredCondition { condition })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use watchloop_core::alert::Severity;
    use watchloop_core::rule::ConditionKind;

    use super::*;

    fn condition(kind: &str, value: serde_json::Value) -> AlertCondition {
        AlertCondition { id: "c1".into(), kind: ConditionKind::new(kind), value, severity: Severity::Warning }
    }

    fn price(low: f64) -> NormalizedValue {
        NormalizedValue::Price { value_low: low, value_high: None, currency: "USD".into(), value: None }
    }

    /// S1
    #[tokio::test]
    async fn price_below_fires_when_new_price_at_or_under_threshold() {
        let evaluator = StandardConditionEvaluator::new();
        let conditions = vec![condition("price_below", serde_json::json!(800.0))];
        let triggered = evaluator.evaluate(None, &price(799.0), &conditions).await;
        assert_eq!(triggered.len(), 1);
    }

    #[tokio::test]
    async fn price_below_does_not_fire_above_threshold() {
        let evaluator = StandardConditionEvaluator::new();
        let conditions = vec![condition("price_below", serde_json::json!(500.0))];
        let triggered = evaluator.evaluate(None, &price(799.0), &conditions).await;
        assert!(triggered.is_empty());
    }

    /// S2
    #[tokio::test]
    async fn price_drop_percent_needs_old_value_and_fires_past_threshold() {
        let evaluator = StandardConditionEvaluator::new();
        let conditions = vec![condition("price_drop_percent", serde_json::json!(15.0))];
        let old = price(999.0);
        let new = price(799.0);
        let triggered = evaluator.evaluate(Some(&old), &new, &conditions).await;
        assert_eq!(triggered.len(), 1);
    }

    #[tokio::test]
    async fn price_drop_percent_with_no_old_value_never_fires() {
        let evaluator = StandardConditionEvaluator::new();
        let conditions = vec![condition("price_drop_percent", serde_json::json!(1.0))];
        let triggered = evaluator.evaluate(None, &price(1.0), &conditions).await;
        assert!(triggered.is_empty());
    }

    #[tokio::test]
    async fn unknown_condition_type_never_fires() {
        let evaluator = StandardConditionEvaluator::new();
        let conditions = vec![condition("made_up_kind", serde_json::json!(1.0))];
        let triggered = evaluator.evaluate(None, &price(1.0), &conditions).await;
        assert!(triggered.is_empty());
    }

    #[tokio::test]
    async fn json_field_equals_checks_nested_path() {
        let evaluator = StandardConditionEvaluator::new();
        let conditions =
            vec![condition("json_field_equals", serde_json::json!({"path": "stock.level", "equals": 0}))];
        let new = NormalizedValue::Json { raw: serde_json::json!({"stock": {"level": 0}}) };
        let triggered = evaluator.evaluate(None, &new, &conditions).await;
        assert_eq!(triggered.len(), 1);
    }
}
