//! C2 — Change Detector.
//!
//! Pure function comparing the last stable observation against a fresh
//! normalized value and producing a change classification plus a
//! human-readable diff, dispatched by rule type. Price comparisons use
//! low-price-first semantics: a currency flip always alerts regardless of
//! the numeric delta, because it signals a different market context, not
//! a real price movement.

use serde::{Deserialize, Serialize};

use crate::rule::RuleType;
use crate::value::NormalizedValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    NewValue,
    ValueDisappeared,
    ValueChanged,
    FormatChanged,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeResult {
    pub change_kind: Option<ChangeKind>,
    pub diff_summary: Option<String>,
}

impl ChangeResult {
    fn kind(kind: ChangeKind, summary: impl Into<String>) -> Self {
        Self {
            change_kind: Some(kind),
            diff_summary: Some(summary.into()),
        }
    }

    fn none() -> Self {
        Self {
            change_kind: None,
            diff_summary: None,
        }
    }

    fn informational(summary: impl Into<String>) -> Self {
        Self {
            change_kind: None,
            diff_summary: Some(summary.into()),
        }
    }
}

/// Compare `old` to `new` for a rule of type `rule_type`. `old` is `None`
/// on a rule's first successful run; `new` is `None` only when the caller
/// is checking disappearance (the run handler never calls this with a
/// `None` new value produced by successful extraction, since extraction
/// failure short-circuits before C2 runs — see §4.11 step 6).
pub fn detect_change(
    old: Option<&NormalizedValue>,
    new: Option<&NormalizedValue>,
    rule_type: RuleType,
) -> ChangeResult {
    let (old, new) = match (old, new) {
        (None, Some(new)) => {
            return ChangeResult::kind(
                ChangeKind::NewValue,
                format!("initial value: {}", describe(new)),
            );
        }
        (Some(old), None) => {
            return ChangeResult::kind(
                ChangeKind::ValueDisappeared,
                format!("value disappeared (last seen: {})", describe(old)),
            );
        }
        (None, None) => return ChangeResult::none(),
        (Some(old), Some(new)) => (old, new),
    };

    match rule_type {
        RuleType::Price => detect_price_change(old, new),
        RuleType::Availability => detect_availability_change(old, new),
        RuleType::Number => detect_number_change(old, new),
        RuleType::Text => detect_text_change(old, new),
        RuleType::JsonField => detect_json_change(old, new),
    }
}

/// Render a price with no trailing zeros for whole-number values (`999`,
/// not `999.00`), two decimals otherwise (`19.99`).
fn format_price(value: f64) -> String {
    if (value - value.trunc()).abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn detect_price_change(old: &NormalizedValue, new: &NormalizedValue) -> ChangeResult {
    let (old_low, old_high, old_ccy) = match old {
        NormalizedValue::Price {
            value_low,
            value_high,
            currency,
            value,
        } => (value.unwrap_or(*value_low), *value_high, currency.as_str()),
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };
    let (new_low, new_high, new_ccy) = match new {
        NormalizedValue::Price {
            value_low,
            value_high,
            currency,
            value,
        } => (value.unwrap_or(*value_low), *value_high, currency.as_str()),
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };

    if old_ccy != new_ccy {
        return ChangeResult::kind(
            ChangeKind::FormatChanged,
            format!("currency changed: {old_ccy} → {new_ccy}"),
        );
    }
    if !old_low.is_finite() || !new_low.is_finite() {
        return ChangeResult::kind(ChangeKind::FormatChanged, "price is not numeric");
    }

    let range_changed = old_high.zip(new_high).map(|(a, b)| a != b).unwrap_or(old_high != new_high);

    if (new_low - old_low).abs() > f64::EPSILON {
        let pct = if old_low.abs() > f64::EPSILON {
            (new_low - old_low) / old_low * 100.0
        } else {
            0.0
        };
        let direction = if new_low < old_low { "decreased" } else { "increased" };
        let mut summary = format!(
            "Price {direction}: {} {new_ccy} → {} {new_ccy} ({pct:+.1}%)",
            format_price(old_low),
            format_price(new_low),
        );
        if range_changed {
            summary.push_str(" [range also changed]");
        }
        return ChangeResult::kind(ChangeKind::ValueChanged, summary);
    }

    if range_changed {
        return ChangeResult::informational(format!(
            "price range changed: high {old_high:?} → {new_high:?} (low unchanged at {} {new_ccy})",
            format_price(old_low),
        ));
    }

    ChangeResult::none()
}

fn detect_availability_change(old: &NormalizedValue, new: &NormalizedValue) -> ChangeResult {
    let (old_status, old_lead) = match old {
        NormalizedValue::Availability { status, lead_time_days } => (status.as_str(), *lead_time_days),
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };
    let (new_status, new_lead) = match new {
        NormalizedValue::Availability { status, lead_time_days } => (status.as_str(), *lead_time_days),
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };

    if old_status != new_status || old_lead != new_lead {
        let mut summary = format!("availability changed: {old_status} → {new_status}");
        if old_lead != new_lead {
            summary.push_str(&format!(", lead time {old_lead:?} → {new_lead:?} days"));
        }
        return ChangeResult::kind(ChangeKind::ValueChanged, summary);
    }

    ChangeResult::none()
}

fn detect_number_change(old: &NormalizedValue, new: &NormalizedValue) -> ChangeResult {
    let old_value = match old {
        NormalizedValue::Number { value } => *value,
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };
    let new_value = match new {
        NormalizedValue::Number { value } => *value,
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };

    if !old_value.is_finite() || !new_value.is_finite() {
        return ChangeResult::kind(ChangeKind::FormatChanged, "value is not numeric");
    }

    let delta = new_value - old_value;
    if delta.abs() > f64::EPSILON {
        let pct = if old_value.abs() > f64::EPSILON {
            delta / old_value * 100.0
        } else {
            0.0
        };
        return ChangeResult::kind(
            ChangeKind::ValueChanged,
            format!("value changed: {old_value} → {new_value} ({pct:+.1}%)"),
        );
    }

    ChangeResult::none()
}

fn detect_text_change(old: &NormalizedValue, new: &NormalizedValue) -> ChangeResult {
    let old_text = match old {
        NormalizedValue::Text { snippet } => snippet.as_str(),
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };
    let new_text = match new {
        NormalizedValue::Text { snippet } => snippet.as_str(),
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };

    if old_text == new_text {
        return ChangeResult::none();
    }

    let old_words = old_text.split_whitespace().count();
    let new_words = new_text.split_whitespace().count();
    let word_delta = new_words as i64 - old_words as i64;
    ChangeResult::kind(
        ChangeKind::ValueChanged,
        format!(
            "text changed ({word_delta:+} words): {}",
            preview(new_text, 50)
        ),
    )
}

fn detect_json_change(old: &NormalizedValue, new: &NormalizedValue) -> ChangeResult {
    let old_raw = match old {
        NormalizedValue::Json { raw } => raw,
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };
    let new_raw = match new {
        NormalizedValue::Json { raw } => raw,
        _ => return ChangeResult::kind(ChangeKind::FormatChanged, "value shape changed"),
    };

    let old_str = old_raw.to_string();
    let new_str = new_raw.to_string();
    ChangeResult::kind(
        ChangeKind::ValueChanged,
        format!("json changed: {}", preview(&new_str, 80)),
    )
}

fn preview(text: &str, max_chars: usize) -> String {
    let truncated: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        format!("{truncated}…")
    } else {
        truncated
    }
}

fn describe(value: &NormalizedValue) -> String {
    match value {
        NormalizedValue::Price { value_low, currency, value, .. } => {
            format!("{:.2} {currency}", value.unwrap_or(*value_low))
        }
        NormalizedValue::Availability { status, .. } => status.clone(),
        NormalizedValue::Number { value } => value.to_string(),
        NormalizedValue::Text { snippet } => preview(snippet, 50),
        NormalizedValue::Json { raw } => preview(&raw.to_string(), 80),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(low: f64, high: Option<f64>, ccy: &str) -> NormalizedValue {
        NormalizedValue::Price {
            value_low: low,
            value_high: high,
            currency: ccy.to_string(),
            value: None,
        }
    }

    /// B1
    #[test]
    fn none_old_yields_new_value() {
        let new = price(999.0, None, "USD");
        let result = detect_change(None, Some(&new), RuleType::Price);
        assert_eq!(result.change_kind, Some(ChangeKind::NewValue));
    }

    #[test]
    fn some_old_none_new_yields_value_disappeared() {
        let old = price(999.0, None, "USD");
        let result = detect_change(Some(&old), None, RuleType::Price);
        assert_eq!(result.change_kind, Some(ChangeKind::ValueDisappeared));
    }

    /// S1
    #[test]
    fn price_drop_is_value_changed_with_direction() {
        let old = price(999.0, None, "USD");
        let new = price(799.0, None, "USD");
        let result = detect_change(Some(&old), Some(&new), RuleType::Price);
        assert_eq!(result.change_kind, Some(ChangeKind::ValueChanged));
        let summary = result.diff_summary.unwrap();
        assert_eq!(summary, "Price decreased: 999 USD → 799 USD (-20.0%)");
    }

    #[test]
    fn price_drop_with_fractional_values_keeps_two_decimals() {
        let old = price(19.99, None, "USD");
        let new = price(14.99, None, "USD");
        let result = detect_change(Some(&old), Some(&new), RuleType::Price);
        let summary = result.diff_summary.unwrap();
        assert!(summary.starts_with("Price decreased: 19.99 USD → 14.99 USD"));
    }

    /// B2 / S2
    #[test]
    fn currency_flip_is_format_changed_regardless_of_delta() {
        let old = price(100.0, None, "EUR");
        let new = price(100.0, None, "USD");
        let result = detect_change(Some(&old), Some(&new), RuleType::Price);
        assert_eq!(result.change_kind, Some(ChangeKind::FormatChanged));
    }

    /// B3
    #[test]
    fn equal_low_differing_high_is_informational_only() {
        let old = price(100.0, Some(120.0), "USD");
        let new = price(100.0, Some(130.0), "USD");
        let result = detect_change(Some(&old), Some(&new), RuleType::Price);
        assert_eq!(result.change_kind, None);
        assert!(result.diff_summary.is_some());
    }

    #[test]
    fn identical_price_is_no_change() {
        let old = price(100.0, None, "USD");
        let new = price(100.0, None, "USD");
        let result = detect_change(Some(&old), Some(&new), RuleType::Price);
        assert_eq!(result.change_kind, None);
        assert!(result.diff_summary.is_none());
    }

    #[test]
    fn availability_status_change_is_value_changed() {
        let old = NormalizedValue::Availability {
            status: "out_of_stock".into(),
            lead_time_days: None,
        };
        let new = NormalizedValue::Availability {
            status: "in_stock".into(),
            lead_time_days: None,
        };
        let result = detect_change(Some(&old), Some(&new), RuleType::Availability);
        assert_eq!(result.change_kind, Some(ChangeKind::ValueChanged));
    }

    #[test]
    fn number_zero_delta_is_no_change() {
        let old = NormalizedValue::Number { value: 5.0 };
        let new = NormalizedValue::Number { value: 5.0 };
        let result = detect_change(Some(&old), Some(&new), RuleType::Number);
        assert_eq!(result.change_kind, None);
    }

    #[test]
    fn json_field_change_is_always_value_changed() {
        let old = NormalizedValue::Json { raw: serde_json::json!({"a": 1}) };
        let new = NormalizedValue::Json { raw: serde_json::json!({"a": 1}) };
        let result = detect_change(Some(&old), Some(&new), RuleType::JsonField);
        assert_eq!(result.change_kind, Some(ChangeKind::ValueChanged));
    }

    #[test]
    fn mismatched_variant_is_format_changed() {
        let old = NormalizedValue::Text { snippet: "hello".into() };
        let new = price(1.0, None, "USD");
        let result = detect_change(Some(&old), Some(&new), RuleType::Price);
        assert_eq!(result.change_kind, Some(ChangeKind::FormatChanged));
    }
}
