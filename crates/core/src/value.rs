//! `NormalizedValue`: the typed replacement for the source's duck-typed
//! `value?.valueLow ?? value?.value ?? value` shape (see design notes).

use serde::{Deserialize, Serialize};

/// A value extracted from a page, normalized to the shape the rule's type
/// expects. The change detector (`change::detect_change`) dispatches on the
/// variant tag; mixing variants across a comparison is a caller bug, not a
/// value this type tries to coerce around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedValue {
    Price {
        #[serde(rename = "valueLow")]
        value_low: f64,
        #[serde(rename = "valueHigh", skip_serializing_if = "Option::is_none")]
        value_high: Option<f64>,
        currency: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
    },
    Availability {
        status: String,
        #[serde(rename = "leadTimeDays", skip_serializing_if = "Option::is_none")]
        lead_time_days: Option<i64>,
    },
    Number {
        value: f64,
    },
    Text {
        snippet: String,
    },
    Json {
        raw: serde_json::Value,
    },
}

impl NormalizedValue {
    /// The effective low price: `valueLow`, falling back to `value` per the
    /// duck-typed source's `value?.valueLow ?? value?.value` precedence.
    pub fn price_low(&self) -> Option<f64> {
        match self {
            Self::Price { value_low, value, .. } => Some(value.unwrap_or(*value_low)),
            _ => None,
        }
    }

    /// Canonical JSON used by the dedupe key (`stableJSON`, see C10). Field
    /// order in `NormalizedValue`'s derive is fixed by declaration order, so
    /// `serde_json::to_value` already produces a stable byte sequence for a
    /// given variant; this just names that property at the call site.
    pub fn stable_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
