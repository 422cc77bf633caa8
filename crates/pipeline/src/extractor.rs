//! §4.13 — Extractor boundary (reference implementation).
//!
//! `spec.md` treats HTML-to-value extraction (selector healing, block
//! pattern libraries, headless automation) as out of scope, specified only
//! at its input/output contract. This module is a minimal CSS-selector
//! extractor behind that contract, sufficient to exercise the run handler
//! end-to-end — a production extractor with fallback-selector healing
//! replaces it without touching C11.

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;

use watchloop_core::rule::RuleType;
use watchloop_core::NormalizedValue;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction spec missing required field: {0}")]
    MissingField(&'static str),
    #[error("extraction spec field has the wrong shape: {0}")]
    InvalidSpec(&'static str),
    #[error("css selector is invalid: {0}")]
    InvalidSelector(String),
    #[error("no element matched any selector (including fallbacks)")]
    NoMatch,
    #[error("matched value could not be parsed as {0}")]
    UnparsableValue(&'static str),
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract a `NormalizedValue` from `body` per `extraction_spec` and
    /// `rule_type`. Returns `Ok(None)` for "yielded null" (§4.11 step 6:
    /// extraction failure and null-yield are both non-fatal, but distinct
    /// from a hard `ExtractError`, which indicates a malformed spec).
    ///
    /// `country` is the geo-context the successful attempt ran under
    /// (propagated from the orchestrator's `country_used`, §4.8's closing
    /// note) — used for currency-stable normalization on `Price` rules
    /// when `extraction_spec` doesn't pin an explicit currency.
    async fn extract(
        &self,
        body: &str,
        rule_type: RuleType,
        extraction_spec: &serde_json::Value,
        country: Option<&str>,
    ) -> Result<Option<NormalizedValue>, ExtractError>;
}

/// Default currency for a two-letter country code, used when
/// `extraction_spec` doesn't pin one explicitly. Falls back to USD for an
/// unrecognized or absent country — the same default the reference
/// extractor used before country-context was threaded through.
fn currency_for_country(country: Option<&str>) -> &'static str {
    match country.map(str::to_uppercase).as_deref() {
        Some("GB") => "GBP",
        Some("DE" | "FR" | "ES" | "IT" | "NL") => "EUR",
        Some("JP") => "JPY",
        Some("CA") => "CAD",
        Some("AU") => "AUD",
        _ => "USD",
    }
}

/// `extraction_spec` shape this reference extractor understands:
/// `{"selector": "...", "fallback_selectors": ["..."], "attribute": "...",
/// "currency": "USD"}`. Unknown/extra fields are ignored, matching the
/// spec's "opaque to the core" framing — only this boundary interprets it.
pub struct CssExtractor;

impl CssExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn selectors(spec: &serde_json::Value) -> Result<Vec<String>, ExtractError> {
        let primary = spec
            .get("selector")
            .and_then(serde_json::Value::as_str)
            .ok_or(ExtractError::MissingField("selector"))?
            .to_owned();
        let mut all = vec![primary];
        if let Some(fallbacks) = spec.get("fallback_selectors") {
            let list = fallbacks.as_array().ok_or(ExtractError::InvalidSpec("fallback_selectors"))?;
            for f in list {
                let s = f.as_str().ok_or(ExtractError::InvalidSpec("fallback_selectors"))?;
                all.push(s.to_owned());
            }
        }
        Ok(all)
    }

    fn matched_text(body: &str, spec: &serde_json::Value) -> Result<Option<String>, ExtractError> {
        let document = Html::parse_document(body);
        let attribute = spec.get("attribute").and_then(serde_json::Value::as_str);

        for raw_selector in Self::selectors(spec)? {
            let selector = Selector::parse(&raw_selector).map_err(|_| ExtractError::InvalidSelector(raw_selector))?;
            if let Some(element) = document.select(&selector).next() {
                let text = if let Some(attr) = attribute {
                    element.value().attr(attr).map(str::to_owned)
                } else {
                    Some(element.text().collect::<String>())
                };
                if let Some(text) = text {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return Ok(Some(trimmed.to_owned()));
                    }
                }
            }
        }
        Ok(None)
    }
}

impl Default for CssExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for CssExtractor {
    async fn extract(
        &self,
        body: &str,
        rule_type: RuleType,
        extraction_spec: &serde_json::Value,
        country: Option<&str>,
    ) -> Result<Option<NormalizedValue>, ExtractError> {
        let Some(text) = Self::matched_text(body, extraction_spec)? else {
            return Ok(None);
        };

        let value = match rule_type {
            RuleType::Price => {
                let currency = extraction_spec
                    .get("currency")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_else(|| currency_for_country(country))
                    .to_owned();
                let numeric: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
                let low = numeric.parse::<f64>().map_err(|_| ExtractError::UnparsableValue("price"))?;
                NormalizedValue::Price { value_low: low, value_high: None, currency, value: None }
            }
            RuleType::Availability => NormalizedValue::Availability { status: text, lead_time_days: None },
            RuleType::Number => {
                let numeric: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
                let value = numeric.parse::<f64>().map_err(|_| ExtractError::UnparsableValue("number"))?;
                NormalizedValue::Number { value }
            }
            RuleType::Text => NormalizedValue::Text { snippet: text },
            RuleType::JsonField => {
                let raw = serde_json::from_str(&text).map_err(|_| ExtractError::UnparsableValue("json"))?;
                NormalizedValue::Json { raw }
            }
        };
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_price_from_matched_text() {
        let extractor = CssExtractor::new();
        let body = r#"<html><body><span class="price">$799.00</span></body></html>"#;
        let spec = serde_json::json!({"selector": ".price"});
        let value = extractor.extract(body, RuleType::Price, &spec, None).await.unwrap().unwrap();
        match value {
            NormalizedValue::Price { value_low, currency, .. } => {
                assert!((value_low - 799.0).abs() < f64::EPSILON);
                assert_eq!(currency, "USD");
            }
            _ => panic!("expected price"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_secondary_selector_when_primary_misses() {
        let extractor = CssExtractor::new();
        let body = r#"<html><body><span class="alt-price">12.50</span></body></html>"#;
        let spec = serde_json::json!({"selector": ".price", "fallback_selectors": [".alt-price"]});
        let value = extractor.extract(body, RuleType::Price, &spec, None).await.unwrap();
        assert!(value.is_some());
    }

    #[tokio::test]
    async fn no_match_yields_none_not_error() {
        let extractor = CssExtractor::new();
        let body = "<html><body><div>nothing here</div></body></html>";
        let spec = serde_json::json!({"selector": ".price"});
        let value = extractor.extract(body, RuleType::Price, &spec, None).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn missing_selector_field_is_a_hard_error() {
        let extractor = CssExtractor::new();
        let spec = serde_json::json!({});
        let result = extractor.extract("<html></html>", RuleType::Text, &spec, None).await;
        assert!(matches!(result, Err(ExtractError::MissingField("selector"))));
    }

    #[tokio::test]
    async fn attribute_extraction_reads_element_attribute() {
        let extractor = CssExtractor::new();
        let body = r#"<html><body><meta class="stock" data-status="in_stock"></body></html>"#;
        let spec = serde_json::json!({"selector": ".stock", "attribute": "data-status"});
        let value = extractor.extract(body, RuleType::Availability, &spec, None).await.unwrap().unwrap();
        match value {
            NormalizedValue::Availability { status, .. } => assert_eq!(status, "in_stock"),
            _ => panic!("expected availability"),
        }
    }

    #[tokio::test]
    async fn country_context_picks_default_currency_when_spec_omits_one() {
        let extractor = CssExtractor::new();
        let body = r#"<html><body><span class="price">49.99</span></body></html>"#;
        let spec = serde_json::json!({"selector": ".price"});
        let value = extractor.extract(body, RuleType::Price, &spec, Some("DE")).await.unwrap().unwrap();
        match value {
            NormalizedValue::Price { currency, .. } => assert_eq!(currency, "EUR"),
            _ => panic!("expected price"),
        }
    }

    #[tokio::test]
    async fn explicit_currency_in_spec_overrides_country_default() {
        let extractor = CssExtractor::new();
        let body = r#"<html><body><span class="price">49.99</span></body></html>"#;
        let spec = serde_json::json!({"selector": ".price", "currency": "GBP"});
        let value = extractor.extract(body, RuleType::Price, &spec, Some("DE")).await.unwrap().unwrap();
        match value {
            NormalizedValue::Price { currency, .. } => assert_eq!(currency, "GBP"),
            _ => panic!("expected price"),
        }
    }
}
