//! C1 — Response Classifier.
//!
//! A single pure function: given the raw shape of an HTTP response (or the
//! absence of one, when the provider raised an error), decide which
//! `Outcome` it represents. Bot-defense pages frequently look identical in
//! structure to real pages, so precision signatures fire unconditionally
//! (tier 1), while heuristic keyword matches are guarded by body size and a
//! schema.org bypass (tier 2) — otherwise "blocked" or "recaptcha" appearing
//! in the JavaScript of an ordinary product page would misclassify it.

use serde::{Deserialize, Serialize};

/// Terminal classification of a fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Empty,
    Blocked,
    CaptchaRequired,
    RateLimited,
    Timeout,
    NetworkError,
    ProviderError,
    PreferredUnavailable,
    /// Geo-restricted interstitial. Never produced by `classify` itself —
    /// a provider that detects a geo wall surfaces it directly. Listed here
    /// because §4.5 names it as excluded from circuit-breaker failure
    /// counting alongside `ok`, `rate_limited`, and `preferred_unavailable`.
    InterstitialGeo,
}

impl Outcome {
    /// Whether this outcome counts as a circuit-breaker failure per §4.5.
    /// Design note (d): anything not in this explicit set is a non-failure.
    pub fn is_circuit_breaker_failure(self) -> bool {
        matches!(
            self,
            Self::Blocked
                | Self::CaptchaRequired
                | Self::Empty
                | Self::Timeout
                | Self::ProviderError
                | Self::NetworkError
        )
    }
}

/// Sub-classification of a blocked response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Datadome,
    Cloudflare,
    Perimeterx,
    Captcha,
    RateLimit,
    Unknown,
}

/// Input to the classifier. All fields optional because a provider-level
/// exception (timeout, connection refused) carries no HTTP response at all.
#[derive(Debug, Clone, Default)]
pub struct ClassifyInput<'a> {
    pub http_status: Option<u16>,
    pub body: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub error_detail: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyResult {
    pub outcome: Outcome,
    pub block_kind: Option<BlockKind>,
    pub signals: Vec<String>,
}

impl ClassifyResult {
    fn ok() -> Self {
        Self {
            outcome: Outcome::Ok,
            block_kind: None,
            signals: Vec::new(),
        }
    }

    fn simple(outcome: Outcome, signal: &str) -> Self {
        Self {
            outcome,
            block_kind: None,
            signals: vec![signal.to_owned()],
        }
    }

    fn blocked(kind: BlockKind, signal: &str) -> Self {
        let outcome = if kind == BlockKind::Captcha {
            Outcome::CaptchaRequired
        } else {
            Outcome::Blocked
        };
        Self {
            outcome,
            block_kind: Some(kind),
            signals: vec![signal.to_owned()],
        }
    }
}

const TIER2_SIZE_GATE: usize = 50_000;
const TIER2_SMALL_PAGE: usize = 10_000;

/// Run the classifier. Evaluation order, first match wins:
/// error detail → HTTP status ≥ 400 (with block classification for 403/429)
/// → block classification on body → empty classification → `ok`.
pub fn classify(input: &ClassifyInput<'_>) -> ClassifyResult {
    if let Some(detail) = input.error_detail {
        return classify_error_detail(detail);
    }

    if let Some(status) = input.http_status {
        if status >= 400 {
            if status == 403 || status == 429 {
                if let Some(block) = classify_block(input.body.unwrap_or(""), status == 429) {
                    return block;
                }
                return ClassifyResult::simple(Outcome::Blocked, "http_status_no_block_match");
            }
            return ClassifyResult::simple(Outcome::Blocked, "http_status_error");
        }
    }

    let body = input.body.unwrap_or("");
    if let Some(block) = classify_block(body, false) {
        return block;
    }

    if has_product_schema_bypass(body, &body.to_lowercase()) {
        return ClassifyResult::ok();
    }

    if let Some(empty) = classify_empty(input.body, input.content_type) {
        return empty;
    }

    ClassifyResult::ok()
}

fn classify_error_detail(detail: &str) -> ClassifyResult {
    let lower = detail.to_lowercase();
    if lower.contains("timeout") || detail.contains("ETIMEDOUT") {
        ClassifyResult::simple(Outcome::Timeout, "error_detail_timeout")
    } else if detail.contains("ECONNREFUSED") || detail.contains("ENOTFOUND") {
        ClassifyResult::simple(Outcome::NetworkError, "error_detail_connection")
    } else {
        ClassifyResult::simple(Outcome::ProviderError, "error_detail_other")
    }
}

/// Whether `body` carries a schema.org Product JSON-LD block past the
/// tier-2 size gate. A legitimate large product page that happens to
/// reference "captcha" or "cloudflare" inside an inline script, or that
/// lacks the `<html>`/`<body>`/`<!doctype>` markers a hand-rolled template
/// omits, must not be misclassified as blocked or empty.
fn has_product_schema_bypass(body: &str, lower: &str) -> bool {
    body.len() > TIER2_SIZE_GATE
        && (lower.contains(r#""@type": "product""#) || lower.contains(r#""@type":"product""#))
}

/// Tier 1 signatures fire unconditionally, at any body size. Tier 2 is
/// heuristic and size-gated, with the schema.org Product bypass above.
fn classify_block(body: &str, is_rate_limit_status: bool) -> Option<ClassifyResult> {
    // Tier 1: precise signatures.
    if body.contains("geo.captcha-delivery.com") || body.contains("captcha-delivery.com/captcha")
    {
        return Some(ClassifyResult::blocked(BlockKind::Datadome, "datadome_url"));
    }
    let lower = body.to_lowercase();
    if lower.contains("press & hold")
        || lower.contains("slide to complete the puzzle")
        || body.contains("posunutím doprava zložte puzzle")
    {
        return Some(ClassifyResult::blocked(
            BlockKind::Datadome,
            "datadome_challenge_text",
        ));
    }
    if body.contains("cf-browser-verification") {
        return Some(ClassifyResult::blocked(
            BlockKind::Cloudflare,
            "cloudflare_verification_attr",
        ));
    }
    if body.contains("px-captcha") {
        return Some(ClassifyResult::blocked(
            BlockKind::Perimeterx,
            "perimeterx_widget",
        ));
    }
    if lower.contains("hcaptcha") && lower.contains("challenge") {
        return Some(ClassifyResult::blocked(
            BlockKind::Captcha,
            "hcaptcha_challenge_frame",
        ));
    }

    // Tier 2: heuristics, size-gated.
    if has_product_schema_bypass(body, &lower) {
        return None;
    }

    if is_rate_limit_status
        && (lower.contains("rate limit") || lower.contains("too many requests"))
    {
        return Some(ClassifyResult::blocked(
            BlockKind::RateLimit,
            "rate_limit_phrase",
        ));
    }

    if body.len() < TIER2_SIZE_GATE {
        if lower.contains("cloudflare") && lower.contains("checking your browser") {
            return Some(ClassifyResult::blocked(
                BlockKind::Cloudflare,
                "cloudflare_heuristic",
            ));
        }
        if lower.contains("perimeterx") || lower.contains("_px") {
            return Some(ClassifyResult::blocked(
                BlockKind::Perimeterx,
                "perimeterx_heuristic",
            ));
        }
        if lower.contains("i am not a robot")
            || lower.contains("verify you are human")
            || lower.contains("complete this security check")
        {
            return Some(ClassifyResult::blocked(
                BlockKind::Captcha,
                "captcha_generic_phrase",
            ));
        }
    }

    if body.len() < TIER2_SMALL_PAGE
        && (lower.contains("access denied") || lower.contains("forbidden"))
    {
        return Some(ClassifyResult::blocked(
            BlockKind::Unknown,
            "access_denied_phrase",
        ));
    }

    None
}

fn classify_empty(body: Option<&str>, content_type: Option<&str>) -> Option<ClassifyResult> {
    let body = body.unwrap_or("");
    if body.len() < 2000 {
        return Some(ClassifyResult::simple(Outcome::Empty, "body_too_small"));
    }
    let is_html_ct = content_type
        .map(|ct| ct.contains("text/html"))
        .unwrap_or(false);
    let trimmed = body.trim_start();
    if is_html_ct && trimmed.starts_with('{') && body.contains("\"error\"") {
        return Some(ClassifyResult::simple(Outcome::Empty, "json_error_in_html_ct"));
    }
    if is_html_ct {
        let lower = body.to_lowercase();
        if !lower.contains("<html") && !lower.contains("<body") && !lower.contains("<!doctype") {
            return Some(ClassifyResult::simple(
                Outcome::Empty,
                "html_ct_missing_markers",
            ));
        }
    }
    if body.to_lowercase().contains("loading...") && body.len() < 5000 {
        return Some(ClassifyResult::simple(Outcome::Empty, "loading_placeholder"));
    }
    None
}
