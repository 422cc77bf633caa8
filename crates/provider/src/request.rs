//! The input/output shapes at the provider boundary (§4.8, §6). A
//! `FetchRequest` is built by the orchestrator from the rule's fetch
//! policy; a `FetchResult` is raw material for the classifier (C1), not a
//! classification itself.

use std::collections::HashMap;

use watchloop_core::ids::Hostname;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub hostname: Hostname,
    pub headers: HashMap<String, String>,
    pub user_agent: Option<String>,
    pub timeout_ms: u64,
    pub render_wait_ms: Option<u64>,
    pub flaresolverr_wait_seconds: Option<u64>,
    pub geo_country: Option<String>,
}

/// Raw provider output. Carries no verdict of its own — `http_status`,
/// `body`, `content_type`, and `error_detail` are exactly the inputs C1's
/// `classify` expects to receive.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub http_status: Option<u16>,
    pub body: Option<String>,
    pub content_type: Option<String>,
    pub final_url: Option<String>,
    pub error_detail: Option<String>,
    /// USD cost of this invocation; `0.0` for free providers.
    pub cost_usd: f64,
    pub cost_units: Option<f64>,
    /// Geo-country actually used to serve the request, when the provider
    /// supports geo-targeting (BrightData). Propagated to the extractor
    /// for currency-stable normalization per §4.8.
    pub country_used: Option<String>,
}
