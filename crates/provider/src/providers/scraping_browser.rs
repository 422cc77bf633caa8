use std::time::Duration;

use async_trait::async_trait;
use watchloop_core::ids::ProviderId;

use crate::error::ProviderError;
use crate::provider::FetchProvider;
use crate::request::{FetchRequest, FetchResult};

use super::http::map_reqwest_error;

/// Cost per request for a managed scraping-browser session, in USD. Higher
/// than BrightData's Web Unlocker (it holds a full remote browser session
/// open rather than proxying a single HTTP request), hence second in the
/// paid candidate order.
const COST_PER_REQUEST_USD: f64 = 0.006;

/// A hosted remote-browser session (full JS rendering, CAPTCHA-aware),
/// reached over its control API. Second paid candidate — more expensive
/// than BrightData's Web Unlocker, used when plain proxying isn't enough.
pub struct ScrapingBrowserProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ScrapingBrowserProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl FetchProvider for ScrapingBrowserProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new("scraping_browser")
    }

    fn is_paid(&self) -> bool {
        true
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Configuration("missing scraping browser API key".into()));
        }

        let wait_ms = request.render_wait_ms.unwrap_or(2_000);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_millis(request.timeout_ms + wait_ms))
            .json(&serde_json::json!({
                "url": request.url,
                "waitMs": wait_ms,
                "country": request.geo_country,
            }))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited);
        }
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(FetchResult {
            http_status: Some(status),
            body: Some(body),
            content_type: Some("text/html".into()),
            final_url: Some(request.url.clone()),
            error_detail: None,
            cost_usd: COST_PER_REQUEST_USD,
            cost_units: Some(1.0),
            country_used: request.geo_country.clone(),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Configuration("missing scraping browser API key".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_paid_and_id() {
        let p = ScrapingBrowserProvider::new("https://api.example/browser", "key");
        assert!(p.is_paid());
        assert_eq!(p.id(), ProviderId::new("scraping_browser"));
    }
}
