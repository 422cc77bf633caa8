use std::time::Duration;

use async_trait::async_trait;
use watchloop_core::ids::ProviderId;

use crate::error::ProviderError;
use crate::provider::FetchProvider;
use crate::request::{FetchRequest, FetchResult};

use super::http::map_reqwest_error;

/// Cost per request charged by BrightData's Web Unlocker product, in USD.
/// Used by [`Self::cost_usd`] to feed the budget guard (C6) and the
/// `FetchAttempt.cost_usd` ledger field.
const COST_PER_REQUEST_USD: f64 = 0.0015;

/// BrightData's Web Unlocker: a residential-proxy + anti-bot-solving HTTP
/// API. First candidate in the paid tier — most cost-effective of the
/// three per §4.8's ordering.
pub struct BrightdataProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    zone: String,
}

impl BrightdataProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            zone: zone.into(),
        }
    }
}

#[async_trait]
impl FetchProvider for BrightdataProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new("brightdata")
    }

    fn is_paid(&self) -> bool {
        true
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Configuration("missing BrightData API key".into()));
        }

        let mut builder = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_millis(request.timeout_ms))
            .json(&serde_json::json!({
                "zone": self.zone,
                "url": request.url,
                "format": "raw",
                "country": request.geo_country,
            }));

        if let Some(ua) = &request.user_agent {
            builder = builder.header(reqwest::header::USER_AGENT, ua);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited);
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(FetchResult {
            http_status: Some(status),
            body: Some(body),
            content_type,
            final_url: Some(request.url.clone()),
            error_detail: None,
            cost_usd: COST_PER_REQUEST_USD,
            cost_units: Some(1.0),
            country_used: request.geo_country.clone(),
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Configuration("missing BrightData API key".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_paid_and_id() {
        let p = BrightdataProvider::new("https://api.brightdata.com/unlocker", "key", "zone1");
        assert!(p.is_paid());
        assert_eq!(p.id(), ProviderId::new("brightdata"));
    }
}
