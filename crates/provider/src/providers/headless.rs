use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use watchloop_core::ids::ProviderId;

use crate::error::ProviderError;
use crate::provider::FetchProvider;
use crate::request::{FetchRequest, FetchResult};

use super::http::map_reqwest_error;

/// In-process/self-hosted headless browser, reached through a render
/// microservice rather than embedding a browser in this process. Free
/// tier's last resort: slower than `http`/`flaresolverr` but renders
/// client-side JavaScript the others can't.
pub struct HeadlessProvider {
    client: reqwest::Client,
    render_endpoint: String,
}

impl HeadlessProvider {
    pub fn new(render_endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), render_endpoint: render_endpoint.into() }
    }
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    #[serde(rename = "waitMs")]
    wait_ms: u64,
    #[serde(rename = "userAgent")]
    user_agent: Option<&'a str>,
}

#[derive(Deserialize)]
struct RenderResponse {
    status: u16,
    html: String,
    #[serde(rename = "finalUrl")]
    final_url: Option<String>,
}

#[async_trait]
impl FetchProvider for HeadlessProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new("headless")
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError> {
        let wait_ms = request.render_wait_ms.unwrap_or(0);
        let payload = RenderRequest {
            url: &request.url,
            wait_ms,
            user_agent: request.user_agent.as_deref(),
        };

        let response = self
            .client
            .post(&self.render_endpoint)
            .timeout(Duration::from_millis(request.timeout_ms + wait_ms))
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(ProviderError::ExecutionFailed(format!(
                "render service returned {}",
                response.status()
            )));
        }

        let body: RenderResponse =
            response.json().await.map_err(|e| ProviderError::Serialization(e.to_string()))?;

        Ok(FetchResult {
            http_status: Some(body.status),
            body: Some(body.html),
            content_type: Some("text/html".into()),
            final_url: body.final_url,
            error_detail: None,
            cost_usd: 0.0,
            cost_units: None,
            country_used: None,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client
            .get(&self.render_endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|_| ())
            .map_err(map_reqwest_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_headless() {
        assert_eq!(
            HeadlessProvider::new("http://localhost:9222/render").id(),
            ProviderId::new("headless")
        );
    }
}
