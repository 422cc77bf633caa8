use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use watchloop_core::ids::ProviderId;

use crate::error::ProviderError;
use crate::provider::FetchProvider;
use crate::request::{FetchRequest, FetchResult};

use super::http::map_reqwest_error;

/// FlareSolverr runs a real headless browser behind a small HTTP proxy API
/// and is free to operate (self-hosted), but slow — second free candidate
/// after plain `http`, ahead of the in-process headless provider only by
/// convention of the candidate order in §4.8.
pub struct FlaresolverrProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl FlaresolverrProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into() }
    }
}

#[derive(Serialize)]
struct FlareSolverrRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
}

#[derive(Deserialize)]
struct FlareSolverrResponse {
    status: String,
    message: Option<String>,
    solution: Option<FlareSolverrSolution>,
}

#[derive(Deserialize)]
struct FlareSolverrSolution {
    status: u16,
    response: String,
    url: String,
}

#[async_trait]
impl FetchProvider for FlaresolverrProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new("flaresolverr")
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError> {
        let wait_seconds = request.flaresolverr_wait_seconds.unwrap_or(0);
        let max_timeout = request.timeout_ms + wait_seconds * 1000;

        let payload = FlareSolverrRequest { cmd: "request.get", url: &request.url, max_timeout };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_millis(max_timeout + 5_000))
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let body: FlareSolverrResponse =
            response.json().await.map_err(|e| ProviderError::Serialization(e.to_string()))?;

        if body.status != "ok" {
            return Err(ProviderError::ExecutionFailed(
                body.message.unwrap_or_else(|| "flaresolverr request failed".into()),
            ));
        }

        let solution = body
            .solution
            .ok_or_else(|| ProviderError::Serialization("missing solution".into()))?;

        Ok(FetchResult {
            http_status: Some(solution.status),
            body: Some(solution.response),
            content_type: Some("text/html".into()),
            final_url: Some(solution.url),
            error_detail: None,
            cost_usd: 0.0,
            cost_units: None,
            country_used: None,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client
            .get(&self.endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|_| ())
            .map_err(map_reqwest_error)
    }
}
