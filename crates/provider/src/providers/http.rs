use std::time::{Duration, Instant};

use async_trait::async_trait;
use watchloop_core::ids::ProviderId;

use crate::error::ProviderError;
use crate::provider::FetchProvider;
use crate::request::{FetchRequest, FetchResult};

/// Plain HTTP GET, no JavaScript rendering. First candidate in the free
/// tier — cheapest and fastest, and sufficient for any target that doesn't
/// sit behind bot defense or a client-rendered page.
pub struct HttpProvider {
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchProvider for HttpProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new("http")
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, ProviderError> {
        let mut builder = self
            .client
            .get(&request.url)
            .timeout(Duration::from_millis(request.timeout_ms));

        if let Some(ua) = &request.user_agent {
            builder = builder.header(reqwest::header::USER_AGENT, ua);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let _elapsed = start.elapsed();

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
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
            final_url: Some(final_url),
            error_detail: None,
            cost_usd: 0.0,
            cost_units: None,
            country_used: None,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(Duration::from_millis(0))
    } else if err.is_connect() {
        ProviderError::Connection(err.to_string())
    } else {
        ProviderError::ExecutionFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_http() {
        assert_eq!(HttpProvider::new().id(), ProviderId::new("http"));
    }
}
