use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use watchloop_core::Alert;
use watchloop_notify::{NotificationAdapter, NotificationResult};

use crate::config::{AuthMethod, HttpMethod, WebhookConfig};
use crate::error::WebhookError;
use crate::types::alert_payload;

type HmacSha256 = Hmac<Sha256>;

/// Generic HTTP webhook notification adapter. One instance per configured
/// channel — the URL, auth method, and payload shape are all baked in at
/// construction, so `send` only ever needs the alert.
pub struct WebhookAdapter {
    config: WebhookConfig,
    client: Client,
}

impl WebhookAdapter {
    /// Build a webhook adapter from the given configuration, with a
    /// `reqwest::Client` sized to the configured timeout and redirect
    /// policy.
    pub fn new(config: WebhookConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::default()
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .expect("failed to build HTTP client");

        Self { config, client }
    }

    /// Build an adapter with a caller-supplied client — used by tests and
    /// by callers sharing a connection pool across channels.
    pub fn with_client(config: WebhookConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn compute_hmac(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| WebhookError::SigningError(format!("invalid HMAC key: {e}")))?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn apply_auth(
        &self,
        mut request: reqwest::RequestBuilder,
        body_bytes: &[u8],
    ) -> Result<reqwest::RequestBuilder, WebhookError> {
        match &self.config.auth {
            Some(AuthMethod::Bearer(token)) => {
                request = request.bearer_auth(token);
            }
            Some(AuthMethod::Basic { username, password }) => {
                request = request.basic_auth(username, Some(password));
            }
            Some(AuthMethod::ApiKey { header, value }) => {
                request = request.header(header, value);
            }
            Some(AuthMethod::HmacSha256 { secret, header }) => {
                let signature = Self::compute_hmac(secret, body_bytes)?;
                request = request.header(header, format!("sha256={signature}"));
            }
            None => {}
        }
        Ok(request)
    }

    fn is_success_status(&self, status: u16) -> bool {
        if self.config.success_status_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.config.success_status_codes.contains(&status)
        }
    }

    fn build_request(&self) -> reqwest::RequestBuilder {
        match self.config.method {
            HttpMethod::Get => self.client.get(&self.config.url),
            HttpMethod::Post => self.client.post(&self.config.url),
            HttpMethod::Put => self.client.put(&self.config.url),
            HttpMethod::Patch => self.client.patch(&self.config.url),
            HttpMethod::Delete => self.client.delete(&self.config.url),
        }
    }

    async fn try_send(&self, alert: &Alert) -> Result<String, WebhookError> {
        let body = alert_payload(self.config.payload_mode, alert);
        let body_bytes = serde_json::to_vec(&body)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        debug!(
            method = self.config.method.as_str(),
            url = %self.config.url,
            "dispatching webhook"
        );

        let mut request = self
            .build_request()
            .header("Content-Type", "application/json")
            .body(body_bytes.clone());

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        request = self.apply_auth(request, &body_bytes)?;

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "webhook request failed");
            WebhookError::Http(e)
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            warn!("webhook endpoint returned 429");
            return Err(WebhookError::RateLimited);
        }

        let response_text = response.text().await.unwrap_or_default();

        if self.is_success_status(status) {
            Ok(response_text)
        } else {
            Err(WebhookError::UnexpectedStatus {
                status,
                body: response_text,
            })
        }
    }
}

#[async_trait]
impl NotificationAdapter for WebhookAdapter {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id, url = %self.config.url))]
    async fn send(&self, alert: &Alert) -> NotificationResult {
        match self.try_send(alert).await {
            Ok(_body) => NotificationResult::ok(alert.id.clone()),
            Err(err) => NotificationResult::failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use watchloop_core::change::ChangeKind;
    use watchloop_core::ids::{RuleId, WorkspaceId};
    use watchloop_core::value::NormalizedValue;
    use watchloop_core::Severity;

    use crate::config::PayloadMode;

    use super::*;

    /// A minimal mock HTTP server built on tokio that returns canned responses.
    struct MockWebhookServer {
        listener: tokio::net::TcpListener,
        base_url: String,
    }

    impl MockWebhookServer {
        async fn start() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind mock server");
            let port = listener.local_addr().unwrap().port();
            let base_url = format!("http://127.0.0.1:{port}");
            Self { listener, base_url }
        }

        async fn respond_once(self, status_code: u16, body: &str) -> Vec<u8> {
            let body = body.to_owned();
            let (mut stream, _) = self.listener.accept().await.unwrap();

            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let mut buf = vec![0u8; 16384];
            let n = stream.read(&mut buf).await.unwrap();
            buf.truncate(n);

            let response = format!(
                "HTTP/1.1 {status_code} OK\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 X-Request-Id: test-123\r\n\
                 Connection: close\r\n\
                 \r\n\
                 {body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            buf
        }

        async fn respond_rate_limited(self) {
            self.respond_once(429, r#"{"error":"rate_limited"}"#).await;
        }
    }

    fn sample_alert() -> Alert {
        Alert {
            id: "alert-1".into(),
            dedupe_key: "dk-1".into(),
            rule_id: RuleId::new("r1"),
            workspace_id: WorkspaceId::new("ws1"),
            severity: Severity::Critical,
            title: "Price dropped".into(),
            body: "Price dropped below threshold".into(),
            triggered_at: Utc::now(),
            current_value: NormalizedValue::Number { value: 9.99 },
            previous_value: Some(NormalizedValue::Number { value: 14.99 }),
            change_kind: Some(ChangeKind::ValueChanged),
            diff_summary: Some("14.99 -> 9.99".into()),
            channels: vec!["webhook".into()],
        }
    }

    #[test]
    fn channel_name_is_webhook() {
        let adapter = WebhookAdapter::new(WebhookConfig::new("https://example.com/hook"));
        assert_eq!(adapter.channel(), "webhook");
    }

    #[tokio::test]
    async fn send_success_post() {
        let server = MockWebhookServer::start().await;
        let adapter = WebhookAdapter::new(WebhookConfig::new(&server.base_url));

        let server_handle =
            tokio::spawn(async move { server.respond_once(200, r#"{"received":true}"#).await });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();

        assert!(result.success);
        assert_eq!(result.message_id.as_deref(), Some("alert-1"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn send_success_put() {
        let server = MockWebhookServer::start().await;
        let config = WebhookConfig::new(&server.base_url).with_method(HttpMethod::Put);
        let adapter = WebhookAdapter::new(config);

        let server_handle = tokio::spawn(async move {
            let request = server.respond_once(200, r#"{"updated":true}"#).await;
            let request_str = String::from_utf8_lossy(&request);
            assert!(request_str.starts_with("PUT "));
        });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn send_compact_payload_omits_values() {
        let server = MockWebhookServer::start().await;
        let config =
            WebhookConfig::new(&server.base_url).with_payload_mode(PayloadMode::Compact);
        let adapter = WebhookAdapter::new(config);

        let server_handle = tokio::spawn(async move {
            let request = server.respond_once(200, r#"{"ok":true}"#).await;
            let request_str = String::from_utf8_lossy(&request);
            assert!(
                !request_str.contains("currentValue"),
                "compact mode should not include value fields"
            );
            assert!(request_str.contains("dedupeKey"));
        });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn send_with_bearer_auth() {
        let server = MockWebhookServer::start().await;
        let config = WebhookConfig::new(&server.base_url)
            .with_auth(AuthMethod::Bearer("my-secret-token".into()));
        let adapter = WebhookAdapter::new(config);

        let server_handle = tokio::spawn(async move {
            let request = server.respond_once(200, r#"{"ok":true}"#).await;
            let request_str = String::from_utf8_lossy(&request);
            assert!(request_str.contains("Bearer my-secret-token"));
        });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn send_with_api_key_auth() {
        let server = MockWebhookServer::start().await;
        let config = WebhookConfig::new(&server.base_url).with_auth(AuthMethod::ApiKey {
            header: "X-API-Key".into(),
            value: "key-12345".into(),
        });
        let adapter = WebhookAdapter::new(config);

        let server_handle = tokio::spawn(async move {
            let request = server.respond_once(200, r#"{"ok":true}"#).await;
            let request_str = String::from_utf8_lossy(&request).to_lowercase();
            assert!(request_str.contains("x-api-key: key-12345"));
        });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn send_with_hmac_auth() {
        let server = MockWebhookServer::start().await;
        let config = WebhookConfig::new(&server.base_url).with_auth(AuthMethod::HmacSha256 {
            secret: "webhook-secret".into(),
            header: "X-Signature".into(),
        });
        let adapter = WebhookAdapter::new(config);

        let server_handle = tokio::spawn(async move {
            let request = server.respond_once(200, r#"{"ok":true}"#).await;
            let request_str = String::from_utf8_lossy(&request).to_lowercase();
            assert!(request_str.contains("x-signature: sha256="));
        });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn send_with_custom_headers() {
        let server = MockWebhookServer::start().await;
        let config = WebhookConfig::new(&server.base_url)
            .with_header("X-Custom-One", "value1")
            .with_header("X-Custom-Two", "value2");
        let adapter = WebhookAdapter::new(config);

        let server_handle = tokio::spawn(async move {
            let request = server.respond_once(200, r#"{"ok":true}"#).await;
            let request_str = String::from_utf8_lossy(&request).to_lowercase();
            assert!(request_str.contains("x-custom-one: value1"));
            assert!(request_str.contains("x-custom-two: value2"));
        });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn send_rate_limited_reports_failure() {
        let server = MockWebhookServer::start().await;
        let adapter = WebhookAdapter::new(WebhookConfig::new(&server.base_url));

        let server_handle = tokio::spawn(async move {
            server.respond_rate_limited().await;
        });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn send_server_error_reports_failure() {
        let server = MockWebhookServer::start().await;
        let adapter = WebhookAdapter::new(WebhookConfig::new(&server.base_url));

        let server_handle = tokio::spawn(async move {
            server
                .respond_once(500, r#"{"error":"internal server error"}"#)
                .await
        });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn send_custom_success_codes() {
        let server = MockWebhookServer::start().await;
        let config =
            WebhookConfig::new(&server.base_url).with_success_status_codes(vec![200, 201, 202]);
        let adapter = WebhookAdapter::new(config);

        let server_handle =
            tokio::spawn(async move { server.respond_once(202, r#"{"queued":true}"#).await });

        let result = adapter.send(&sample_alert()).await;
        server_handle.await.unwrap();
        assert!(result.success);
    }

    #[test]
    fn compute_hmac_produces_hex_string() {
        let signature = WebhookAdapter::compute_hmac("secret", b"hello world").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn compute_hmac_deterministic() {
        let sig1 = WebhookAdapter::compute_hmac("secret", b"data").unwrap();
        let sig2 = WebhookAdapter::compute_hmac("secret", b"data").unwrap();
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn compute_hmac_different_secrets_differ() {
        let sig1 = WebhookAdapter::compute_hmac("secret1", b"data").unwrap();
        let sig2 = WebhookAdapter::compute_hmac("secret2", b"data").unwrap();
        assert_ne!(sig1, sig2);
    }

    #[test]
    fn is_success_status_default() {
        let adapter = WebhookAdapter::new(WebhookConfig::new("https://example.com"));
        assert!(adapter.is_success_status(200));
        assert!(adapter.is_success_status(204));
        assert!(!adapter.is_success_status(301));
        assert!(!adapter.is_success_status(500));
    }

    #[test]
    fn is_success_status_custom() {
        let config =
            WebhookConfig::new("https://example.com").with_success_status_codes(vec![200, 202]);
        let adapter = WebhookAdapter::new(config);
        assert!(adapter.is_success_status(200));
        assert!(adapter.is_success_status(202));
        assert!(!adapter.is_success_status(201));
    }
}
