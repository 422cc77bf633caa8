use thiserror::Error;

/// Internal errors for a single webhook delivery attempt. Never escapes
/// [`WebhookAdapter::send`](crate::adapter::WebhookAdapter::send) as an
/// `Err` — it's always folded into a
/// [`NotificationResult`](watchloop_notify::NotificationResult) whose
/// `error` field carries this error's `Display` output.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// An HTTP-level transport error occurred.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote endpoint returned an unexpected status code.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The alert payload could not be serialized for the request body.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The endpoint returned HTTP 429 (Too Many Requests).
    #[error("rate limited by remote endpoint")]
    RateLimited,

    /// HMAC signature computation failed.
    #[error("HMAC signing error: {0}")]
    SigningError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WebhookError::RateLimited;
        assert_eq!(err.to_string(), "rate limited by remote endpoint");

        let err = WebhookError::UnexpectedStatus {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "unexpected status 503: unavailable");

        let err = WebhookError::InvalidPayload("bad json".into());
        assert_eq!(err.to_string(), "invalid payload: bad json");

        let err = WebhookError::SigningError("bad secret".into());
        assert_eq!(err.to_string(), "HMAC signing error: bad secret");
    }
}
