use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while invoking a fetch provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested provider id is not registered.
    #[error("provider not found: {0}")]
    NotFound(String),

    /// The provider executed but the request failed for a reason other
    /// than timeout, connection, or rate limiting.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The provider did not respond within the request's configured
    /// timeout. Maps to outcome `timeout` at the classifier.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level error occurred before any response was
    /// received. Maps to outcome `network_error`.
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider was given invalid configuration (missing credential,
    /// malformed endpoint).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The provider's own upstream rejected the request for rate limiting
    /// reasons, distinct from this pipeline's own token bucket.
    #[error("rate limited")]
    RateLimited,

    /// The provider's response could not be parsed into the expected shape.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ProviderError {
    /// Whether the error is transient and the candidate loop should record
    /// it as such rather than treat it as a hard provider-error outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::RateLimited
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ProviderError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(ProviderError::Connection("reset".into()).is_retryable());
        assert!(ProviderError::RateLimited.is_retryable());
    }

    #[test]
    fn non_retryable_errors() {
        assert!(!ProviderError::NotFound("x".into()).is_retryable());
        assert!(!ProviderError::ExecutionFailed("x".into()).is_retryable());
        assert!(!ProviderError::Configuration("x".into()).is_retryable());
        assert!(!ProviderError::Serialization("x".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ProviderError::NotFound("brightdata".into());
        assert_eq!(err.to_string(), "provider not found: brightdata");

        let err = ProviderError::Timeout(Duration::from_millis(500));
        assert_eq!(err.to_string(), "timeout after 500ms");

        let err = ProviderError::RateLimited;
        assert_eq!(err.to_string(), "rate limited");
    }
}
