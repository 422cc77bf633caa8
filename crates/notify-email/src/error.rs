use thiserror::Error;

/// Internal errors for a single email delivery attempt. Never escapes
/// [`EmailAdapter::send`](crate::adapter::EmailAdapter::send) as an `Err` —
/// always folded into a
/// [`NotificationResult`](watchloop_notify::NotificationResult) whose
/// `error` field carries this error's `Display` output.
#[derive(Debug, Error)]
pub enum EmailError {
    /// The transport (SMTP connection, TLS handshake, auth) failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A `from`/`to`/`cc`/`bcc`/`reply-to` address did not parse.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The message could not be built (missing body, bad MIME parts, …).
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The configured transport could not be constructed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            EmailError::Transport("connection refused".into()).to_string(),
            "transport error: connection refused"
        );
        assert_eq!(
            EmailError::InvalidAddress("not-an-email".into()).to_string(),
            "invalid address: not-an-email"
        );
    }
}
