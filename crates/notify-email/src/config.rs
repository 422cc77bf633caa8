use serde::{Deserialize, Serialize};

/// SMTP-specific configuration settings.
///
/// Holds all settings needed to establish a connection to an SMTP server.
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server hostname.
    pub smtp_host: String,

    /// SMTP server port. Defaults to 587 (STARTTLS submission port).
    pub smtp_port: u16,

    /// Optional SMTP username for authentication.
    pub username: Option<String>,

    /// Optional SMTP password for authentication.
    pub password: Option<String>,

    /// Whether to use TLS for the SMTP connection. Defaults to `true`.
    pub tls: bool,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tls", &self.tls)
            .finish()
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_owned(),
            smtp_port: 587,
            username: None,
            password: None,
            tls: true,
        }
    }
}

/// Full email channel configuration: the `channelConfig` half of the
/// notification boundary for the email channel. One config targets one
/// recipient mailbox through one SMTP server.
///
/// # Examples
///
/// ```
/// use watchloop_notify_email::EmailConfig;
///
/// let config = EmailConfig::new("smtp.example.com", "noreply@example.com", "ops@example.com");
/// assert_eq!(config.smtp_host, "smtp.example.com");
/// assert!(config.tls);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// The `From` address used in outgoing emails.
    pub from_address: String,

    /// The recipient mailbox this channel delivers to.
    pub to_address: String,

    /// SMTP server hostname.
    pub smtp_host: String,

    /// SMTP server port. Defaults to 587.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Optional SMTP username for authentication.
    pub username: Option<String>,

    /// Optional SMTP password for authentication.
    pub password: Option<String>,

    /// Whether to use TLS for SMTP. Defaults to `true`.
    #[serde(default = "default_tls")]
    pub tls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_tls() -> bool {
    true
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("from_address", &self.from_address)
            .field("to_address", &self.to_address)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tls", &self.tls)
            .finish()
    }
}

impl EmailConfig {
    /// Create a new `EmailConfig` for the given SMTP host, sender, and
    /// recipient.
    pub fn new(
        smtp_host: impl Into<String>,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
    ) -> Self {
        Self {
            from_address: from_address.into(),
            to_address: to_address.into(),
            smtp_host: smtp_host.into(),
            smtp_port: 587,
            username: None,
            password: None,
            tls: true,
        }
    }

    /// Set SMTP authentication credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Override the default SMTP port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.smtp_port = port;
        self
    }

    /// Set whether TLS should be used for SMTP.
    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Extract the SMTP-specific config.
    pub fn smtp_config(&self) -> SmtpConfig {
        SmtpConfig {
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            username: self.username.clone(),
            password: self.password.clone(),
            tls: self.tls,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_address: "noreply@localhost".to_owned(),
            to_address: "ops@localhost".to_owned(),
            smtp_host: "localhost".to_owned(),
            smtp_port: 587,
            username: None,
            password: None,
            tls: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = EmailConfig::default();
        assert_eq!(config.smtp_host, "localhost");
        assert_eq!(config.smtp_port, 587);
        assert!(config.tls);
        assert!(config.username.is_none());
        assert!(config.password.is_none());
        assert_eq!(config.from_address, "noreply@localhost");
    }

    #[test]
    fn new_config_sets_host_from_and_to() {
        let config = EmailConfig::new("smtp.gmail.com", "me@gmail.com", "ops@gmail.com");
        assert_eq!(config.smtp_host, "smtp.gmail.com");
        assert_eq!(config.from_address, "me@gmail.com");
        assert_eq!(config.to_address, "ops@gmail.com");
        assert_eq!(config.smtp_port, 587);
        assert!(config.tls);
    }

    #[test]
    fn with_credentials_sets_auth() {
        let config = EmailConfig::new("smtp.example.com", "sender@example.com", "to@example.com")
            .with_credentials("user", "pass");
        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.password.as_deref(), Some("pass"));
    }

    #[test]
    fn with_port_overrides_default() {
        let config = EmailConfig::new("smtp.example.com", "sender@example.com", "to@example.com")
            .with_port(465);
        assert_eq!(config.smtp_port, 465);
    }

    #[test]
    fn with_tls_can_disable() {
        let config = EmailConfig::new("smtp.example.com", "sender@example.com", "to@example.com")
            .with_tls(false);
        assert!(!config.tls);
    }

    #[test]
    fn smtp_config_extraction() {
        let config = EmailConfig::new("smtp.example.com", "sender@example.com", "to@example.com")
            .with_credentials("user", "pass")
            .with_port(465)
            .with_tls(false);

        let smtp = config.smtp_config();
        assert_eq!(smtp.smtp_host, "smtp.example.com");
        assert_eq!(smtp.smtp_port, 465);
        assert_eq!(smtp.username.as_deref(), Some("user"));
        assert!(!smtp.tls);
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = EmailConfig::new("smtp.example.com", "test@example.com", "to@example.com")
            .with_credentials("user", "myvalue")
            .with_port(465)
            .with_tls(false);

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EmailConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.smtp_host, "smtp.example.com");
        assert_eq!(deserialized.smtp_port, 465);
        assert_eq!(deserialized.username.as_deref(), Some("user"));
        assert_eq!(deserialized.password.as_deref(), Some("myvalue"));
        assert_eq!(deserialized.from_address, "test@example.com");
        assert!(!deserialized.tls);
    }

    #[test]
    fn debug_redacts_password() {
        let config = EmailConfig::new("smtp.example.com", "test@example.com", "to@example.com")
            .with_credentials("user", "test-pw-placeholder");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"), "password must be redacted");
        assert!(
            !debug.contains("test-pw-placeholder"),
            "password must not appear in debug output"
        );
        assert!(
            debug.contains("smtp.example.com"),
            "non-secret fields should be visible"
        );
    }
}
