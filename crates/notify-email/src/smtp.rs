use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};

use crate::backend::{EmailBackend, EmailMessage, EmailResult};
use crate::config::SmtpConfig;
use crate::error::EmailError;

/// SMTP email delivery backend using `lettre`.
pub struct SmtpBackend {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpBackend")
            .field("config", &self.config)
            .field("transport", &"<AsyncSmtpTransport>")
            .finish()
    }
}

impl SmtpBackend {
    /// Create a new `SmtpBackend` from the given SMTP configuration.
    pub fn new(config: SmtpConfig) -> Result<Self, EmailError> {
        let transport = build_transport(&config)?;
        Ok(Self { config, transport })
    }

    /// Create a `SmtpBackend` with a pre-built transport (for testing).
    pub fn with_transport(
        config: SmtpConfig,
        transport: AsyncSmtpTransport<Tokio1Executor>,
    ) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl EmailBackend for SmtpBackend {
    async fn send(&self, message: &EmailMessage) -> Result<EmailResult, EmailError> {
        debug!(to = %message.to, subject = %message.subject, "building SMTP message");
        let lettre_message = build_message(message)?;

        info!(to = %message.to, subject = %message.subject, "sending email via SMTP");
        self.transport.send(lettre_message).await.map_err(|e| {
            error!(error = %e, "SMTP send failed");
            map_smtp_error(&e)
        })?;

        info!(to = %message.to, "email sent successfully via SMTP");
        Ok(EmailResult {
            message_id: None,
            status: "sent".to_owned(),
        })
    }

    async fn health_check(&self) -> Result<(), EmailError> {
        debug!("performing SMTP health check");
        self.transport.test_connection().await.map_err(|e| {
            error!(error = %e, "SMTP health check failed");
            EmailError::Transport(format!("SMTP health check failed: {e}"))
        })?;
        info!("SMTP health check passed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "smtp"
    }
}

/// Build a `lettre::Message` from the unified [`EmailMessage`].
fn build_message(msg: &EmailMessage) -> Result<Message, EmailError> {
    let from_mailbox: Mailbox = msg
        .from
        .parse()
        .map_err(|e| EmailError::InvalidAddress(format!("invalid from address: {e}")))?;

    let to_mailbox: Mailbox = msg
        .to
        .parse()
        .map_err(|e| EmailError::InvalidAddress(format!("invalid recipient address: {e}")))?;

    let mut builder = Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(&msg.subject);

    if let Some(ref reply_to) = msg.reply_to {
        let reply_mailbox: Mailbox = reply_to
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("invalid reply-to address: {e}")))?;
        builder = builder.reply_to(reply_mailbox);
    }

    if let Some(ref cc) = msg.cc {
        let cc_mailbox: Mailbox = cc
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("invalid CC address: {e}")))?;
        builder = builder.cc(cc_mailbox);
    }

    if let Some(ref bcc) = msg.bcc {
        let bcc_mailbox: Mailbox = bcc
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("invalid BCC address: {e}")))?;
        builder = builder.bcc(bcc_mailbox);
    }

    let message = match (&msg.body, &msg.html_body) {
        (Some(text), Some(html)) => builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(lettre::message::header::ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(lettre::message::header::ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            )
            .map_err(|e| EmailError::InvalidMessage(format!("failed to build email: {e}")))?,
        (Some(text), None) => builder
            .body(text.clone())
            .map_err(|e| EmailError::InvalidMessage(format!("failed to build email: {e}")))?,
        (None, Some(html)) => builder
            .singlepart(
                SinglePart::builder()
                    .header(lettre::message::header::ContentType::TEXT_HTML)
                    .body(html.clone()),
            )
            .map_err(|e| EmailError::InvalidMessage(format!("failed to build email: {e}")))?,
        (None, None) => builder
            .body(String::new())
            .map_err(|e| EmailError::InvalidMessage(format!("failed to build email: {e}")))?,
    };

    Ok(message)
}

/// Build an async SMTP transport from the given configuration.
fn build_transport(config: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
    let builder = if config.tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| EmailError::Configuration(format!("SMTP TLS relay error: {e}")))?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
    };

    let builder = builder.port(config.smtp_port);

    let builder = if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        builder.credentials(Credentials::new(user.clone(), pass.clone()))
    } else {
        builder
    };

    Ok(builder.build())
}

/// Map a lettre SMTP error to the appropriate `EmailError` variant.
fn map_smtp_error(error: &lettre::transport::smtp::Error) -> EmailError {
    let message = error.to_string();

    if error.is_transient() {
        EmailError::Transport(format!("transient SMTP error: {message}"))
    } else if error.is_permanent() {
        EmailError::Transport(format!("permanent SMTP error: {message}"))
    } else {
        EmailError::Transport(format!("SMTP error: {message}"))
    }
}
