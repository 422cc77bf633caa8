use async_trait::async_trait;
use tracing::instrument;

use watchloop_core::Alert;
use watchloop_notify::{NotificationAdapter, NotificationResult};

use crate::backend::{EmailBackend, EmailMessage};
use crate::config::EmailConfig;
use crate::error::EmailError;
use crate::smtp::SmtpBackend;

/// Email notification adapter. One instance per configured channel — the
/// SMTP server, sender, and recipient are baked in at construction.
pub struct EmailAdapter {
    from_address: String,
    to_address: String,
    backend: Box<dyn EmailBackend>,
}

impl std::fmt::Debug for EmailAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailAdapter")
            .field("from_address", &self.from_address)
            .field("to_address", &self.to_address)
            .field("backend", &self.backend)
            .finish()
    }
}

impl EmailAdapter {
    /// Build an email adapter from the given channel configuration, with
    /// an SMTP backend built from its [`SmtpConfig`](crate::config::SmtpConfig).
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let backend = SmtpBackend::new(config.smtp_config())?;
        Ok(Self {
            from_address: config.from_address.clone(),
            to_address: config.to_address.clone(),
            backend: Box::new(backend),
        })
    }

    /// Build an adapter with a caller-supplied backend — used by tests and
    /// by any future non-SMTP transport.
    pub fn with_backend(
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        backend: Box<dyn EmailBackend>,
    ) -> Self {
        Self {
            from_address: from_address.into(),
            to_address: to_address.into(),
            backend,
        }
    }

    fn build_message(&self, alert: &Alert) -> EmailMessage {
        let mut body = alert.body.clone();
        if let Some(ref diff) = alert.diff_summary {
            body.push_str("\n\n");
            body.push_str(diff);
        }

        EmailMessage {
            from: self.from_address.clone(),
            to: self.to_address.clone(),
            subject: format!("[{:?}] {}", alert.severity, alert.title),
            body: Some(body),
            html_body: None,
            cc: None,
            bcc: None,
            reply_to: None,
        }
    }
}

#[async_trait]
impl NotificationAdapter for EmailAdapter {
    fn channel(&self) -> &'static str {
        "email"
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id, to = %self.to_address))]
    async fn send(&self, alert: &Alert) -> NotificationResult {
        let message = self.build_message(alert);
        match self.backend.send(&message).await {
            Ok(result) => NotificationResult {
                success: true,
                message_id: result.message_id.or_else(|| Some(alert.id.clone())),
                error: None,
            },
            Err(err) => NotificationResult::failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use watchloop_core::ids::{RuleId, WorkspaceId};
    use watchloop_core::value::NormalizedValue;
    use watchloop_core::Severity;

    use crate::backend::EmailResult;

    use super::*;

    #[derive(Debug)]
    struct StubBackend {
        result: Result<EmailResult, String>,
    }

    #[async_trait]
    impl EmailBackend for StubBackend {
        async fn send(&self, _message: &EmailMessage) -> Result<EmailResult, EmailError> {
            match &self.result {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(EmailError::Transport(e.clone())),
            }
        }

        async fn health_check(&self) -> Result<(), EmailError> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "stub"
        }
    }

    fn sample_alert() -> Alert {
        Alert {
            id: "alert-1".into(),
            dedupe_key: "dk-1".into(),
            rule_id: RuleId::new("r1"),
            workspace_id: WorkspaceId::new("ws1"),
            severity: Severity::Warning,
            title: "Stock back in stock".into(),
            body: "Item is now available.".into(),
            triggered_at: Utc::now(),
            current_value: NormalizedValue::Availability {
                status: "in_stock".into(),
                lead_time_days: None,
            },
            previous_value: None,
            change_kind: None,
            diff_summary: Some("out_of_stock -> in_stock".into()),
            channels: vec!["email".into()],
        }
    }

    #[test]
    fn channel_name_is_email() {
        let adapter = EmailAdapter::with_backend(
            "noreply@example.com",
            "ops@example.com",
            Box::new(StubBackend {
                result: Ok(EmailResult {
                    message_id: None,
                    status: "sent".into(),
                }),
            }),
        );
        assert_eq!(adapter.channel(), "email");
    }

    #[test]
    fn build_message_includes_diff_summary_in_body() {
        let adapter = EmailAdapter::with_backend(
            "noreply@example.com",
            "ops@example.com",
            Box::new(StubBackend {
                result: Ok(EmailResult {
                    message_id: None,
                    status: "sent".into(),
                }),
            }),
        );
        let message = adapter.build_message(&sample_alert());
        assert_eq!(message.to, "ops@example.com");
        assert!(message.subject.contains("Stock back in stock"));
        assert!(message.body.unwrap().contains("out_of_stock -> in_stock"));
    }

    #[tokio::test]
    async fn send_success_carries_message_id() {
        let adapter = EmailAdapter::with_backend(
            "noreply@example.com",
            "ops@example.com",
            Box::new(StubBackend {
                result: Ok(EmailResult {
                    message_id: Some("smtp-queued-1".into()),
                    status: "sent".into(),
                }),
            }),
        );
        let result = adapter.send(&sample_alert()).await;
        assert!(result.success);
        assert_eq!(result.message_id.as_deref(), Some("smtp-queued-1"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn send_without_backend_message_id_falls_back_to_alert_id() {
        let adapter = EmailAdapter::with_backend(
            "noreply@example.com",
            "ops@example.com",
            Box::new(StubBackend {
                result: Ok(EmailResult {
                    message_id: None,
                    status: "sent".into(),
                }),
            }),
        );
        let result = adapter.send(&sample_alert()).await;
        assert!(result.success);
        assert_eq!(result.message_id.as_deref(), Some("alert-1"));
    }

    #[tokio::test]
    async fn send_failure_reports_error() {
        let adapter = EmailAdapter::with_backend(
            "noreply@example.com",
            "ops@example.com",
            Box::new(StubBackend {
                result: Err("connection refused".into()),
            }),
        );
        let result = adapter.send(&sample_alert()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("connection refused"));
    }
}
