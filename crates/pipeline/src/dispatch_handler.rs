//! C12 — Alert Dispatch Handler (§4.12).
//!
//! Top-level `alerts:dispatch` job handler: loads the alert the job points
//! at, fans out to each channel on the job concurrently, and reports
//! partial failure back to the caller so the queue's own retry/backoff
//! (§6: five attempts, exponential) can re-drive only what's left to do —
//! this handler does not retry internally.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use watchloop_core::AlertDispatchJob;
use watchloop_ledger::Ledger;
use watchloop_notify::NotificationRegistry;

use crate::error::PipelineError;

pub struct DispatchHandler {
    ledger: Arc<dyn Ledger>,
    registry: NotificationRegistry,
}

impl DispatchHandler {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, registry: NotificationRegistry) -> Self {
        Self { ledger, registry }
    }

    #[instrument(skip(self, job), fields(alert_id = %job.alert_id, dedupe_key = %job.dedupe_key))]
    pub async fn handle(&self, job: AlertDispatchJob) -> Result<(), PipelineError> {
        let alert = self
            .ledger
            .get_alert_by_dedupe_key(&job.dedupe_key)
            .await?
            .ok_or_else(|| PipelineError::AlertNotFound(job.alert_id.clone()))?;

        let sends = job.channels.iter().map(|channel| {
            let alert = &alert;
            async move {
                match self.registry.get(channel) {
                    Some(adapter) => {
                        let result = adapter.send(alert).await;
                        if !result.success {
                            warn!(channel = %channel, error = ?result.error, "channel delivery failed");
                        }
                        result.success
                    }
                    None => {
                        warn!(channel = %channel, "no adapter registered for channel");
                        false
                    }
                }
            }
        });

        let results = join_all(sends).await;
        let failures = results.iter().filter(|ok| !**ok).count();

        if failures > 0 {
            return Err(PipelineError::DispatchPartialFailure(job.alert_id));
        }

        info!(channels = job.channels.len(), "alert dispatched to all channels");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use watchloop_core::alert::Severity;
    use watchloop_core::ids::{RuleId, WorkspaceId};
    use watchloop_core::{Alert, NormalizedValue};
    use watchloop_ledger_memory::MemoryLedger;
    use watchloop_notify::{NotificationAdapter, NotificationResult};

    use super::*;

    struct StubAdapter {
        channel: &'static str,
        succeeds: bool,
    }

    #[async_trait]
    impl NotificationAdapter for StubAdapter {
        fn channel(&self) -> &'static str {
            self.channel
        }

        async fn send(&self, _alert: &Alert) -> NotificationResult {
            if self.succeeds {
                NotificationResult::ok_without_id()
            } else {
                NotificationResult::failed("simulated delivery failure")
            }
        }
    }

    fn alert(channels: Vec<&str>) -> Alert {
        Alert {
            id: "a1".into(),
            dedupe_key: "dk1".into(),
            rule_id: RuleId::new("r1"),
            workspace_id: WorkspaceId::new("ws1"),
            severity: Severity::Warning,
            title: "Price dropped".into(),
            body: "body".into(),
            triggered_at: Utc::now(),
            current_value: NormalizedValue::Number { value: 1.0 },
            previous_value: None,
            change_kind: None,
            diff_summary: None,
            channels: channels.into_iter().map(String::from).collect(),
        }
    }

    fn job() -> AlertDispatchJob {
        AlertDispatchJob { alert_id: "a1".into(), channels: vec!["webhook".into(), "email".into()], dedupe_key: "dk1".into() }
    }

    #[tokio::test]
    async fn dispatches_to_all_channels_successfully() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_alert(alert(vec!["webhook", "email"])).await.unwrap();

        let mut registry = NotificationRegistry::new();
        registry.register(Arc::new(StubAdapter { channel: "webhook", succeeds: true }));
        registry.register(Arc::new(StubAdapter { channel: "email", succeeds: true }));

        let handler = DispatchHandler::new(ledger, registry);
        handler.handle(job()).await.unwrap();
    }

    #[tokio::test]
    async fn one_failing_channel_reports_partial_failure() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_alert(alert(vec!["webhook", "email"])).await.unwrap();

        let mut registry = NotificationRegistry::new();
        registry.register(Arc::new(StubAdapter { channel: "webhook", succeeds: true }));
        registry.register(Arc::new(StubAdapter { channel: "email", succeeds: false }));

        let handler = DispatchHandler::new(ledger, registry);
        let result = handler.handle(job()).await;
        assert!(matches!(result, Err(PipelineError::DispatchPartialFailure(_))));
    }

    #[tokio::test]
    async fn missing_channel_adapter_counts_as_a_failure() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_alert(alert(vec!["webhook", "sms"])).await.unwrap();

        let mut registry = NotificationRegistry::new();
        registry.register(Arc::new(StubAdapter { channel: "webhook", succeeds: true }));

        let handler = DispatchHandler::new(ledger, registry);
        let result = handler.handle(job()).await;
        assert!(matches!(result, Err(PipelineError::DispatchPartialFailure(_))));
    }

    #[tokio::test]
    async fn alert_not_found_is_an_error_not_a_panic() {
        let ledger = Arc::new(MemoryLedger::new());
        let registry = NotificationRegistry::new();
        let handler = DispatchHandler::new(ledger, registry);
        let result = handler.handle(job()).await;
        assert!(matches!(result, Err(PipelineError::AlertNotFound(_))));
    }
}
