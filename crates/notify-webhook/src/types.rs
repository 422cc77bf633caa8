use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use watchloop_core::alert::{Alert, Severity};
use watchloop_core::change::ChangeKind;
use watchloop_core::value::NormalizedValue;

use crate::config::PayloadMode;

/// Response received from the webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// HTTP status code from the endpoint.
    pub status_code: u16,

    /// Response body (parsed as JSON if possible, otherwise a string value).
    pub body: serde_json::Value,

    /// Response headers.
    pub headers: HashMap<String, String>,
}

/// The full alert payload sent when [`PayloadMode::FullAlert`] is
/// configured — every field a receiving integration might want to branch
/// on, camelCase to match the rest of the spec's external wire formats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FullAlertPayload<'a> {
    alert_id: &'a str,
    dedupe_key: &'a str,
    rule_id: &'a str,
    workspace_id: &'a str,
    severity: Severity,
    title: &'a str,
    body: &'a str,
    triggered_at: chrono::DateTime<chrono::Utc>,
    current_value: &'a NormalizedValue,
    previous_value: &'a Option<NormalizedValue>,
    change_kind: Option<ChangeKind>,
    diff_summary: &'a Option<String>,
}

/// The reduced payload sent when [`PayloadMode::Compact`] is configured —
/// enough for a chat-ops integration to render a one-line notification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompactAlertPayload<'a> {
    alert_id: &'a str,
    dedupe_key: &'a str,
    severity: Severity,
    title: &'a str,
    body: &'a str,
}

/// Build the JSON request body for `alert` under the given payload mode.
pub fn alert_payload(mode: PayloadMode, alert: &Alert) -> serde_json::Value {
    match mode {
        PayloadMode::FullAlert => serde_json::to_value(FullAlertPayload {
            alert_id: &alert.id,
            dedupe_key: &alert.dedupe_key,
            rule_id: alert.rule_id.as_str(),
            workspace_id: alert.workspace_id.as_str(),
            severity: alert.severity,
            title: &alert.title,
            body: &alert.body,
            triggered_at: alert.triggered_at,
            current_value: &alert.current_value,
            previous_value: &alert.previous_value,
            change_kind: alert.change_kind,
            diff_summary: &alert.diff_summary,
        }),
        PayloadMode::Compact => serde_json::to_value(CompactAlertPayload {
            alert_id: &alert.id,
            dedupe_key: &alert.dedupe_key,
            severity: alert.severity,
            title: &alert.title,
            body: &alert.body,
        }),
    }
    .expect("alert payload types are always JSON-serializable")
}

#[cfg(test)]
mod tests {
    use watchloop_core::ids::{RuleId, WorkspaceId};
    use watchloop_core::value::NormalizedValue;

    use super::*;

    #[test]
    fn webhook_response_serializes() {
        let resp = WebhookResponse {
            status_code: 200,
            body: serde_json::json!({"ok": true}),
            headers: HashMap::new(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status_code"], 200);
        assert_eq!(json["body"]["ok"], true);
    }

    #[test]
    fn webhook_response_serde_roundtrip() {
        let resp = WebhookResponse {
            status_code: 202,
            body: serde_json::json!({"id": "event-1"}),
            headers: HashMap::new(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: WebhookResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status_code, 202);
        assert_eq!(back.body["id"], "event-1");
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
            triggered_at: chrono::Utc::now(),
            current_value: NormalizedValue::Number { value: 9.99 },
            previous_value: Some(NormalizedValue::Number { value: 14.99 }),
            change_kind: Some(ChangeKind::ValueChanged),
            diff_summary: Some("14.99 -> 9.99".into()),
            channels: vec!["webhook".into()],
        }
    }

    #[test]
    fn full_alert_payload_includes_every_field() {
        let alert = sample_alert();
        let body = alert_payload(PayloadMode::FullAlert, &alert);
        assert_eq!(body["alertId"], "alert-1");
        assert_eq!(body["dedupeKey"], "dk-1");
        assert_eq!(body["ruleId"], "r1");
        assert_eq!(body["workspaceId"], "ws1");
        assert_eq!(body["title"], "Price dropped");
        assert!(body.get("previousValue").is_some());
        assert!(body.get("diffSummary").is_some());
    }

    #[test]
    fn compact_alert_payload_omits_value_fields() {
        let alert = sample_alert();
        let body = alert_payload(PayloadMode::Compact, &alert);
        assert_eq!(body["alertId"], "alert-1");
        assert_eq!(body["title"], "Price dropped");
        assert!(body.get("currentValue").is_none());
        assert!(body.get("ruleId").is_none());
    }
}
