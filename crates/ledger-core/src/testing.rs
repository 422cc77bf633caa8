//! Shared conformance test suite for [`Ledger`](crate::Ledger) backends.
//! Call [`run_ledger_conformance_tests`] from your backend's test module
//! with a fresh store instance.

use chrono::Utc;

use watchloop_core::classify::Outcome;
use watchloop_core::ids::{ProviderId, RuleId, WorkspaceId};
use watchloop_core::value::NormalizedValue;
use watchloop_core::{Alert, FetchAttempt, Observation, Severity};

use crate::error::LedgerError;
use crate::store::Ledger;

fn sample_attempt(workspace_id: &str, rule_id: &str, hostname: &str) -> FetchAttempt {
    FetchAttempt {
        workspace_id: WorkspaceId::new(workspace_id),
        rule_id: RuleId::new(rule_id),
        url: format!("https://{hostname}/item"),
        hostname: hostname.to_owned(),
        provider: ProviderId::new("http"),
        outcome: Outcome::Ok,
        block_kind: None,
        http_status: Some(200),
        final_url: None,
        body_bytes: Some(1024),
        content_type: Some("text/html".to_owned()),
        latency_ms: 120,
        signals: Vec::new(),
        error_detail: None,
        cost_usd: 0.0,
        cost_units: None,
        raw_sample: None,
        attempted_at: Utc::now(),
    }
}

fn sample_alert(rule_id: &str, dedupe_key: &str) -> Alert {
    Alert {
        id: uuid::Uuid::new_v4().to_string(),
        dedupe_key: dedupe_key.to_owned(),
        rule_id: RuleId::new(rule_id),
        workspace_id: WorkspaceId::new("ws-conformance"),
        severity: Severity::Warning,
        title: "price changed".to_owned(),
        body: "price dropped below threshold".to_owned(),
        triggered_at: Utc::now(),
        current_value: NormalizedValue::Number(9.99),
        previous_value: Some(NormalizedValue::Number(12.99)),
        change_kind: None,
        diff_summary: None,
        channels: vec!["webhook".to_owned()],
    }
}

/// Run the full ledger conformance test suite.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_ledger_conformance_tests(ledger: &dyn Ledger) -> Result<(), LedgerError> {
    test_log_and_domain_stats(ledger).await?;
    test_observation_round_trip(ledger).await?;
    test_observation_missing_is_none(ledger).await?;
    test_alert_dedupe_key_lookup(ledger).await?;
    test_alert_duplicate_dedupe_key_rejected(ledger).await?;
    test_latest_alert_for_rule(ledger).await?;
    Ok(())
}

async fn test_log_and_domain_stats(ledger: &dyn Ledger) -> Result<(), LedgerError> {
    let workspace_id = WorkspaceId::new("ws-stats");
    let hostname = "stats.example".to_owned();
    let day = Utc::now().date_naive();

    ledger.log_attempt(sample_attempt("ws-stats", "rule-stats", &hostname)).await?;
    ledger
        .record_domain_stats(&workspace_id, &hostname, day, Outcome::Ok, 120, 0.0)
        .await?;
    ledger
        .record_domain_stats(&workspace_id, &hostname, day, Outcome::Blocked, 80, 0.0015)
        .await?;

    let stats = ledger
        .get_domain_stats(&workspace_id, &hostname, day)
        .await?
        .expect("domain stats should exist after recording");
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.ok_count, 1);
    assert_eq!(stats.blocked_count, 1);
    assert!((stats.cost_usd - 0.0015).abs() < 1e-9);
    Ok(())
}

async fn test_observation_round_trip(ledger: &dyn Ledger) -> Result<(), LedgerError> {
    let rule_id = RuleId::new("rule-obs-1");
    let observation = Observation {
        rule_id: rule_id.clone(),
        workspace_id: WorkspaceId::new("ws-obs"),
        value: NormalizedValue::Number(42.0),
        observed_at: Utc::now(),
    };

    ledger.put_observation(observation.clone()).await?;
    let fetched = ledger.get_observation(&rule_id).await?.expect("observation should be stored");
    assert_eq!(fetched.value, observation.value);

    // last-write-wins
    let updated = Observation { value: NormalizedValue::Number(43.0), ..observation };
    ledger.put_observation(updated.clone()).await?;
    let fetched = ledger.get_observation(&rule_id).await?.unwrap();
    assert_eq!(fetched.value, updated.value);
    Ok(())
}

async fn test_observation_missing_is_none(ledger: &dyn Ledger) -> Result<(), LedgerError> {
    let missing = ledger.get_observation(&RuleId::new("rule-never-observed")).await?;
    assert!(missing.is_none());
    Ok(())
}

async fn test_alert_dedupe_key_lookup(ledger: &dyn Ledger) -> Result<(), LedgerError> {
    let alert = sample_alert("rule-alert-1", "dedupe-key-1");
    ledger.insert_alert(alert.clone()).await?;

    let fetched = ledger
        .get_alert_by_dedupe_key("dedupe-key-1")
        .await?
        .expect("alert should be findable by dedupe key");
    assert_eq!(fetched.id, alert.id);

    let missing = ledger.get_alert_by_dedupe_key("no-such-key").await?;
    assert!(missing.is_none());
    Ok(())
}

async fn test_alert_duplicate_dedupe_key_rejected(ledger: &dyn Ledger) -> Result<(), LedgerError> {
    let alert = sample_alert("rule-alert-dup", "dedupe-key-dup");
    ledger.insert_alert(alert.clone()).await?;

    let conflicting = sample_alert("rule-alert-dup-other", "dedupe-key-dup");
    let result = ledger.insert_alert(conflicting).await;
    assert!(
        matches!(result, Err(LedgerError::DuplicateDedupeKey(_))),
        "inserting a second alert with the same dedupe key should fail"
    );
    Ok(())
}

async fn test_latest_alert_for_rule(ledger: &dyn Ledger) -> Result<(), LedgerError> {
    let rule_id = "rule-cooldown";
    ledger.insert_alert(sample_alert(rule_id, "cooldown-key-1")).await?;
    ledger.insert_alert(sample_alert(rule_id, "cooldown-key-2")).await?;

    let latest = ledger
        .get_latest_alert_for_rule(&RuleId::new(rule_id))
        .await?
        .expect("at least one alert exists for this rule");
    assert_eq!(latest.rule_id, RuleId::new(rule_id));

    let none = ledger.get_latest_alert_for_rule(&RuleId::new("rule-never-alerted")).await?;
    assert!(none.is_none());
    Ok(())
}
