use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use watchloop_core::classify::{BlockKind, Outcome};
use watchloop_core::ids::{Hostname, RuleId, WorkspaceId};
use watchloop_core::value::NormalizedValue;
use watchloop_core::{Alert, ChangeKind, DomainStats, FetchAttempt, Observation, Severity};
use watchloop_ledger::error::LedgerError;
use watchloop_ledger::store::Ledger;

use crate::config::PostgresLedgerConfig;
use crate::migrations;

fn to_storage_err(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().and_then(sqlx::error::DatabaseError::code).as_deref() == Some("23505")
}

/// Postgres-backed [`Ledger`] using `sqlx`.
pub struct PostgresLedger {
    pool: PgPool,
    attempts_table: String,
    stats_table: String,
    observations_table: String,
    alerts_table: String,
}

impl PostgresLedger {
    /// Connect to Postgres and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the connection or migrations fail.
    pub async fn new(config: &PostgresLedgerConfig) -> Result<Self, LedgerError> {
        let pool = PgPool::connect(&config.url).await.map_err(to_storage_err)?;
        Self::from_pool(pool, &config.prefix).await
    }

    /// Construct from an existing pool (useful for tests and shared pools).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if migrations fail.
    pub async fn from_pool(pool: PgPool, prefix: &str) -> Result<Self, LedgerError> {
        migrations::run_migrations(&pool, prefix).await.map_err(to_storage_err)?;

        Ok(Self {
            attempts_table: format!("{prefix}fetch_attempts"),
            stats_table: format!("{prefix}domain_stats"),
            observations_table: format!("{prefix}observations"),
            alerts_table: format!("{prefix}alerts"),
            pool,
        })
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn log_attempt(&self, attempt: FetchAttempt) -> Result<(), LedgerError> {
        let sql = format!(
            "INSERT INTO {} (
                workspace_id, rule_id, url, hostname, provider, outcome, block_kind,
                http_status, final_url, body_bytes, content_type, latency_ms, signals,
                error_detail, cost_usd, cost_units, raw_sample, attempted_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)",
            self.attempts_table
        );

        #[allow(clippy::cast_possible_wrap)]
        let http_status = attempt.http_status.map(i32::from);
        #[allow(clippy::cast_possible_wrap)]
        let body_bytes = attempt.body_bytes.map(|b| b as i64);
        #[allow(clippy::cast_possible_wrap)]
        let latency_ms = attempt.latency_ms as i64;

        sqlx::query(&sql)
            .bind(attempt.workspace_id.as_str())
            .bind(attempt.rule_id.as_str())
            .bind(&attempt.url)
            .bind(&attempt.hostname)
            .bind(attempt.provider.as_str())
            .bind(outcome_str(attempt.outcome))
            .bind(attempt.block_kind.map(|k| block_kind_str(k).to_owned()))
            .bind(http_status)
            .bind(&attempt.final_url)
            .bind(body_bytes)
            .bind(&attempt.content_type)
            .bind(latency_ms)
            .bind(serde_json::Value::from(attempt.signals))
            .bind(&attempt.error_detail)
            .bind(attempt.cost_usd)
            .bind(attempt.cost_units)
            .bind(&attempt.raw_sample)
            .bind(attempt.attempted_at)
            .execute(&self.pool)
            .await
            .map_err(to_storage_err)?;

        Ok(())
    }

    async fn record_domain_stats(
        &self,
        workspace_id: &WorkspaceId,
        hostname: &Hostname,
        day: NaiveDate,
        outcome: Outcome,
        latency_ms: u64,
        cost_usd: f64,
    ) -> Result<(), LedgerError> {
        let ok_delta = i64::from(outcome == Outcome::Ok);
        let blocked_delta = i64::from(matches!(outcome, Outcome::Blocked | Outcome::CaptchaRequired));
        let empty_delta = i64::from(outcome == Outcome::Empty);
        let timeout_delta = i64::from(outcome == Outcome::Timeout);
        #[allow(clippy::cast_possible_wrap)]
        let latency_ms = latency_ms as i64;

        let sql = format!(
            "INSERT INTO {} (
                workspace_id, hostname, day, attempts, ok_count, blocked_count,
                empty_count, timeout_count, cost_usd, latency_sum_ms
            ) VALUES ($1,$2,$3,1,$4,$5,$6,$7,$8,$9)
            ON CONFLICT (workspace_id, hostname, day) DO UPDATE SET
                attempts = {0}.attempts + 1,
                ok_count = {0}.ok_count + EXCLUDED.ok_count,
                blocked_count = {0}.blocked_count + EXCLUDED.blocked_count,
                empty_count = {0}.empty_count + EXCLUDED.empty_count,
                timeout_count = {0}.timeout_count + EXCLUDED.timeout_count,
                cost_usd = {0}.cost_usd + EXCLUDED.cost_usd,
                latency_sum_ms = {0}.latency_sum_ms + EXCLUDED.latency_sum_ms",
            self.stats_table
        );

        sqlx::query(&sql)
            .bind(workspace_id.as_str())
            .bind(hostname)
            .bind(day)
            .bind(ok_delta)
            .bind(blocked_delta)
            .bind(empty_delta)
            .bind(timeout_delta)
            .bind(cost_usd)
            .bind(latency_ms)
            .execute(&self.pool)
            .await
            .map_err(to_storage_err)?;

        Ok(())
    }

    async fn get_domain_stats(
        &self,
        workspace_id: &WorkspaceId,
        hostname: &Hostname,
        day: NaiveDate,
    ) -> Result<Option<DomainStats>, LedgerError> {
        let sql = format!(
            "SELECT attempts, ok_count, blocked_count, empty_count, timeout_count, cost_usd, latency_sum_ms
             FROM {} WHERE workspace_id = $1 AND hostname = $2 AND day = $3",
            self.stats_table
        );

        let row: Option<(i64, i64, i64, i64, i64, f64, i64)> = sqlx::query_as(&sql)
            .bind(workspace_id.as_str())
            .bind(hostname)
            .bind(day)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;

        Ok(row.map(|(attempts, ok_count, blocked_count, empty_count, timeout_count, cost_usd, latency_sum_ms)| {
            DomainStats {
                workspace_id: workspace_id.clone(),
                hostname: hostname.clone(),
                day,
                #[allow(clippy::cast_sign_loss)]
                attempts: attempts as u64,
                #[allow(clippy::cast_sign_loss)]
                ok_count: ok_count as u64,
                #[allow(clippy::cast_sign_loss)]
                blocked_count: blocked_count as u64,
                #[allow(clippy::cast_sign_loss)]
                empty_count: empty_count as u64,
                #[allow(clippy::cast_sign_loss)]
                timeout_count: timeout_count as u64,
                cost_usd,
                #[allow(clippy::cast_sign_loss)]
                latency_sum_ms: latency_sum_ms as u64,
            }
        }))
    }

    async fn get_observation(&self, rule_id: &RuleId) -> Result<Option<Observation>, LedgerError> {
        let sql = format!(
            "SELECT workspace_id, value, observed_at FROM {} WHERE rule_id = $1",
            self.observations_table
        );

        let row: Option<(String, serde_json::Value, DateTime<Utc>)> = sqlx::query_as(&sql)
            .bind(rule_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;

        row.map(|(workspace_id, value, observed_at)| {
            Ok(Observation {
                rule_id: rule_id.clone(),
                workspace_id: WorkspaceId::new(workspace_id),
                value: serde_json::from_value(value).map_err(|e| LedgerError::Serialization(e.to_string()))?,
                observed_at,
            })
        })
        .transpose()
    }

    async fn put_observation(&self, observation: Observation) -> Result<(), LedgerError> {
        let sql = format!(
            "INSERT INTO {} (rule_id, workspace_id, value, observed_at) VALUES ($1,$2,$3,$4)
             ON CONFLICT (rule_id) DO UPDATE SET
                workspace_id = EXCLUDED.workspace_id,
                value = EXCLUDED.value,
                observed_at = EXCLUDED.observed_at",
            self.observations_table
        );

        let value = serde_json::to_value(&observation.value).map_err(|e| LedgerError::Serialization(e.to_string()))?;

        sqlx::query(&sql)
            .bind(observation.rule_id.as_str())
            .bind(observation.workspace_id.as_str())
            .bind(value)
            .bind(observation.observed_at)
            .execute(&self.pool)
            .await
            .map_err(to_storage_err)?;

        Ok(())
    }

    async fn get_alert_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<Alert>, LedgerError> {
        let sql = format!("SELECT * FROM {} WHERE dedupe_key = $1", self.alerts_table);
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(dedupe_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_latest_alert_for_rule(&self, rule_id: &RuleId) -> Result<Option<Alert>, LedgerError> {
        let sql = format!(
            "SELECT * FROM {} WHERE rule_id = $1 ORDER BY triggered_at DESC LIMIT 1",
            self.alerts_table
        );
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(rule_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn insert_alert(&self, alert: Alert) -> Result<(), LedgerError> {
        let sql = format!(
            "INSERT INTO {} (
                id, dedupe_key, rule_id, workspace_id, severity, title, body,
                triggered_at, current_value, previous_value, change_kind, diff_summary, channels
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
            self.alerts_table
        );

        let current_value =
            serde_json::to_value(&alert.current_value).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let previous_value = alert
            .previous_value
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let channels = serde_json::Value::from(alert.channels.clone());

        sqlx::query(&sql)
            .bind(&alert.id)
            .bind(&alert.dedupe_key)
            .bind(alert.rule_id.as_str())
            .bind(alert.workspace_id.as_str())
            .bind(severity_str(alert.severity))
            .bind(&alert.title)
            .bind(&alert.body)
            .bind(alert.triggered_at)
            .bind(current_value)
            .bind(previous_value)
            .bind(alert.change_kind.map(|k| change_kind_str(k).to_owned()))
            .bind(&alert.diff_summary)
            .bind(channels)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::DuplicateDedupeKey(alert.dedupe_key.clone())
                } else {
                    to_storage_err(e)
                }
            })?;

        Ok(())
    }
}

fn outcome_str(o: Outcome) -> &'static str {
    match o {
        Outcome::Ok => "ok",
        Outcome::Empty => "empty",
        Outcome::Blocked => "blocked",
        Outcome::CaptchaRequired => "captcha_required",
        Outcome::RateLimited => "rate_limited",
        Outcome::Timeout => "timeout",
        Outcome::NetworkError => "network_error",
        Outcome::ProviderError => "provider_error",
        Outcome::PreferredUnavailable => "preferred_unavailable",
        Outcome::InterstitialGeo => "interstitial_geo",
    }
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

fn block_kind_str(k: BlockKind) -> &'static str {
    match k {
        BlockKind::Datadome => "datadome",
        BlockKind::Cloudflare => "cloudflare",
        BlockKind::Perimeterx => "perimeterx",
        BlockKind::Captcha => "captcha",
        BlockKind::RateLimit => "rate_limit",
        BlockKind::Unknown => "unknown",
    }
}

fn change_kind_str(k: ChangeKind) -> &'static str {
    match k {
        ChangeKind::NewValue => "new_value",
        ChangeKind::ValueDisappeared => "value_disappeared",
        ChangeKind::ValueChanged => "value_changed",
        ChangeKind::FormatChanged => "format_changed",
    }
}

fn parse_severity(s: &str) -> Result<Severity, LedgerError> {
    match s {
        "info" => Ok(Severity::Info),
        "warning" => Ok(Severity::Warning),
        "critical" => Ok(Severity::Critical),
        other => Err(LedgerError::Serialization(format!("unknown severity '{other}'"))),
    }
}

fn parse_change_kind(s: &str) -> Result<ChangeKind, LedgerError> {
    match s {
        "new_value" => Ok(ChangeKind::NewValue),
        "value_disappeared" => Ok(ChangeKind::ValueDisappeared),
        "value_changed" => Ok(ChangeKind::ValueChanged),
        "format_changed" => Ok(ChangeKind::FormatChanged),
        other => Err(LedgerError::Serialization(format!("unknown change kind '{other}'"))),
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: String,
    dedupe_key: String,
    rule_id: String,
    workspace_id: String,
    severity: String,
    title: String,
    body: String,
    triggered_at: DateTime<Utc>,
    current_value: serde_json::Value,
    previous_value: Option<serde_json::Value>,
    change_kind: Option<String>,
    diff_summary: Option<String>,
    channels: serde_json::Value,
}

impl TryFrom<AlertRow> for Alert {
    type Error = LedgerError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let channels: Vec<String> = match row.channels {
            serde_json::Value::Array(items) => {
                items.into_iter().filter_map(|v| v.as_str().map(str::to_owned)).collect()
            }
            _ => Vec::new(),
        };

        Ok(Self {
            id: row.id,
            dedupe_key: row.dedupe_key,
            rule_id: RuleId::new(row.rule_id),
            workspace_id: WorkspaceId::new(row.workspace_id),
            severity: parse_severity(&row.severity)?,
            title: row.title,
            body: row.body,
            triggered_at: row.triggered_at,
            current_value: serde_json::from_value(row.current_value)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?,
            previous_value: row
                .previous_value
                .map(serde_json::from_value::<NormalizedValue>)
                .transpose()
                .map_err(|e| LedgerError::Serialization(e.to_string()))?,
            change_kind: row.change_kind.map(|s| parse_change_kind(&s)).transpose()?,
            diff_summary: row.diff_summary,
            channels,
        })
    }
}
