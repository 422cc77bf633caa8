use sqlx::PgPool;

/// Create the ledger tables and indexes if they do not already exist.
pub async fn run_migrations(pool: &PgPool, prefix: &str) -> Result<(), sqlx::Error> {
    let attempts = format!("{prefix}fetch_attempts");
    let stats = format!("{prefix}domain_stats");
    let observations = format!("{prefix}observations");
    let alerts = format!("{prefix}alerts");

    sqlx::query(&format!(
        "
        CREATE TABLE IF NOT EXISTS {attempts} (
            id              BIGSERIAL PRIMARY KEY,
            workspace_id    TEXT NOT NULL,
            rule_id         TEXT NOT NULL,
            url             TEXT NOT NULL,
            hostname        TEXT NOT NULL,
            provider        TEXT NOT NULL,
            outcome         TEXT NOT NULL,
            block_kind      TEXT,
            http_status     INTEGER,
            final_url       TEXT,
            body_bytes      BIGINT,
            content_type    TEXT,
            latency_ms      BIGINT NOT NULL,
            signals         JSONB NOT NULL DEFAULT '[]'::jsonb,
            error_detail    TEXT,
            cost_usd        DOUBLE PRECISION NOT NULL DEFAULT 0,
            cost_units      DOUBLE PRECISION,
            raw_sample      TEXT,
            attempted_at    TIMESTAMPTZ NOT NULL
        )
        "
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{prefix}attempts_rule_time ON {attempts} (rule_id, attempted_at DESC)"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "
        CREATE TABLE IF NOT EXISTS {stats} (
            workspace_id    TEXT NOT NULL,
            hostname        TEXT NOT NULL,
            day             DATE NOT NULL,
            attempts        BIGINT NOT NULL DEFAULT 0,
            ok_count        BIGINT NOT NULL DEFAULT 0,
            blocked_count   BIGINT NOT NULL DEFAULT 0,
            empty_count     BIGINT NOT NULL DEFAULT 0,
            timeout_count   BIGINT NOT NULL DEFAULT 0,
            cost_usd        DOUBLE PRECISION NOT NULL DEFAULT 0,
            latency_sum_ms  BIGINT NOT NULL DEFAULT 0,
            PRIMARY KEY (workspace_id, hostname, day)
        )
        "
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "
        CREATE TABLE IF NOT EXISTS {observations} (
            rule_id         TEXT PRIMARY KEY,
            workspace_id    TEXT NOT NULL,
            value           JSONB NOT NULL,
            observed_at     TIMESTAMPTZ NOT NULL
        )
        "
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "
        CREATE TABLE IF NOT EXISTS {alerts} (
            id              TEXT PRIMARY KEY,
            dedupe_key      TEXT NOT NULL UNIQUE,
            rule_id         TEXT NOT NULL,
            workspace_id    TEXT NOT NULL,
            severity        TEXT NOT NULL,
            title           TEXT NOT NULL,
            body            TEXT NOT NULL,
            triggered_at    TIMESTAMPTZ NOT NULL,
            current_value   JSONB NOT NULL,
            previous_value  JSONB,
            change_kind     TEXT,
            diff_summary    TEXT,
            channels        JSONB NOT NULL DEFAULT '[]'::jsonb
        )
        "
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{prefix}alerts_rule_time ON {alerts} (rule_id, triggered_at DESC)"
    ))
    .execute(pool)
    .await?;

    Ok(())
}
