//! watchloop background worker (§5, §6).
//!
//! Two independent polling loops against the job queue boundary: `rules:run`
//! jobs drive the Run Handler (C11), `alerts:dispatch` jobs drive the Alert
//! Dispatch Handler (C12). Each loop caps in-flight jobs with a counting
//! semaphore and polls on a short interval — the in-process queues this
//! binary defaults to are push-free, so there's nothing to subscribe to;
//! a deployment behind a real broker replaces `RunQueue`/`DispatchQueue`
//! without touching either handler.

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{Notify, Semaphore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use watchloop_core::{AlertDispatchJob, RunJob};
use watchloop_ledger::Ledger;
use watchloop_ledger_memory::MemoryLedger;
use watchloop_ledger_postgres::{PostgresLedger, PostgresLedgerConfig};
use watchloop_notify::{NotificationAdapter, NotificationRegistry};
use watchloop_notify_email::{EmailAdapter, EmailConfig};
use watchloop_notify_webhook::{AuthMethod, WebhookAdapter, WebhookConfig};
use watchloop_pipeline::{
    BudgetGuard, CircuitBreaker, ConcurrencySemaphore, CssExtractor, DispatchHandler, DispatchQueue,
    FetchOrchestrator, MemoryDispatchQueue, MemoryRuleSource, MemoryRunQueue, QueueError, RateLimiter,
    RunHandler, RunQueue, StandardConditionEvaluator, StaticBudgetPolicy, TierPolicy,
};
use watchloop_provider::{
    BrightdataProvider, FlaresolverrProvider, HeadlessProvider, HttpProvider, ProviderRegistry,
    ScrapingBrowserProvider, TwoCaptchaProxyProvider,
};
use watchloop_state::{DistributedLock, LeaseStore, StateStore};
use watchloop_state_memory::{MemoryDistributedLock, MemoryLeaseStore, MemoryStateStore};
use watchloop_state_redis::{RedisConfig, RedisDistributedLock, RedisLeaseStore, RedisStateStore};

use config::{LedgerBackendKind, StateBackendKind, WorkerConfig};

/// How often each loop checks its queue when idle.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WorkerConfig::parse();

    let (store, lock, leases) = build_state_backend(&config).await?;
    let ledger = build_ledger(&config).await?;
    let providers = build_providers(&config)?;
    let registry = build_notification_registry(&config)?;

    let orchestrator = Arc::new(FetchOrchestrator::new(
        providers,
        RateLimiter::new(store.clone(), lock.clone()),
        ConcurrencySemaphore::new(leases),
        CircuitBreaker::new(store, lock),
        BudgetGuard::new(ledger.clone(), Arc::new(StaticBudgetPolicy::new())),
        ledger.clone(),
    ));

    let tier_policy = TierPolicy {
        enabled: config.tier_policy_enabled,
        canary_workspaces: config.canary_workspaces(),
        default_max_attempts_per_run: config.max_attempts_per_run,
        default_allow_paid: config.allow_paid,
    };

    // Rule storage is out of scope (§1) — the in-memory source is this
    // binary's only option until a tenant config store is wired in.
    let rule_source = Arc::new(MemoryRuleSource::new());
    let run_queue: Arc<dyn RunQueue> = Arc::new(MemoryRunQueue::new());
    let dispatch_queue: Arc<dyn DispatchQueue> = Arc::new(MemoryDispatchQueue::new());

    let run_handler = Arc::new(RunHandler::new(
        rule_source,
        ledger.clone(),
        orchestrator,
        Arc::new(CssExtractor::new()),
        Arc::new(StandardConditionEvaluator::new()),
        run_queue.clone(),
        dispatch_queue.clone(),
        tier_policy,
    ));
    let dispatch_handler = Arc::new(DispatchHandler::new(ledger, registry));

    let shutdown = Arc::new(Notify::new());

    let run_loop = tokio::spawn(poll_run_queue(run_queue, run_handler, config.run_concurrency, shutdown.clone()));
    let dispatch_loop =
        tokio::spawn(poll_dispatch_queue(dispatch_queue, dispatch_handler, config.dispatch_concurrency, shutdown.clone()));

    shutdown_signal().await;
    info!("shutdown signal received, draining in-flight jobs");
    shutdown.notify_waiters();

    if tokio::time::timeout(config.shutdown_drain(), async {
        let _ = tokio::join!(run_loop, dispatch_loop);
    })
    .await
    .is_err()
    {
        warn!("drain window elapsed before all in-flight jobs finished");
    }

    info!("watchloop-worker shut down");
    Ok(())
}

async fn poll_run_queue(
    queue: Arc<dyn RunQueue>,
    handler: Arc<RunHandler>,
    concurrency: usize,
    shutdown: Arc<Notify>,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    loop {
        tokio::select! {
            biased;
            () = shutdown.notified() => break,
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        match queue.dequeue().await {
            Ok(Some(job)) => spawn_run_job(&semaphore, &handler, job),
            Ok(None) => {}
            Err(e) => log_queue_error("rules:run", &e),
        }
    }
    drain(&semaphore, concurrency).await;
}

fn spawn_run_job(semaphore: &Arc<Semaphore>, handler: &Arc<RunHandler>, job: RunJob) {
    let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
        // Concurrency ceiling reached; leave the job queued for next poll.
        return;
    };
    let handler = handler.clone();
    let rule_id = job.rule_id.clone();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(e) = handler.handle(job).await {
            error!(rule_id = %rule_id, error = %e, "rules:run job failed");
        }
    });
}

async fn poll_dispatch_queue(
    queue: Arc<dyn DispatchQueue>,
    handler: Arc<DispatchHandler>,
    concurrency: usize,
    shutdown: Arc<Notify>,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    loop {
        tokio::select! {
            biased;
            () = shutdown.notified() => break,
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        match queue.dequeue().await {
            Ok(Some(job)) => spawn_dispatch_job(&semaphore, &handler, job),
            Ok(None) => {}
            Err(e) => log_queue_error("alerts:dispatch", &e),
        }
    }
    drain(&semaphore, concurrency).await;
}

fn spawn_dispatch_job(semaphore: &Arc<Semaphore>, handler: &Arc<DispatchHandler>, job: AlertDispatchJob) {
    let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
        return;
    };
    let handler = handler.clone();
    let alert_id = job.alert_id.clone();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(e) = handler.handle(job).await {
            error!(alert_id = %alert_id, error = %e, "alerts:dispatch job failed");
        }
    });
}

fn log_queue_error(queue_name: &str, error: &QueueError) {
    warn!(queue = queue_name, error = %error, "queue backend unavailable, will retry");
}

/// Wait until every in-flight permit is released, i.e. all spawned jobs
/// finished. Callers bound the total wait with a timeout of their own.
async fn drain(semaphore: &Arc<Semaphore>, concurrency: usize) {
    let _ = semaphore.acquire_many(concurrency as u32).await;
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}

type StateBackend = (Arc<dyn StateStore>, Arc<dyn DistributedLock>, Arc<dyn LeaseStore>);

async fn build_state_backend(config: &WorkerConfig) -> Result<StateBackend, Box<dyn std::error::Error>> {
    match config.state_backend {
        StateBackendKind::Memory => {
            Ok((Arc::new(MemoryStateStore::new()), Arc::new(MemoryDistributedLock::new()), Arc::new(MemoryLeaseStore::new())))
        }
        StateBackendKind::Redis => {
            let redis_config =
                RedisConfig { url: config.redis_url.clone(), prefix: config.redis_prefix.clone(), ..RedisConfig::default() };
            let store = RedisStateStore::new(&redis_config)?;
            let lock = RedisDistributedLock::new(&redis_config)?;
            let leases = RedisLeaseStore::new(&redis_config)?;
            info!(url = %config.redis_url, "connected to redis state backend");
            Ok((Arc::new(store), Arc::new(lock), Arc::new(leases)))
        }
    }
}

async fn build_ledger(config: &WorkerConfig) -> Result<Arc<dyn Ledger>, Box<dyn std::error::Error>> {
    match config.ledger_backend {
        LedgerBackendKind::Memory => Ok(Arc::new(MemoryLedger::new())),
        LedgerBackendKind::Postgres => {
            let pg_config = PostgresLedgerConfig::new(config.postgres_url.clone()).with_prefix(config.postgres_prefix.clone());
            let ledger = PostgresLedger::new(&pg_config).await?;
            info!("connected to postgres ledger backend, migrations applied");
            Ok(Arc::new(ledger))
        }
    }
}

fn build_providers(config: &WorkerConfig) -> Result<ProviderRegistry, Box<dyn std::error::Error>> {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(HttpProvider::new()));

    if let Some(endpoint) = &config.flaresolverr_endpoint {
        registry.register(Arc::new(FlaresolverrProvider::new(endpoint.clone())));
    }
    if let Some(endpoint) = &config.headless_endpoint {
        registry.register(Arc::new(HeadlessProvider::new(endpoint.clone())));
    }
    if let (Some(endpoint), Some(api_key)) = (&config.brightdata_endpoint, &config.brightdata_api_key) {
        let api_key = config.resolve_secret(api_key)?;
        registry.register(Arc::new(BrightdataProvider::new(endpoint.clone(), api_key, config.brightdata_zone.clone())));
    }
    if let (Some(endpoint), Some(api_key)) = (&config.scraping_browser_endpoint, &config.scraping_browser_api_key) {
        let api_key = config.resolve_secret(api_key)?;
        registry.register(Arc::new(ScrapingBrowserProvider::new(endpoint.clone(), api_key)));
    }
    if let (Some(endpoint), Some(api_key)) = (&config.twocaptcha_proxy_endpoint, &config.twocaptcha_proxy_api_key) {
        let api_key = config.resolve_secret(api_key)?;
        registry.register(Arc::new(TwoCaptchaProxyProvider::new(endpoint.clone(), api_key)));
    }

    Ok(registry)
}

fn build_notification_registry(config: &WorkerConfig) -> Result<NotificationRegistry, Box<dyn std::error::Error>> {
    let mut registry = NotificationRegistry::new();

    if let Some(url) = &config.webhook_url {
        let mut webhook_config = WebhookConfig::new(url.clone());
        if let Some(token) = &config.webhook_bearer_token {
            let token = config.resolve_secret(token)?;
            webhook_config = webhook_config.with_auth(AuthMethod::Bearer(token));
        }
        let adapter: Arc<dyn NotificationAdapter> = Arc::new(WebhookAdapter::new(webhook_config));
        registry.register(adapter);
    }

    if let (Some(smtp_host), Some(to_address)) = (&config.smtp_host, &config.email_to) {
        let mut email_config = EmailConfig::new(smtp_host.clone(), config.email_from.clone(), to_address.clone())
            .with_port(config.smtp_port);
        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            let password = config.resolve_secret(password)?;
            email_config = email_config.with_credentials(username.clone(), password);
        }
        let adapter: Arc<dyn NotificationAdapter> = Arc::new(EmailAdapter::new(&email_config)?);
        registry.register(adapter);
    }

    Ok(registry)
}
