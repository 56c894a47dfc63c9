//! cronpipe: HTTP trigger server for the scheduled pipeline.
//!
//! ## Build variants
//!
//! ```bash
//! # In-memory ledger and locks (single instance)
//! cargo build --release --bin cronpipe
//!
//! # Postgres ledger and locks
//! cargo build --release --features postgres --bin cronpipe
//! ```
//!
//! ## Environment variables
//!
//! | Variable                 | Required | Description                                 |
//! |--------------------------|----------|---------------------------------------------|
//! | `CRON_SECRET`            | Yes      | Bearer secret the scheduler presents        |
//! | `SPLIT_JOBS_ENABLED`     | No       | Enable standalone stage endpoints           |
//! | `BIND_ADDRESS`           | No       | Listen address (default: 0.0.0.0:8080)      |
//! | `DATABASE_URL`           | No       | Postgres URL (feature `postgres`)           |
//! | `CACHE_REVALIDATE_URL`   | No       | URL POSTed to after data changes            |
//! | `CACHE_REVALIDATE_TOKEN` | No       | Bearer token for the revalidation URL       |
//! | `LOG_FORMAT`             | No       | `json` for structured logs                  |

use anyhow::Context;
use clap::Parser;
use cronpipe::api::{self, AppState};
use cronpipe::cache::{CacheInvalidator, HttpCacheInvalidator, LoggingCacheInvalidator};
use cronpipe::config::{ConfigOverrides, OrchestratorConfig};
use cronpipe::core::StageName;
use cronpipe::events::LoggingEventSink;
use cronpipe::ledger::{InMemoryLedger, Ledger};
use cronpipe::lock::{InMemoryLockStore, LockManager, LockStore};
use cronpipe::pipeline::Orchestrator;
use cronpipe::stages::{NoOpStage, StageRegistry};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cronpipe", about = "Lock-guarded pipeline orchestrator for scheduled jobs")]
struct CliArgs {
    /// Bind address (overrides BIND_ADDRESS)
    #[arg(long)]
    bind_address: Option<String>,

    /// PostgreSQL connection URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Enable standalone stage endpoints (overrides SPLIT_JOBS_ENABLED)
    #[arg(long)]
    split_jobs: Option<bool>,

    /// Log format: `text` or `json`
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_tracing(&args.log_format);

    let config = OrchestratorConfig::from_env(ConfigOverrides {
        bind_address: args.bind_address,
        database_url: args.database_url,
        split_jobs_enabled: args.split_jobs,
    })?;
    config.validate().context("refusing to start")?;

    info!(
        bind = %config.bind_address,
        split_jobs_enabled = config.split_jobs_enabled,
        "Starting cronpipe"
    );

    // ── Stores ────────────────────────────────────────────────────────────────
    let (lock_store, ledger) = open_stores(&config).await?;

    // ── Stages ────────────────────────────────────────────────────────────────
    // Demonstration stages; deployments register their own implementations.
    let stages = StageName::PIPELINE_ORDER
        .into_iter()
        .fold(StageRegistry::new(), |registry, stage| {
            registry.with(Arc::new(NoOpStage::new(stage)))
        });

    let cache: Arc<dyn CacheInvalidator> = match &config.cache_revalidate_url {
        Some(url) => {
            info!(url = %url, "Cache revalidation enabled");
            Arc::new(HttpCacheInvalidator::new(
                url.clone(),
                config.cache_revalidate_token.clone(),
            )?)
        }
        None => Arc::new(LoggingCacheInvalidator),
    };

    let orchestrator = Orchestrator::new(LockManager::new(lock_store), ledger, stages)
        .with_cache(cache)
        .with_events(Arc::new(LoggingEventSink::debug()));

    let state = Arc::new(AppState::new(
        config.cron_secret.clone(),
        orchestrator,
        config.split_jobs_enabled,
    ));

    // ── HTTP Server ───────────────────────────────────────────────────────────
    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("binding {}", config.bind_address))?;
    info!(address = %config.bind_address, "cronpipe listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("cronpipe shut down gracefully");
    Ok(())
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cronpipe=debug"));

    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(feature = "postgres")]
async fn open_stores(
    config: &OrchestratorConfig,
) -> anyhow::Result<(Arc<dyn LockStore>, Arc<dyn Ledger>)> {
    use cronpipe::ledger::PgLedger;
    use cronpipe::lock::PgLockStore;

    let Some(url) = &config.database_url else {
        warn!("DATABASE_URL not set, using in-memory ledger and locks");
        return Ok(in_memory_stores());
    };

    let pool = PgLedger::connect(url).await?;
    PgLedger::migrate(&pool).await?;
    Ok((
        Arc::new(PgLockStore::new(pool.clone())),
        Arc::new(PgLedger::new(pool)),
    ))
}

#[cfg(not(feature = "postgres"))]
async fn open_stores(
    config: &OrchestratorConfig,
) -> anyhow::Result<(Arc<dyn LockStore>, Arc<dyn Ledger>)> {
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but the postgres feature is disabled; using in-memory stores");
    } else {
        info!("Using in-memory ledger and locks");
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (Arc<dyn LockStore>, Arc<dyn Ledger>) {
    (
        Arc::new(InMemoryLockStore::new()),
        Arc::new(InMemoryLedger::new()),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
