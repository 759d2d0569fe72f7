use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use testpool_driver::{Driver, DockerDriver, DriverRegistry, KvmDriver, LocalDriver};
use testpool_engine::{Engine, ProfileLog, SchedulerConfig};
use testpool_store::{InMemoryStore, PostgresStore, RedbStore, StateStore};

use crate::cli::{Cli, StoreBackend};
use crate::output;

fn build_registry(plugins: &[String]) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    for plugin in plugins {
        let driver: Arc<dyn Driver> = match plugin.as_str() {
            "local" => Arc::new(LocalDriver::new()),
            "docker" => Arc::new(DockerDriver::new()),
            "kvm" => Arc::new(KvmDriver::new()),
            other => {
                warn!(plugin = other, "unknown driver plugin, skipping");
                continue;
            }
        };
        registry.register(driver);
    }
    registry
}

async fn build_store(cli: &Cli) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match cli.store_backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::Redb => {
            let path = cli
                .store_path
                .as_deref()
                .context("--store-path is required for the redb store backend")?;
            Arc::new(RedbStore::open(std::path::Path::new(path))?)
        }
        StoreBackend::Postgres => {
            let url = cli
                .store_path
                .as_deref()
                .context("--store-path is required for the postgres store backend")?;
            Arc::new(PostgresStore::connect(url).await?)
        }
    };
    Ok(store)
}

/// Run the scheduler loop (§4.G), optionally preceded by setup (§4.I) and
/// accompanied by the in-process HTTP surface (§10.F).
pub async fn run(cli: Cli) -> Result<()> {
    let cfg = testpool_config::load(&cli.cfg_file).context("loading config")?;

    let store = build_store(&cli).await?;
    let registry = Arc::new(build_registry(&cfg.plugins));
    let profile_log = Arc::new(ProfileLog::open(cfg.profile_log.as_deref())?);
    let engine = Arc::new(Engine::new(store.clone(), registry.clone(), profile_log));

    if !cli.no_setup {
        info!("running startup reconciliation");
        engine.bootstrap().await.context("bootstrap failed")?;
    }
    engine.adapt_all().await.context("initial adapt failed")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, finishing current action");
            shutdown_for_signal.store(true, Ordering::SeqCst);
        }
    });

    let scheduler_cfg = SchedulerConfig {
        count: cli.count,
        max_sleep_time: Duration::from_secs(cli.max_sleep_time.unwrap_or(cfg.max_sleep_time.as_secs())),
        min_sleep_time: Duration::from_secs(cli.min_sleep_time.unwrap_or(cfg.min_sleep_time.as_secs())),
    };

    match cli.http_addr {
        Some(addr) => {
            let http = serve_http(addr, store, registry);
            let loop_engine = engine.clone();
            let (http_result, loop_result) = tokio::join!(http, loop_engine.run(scheduler_cfg, shutdown));
            http_result?;
            loop_result.context("scheduler loop failed")?;
        }
        None => {
            engine.run(scheduler_cfg, shutdown).await.context("scheduler loop failed")?;
        }
    }

    info!("clean shutdown");
    Ok(())
}

async fn serve_http(addr: SocketAddr, store: Arc<dyn StateStore>, registry: Arc<DriverRegistry>) -> Result<()> {
    let app = testpool_api::build_app(store, registry);
    let listener = tokio::net::TcpListener::bind(addr).await.context("binding HTTP listener")?;
    info!(%addr, "serving HTTP surface");
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}

/// `status` subcommand (§10.F): query a running engine's `GET /api/pool` and
/// print a table, re-expressing the original system's `events_show`.
pub async fn status(url: String) -> Result<()> {
    let endpoint = format!("{}/api/pool", url.trim_end_matches('/'));
    let pools: Vec<serde_json::Value> = reqwest::get(&endpoint)
        .await
        .with_context(|| format!("requesting {endpoint}"))?
        .error_for_status()
        .context("engine returned an error status")?
        .json()
        .await
        .context("parsing pool list")?;
    println!("{}", output::render_pool_table(&pools));
    Ok(())
}
