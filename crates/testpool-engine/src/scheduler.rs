//! The main control loop: repeatedly pick the earliest-due non-READY
//! resource across every pool and execute its action. Single-threaded and
//! cooperative — one resource's action runs to completion before the next
//! is considered, matching the engine's single-writer persistence model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use testpool_domain::{Action, Resource};
use testpool_driver::DriverRegistry;
use testpool_store::StateStore;

use crate::adapter;
use crate::error::EngineError;
use crate::executor;

/// How long to defer a resource whose pool's host has no registered driver,
/// so the loop doesn't spin retrying it every iteration.
const UNSERVICED_RETRY_SECONDS: i64 = 60;

/// How many iterations to run before stopping, and the sleep bounds used
/// when no resource is immediately due. Mirrors `argparser()`'s
/// `--count`/`--max-sleep-time`/`--min-sleep-time` flags.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `None` runs forever (production); `Some(n)` stops after `n`
    /// iterations or once every resource is READY, whichever comes first —
    /// the latter only applies when this is `Some`, so tests can await
    /// convergence instead of guessing an iteration count.
    pub count: Option<u64>,
    pub max_sleep_time: Duration,
    pub min_sleep_time: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { count: None, max_sleep_time: Duration::from_secs(60), min_sleep_time: Duration::from_secs(1) }
    }
}

/// Runs the loop until `shutdown` is set, `cfg.count` iterations have
/// elapsed, or (when `cfg.count` is `Some`) every resource reaches READY.
/// Cancellation always completes the in-flight action before returning —
/// no resource is left mid-transition.
pub async fn run(
    store: Arc<dyn StateStore>,
    registry: Arc<DriverRegistry>,
    cfg: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<(), EngineError> {
    let mut remaining = cfg.count;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if remaining == Some(0) {
            break;
        }
        if cfg.count.is_some() && mode_test_stop(&store).await? {
            break;
        }

        let due = store.list_non_ready_resources().await?;
        match due.first() {
            None => tokio::time::sleep(cfg.max_sleep_time).await,
            Some(resource) => {
                let delay = resource.action_time - Utc::now();
                if delay <= chrono::Duration::zero() {
                    run_one(resource, &store, &registry).await?;
                } else {
                    let wait = Duration::from_millis(delay.num_milliseconds().max(0) as u64)
                        .clamp(cfg.min_sleep_time, cfg.max_sleep_time);
                    tokio::time::sleep(wait).await;
                }
            }
        }

        if let Some(n) = remaining.as_mut() {
            *n -= 1;
        }
    }

    Ok(())
}

/// True once no resource anywhere is non-READY. Only meaningful with a
/// finite `count` — an unbounded production loop never expects this.
async fn mode_test_stop(store: &Arc<dyn StateStore>) -> Result<bool, EngineError> {
    Ok(store.list_non_ready_resources().await?.is_empty())
}

async fn run_one(
    resource: &Resource,
    store: &Arc<dyn StateStore>,
    registry: &Arc<DriverRegistry>,
) -> Result<(), EngineError> {
    let pool = store
        .get_pool(&resource.pool)
        .await?
        .ok_or_else(|| EngineError::Internal(format!("resource {} references missing pool {}", resource.name, resource.pool)))?;
    let host = store
        .get_host(pool.host)
        .await?
        .ok_or_else(|| EngineError::Internal(format!("pool {} references missing host", pool.name)))?;
    let driver = match registry.for_product(&host.product) {
        Ok(d) => d,
        Err(_) => {
            let err = EngineError::UnservicedProduct(host.product.clone());
            warn!(pool = %pool.name, %err, "pool is unserviceable, deferring its due resource");
            store
                .transition_resource(resource.id, resource.status, resource.action, UNSERVICED_RETRY_SECONDS)
                .await?;
            return Ok(());
        }
    };

    debug!(resource = %resource.name, action = %resource.action, "executing due action");
    executor::execute(resource, &pool, &host.connection, &driver, store).await?;
    adapter::adapt(&pool, &driver, store).await?;

    if resource.action == Action::Destroy {
        let remaining = store.list_pool_resources(&pool.name).await?.len();
        if pool.deleteable(remaining) {
            store.delete_pool(&pool.name).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testpool_domain::{HostId, Pool, PoolName};
    use testpool_driver::LocalDriver;
    use testpool_store::InMemoryStore;

    #[tokio::test]
    async fn finite_count_drains_pool_to_ready() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(LocalDriver::new()));
        let registry = Arc::new(registry);

        let host = store.create_host("local://".into(), "local".into()).await.unwrap();
        let pool = Pool { name: PoolName::new("p"), host: host.id, template_name: "tmpl".into(), resource_max: 2 };
        store.create_pool(pool.clone()).await.unwrap();
        store.create_resource(Resource::new_pending_clone(pool.name.clone(), "tmpl.0")).await.unwrap();
        store.create_resource(Resource::new_pending_clone(pool.name.clone(), "tmpl.1")).await.unwrap();

        let cfg = SchedulerConfig {
            count: Some(20),
            max_sleep_time: Duration::from_millis(5),
            min_sleep_time: Duration::from_millis(1),
        };
        run(store.clone(), registry, cfg, Arc::new(AtomicBool::new(false))).await.unwrap();

        let resources = store.list_pool_resources(&pool.name).await.unwrap();
        assert!(resources.iter().all(|r| r.status == testpool_domain::Status::Ready));
    }

    /// A pool whose host has no registered driver must not abort the whole
    /// loop — it's deferred and logged, while other pools keep converging.
    #[tokio::test]
    async fn unserviceable_pool_is_deferred_not_fatal() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(LocalDriver::new()));
        let registry = Arc::new(registry);

        let good_host = store.create_host("local://".into(), "local".into()).await.unwrap();
        let good_pool =
            Pool { name: PoolName::new("good"), host: good_host.id, template_name: "tmpl".into(), resource_max: 1 };
        store.create_pool(good_pool.clone()).await.unwrap();
        store.create_resource(Resource::new_pending_clone(good_pool.name.clone(), "tmpl.0")).await.unwrap();

        let ghost_host = store.create_host("ghost://".into(), "ghost".into()).await.unwrap();
        let ghost_pool =
            Pool { name: PoolName::new("ghost"), host: ghost_host.id, template_name: "tmpl".into(), resource_max: 1 };
        store.create_pool(ghost_pool.clone()).await.unwrap();
        let ghost_resource =
            store.create_resource(Resource::new_pending_clone(ghost_pool.name.clone(), "tmpl.0")).await.unwrap();

        let cfg = SchedulerConfig {
            count: Some(20),
            max_sleep_time: Duration::from_millis(5),
            min_sleep_time: Duration::from_millis(1),
        };
        run(store.clone(), registry, cfg, Arc::new(AtomicBool::new(false))).await.unwrap();

        let good_resources = store.list_pool_resources(&good_pool.name).await.unwrap();
        assert!(good_resources.iter().all(|r| r.status == testpool_domain::Status::Ready));

        let deferred = store.get_resource(ghost_resource.id).await.unwrap().unwrap();
        assert_eq!(deferred.status, testpool_domain::Status::Pending);
        assert!(deferred.action_time > ghost_resource.action_time);
    }

    #[tokio::test]
    async fn shutdown_flag_stops_the_loop() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let registry = Arc::new(DriverRegistry::new());
        let shutdown = Arc::new(AtomicBool::new(true));
        let cfg = SchedulerConfig { count: None, ..Default::default() };
        // Already-set shutdown flag must return immediately regardless of count.
        run(store, registry, cfg, shutdown).await.unwrap();
    }
}
