pub mod adapter;
pub mod error;
pub mod executor;
pub mod profile_log;
pub mod reservation;
pub mod scheduler;
pub mod setup;
pub mod state_machine;

pub use error::EngineError;
pub use profile_log::ProfileLog;
pub use scheduler::SchedulerConfig;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::warn;

use testpool_driver::DriverRegistry;
use testpool_store::StateStore;

/// Bundles the collaborators every top-level engine operation needs: the
/// durable store, the resolved driver registry, and the profile logger.
/// Constructed once at startup and handed to `testpool-cli`/`testpool-api`.
pub struct Engine {
    store: Arc<dyn StateStore>,
    registry: Arc<DriverRegistry>,
    profile_log: Arc<ProfileLog>,
}

impl Engine {
    pub fn new(store: Arc<dyn StateStore>, registry: Arc<DriverRegistry>, profile_log: Arc<ProfileLog>) -> Self {
        Engine { store, registry, profile_log }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Runs `setup` (§4.I) against every pool whose host resolves to a
    /// registered driver. A pool with no driver for its host's product is
    /// logged and left alone rather than treated as fatal.
    pub async fn bootstrap(&self) -> Result<(), EngineError> {
        for pool in self.store.list_pools().await? {
            let Some(host) = self.store.get_host(pool.host).await? else {
                warn!(pool = %pool.name, "pool references missing host, skipping setup");
                continue;
            };
            let driver = match self.registry.for_product(&host.product) {
                Ok(d) => d,
                Err(_) => {
                    warn!(pool = %pool.name, product = %host.product, "no driver registered, skipping setup");
                    continue;
                }
            };
            setup::setup(&pool, &host.connection, &driver, &self.store).await?;
        }
        Ok(())
    }

    /// One adapt pass over every pool, logging a profile-log line per pool.
    /// Mirrors `server.py`'s pre-loop `adapt()` step.
    pub async fn adapt_all(&self) -> Result<(), EngineError> {
        for pool in self.store.list_pools().await? {
            let Some(host) = self.store.get_host(pool.host).await? else { continue };
            let Ok(driver) = self.registry.for_product(&host.product) else { continue };
            adapter::adapt(&pool, &driver, &self.store).await?;
            let count = self.store.list_pool_resources(&pool.name).await?.len();
            self.profile_log.record(pool.name.as_str(), count, pool.resource_max);
        }
        Ok(())
    }

    /// Runs the scheduler loop (§4.G) until `shutdown` is set or `cfg.count`
    /// is exhausted.
    pub async fn run(&self, cfg: SchedulerConfig, shutdown: Arc<AtomicBool>) -> Result<(), EngineError> {
        scheduler::run(self.store.clone(), self.registry.clone(), cfg, shutdown).await
    }

    /// Reservation API (§4.H), re-exposed here so callers only need an `Engine`.
    pub async fn acquire(
        &self,
        pool: &testpool_domain::PoolName,
        ttl_seconds: i64,
    ) -> Result<testpool_domain::Resource, EngineError> {
        reservation::acquire(&self.store, pool, ttl_seconds).await
    }

    pub async fn release(&self, id: testpool_domain::ResourceId) -> Result<testpool_domain::Resource, EngineError> {
        reservation::release(&self.store, id).await
    }
}
