//! Bootstrap (§4.I): reconcile the store's view of a pool against what the
//! backend actually has before the daemon starts normal operation. Run once
//! per pool at startup unless `--no-setup` is given.

use std::collections::HashSet;
use std::sync::Arc;

use testpool_domain::{Action, Pool, Resource, Status};
use testpool_driver::{Driver, TimingOp};
use testpool_store::StateStore;

use crate::error::EngineError;

/// 1. Mark every existing row BAD.
/// 2. Ensure exactly `resource_max` rows exist (by deterministic name),
///    creating BAD placeholders for any missing.
/// 3. Enumerate the backend; restore rows whose name is still present there
///    to `(PENDING, DESTROY)`, staggered so they don't all fire at once.
/// 4. Delete whatever is left BAD (tracked but absent from the backend).
/// 5. Drop the pool if it's now empty and capacity-zero.
pub async fn setup(
    pool: &Pool,
    connection: &str,
    driver: &Arc<dyn Driver>,
    store: &Arc<dyn StateStore>,
) -> Result<(), EngineError> {
    store.mark_all_bad(&pool.name).await?;

    let mut known_names: HashSet<String> =
        store.list_pool_resources(&pool.name).await?.into_iter().map(|r| r.name).collect();
    for index in 0..pool.resource_max {
        let name = driver.new_name_get(&pool.template_name, index);
        if !known_names.contains(&name) {
            store.create_resource(Resource::new_bad_placeholder(pool.name.clone(), name.clone())).await?;
            known_names.insert(name);
        }
    }

    let backend_names = driver.list(connection, pool.name.as_str()).await?;
    let destroy_delay = driver.timing_get(TimingOp::Destroy).as_secs().max(1) as i64;
    let mut delta = 0i64;
    for r in store.list_pool_resources(&pool.name).await? {
        if backend_names.contains(&r.name) {
            store.transition_resource(r.id, Status::Pending, Action::Destroy, delta).await?;
            delta += destroy_delay;
        }
    }

    store.delete_bad(&pool.name).await?;

    let remaining = store.list_pool_resources(&pool.name).await?.len();
    if pool.deleteable(remaining) {
        store.delete_pool(&pool.name).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testpool_domain::{HostId, PoolName};
    use testpool_driver::LocalDriver;
    use testpool_store::InMemoryStore;

    #[tokio::test]
    async fn restores_resources_still_present_on_backend() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let driver: Arc<dyn Driver> = Arc::new(LocalDriver::new());
        let host = store.create_host("c".into(), "local".into()).await.unwrap();
        // LocalDriver::list buckets by the name's prefix before the last '.', so the
        // template name needs to match the pool name for its naive tracking to find it.
        let pool = Pool { name: PoolName::new("p"), host: host.id, template_name: "p".into(), resource_max: 1 };
        store.create_pool(pool.clone()).await.unwrap();
        driver.clone("c", "p", "p.0").await.unwrap();
        let stale = store.create_resource(Resource::new_pending_clone(pool.name.clone(), "p.0")).await.unwrap();

        setup(&pool, "c", &driver, &store).await.unwrap();

        let restored = store.get_resource(stale.id).await.unwrap().unwrap();
        assert_eq!(restored.status, Status::Pending);
        assert_eq!(restored.action, Action::Destroy);
    }

    #[tokio::test]
    async fn creates_placeholders_for_missing_capacity() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let driver: Arc<dyn Driver> = Arc::new(LocalDriver::new());
        let host = store.create_host("c".into(), "local".into()).await.unwrap();
        let pool = Pool { name: PoolName::new("p"), host: host.id, template_name: "tmpl".into(), resource_max: 2 };
        store.create_pool(pool.clone()).await.unwrap();

        setup(&pool, "c", &driver, &store).await.unwrap();

        // Nothing existed on the backend, so both placeholders stay BAD and
        // get swept by delete_bad.
        let resources = store.list_pool_resources(&pool.name).await.unwrap();
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn empty_zero_capacity_pool_is_dropped() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let driver: Arc<dyn Driver> = Arc::new(LocalDriver::new());
        let host = store.create_host("c".into(), "local".into()).await.unwrap();
        let pool = Pool { name: PoolName::new("gone"), host: host.id, template_name: "tmpl".into(), resource_max: 0 };
        store.create_pool(pool.clone()).await.unwrap();

        setup(&pool, "c", &driver, &store).await.unwrap();

        assert!(store.get_pool(&pool.name).await.unwrap().is_none());
    }
}
