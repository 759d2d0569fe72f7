//! Pool-size reconciliation: bring a pool's resource count to its
//! configured `resource_max` by destroying or creating resources.

use std::collections::HashSet;
use std::sync::Arc;

use testpool_domain::{Action, Pool, Resource, Status};
use testpool_driver::Driver;
use testpool_store::StateStore;

use crate::error::EngineError;

/// Extracts the trailing `.N` index from a resource name such as
/// `web-template.3`. Resources named outside this convention (shouldn't
/// happen for anything this engine created) sort before all indexed ones.
///
/// Also used by the executor to tell an excess (shrink) destroy from an
/// ordinary recycle destroy: a resource whose index no longer fits under
/// `pool.resource_max` is being shrunk away, not recycled.
pub(crate) fn index_of(name: &str) -> Option<u32> {
    name.rsplit_once('.').and_then(|(_, idx)| idx.parse().ok())
}

/// Adapts `pool` to its declared size. Returns the signed change in
/// non-BAD resource count (positive: created, negative: destroyed,
/// zero: already at capacity).
pub async fn adapt(
    pool: &Pool,
    driver: &Arc<dyn Driver>,
    store: &Arc<dyn StateStore>,
) -> Result<i64, EngineError> {
    let resources = store.list_pool_resources(&pool.name).await?;
    let live: Vec<&Resource> = resources.iter().filter(|r| r.status != Status::Bad).collect();
    let current = live.len() as u32;

    if current == pool.resource_max {
        return Ok(0);
    }

    if current > pool.resource_max {
        let mut sorted = live;
        sorted.sort_by_key(|r| index_of(&r.name).unwrap_or(0));
        let excess = (current - pool.resource_max) as usize;
        let mut destroyed = 0i64;
        for r in sorted.into_iter().rev().take(excess) {
            store.transition_resource(r.id, Status::Pending, Action::Destroy, 0).await?;
            destroyed -= 1;
        }
        return Ok(destroyed);
    }

    let used: HashSet<u32> = live.iter().filter_map(|r| index_of(&r.name)).collect();
    let deficit = (pool.resource_max - current) as usize;
    let mut created = 0i64;
    let mut index = 0u32;
    while (created as usize) < deficit {
        if !used.contains(&index) {
            let name = driver.new_name_get(&pool.template_name, index);
            store.create_resource(Resource::new_pending_clone(pool.name.clone(), name)).await?;
            created += 1;
        }
        index += 1;
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use testpool_domain::{HostId, PoolName};
    use testpool_driver::LocalDriver;
    use testpool_store::InMemoryStore;

    fn test_pool(resource_max: u32) -> Pool {
        Pool {
            name: PoolName::new("web"),
            host: HostId::new(),
            template_name: "web-template".to_string(),
            resource_max,
        }
    }

    #[tokio::test]
    async fn expand_creates_smallest_missing_indices() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let driver: Arc<dyn Driver> = Arc::new(LocalDriver::new());
        let pool = test_pool(3);
        store.create_pool(pool.clone()).await.unwrap();

        let delta = adapt(&pool, &driver, &store).await.unwrap();
        assert_eq!(delta, 3);

        let resources = store.list_pool_resources(&pool.name).await.unwrap();
        let mut names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["web-template.0", "web-template.1", "web-template.2"]);
    }

    #[tokio::test]
    async fn shrink_destroys_highest_index_first() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let driver: Arc<dyn Driver> = Arc::new(LocalDriver::new());
        let mut pool = test_pool(3);
        store.create_pool(pool.clone()).await.unwrap();
        adapt(&pool, &driver, &store).await.unwrap();

        pool.resource_max = 1;
        let delta = adapt(&pool, &driver, &store).await.unwrap();
        assert_eq!(delta, -2);

        let resources = store.list_pool_resources(&pool.name).await.unwrap();
        let destroying: HashSet<&str> = resources
            .iter()
            .filter(|r| r.action == Action::Destroy)
            .map(|r| r.name.as_str())
            .collect();
        assert!(destroying.contains("web-template.2"));
        assert!(destroying.contains("web-template.1"));
        assert!(!destroying.contains("web-template.0"));
    }

    #[tokio::test]
    async fn at_capacity_is_a_no_op() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let driver: Arc<dyn Driver> = Arc::new(LocalDriver::new());
        let pool = test_pool(2);
        store.create_pool(pool.clone()).await.unwrap();
        adapt(&pool, &driver, &store).await.unwrap();

        let delta = adapt(&pool, &driver, &store).await.unwrap();
        assert_eq!(delta, 0);
    }

    #[tokio::test]
    async fn expand_fills_gap_left_by_prior_shrink() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let driver: Arc<dyn Driver> = Arc::new(LocalDriver::new());
        let mut pool = test_pool(3);
        store.create_pool(pool.clone()).await.unwrap();
        adapt(&pool, &driver, &store).await.unwrap();

        pool.resource_max = 1;
        adapt(&pool, &driver, &store).await.unwrap();
        for r in store.list_pool_resources(&pool.name).await.unwrap() {
            if r.action == Action::Destroy {
                store.delete_resource(r.id).await.unwrap();
            }
        }

        pool.resource_max = 3;
        let delta = adapt(&pool, &driver, &store).await.unwrap();
        assert_eq!(delta, 2);
        let resources = store.list_pool_resources(&pool.name).await.unwrap();
        let mut names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["web-template.0", "web-template.1", "web-template.2"]);
    }
}
