//! The reservation API (§4.H): acquire a READY resource from a pool, and
//! release a RESERVED one back into the destroy/clone cycle. Thin over
//! `StateStore`'s already-atomic `acquire_ready`/`release_reserved` — this
//! module exists so `testpool-api` depends on the engine's vocabulary
//! instead of reaching into the store directly.

use std::sync::Arc;

use testpool_domain::{PoolName, Resource, ResourceId};
use testpool_store::StateStore;

use crate::error::EngineError;

/// Reserve a READY resource in `pool` for `ttl_seconds`. `NoResources` if
/// none are READY, `UnknownPool` if `pool` doesn't exist.
pub async fn acquire(store: &Arc<dyn StateStore>, pool: &PoolName, ttl_seconds: i64) -> Result<Resource, EngineError> {
    Ok(store.acquire_ready(pool, ttl_seconds).await?)
}

/// Release a RESERVED resource, scheduling its destroy/clone cycle.
/// `NotReserved` if it isn't currently reserved.
pub async fn release(store: &Arc<dyn StateStore>, id: ResourceId) -> Result<Resource, EngineError> {
    Ok(store.release_reserved(id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use testpool_domain::{Action, Pool, Status};
    use testpool_store::{InMemoryStore, StoreError};

    async fn ready_pool(store: &Arc<dyn StateStore>) -> (Pool, Resource) {
        let host = store.create_host("c".into(), "local".into()).await.unwrap();
        let pool = Pool { name: PoolName::new("p"), host: host.id, template_name: "t".into(), resource_max: 1 };
        store.create_pool(pool.clone()).await.unwrap();
        let mut r = Resource::new_pending_clone(pool.name.clone(), "t.0");
        r.status = Status::Ready;
        r.action = Action::None;
        let r = store.create_resource(r).await.unwrap();
        (pool, r)
    }

    #[tokio::test]
    async fn acquire_then_release_round_trips() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let (pool, r) = ready_pool(&store).await;

        let acquired = acquire(&store, &pool.name, 60).await.unwrap();
        assert_eq!(acquired.id, r.id);
        assert_eq!(acquired.status, Status::Reserved);

        let released = release(&store, r.id).await.unwrap();
        assert_eq!(released.status, Status::Pending);
        assert_eq!(released.action, Action::Destroy);
    }

    #[tokio::test]
    async fn acquire_empty_pool_is_no_resources() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let host = store.create_host("c".into(), "local".into()).await.unwrap();
        let pool = Pool { name: PoolName::new("empty"), host: host.id, template_name: "t".into(), resource_max: 0 };
        store.create_pool(pool.clone()).await.unwrap();

        let err = acquire(&store, &pool.name, 60).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::NoResources(_))));
    }

    #[tokio::test]
    async fn release_requires_reserved() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let (_pool, r) = ready_pool(&store).await;
        let err = release(&store, r.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::NotReserved(_))));
    }
}
