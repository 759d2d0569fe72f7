use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use testpool_domain::{Action, Attribute, Host, HostId, Pool, PoolName, Resource, ResourceId, Status};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    hosts: HashMap<HostId, Host>,
    pools: HashMap<PoolName, Pool>,
    resources: HashMap<ResourceId, Resource>,
    /// Insertion order, used as the tie-break for equal `action_time`.
    resource_order: Vec<ResourceId>,
    resource_attrs: HashMap<ResourceId, Vec<Attribute>>,
    pool_attrs: HashMap<PoolName, Vec<Attribute>>,
}

impl Inner {
    fn insertion_index(&self, id: ResourceId) -> usize {
        self.resource_order.iter().position(|r| *r == id).unwrap_or(usize::MAX)
    }
}

/// In-memory implementation of [`StateStore`].
///
/// All data is lost on process exit. Suitable for tests and single-process demos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn create_host(&self, connection: String, product: String) -> Result<Host, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.hosts.values().any(|h| h.connection == connection && h.product == product) {
            return Err(StoreError::HostAlreadyExists { connection, product });
        }
        let host = Host { id: HostId::new(), connection, product };
        guard.hosts.insert(host.id, host.clone());
        Ok(host)
    }

    async fn find_host(&self, connection: &str, product: &str) -> Result<Option<Host>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .hosts
            .values()
            .find(|h| h.connection == connection && h.product == product)
            .cloned())
    }

    async fn get_host(&self, id: HostId) -> Result<Option<Host>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.hosts.get(&id).cloned())
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.hosts.values().cloned().collect())
    }

    async fn create_pool(&self, pool: Pool) -> Result<Pool, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.pools.contains_key(&pool.name) {
            return Err(StoreError::PoolAlreadyExists(pool.name.to_string()));
        }
        guard.pools.insert(pool.name.clone(), pool.clone());
        Ok(pool)
    }

    async fn get_pool(&self, name: &PoolName) -> Result<Option<Pool>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.pools.get(name).cloned())
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError> {
        let guard = self.inner.read().await;
        let mut pools: Vec<Pool> = guard.pools.values().cloned().collect();
        pools.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(pools)
    }

    async fn update_pool_max(&self, name: &PoolName, resource_max: u32) -> Result<Pool, StoreError> {
        let mut guard = self.inner.write().await;
        let pool = guard
            .pools
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownPool(name.to_string()))?;
        pool.resource_max = resource_max;
        Ok(pool.clone())
    }

    async fn delete_pool(&self, name: &PoolName) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.pools.remove(name);
        Ok(())
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let mut guard = self.inner.write().await;
        guard.resource_order.push(resource.id);
        guard.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.resources.get(&id).cloned())
    }

    async fn list_pool_resources(&self, pool: &PoolName) -> Result<Vec<Resource>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .resource_order
            .iter()
            .filter_map(|id| guard.resources.get(id))
            .filter(|r| &r.pool == pool)
            .cloned()
            .collect())
    }

    async fn list_non_ready_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let guard = self.inner.read().await;
        let mut out: Vec<Resource> = guard
            .resources
            .values()
            .filter(|r| r.status != Status::Ready)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.action_time
                .cmp(&b.action_time)
                .then_with(|| guard.insertion_index(a.id).cmp(&guard.insertion_index(b.id)))
        });
        Ok(out)
    }

    async fn transition_resource(
        &self,
        id: ResourceId,
        status: Status,
        action: Action,
        delta_seconds: i64,
    ) -> Result<Resource, StoreError> {
        let mut guard = self.inner.write().await;
        let resource = guard
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        resource.status = status;
        resource.action = action;
        resource.action_time = Utc::now() + ChronoDuration::seconds(delta_seconds);
        Ok(resource.clone())
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.resources.remove(&id);
        guard.resource_order.retain(|r| *r != id);
        guard.resource_attrs.remove(&id);
        Ok(())
    }

    async fn set_attempts(&self, id: ResourceId, attempts: u32) -> Result<Resource, StoreError> {
        let mut guard = self.inner.write().await;
        let resource = guard
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        resource.attempts = attempts;
        Ok(resource.clone())
    }

    async fn set_poll_count(&self, id: ResourceId, poll_count: u32) -> Result<Resource, StoreError> {
        let mut guard = self.inner.write().await;
        let resource = guard
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        resource.poll_count = poll_count;
        Ok(resource.clone())
    }

    async fn set_ip_addr(&self, id: ResourceId, ip_addr: Option<String>) -> Result<Resource, StoreError> {
        let mut guard = self.inner.write().await;
        let resource = guard
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        resource.ip_addr = ip_addr;
        Ok(resource.clone())
    }

    async fn mark_all_bad(&self, pool: &PoolName) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        for r in guard.resources.values_mut().filter(|r| &r.pool == pool) {
            r.status = Status::Bad;
            r.action = Action::None;
        }
        Ok(())
    }

    async fn delete_bad(&self, pool: &PoolName) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let dead: Vec<ResourceId> = guard
            .resources
            .values()
            .filter(|r| &r.pool == pool && r.status == Status::Bad)
            .map(|r| r.id)
            .collect();
        for id in dead {
            guard.resources.remove(&id);
            guard.resource_order.retain(|r| *r != id);
        }
        Ok(())
    }

    async fn acquire_ready(&self, pool: &PoolName, ttl_seconds: i64) -> Result<Resource, StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.pools.contains_key(pool) {
            return Err(StoreError::UnknownPool(pool.to_string()));
        }
        let candidate = guard
            .resources
            .values()
            .filter(|r| &r.pool == pool && r.status == Status::Ready)
            .min_by(|a, b| a.name.cmp(&b.name))
            .map(|r| r.id)
            .ok_or_else(|| StoreError::NoResources(pool.to_string()))?;

        let resource = guard.resources.get_mut(&candidate).expect("candidate exists");
        resource.status = Status::Reserved;
        resource.action = Action::Destroy;
        resource.action_time = Utc::now() + ChronoDuration::seconds(ttl_seconds);
        Ok(resource.clone())
    }

    async fn release_reserved(&self, id: ResourceId) -> Result<Resource, StoreError> {
        let mut guard = self.inner.write().await;
        let resource = guard
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        if resource.status != Status::Reserved {
            return Err(StoreError::NotReserved(id.to_string()));
        }
        resource.status = Status::Pending;
        resource.action = Action::Destroy;
        resource.action_time = Utc::now() + ChronoDuration::seconds(1);
        Ok(resource.clone())
    }

    async fn set_resource_attribute(
        &self,
        id: ResourceId,
        key: String,
        value: String,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let attrs = guard.resource_attrs.entry(id).or_default();
        let attr = Attribute { key, value };
        if !attrs.contains(&attr) {
            attrs.push(attr);
        }
        Ok(())
    }

    async fn list_resource_attributes(&self, id: ResourceId) -> Result<Vec<Attribute>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.resource_attrs.get(&id).cloned().unwrap_or_default())
    }

    async fn set_pool_attribute(&self, pool: &PoolName, key: String, value: String) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let attrs = guard.pool_attrs.entry(pool.clone()).or_default();
        let attr = Attribute { key, value };
        if !attrs.contains(&attr) {
            attrs.push(attr);
        }
        Ok(())
    }

    async fn list_pool_attributes(&self, pool: &PoolName) -> Result<Vec<Attribute>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.pool_attrs.get(pool).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool_with_one_ready(store: &InMemoryStore) -> (Pool, Resource) {
        let host = store.create_host("local://".into(), "local".into()).await.unwrap();
        let pool = store
            .create_pool(Pool {
                name: PoolName::new("p"),
                host: host.id,
                template_name: "tmpl".into(),
                resource_max: 1,
            })
            .await
            .unwrap();
        let mut r = Resource::new_pending_clone(pool.name.clone(), "tmpl.0");
        r.status = Status::Ready;
        r.action = Action::None;
        let r = store.create_resource(r).await.unwrap();
        (pool, r)
    }

    #[tokio::test]
    async fn acquire_transitions_to_reserved_destroy() {
        let store = InMemoryStore::new();
        let (pool, r) = pool_with_one_ready(&store).await;
        let acquired = store.acquire_ready(&pool.name, 30).await.unwrap();
        assert_eq!(acquired.id, r.id);
        assert_eq!(acquired.status, Status::Reserved);
        assert_eq!(acquired.action, Action::Destroy);
    }

    #[tokio::test]
    async fn acquire_on_empty_pool_is_no_resources() {
        let store = InMemoryStore::new();
        let host = store.create_host("c".into(), "local".into()).await.unwrap();
        let pool = store
            .create_pool(Pool {
                name: PoolName::new("empty"),
                host: host.id,
                template_name: "t".into(),
                resource_max: 0,
            })
            .await
            .unwrap();
        let err = store.acquire_ready(&pool.name, 30).await.unwrap_err();
        assert!(matches!(err, StoreError::NoResources(_)));
    }

    #[tokio::test]
    async fn acquire_on_unknown_pool_errors() {
        let store = InMemoryStore::new();
        let err = store.acquire_ready(&PoolName::new("nope"), 30).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownPool(_)));
    }

    #[tokio::test]
    async fn release_requires_reserved_status() {
        let store = InMemoryStore::new();
        let (_pool, r) = pool_with_one_ready(&store).await;
        let err = store.release_reserved(r.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotReserved(_)));
    }

    #[tokio::test]
    async fn release_after_acquire_schedules_destroy() {
        let store = InMemoryStore::new();
        let (pool, r) = pool_with_one_ready(&store).await;
        store.acquire_ready(&pool.name, 30).await.unwrap();
        let released = store.release_reserved(r.id).await.unwrap();
        assert_eq!(released.status, Status::Pending);
        assert_eq!(released.action, Action::Destroy);
    }

    #[tokio::test]
    async fn non_ready_ordered_by_action_time_then_insertion() {
        let store = InMemoryStore::new();
        let host = store.create_host("c".into(), "local".into()).await.unwrap();
        store
            .create_pool(Pool {
                name: PoolName::new("p"),
                host: host.id,
                template_name: "t".into(),
                resource_max: 2,
            })
            .await
            .unwrap();

        let mut first = Resource::new_pending_clone(PoolName::new("p"), "t.0");
        first.action_time = Utc::now() + ChronoDuration::seconds(5);
        let first = store.create_resource(first).await.unwrap();

        let mut second = Resource::new_pending_clone(PoolName::new("p"), "t.1");
        second.action_time = first.action_time; // tie — insertion order decides
        let second = store.create_resource(second).await.unwrap();

        let due = store.list_non_ready_resources().await.unwrap();
        assert_eq!(due[0].id, first.id);
        assert_eq!(due[1].id, second.id);
    }

    #[tokio::test]
    async fn attribute_set_dedups_by_exact_value() {
        let store = InMemoryStore::new();
        let (_pool, r) = pool_with_one_ready(&store).await;
        store.set_resource_attribute(r.id, "ip".into(), "10.0.0.1".into()).await.unwrap();
        store.set_resource_attribute(r.id, "ip".into(), "10.0.0.1".into()).await.unwrap();
        let attrs = store.list_resource_attributes(r.id).await.unwrap();
        assert_eq!(attrs.len(), 1);
    }
}
