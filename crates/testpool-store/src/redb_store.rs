use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use testpool_domain::{Action, Attribute, Host, HostId, Pool, PoolName, Resource, ResourceId, Status};

use crate::error::StoreError;
use crate::store::StateStore;

const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");
const POOLS: TableDefinition<&str, &[u8]> = TableDefinition::new("pools");
const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");
/// Insertion sequence number -> resource id, used to break `action_time` ties.
const RESOURCE_ORDER: TableDefinition<u64, &str> = TableDefinition::new("resource_order");
const RESOURCE_ATTRS: TableDefinition<&str, &[u8]> = TableDefinition::new("resource_attrs");
const POOL_ATTRS: TableDefinition<&str, &[u8]> = TableDefinition::new("pool_attrs");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

fn internal<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Internal(e.to_string())
}

/// Persistent state store backed by a redb database file.
///
/// All pool state survives process restarts. Suitable for single-process
/// local production use.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a redb database at `path`.
    ///
    /// Parent directories are created automatically.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;

        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(HOSTS).map_err(internal)?;
            wtxn.open_table(POOLS).map_err(internal)?;
            wtxn.open_table(RESOURCES).map_err(internal)?;
            wtxn.open_table(RESOURCE_ORDER).map_err(internal)?;
            wtxn.open_table(RESOURCE_ATTRS).map_err(internal)?;
            wtxn.open_table(POOL_ATTRS).map_err(internal)?;
            wtxn.open_table(META).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    fn read_resource(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(RESOURCES).map_err(internal)?;
        match table.get(id.to_string().as_str()).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn write_resource(&self, resource: &Resource) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(resource)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(RESOURCES).map_err(internal)?;
            table
                .insert(resource.id.to_string().as_str(), bytes.as_slice())
                .map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for RedbStore {
    async fn create_host(&self, connection: String, product: String) -> Result<Host, StoreError> {
        if self.find_host(&connection, &product).await?.is_some() {
            return Err(StoreError::HostAlreadyExists { connection, product });
        }
        let host = Host { id: HostId::new(), connection, product };
        let bytes = serde_json::to_vec(&host)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(HOSTS).map_err(internal)?;
            table.insert(host.id.to_string().as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(host)
    }

    async fn find_host(&self, connection: &str, product: &str) -> Result<Option<Host>, StoreError> {
        for host in self.list_hosts().await? {
            if host.connection == connection && host.product == product {
                return Ok(Some(host));
            }
        }
        Ok(None)
    }

    async fn get_host(&self, id: HostId) -> Result<Option<Host>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(HOSTS).map_err(internal)?;
        match table.get(id.to_string().as_str()).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(HOSTS).map_err(internal)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    async fn create_pool(&self, pool: Pool) -> Result<Pool, StoreError> {
        if self.get_pool(&pool.name).await?.is_some() {
            return Err(StoreError::PoolAlreadyExists(pool.name.to_string()));
        }
        let bytes = serde_json::to_vec(&pool)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(POOLS).map_err(internal)?;
            table.insert(pool.name.as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(pool)
    }

    async fn get_pool(&self, name: &PoolName) -> Result<Option<Pool>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(POOLS).map_err(internal)?;
        match table.get(name.as_str()).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(POOLS).map_err(internal)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice::<Pool>(v.value())?);
        }
        out.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        Ok(out)
    }

    async fn update_pool_max(&self, name: &PoolName, resource_max: u32) -> Result<Pool, StoreError> {
        let mut pool = self
            .get_pool(name)
            .await?
            .ok_or_else(|| StoreError::UnknownPool(name.to_string()))?;
        pool.resource_max = resource_max;
        let bytes = serde_json::to_vec(&pool)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(POOLS).map_err(internal)?;
            table.insert(name.as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(pool)
    }

    async fn delete_pool(&self, name: &PoolName) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(POOLS).map_err(internal)?;
            table.remove(name.as_str()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let bytes = serde_json::to_vec(&resource)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut meta = wtxn.open_table(META).map_err(internal)?;
            let seq = meta.get("resource_seq").map_err(internal)?.map(|g| g.value()).unwrap_or(0);
            let new_seq = seq + 1;
            meta.insert("resource_seq", new_seq).map_err(internal)?;

            let mut order = wtxn.open_table(RESOURCE_ORDER).map_err(internal)?;
            order
                .insert(new_seq, resource.id.to_string().as_str())
                .map_err(internal)?;

            let mut table = wtxn.open_table(RESOURCES).map_err(internal)?;
            table
                .insert(resource.id.to_string().as_str(), bytes.as_slice())
                .map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(resource)
    }

    async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>, StoreError> {
        self.read_resource(id)
    }

    async fn list_pool_resources(&self, pool: &PoolName) -> Result<Vec<Resource>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let order = rtxn.open_table(RESOURCE_ORDER).map_err(internal)?;
        let resources = rtxn.open_table(RESOURCES).map_err(internal)?;
        let mut out = Vec::new();
        for entry in order.iter().map_err(internal)? {
            let (_seq, rid) = entry.map_err(internal)?;
            if let Some(guard) = resources.get(rid.value()).map_err(internal)? {
                let r: Resource = serde_json::from_slice(guard.value())?;
                if &r.pool == pool {
                    out.push(r);
                }
            }
        }
        Ok(out)
    }

    async fn list_non_ready_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(RESOURCES).map_err(internal)?;
        let order = rtxn.open_table(RESOURCE_ORDER).map_err(internal)?;
        let mut index = std::collections::HashMap::new();
        for entry in order.iter().map_err(internal)? {
            let (seq, rid) = entry.map_err(internal)?;
            index.insert(rid.value().to_string(), seq.value());
        }
        let mut out: Vec<Resource> = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            let r: Resource = serde_json::from_slice(v.value())?;
            if r.status != Status::Ready {
                out.push(r);
            }
        }
        out.sort_by(|a, b| {
            a.action_time.cmp(&b.action_time).then_with(|| {
                let ia = index.get(&a.id.to_string()).copied().unwrap_or(u64::MAX);
                let ib = index.get(&b.id.to_string()).copied().unwrap_or(u64::MAX);
                ia.cmp(&ib)
            })
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
        let mut resource = self
            .read_resource(id)?
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        resource.status = status;
        resource.action = action;
        resource.action_time = chrono::Utc::now() + chrono::Duration::seconds(delta_seconds);
        self.write_resource(&resource)?;
        Ok(resource)
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(RESOURCES).map_err(internal)?;
            table.remove(id.to_string().as_str()).map_err(internal)?;
            let mut attrs = wtxn.open_table(RESOURCE_ATTRS).map_err(internal)?;
            attrs.remove(id.to_string().as_str()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn set_attempts(&self, id: ResourceId, attempts: u32) -> Result<Resource, StoreError> {
        let mut resource = self
            .read_resource(id)?
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        resource.attempts = attempts;
        self.write_resource(&resource)?;
        Ok(resource)
    }

    async fn set_poll_count(&self, id: ResourceId, poll_count: u32) -> Result<Resource, StoreError> {
        let mut resource = self
            .read_resource(id)?
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        resource.poll_count = poll_count;
        self.write_resource(&resource)?;
        Ok(resource)
    }

    async fn set_ip_addr(&self, id: ResourceId, ip_addr: Option<String>) -> Result<Resource, StoreError> {
        let mut resource = self
            .read_resource(id)?
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        resource.ip_addr = ip_addr;
        self.write_resource(&resource)?;
        Ok(resource)
    }

    async fn mark_all_bad(&self, pool: &PoolName) -> Result<(), StoreError> {
        for mut r in self.list_pool_resources(pool).await? {
            r.status = Status::Bad;
            r.action = Action::None;
            self.write_resource(&r)?;
        }
        Ok(())
    }

    async fn delete_bad(&self, pool: &PoolName) -> Result<(), StoreError> {
        for r in self.list_pool_resources(pool).await? {
            if r.status == Status::Bad {
                self.delete_resource(r.id).await?;
            }
        }
        Ok(())
    }

    /// Selects the READY resource and transitions it to RESERVED within a
    /// single write transaction, so two concurrent callers can't both select
    /// the same resource before either commits — redb only ever has one
    /// write transaction open at a time, so holding it across the
    /// select-then-write makes the whole operation atomic.
    async fn acquire_ready(&self, pool: &PoolName, ttl_seconds: i64) -> Result<Resource, StoreError> {
        if self.get_pool(pool).await?.is_none() {
            return Err(StoreError::UnknownPool(pool.to_string()));
        }
        let wtxn = self.db.begin_write().map_err(internal)?;
        let candidate = {
            let mut table = wtxn.open_table(RESOURCES).map_err(internal)?;
            let mut candidate: Option<Resource> = None;
            for entry in table.iter().map_err(internal)? {
                let (_key, value) = entry.map_err(internal)?;
                let r: Resource = serde_json::from_slice(value.value())?;
                if &r.pool != pool || r.status != Status::Ready {
                    continue;
                }
                candidate = Some(match candidate {
                    Some(c) if c.name <= r.name => c,
                    _ => r,
                });
            }
            let mut candidate = candidate.ok_or_else(|| StoreError::NoResources(pool.to_string()))?;
            candidate.status = Status::Reserved;
            candidate.action = Action::Destroy;
            candidate.action_time = chrono::Utc::now() + chrono::Duration::seconds(ttl_seconds);
            let bytes = serde_json::to_vec(&candidate)?;
            table
                .insert(candidate.id.to_string().as_str(), bytes.as_slice())
                .map_err(internal)?;
            candidate
        };
        wtxn.commit().map_err(internal)?;
        Ok(candidate)
    }

    async fn release_reserved(&self, id: ResourceId) -> Result<Resource, StoreError> {
        let mut resource = self
            .read_resource(id)?
            .ok_or_else(|| StoreError::UnknownResource(id.to_string()))?;
        if resource.status != Status::Reserved {
            return Err(StoreError::NotReserved(id.to_string()));
        }
        resource.status = Status::Pending;
        resource.action = Action::Destroy;
        resource.action_time = chrono::Utc::now() + chrono::Duration::seconds(1);
        self.write_resource(&resource)?;
        Ok(resource)
    }

    async fn set_resource_attribute(
        &self,
        id: ResourceId,
        key: String,
        value: String,
    ) -> Result<(), StoreError> {
        let mut attrs = self.list_resource_attributes(id).await?;
        let attr = Attribute { key, value };
        if !attrs.contains(&attr) {
            attrs.push(attr);
            let bytes = serde_json::to_vec(&attrs)?;
            let wtxn = self.db.begin_write().map_err(internal)?;
            {
                let mut table = wtxn.open_table(RESOURCE_ATTRS).map_err(internal)?;
                table.insert(id.to_string().as_str(), bytes.as_slice()).map_err(internal)?;
            }
            wtxn.commit().map_err(internal)?;
        }
        Ok(())
    }

    async fn list_resource_attributes(&self, id: ResourceId) -> Result<Vec<Attribute>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(RESOURCE_ATTRS).map_err(internal)?;
        match table.get(id.to_string().as_str()).map_err(internal)? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Ok(Vec::new()),
        }
    }

    async fn set_pool_attribute(&self, pool: &PoolName, key: String, value: String) -> Result<(), StoreError> {
        let mut attrs = self.list_pool_attributes(pool).await?;
        let attr = Attribute { key, value };
        if !attrs.contains(&attr) {
            attrs.push(attr);
            let bytes = serde_json::to_vec(&attrs)?;
            let wtxn = self.db.begin_write().map_err(internal)?;
            {
                let mut table = wtxn.open_table(POOL_ATTRS).map_err(internal)?;
                table.insert(pool.as_str(), bytes.as_slice()).map_err(internal)?;
            }
            wtxn.commit().map_err(internal)?;
        }
        Ok(())
    }

    async fn list_pool_attributes(&self, pool: &PoolName) -> Result<Vec<Attribute>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(POOL_ATTRS).map_err(internal)?;
        match table.get(pool.as_str()).map_err(internal)? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use testpool_domain::Resource;

    fn open_store(dir: &TempDir) -> RedbStore {
        RedbStore::open(&dir.path().join("state.redb")).unwrap()
    }

    async fn seed_pool(store: &RedbStore) -> Pool {
        let host = store.create_host("local://".into(), "local".into()).await.unwrap();
        store
            .create_pool(Pool {
                name: PoolName::new("p"),
                host: host.id,
                template_name: "tmpl".into(),
                resource_max: 3,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_get_resource() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let pool = seed_pool(&store).await;
        let r = Resource::new_pending_clone(pool.name.clone(), "tmpl.0");
        let created = store.create_resource(r).await.unwrap();
        let got = store.get_resource(created.id).await.unwrap().unwrap();
        assert_eq!(got.id, created.id);
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");
        let pool_name;
        let resource_id;
        {
            let store = RedbStore::open(&path).unwrap();
            let pool = seed_pool(&store).await;
            pool_name = pool.name.clone();
            let r = Resource::new_pending_clone(pool.name.clone(), "tmpl.0");
            resource_id = store.create_resource(r).await.unwrap().id;
        }
        {
            let store = RedbStore::open(&path).unwrap();
            assert!(store.get_pool(&pool_name).await.unwrap().is_some());
            assert!(store.get_resource(resource_id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn acquire_ready_is_atomic_transition() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let pool = seed_pool(&store).await;
        let mut r = Resource::new_pending_clone(pool.name.clone(), "tmpl.0");
        r.status = Status::Ready;
        r.action = Action::None;
        let r = store.create_resource(r).await.unwrap();

        let acquired = store.acquire_ready(&pool.name, 30).await.unwrap();
        assert_eq!(acquired.id, r.id);
        assert_eq!(acquired.status, Status::Reserved);
    }

    #[tokio::test]
    async fn concurrent_acquire_never_hands_out_the_same_resource_twice() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let pool = seed_pool(&store).await;
        for i in 0..5 {
            let mut r = Resource::new_pending_clone(pool.name.clone(), format!("tmpl.{i}"));
            r.status = Status::Ready;
            r.action = Action::None;
            store.create_resource(r).await.unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let store = store.clone();
            let pool_name = pool.name.clone();
            tasks.push(tokio::spawn(async move { store.acquire_ready(&pool_name, 30).await }));
        }
        let mut acquired_ids = std::collections::HashSet::new();
        for task in tasks {
            let resource = task.await.unwrap().unwrap();
            assert!(acquired_ids.insert(resource.id), "the same resource was acquired twice");
        }
        assert_eq!(acquired_ids.len(), 5);
    }

    #[tokio::test]
    async fn attribute_dedup_by_value() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let pool = seed_pool(&store).await;
        let r = Resource::new_pending_clone(pool.name.clone(), "tmpl.0");
        let r = store.create_resource(r).await.unwrap();
        store.set_resource_attribute(r.id, "ip".into(), "10.0.0.5".into()).await.unwrap();
        store.set_resource_attribute(r.id, "ip".into(), "10.0.0.5".into()).await.unwrap();
        assert_eq!(store.list_resource_attributes(r.id).await.unwrap().len(), 1);
    }
}
