use async_trait::async_trait;
use testpool_domain::{Action, Attribute, Host, HostId, Pool, PoolName, Resource, ResourceId, Status};

use crate::error::StoreError;

/// Durable store of hosts, pools, resources, and key/value attributes.
///
/// The engine is single-writer, so a simple per-row write lock is sufficient
/// for the compare-and-set semantics `transition_resource`/`acquire_ready`/
/// `release_reserved` rely on.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    // ── Hosts ─────────────────────────────────────────────────────────────────

    async fn create_host(&self, connection: String, product: String) -> Result<Host, StoreError>;
    async fn find_host(&self, connection: &str, product: &str) -> Result<Option<Host>, StoreError>;
    async fn get_host(&self, id: HostId) -> Result<Option<Host>, StoreError>;
    async fn list_hosts(&self) -> Result<Vec<Host>, StoreError>;

    // ── Pools ─────────────────────────────────────────────────────────────────

    async fn create_pool(&self, pool: Pool) -> Result<Pool, StoreError>;
    async fn get_pool(&self, name: &PoolName) -> Result<Option<Pool>, StoreError>;
    /// `pool.iterate()` — ordered by name.
    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError>;
    async fn update_pool_max(&self, name: &PoolName, resource_max: u32) -> Result<Pool, StoreError>;
    async fn delete_pool(&self, name: &PoolName) -> Result<(), StoreError>;

    // ── Resources ─────────────────────────────────────────────────────────────

    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError>;
    async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>, StoreError>;
    /// `pool.resources()` — ordered by insertion, no status filter.
    async fn list_pool_resources(&self, pool: &PoolName) -> Result<Vec<Resource>, StoreError>;
    /// Global `status != READY` set ordered by `action_time` ascending, ties
    /// broken by insertion order. Feeds the scheduler loop (§4.G).
    async fn list_non_ready_resources(&self) -> Result<Vec<Resource>, StoreError>;
    /// `resource.transition(new_status, new_action, delta_seconds)`.
    async fn transition_resource(
        &self,
        id: ResourceId,
        status: Status,
        action: Action,
        delta_seconds: i64,
    ) -> Result<Resource, StoreError>;
    async fn delete_resource(&self, id: ResourceId) -> Result<(), StoreError>;
    /// Update the retry counter without otherwise touching the row's state.
    async fn set_attempts(&self, id: ResourceId, attempts: u32) -> Result<Resource, StoreError>;
    async fn set_poll_count(&self, id: ResourceId, poll_count: u32) -> Result<Resource, StoreError>;
    /// Record discovered backend address without otherwise touching status/action.
    async fn set_ip_addr(&self, id: ResourceId, ip_addr: Option<String>) -> Result<Resource, StoreError>;
    /// Setup step 1: mark every row in `pool` BAD.
    async fn mark_all_bad(&self, pool: &PoolName) -> Result<(), StoreError>;
    /// Setup step 3: delete remaining BAD rows in `pool`.
    async fn delete_bad(&self, pool: &PoolName) -> Result<(), StoreError>;

    // ── Reservation API (§4.H) ────────────────────────────────────────────────

    /// Select a READY resource in `pool` (tie-break lexical name), atomically
    /// transition to `(RESERVED, DESTROY, ttl_seconds)`. `NoResources` if none
    /// READY, `UnknownPool` if `pool` doesn't exist.
    async fn acquire_ready(&self, pool: &PoolName, ttl_seconds: i64) -> Result<Resource, StoreError>;
    /// Require `status == RESERVED`; transition to `(PENDING, DESTROY, 1)`.
    /// `NotReserved` otherwise.
    async fn release_reserved(&self, id: ResourceId) -> Result<Resource, StoreError>;

    // ── Attributes ────────────────────────────────────────────────────────────

    /// No-op if `(key, value)` is already attached (dedup by exact value).
    async fn set_resource_attribute(
        &self,
        id: ResourceId,
        key: String,
        value: String,
    ) -> Result<(), StoreError>;
    async fn list_resource_attributes(&self, id: ResourceId) -> Result<Vec<Attribute>, StoreError>;
    async fn set_pool_attribute(&self, pool: &PoolName, key: String, value: String) -> Result<(), StoreError>;
    async fn list_pool_attributes(&self, pool: &PoolName) -> Result<Vec<Attribute>, StoreError>;
}
