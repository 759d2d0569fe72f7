use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DriverError;

/// The three ops the engine asks a driver for a backoff duration on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingOp {
    Destroy,
    Clone,
    Attr,
}

/// Result of `Driver::start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartState {
    Running,
    Stopped,
    None,
}

/// The hypervisor-specific backend interface. One implementation per `product`.
///
/// Every mutating call is expected to be retried by the caller on
/// [`DriverError::BackendUnavailable`]; `destroy` must be idempotent
/// (no-op if the target is already absent) and `clone` must treat an
/// already-existing name as success.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// The `product` key this driver answers to in the registry.
    fn product(&self) -> &'static str;

    /// Validate the connection is usable. Called at startup for each host.
    async fn check(&self, connection: &str) -> Result<(), DriverError>;

    /// Resource names currently present on the backend for this host/pool.
    async fn list(&self, connection: &str, pool: &str) -> Result<HashSet<String>, DriverError>;

    /// Clone `template` into a new resource named `name`.
    async fn clone(&self, connection: &str, template: &str, name: &str) -> Result<(), DriverError>;

    /// Destroy the resource named `name`. No-op if it does not exist.
    async fn destroy(&self, connection: &str, name: &str) -> Result<(), DriverError>;

    /// Start the resource named `name` and report its resulting run state.
    async fn start(&self, connection: &str, name: &str) -> Result<StartState, DriverError>;

    /// Best-effort IP address discovery. `None` means not yet assigned.
    async fn ip_get(&self, connection: &str, name: &str) -> Result<Option<String>, DriverError>;

    /// Arbitrary key/value metadata the backend exposes for this resource.
    async fn attributes_get(
        &self,
        connection: &str,
        name: &str,
    ) -> Result<HashMap<String, String>, DriverError>;

    /// Deterministic resource name for the `index`-th clone of `template`.
    fn new_name_get(&self, template: &str, index: u32) -> String {
        format!("{template}.{index}")
    }

    /// Recommended retry/backoff delay for `op`, opaque to the engine.
    fn timing_get(&self, op: TimingOp) -> Duration;
}
