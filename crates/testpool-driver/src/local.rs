use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::driver::{Driver, StartState, TimingOp};
use crate::error::DriverError;

/// A deterministic, in-memory driver used for tests, demos, and CI smoke
/// tests without any external hypervisor. Performs no real I/O: `clone`
/// just remembers the name, `ip_get` synthesizes a stable fake address.
#[derive(Debug, Default)]
pub struct LocalDriver {
    resources: Mutex<HashMap<String, HashSet<String>>>,
}

impl LocalDriver {
    pub fn new() -> Self {
        Self { resources: Mutex::new(HashMap::new()) }
    }

    fn pool_set<'a>(
        guard: &'a mut HashMap<String, HashSet<String>>,
        pool: &str,
    ) -> &'a mut HashSet<String> {
        guard.entry(pool.to_string()).or_default()
    }
}

#[async_trait]
impl Driver for LocalDriver {
    fn product(&self) -> &'static str {
        "local"
    }

    async fn check(&self, _connection: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn list(&self, _connection: &str, pool: &str) -> Result<HashSet<String>, DriverError> {
        let guard = self.resources.lock().unwrap();
        Ok(guard.get(pool).cloned().unwrap_or_default())
    }

    async fn clone(&self, _connection: &str, _template: &str, name: &str) -> Result<(), DriverError> {
        debug!(name, "local driver: clone");
        // The pool isn't known here; track under a synthetic "*" bucket keyed by name prefix.
        let mut guard = self.resources.lock().unwrap();
        let pool = name.rsplit_once('.').map(|(p, _)| p).unwrap_or(name);
        Self::pool_set(&mut guard, pool).insert(name.to_string());
        Ok(())
    }

    async fn destroy(&self, _connection: &str, name: &str) -> Result<(), DriverError> {
        debug!(name, "local driver: destroy");
        let mut guard = self.resources.lock().unwrap();
        for set in guard.values_mut() {
            set.remove(name);
        }
        Ok(())
    }

    async fn start(&self, _connection: &str, _name: &str) -> Result<StartState, DriverError> {
        Ok(StartState::Running)
    }

    async fn ip_get(&self, _connection: &str, name: &str) -> Result<Option<String>, DriverError> {
        let hash = name.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        Ok(Some(format!("10.0.{}.{}", (hash >> 8) % 256, hash % 256)))
    }

    async fn attributes_get(
        &self,
        _connection: &str,
        name: &str,
    ) -> Result<HashMap<String, String>, DriverError> {
        let mut attrs = HashMap::new();
        attrs.insert("driver".to_string(), "local".to_string());
        attrs.insert("name".to_string(), name.to_string());
        Ok(attrs)
    }

    fn timing_get(&self, _op: TimingOp) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clone_then_list_reports_the_resource() {
        let driver = LocalDriver::new();
        driver.clone("", "tmpl", "p.0").await.unwrap();
        let names = driver.list("", "p").await.unwrap();
        assert!(names.contains("p.0"));
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let driver = LocalDriver::new();
        driver.destroy("", "p.0").await.unwrap();
        driver.clone("", "tmpl", "p.0").await.unwrap();
        driver.destroy("", "p.0").await.unwrap();
        driver.destroy("", "p.0").await.unwrap();
        let names = driver.list("", "p").await.unwrap();
        assert!(!names.contains("p.0"));
    }

    #[tokio::test]
    async fn ip_get_is_deterministic() {
        let driver = LocalDriver::new();
        let a = driver.ip_get("", "p.0").await.unwrap();
        let b = driver.ip_get("", "p.0").await.unwrap();
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[tokio::test]
    async fn start_reports_running() {
        let driver = LocalDriver::new();
        assert_eq!(driver.start("", "p.0").await.unwrap(), StartState::Running);
    }

    #[test]
    fn timing_is_zero_for_fast_tests() {
        let driver = LocalDriver::new();
        assert_eq!(driver.timing_get(TimingOp::Clone), Duration::ZERO);
    }
}
