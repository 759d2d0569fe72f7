use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::Driver;
use crate::error::DriverError;

/// Process-wide mapping from `product` to driver instance.
///
/// Populated once at startup from the configured `plugins` list (see
/// `testpool-config`); each entry is resolved to a built-in driver
/// constructor rather than dynamically loaded, since this workspace has
/// no plugin-loading mechanism.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self { drivers: HashMap::new() }
    }

    /// Register a driver under its own `product()` key. Returns `&mut self` for chaining.
    pub fn register(&mut self, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(driver.product().to_string(), driver);
        self
    }

    /// Resolve the driver for a host's `product`.
    ///
    /// Returns `DriverNotConfigured` if no driver is registered for it; callers
    /// must treat that pool as unserviceable (logged, not deleted) rather than fatal.
    pub fn for_product(&self, product: &str) -> Result<Arc<dyn Driver>, DriverError> {
        self.drivers
            .get(product)
            .cloned()
            .ok_or_else(|| DriverError::DriverNotConfigured(product.to_string()))
    }

    /// Products with a registered driver.
    pub fn active_products(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalDriver;

    #[test]
    fn resolves_registered_product() {
        let mut reg = DriverRegistry::new();
        reg.register(Arc::new(LocalDriver::new()));
        assert!(reg.for_product("local").is_ok());
    }

    #[test]
    fn unknown_product_is_not_configured() {
        let reg = DriverRegistry::new();
        assert!(matches!(
            reg.for_product("docker"),
            Err(DriverError::DriverNotConfigured(p)) if p == "docker"
        ));
    }

    #[test]
    fn active_products_lists_registered_only() {
        let mut reg = DriverRegistry::new();
        reg.register(Arc::new(LocalDriver::new()));
        assert_eq!(reg.active_products(), vec!["local".to_string()]);
    }
}
