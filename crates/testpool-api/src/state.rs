use std::sync::Arc;

use testpool_driver::DriverRegistry;
use testpool_store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub registry: Arc<DriverRegistry>,
}
