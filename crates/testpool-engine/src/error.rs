use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] testpool_config::ConfigError),

    #[error("store error: {0}")]
    Store(#[from] testpool_store::StoreError),

    #[error("driver error: {0}")]
    Driver(#[from] testpool_driver::DriverError),

    #[error("no driver registered for product {0}")]
    UnservicedProduct(String),

    #[error("internal error: {0}")]
    Internal(String),
}
