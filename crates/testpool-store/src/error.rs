use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("no ready resources in pool {0}")]
    NoResources(String),

    #[error("resource {0} is not reserved")]
    NotReserved(String),

    #[error("host already exists for connection {connection:?} product {product:?}")]
    HostAlreadyExists { connection: String, product: String },

    #[error("pool already exists: {0}")]
    PoolAlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
