use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("fatal backend error: {0}")]
    FatalBackend(String),

    #[error("driver not configured for product: {0}")]
    DriverNotConfigured(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}
