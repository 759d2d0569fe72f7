use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid pool name: {0}")]
    InvalidPoolName(String),

    #[error("invalid product: {0}")]
    InvalidProduct(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
