mod raw;
mod loader;
pub mod error;

pub use loader::{load, Config, DEFAULT_CFG_PATH};
pub use error::ConfigError;
