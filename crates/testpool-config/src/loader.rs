use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawConfig;

/// Default `--cfg-file` path when none is given on the command line.
pub const DEFAULT_CFG_PATH: &str = "/etc/testpool/testpool.yml";

/// Matches `core/server.py`'s `argparser()` defaults.
const DEFAULT_MAX_SLEEP_TIME: u64 = 60;
const DEFAULT_MIN_SLEEP_TIME: u64 = 1;

/// Validated, working configuration for the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub plugins: Vec<String>,
    pub profile_log: Option<PathBuf>,
    pub max_sleep_time: Duration,
    pub min_sleep_time: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            plugins: Vec::new(),
            profile_log: None,
            max_sleep_time: Duration::from_secs(DEFAULT_MAX_SLEEP_TIME),
            min_sleep_time: Duration::from_secs(DEFAULT_MIN_SLEEP_TIME),
        }
    }
}

/// Load and validate the YAML config at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let raw: RawConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;

    convert(raw, path)
}

fn convert(raw: RawConfig, path: &Path) -> Result<Config, ConfigError> {
    if raw.plugins.is_empty() {
        debug!("{}: no plugins configured, engine will not service any host", path.display());
    }

    let profile_log = raw
        .daemon
        .profile
        .and_then(|p| p.log)
        .map(PathBuf::from);

    let max_sleep_time = Duration::from_secs(raw.daemon.max_sleep_time.unwrap_or(DEFAULT_MAX_SLEEP_TIME));
    let min_sleep_time = Duration::from_secs(raw.daemon.min_sleep_time.unwrap_or(DEFAULT_MIN_SLEEP_TIME));

    if min_sleep_time > max_sleep_time {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!(
                "min_sleep_time ({:?}) must not exceed max_sleep_time ({:?})",
                min_sleep_time, max_sleep_time
            ),
        });
    }

    Ok(Config {
        plugins: raw.plugins,
        profile_log,
        max_sleep_time,
        min_sleep_time,
    })
}
