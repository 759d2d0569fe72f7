use serde::{Deserialize, Serialize};

/// Raw YAML representation of `/etc/testpool/testpool.yml`.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawConfig {
    /// Driver package identifiers to resolve at startup (e.g. `docker`, `kvm`, `local`).
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub daemon: RawDaemon,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawDaemon {
    #[serde(default)]
    pub profile: Option<RawProfile>,
    pub max_sleep_time: Option<u64>,
    pub min_sleep_time: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawProfile {
    /// Path for the structured per-pool JSONL log. Absent means no profile log.
    pub log: Option<String>,
}
