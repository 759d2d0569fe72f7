//! The per-pool structured log (§6, §10.B): one stable JSON line per adapt
//! pass, consumed by operators/monitoring rather than humans reading
//! `tracing` output. Deliberately independent of the `tracing` subscriber —
//! this is an external contract with a fixed shape, not a diagnostic trace.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::EngineError;

#[derive(Serialize)]
struct ProfileLogEntry<'a> {
    timestamp: String,
    level: &'a str,
    pool: &'a str,
    resource_count: usize,
    resource_max: u32,
}

/// Appends `{timestamp, level, pool, resource_count, resource_max}` JSON
/// lines to a file. Constructed with `path: None`, every `record` call is a
/// silent no-op — the config key (`daemon.profile.log`) is optional.
pub struct ProfileLog {
    file: Option<Mutex<File>>,
}

impl ProfileLog {
    pub fn open(path: Option<&Path>) -> Result<Self, EngineError> {
        let file = match path {
            Some(p) => {
                if let Some(parent) = p.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| EngineError::Internal(e.to_string()))?;
                }
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(p)
                    .map_err(|e| EngineError::Internal(e.to_string()))?;
                Some(Mutex::new(f))
            }
            None => None,
        };
        Ok(ProfileLog { file })
    }

    /// Silently drops the entry if the underlying write fails — the engine
    /// loop must never stall or abort on a logging problem.
    pub fn record(&self, pool: &str, resource_count: usize, resource_max: u32) {
        let Some(file) = &self.file else { return };
        let entry = ProfileLogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            level: "info",
            pool,
            resource_count,
            resource_max,
        };
        let Ok(line) = serde_json::to_string(&entry) else { return };
        if let Ok(mut f) = file.lock() {
            let _ = writeln!(f, "{line}");
        }
    }
}
