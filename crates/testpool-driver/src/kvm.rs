use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::driver::{Driver, StartState, TimingOp};
use crate::error::DriverError;

/// Backed by libvirt, driven through the `virsh` CLI as a subprocess.
///
/// No libvirt FFI binding is part of this workspace's dependency stack, so
/// (as with this codebase's other external-tool-driven backends) the driver
/// shells out rather than linking against `libvirt-sys`. `connection` is
/// passed to `virsh -c <connection>`; an empty string uses virsh's default
/// (`qemu:///system`).
#[derive(Debug, Default)]
pub struct KvmDriver;

impl KvmDriver {
    pub fn new() -> Self {
        Self
    }

    async fn virsh(&self, connection: &str, args: &[&str]) -> Result<String, DriverError> {
        let mut full_args: Vec<&str> = Vec::with_capacity(args.len() + 2);
        if !connection.is_empty() {
            full_args.push("-c");
            full_args.push(connection);
        }
        full_args.extend_from_slice(args);

        info!(?full_args, "running virsh");
        let output = Command::new("virsh")
            .args(&full_args)
            .output()
            .await
            .map_err(|e| DriverError::BackendUnavailable(format!("spawn virsh: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let combined = format!("{stdout}{stderr}");
            if combined.contains("failed to get domain") || combined.contains("Domain not found") {
                return Err(DriverError::NotFound(combined));
            }
            if combined.contains("already exists") {
                return Err(DriverError::AlreadyExists(combined));
            }
            return Err(DriverError::BackendUnavailable(combined));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl Driver for KvmDriver {
    fn product(&self) -> &'static str {
        "kvm"
    }

    async fn check(&self, connection: &str) -> Result<(), DriverError> {
        self.virsh(connection, &["version"]).await?;
        Ok(())
    }

    async fn list(&self, connection: &str, pool: &str) -> Result<HashSet<String>, DriverError> {
        let out = self.virsh(connection, &["list", "--all", "--name"]).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter(|name| name.starts_with(&format!("{pool}.")))
            .map(String::from)
            .collect())
    }

    async fn clone(&self, connection: &str, template: &str, name: &str) -> Result<(), DriverError> {
        debug!(template, name, "kvm driver: clone");
        match self
            .virsh(connection, &["vol-clone", template, name])
            .await
        {
            Ok(_) => Ok(()),
            Err(DriverError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn destroy(&self, connection: &str, name: &str) -> Result<(), DriverError> {
        debug!(name, "kvm driver: destroy");
        // `destroy` stops the domain, `undefine` removes its definition; either
        // returning "not found" is treated as already-torn-down.
        match self.virsh(connection, &["destroy", name]).await {
            Ok(_) | Err(DriverError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        match self.virsh(connection, &["undefine", name, "--remove-all-storage"]).await {
            Ok(_) | Err(DriverError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn start(&self, connection: &str, name: &str) -> Result<StartState, DriverError> {
        self.virsh(connection, &["start", name]).await?;
        let state = self.virsh(connection, &["domstate", name]).await?;
        Ok(match state.trim() {
            "running" => StartState::Running,
            "shut off" => StartState::Stopped,
            _ => StartState::None,
        })
    }

    async fn ip_get(&self, connection: &str, name: &str) -> Result<Option<String>, DriverError> {
        let out = match self.virsh(connection, &["domifaddr", name]).await {
            Ok(o) => o,
            Err(DriverError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        // Lines look like: "vnet0  52:54:00:xx:xx:xx  ipv4  192.168.122.5/24"
        for line in out.lines() {
            if let Some(cidr) = line.split_whitespace().last() {
                if let Some((ip, _)) = cidr.split_once('/') {
                    if ip.parse::<std::net::Ipv4Addr>().is_ok() {
                        return Ok(Some(ip.to_string()));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn attributes_get(
        &self,
        connection: &str,
        name: &str,
    ) -> Result<HashMap<String, String>, DriverError> {
        let out = self.virsh(connection, &["dominfo", name]).await?;
        let mut attrs = HashMap::new();
        for line in out.lines() {
            if let Some((key, value)) = line.split_once(':') {
                attrs.insert(key.trim().to_lowercase().replace(' ', "_"), value.trim().to_string());
            }
        }
        Ok(attrs)
    }

    fn timing_get(&self, op: TimingOp) -> Duration {
        match op {
            TimingOp::Destroy => Duration::from_secs(5),
            TimingOp::Clone => Duration::from_secs(15),
            TimingOp::Attr => Duration::from_secs(5),
        }
    }
}
