use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::Docker;
use crate::driver::{Driver, StartState, TimingOp};
use crate::error::DriverError;

const POOL_LABEL: &str = "testpool.pool";

/// Backed by the local Docker daemon via `bollard`.
///
/// `connection` is either empty (use the platform default socket) or an
/// explicit Docker host URI/socket path understood by `bollard`.
#[derive(Debug, Default)]
pub struct DockerDriver;

impl DockerDriver {
    pub fn new() -> Self {
        Self
    }

    fn connect(&self, connection: &str) -> Result<Docker, DriverError> {
        let docker = if connection.is_empty() {
            Docker::connect_with_local_defaults()
        } else {
            Docker::connect_with_socket(connection, 120, bollard::API_DEFAULT_VERSION)
        };
        docker.map_err(|e| DriverError::BackendUnavailable(e.to_string()))
    }
}

fn map_err(e: BollardError) -> DriverError {
    match &e {
        BollardError::DockerResponseServerError { status_code: 404, .. } => {
            DriverError::NotFound(e.to_string())
        }
        BollardError::DockerResponseServerError { status_code: 409, .. } => {
            DriverError::AlreadyExists(e.to_string())
        }
        _ => DriverError::BackendUnavailable(e.to_string()),
    }
}

#[async_trait]
impl Driver for DockerDriver {
    fn product(&self) -> &'static str {
        "docker"
    }

    async fn check(&self, connection: &str) -> Result<(), DriverError> {
        let docker = self.connect(connection)?;
        docker.ping().await.map_err(map_err)?;
        Ok(())
    }

    async fn list(&self, connection: &str, pool: &str) -> Result<HashSet<String>, DriverError> {
        let docker = self.connect(connection)?;
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{POOL_LABEL}={pool}")]);
        let containers = docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(map_err)?;
        Ok(containers
            .into_iter()
            .flat_map(|c| c.names.unwrap_or_default())
            .map(|n| n.trim_start_matches('/').to_string())
            .collect())
    }

    async fn clone(&self, connection: &str, template: &str, name: &str) -> Result<(), DriverError> {
        let docker = self.connect(connection)?;
        let pool = name.rsplit_once('.').map(|(p, _)| p).unwrap_or(name);
        let mut labels = HashMap::new();
        labels.insert(POOL_LABEL.to_string(), pool.to_string());

        let options = CreateContainerOptions { name: name.to_string(), platform: None };
        let config = Config {
            image: Some(template.to_string()),
            labels: Some(labels),
            ..Default::default()
        };

        match docker.create_container(Some(options), config).await {
            Ok(_) => Ok(()),
            Err(e) => match map_err(e) {
                DriverError::AlreadyExists(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn destroy(&self, connection: &str, name: &str) -> Result<(), DriverError> {
        let docker = self.connect(connection)?;
        match docker
            .remove_container(name, Some(RemoveContainerOptions { force: true, ..Default::default() }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => match map_err(e) {
                DriverError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn start(&self, connection: &str, name: &str) -> Result<StartState, DriverError> {
        let docker = self.connect(connection)?;
        docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_err)?;

        let inspect = docker.inspect_container(name, None).await.map_err(map_err)?;
        let running = inspect
            .state
            .and_then(|s| s.running)
            .unwrap_or(false);
        Ok(if running { StartState::Running } else { StartState::Stopped })
    }

    async fn ip_get(&self, connection: &str, name: &str) -> Result<Option<String>, DriverError> {
        let docker = self.connect(connection)?;
        let inspect = match docker.inspect_container(name, None).await {
            Ok(i) => i,
            Err(e) => {
                return match map_err(e) {
                    DriverError::NotFound(_) => Ok(None),
                    other => Err(other),
                }
            }
        };
        let ip = inspect
            .network_settings
            .and_then(|ns| ns.networks)
            .and_then(|networks| networks.values().next().cloned())
            .and_then(|n| n.ip_address)
            .filter(|s| !s.is_empty());
        Ok(ip)
    }

    async fn attributes_get(
        &self,
        connection: &str,
        name: &str,
    ) -> Result<HashMap<String, String>, DriverError> {
        let docker = self.connect(connection)?;
        let inspect = docker.inspect_container(name, None).await.map_err(map_err)?;
        let labels = inspect
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default();
        Ok(labels)
    }

    fn timing_get(&self, op: TimingOp) -> Duration {
        match op {
            TimingOp::Destroy => Duration::from_secs(2),
            TimingOp::Clone => Duration::from_secs(3),
            TimingOp::Attr => Duration::from_secs(2),
        }
    }
}
