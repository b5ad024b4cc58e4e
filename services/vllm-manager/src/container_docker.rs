use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerStateStatusEnum, DeviceRequest, HostConfig};
use bollard::Docker;
use tracing::debug;

use crate::container::{
    ContainerRuntime, ContainerSpec, ContainerState, RuntimeError, RuntimeInfo,
};

/// Docker Engine API client. Backends are addressed by container name on
/// the shared network, so the manager has to run on that network too.
pub struct DockerEngine {
    docker: Docker,
    network: String,
    port: u16,
}

impl DockerEngine {
    /// Connects over the local socket (or `DOCKER_HOST`). Does not ping.
    pub fn connect(network: String, port: u16) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self {
            docker,
            network,
            port,
        })
    }
}

fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn is_not_found(err: &DockerError) -> bool {
    status_code(err) == Some(404)
}

fn command_error(op: &str, name: &str, err: DockerError) -> RuntimeError {
    RuntimeError::Command {
        op: op.to_string(),
        name: name.to_string(),
        message: err.to_string(),
    }
}

pub fn container_state(status: Option<ContainerStateStatusEnum>) -> ContainerState {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::PAUSED) => ContainerState::Paused,
        Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Restarting,
        Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Removing,
        Some(ContainerStateStatusEnum::EXITED) => ContainerState::Exited,
        Some(ContainerStateStatusEnum::DEAD) => ContainerState::Dead,
        _ => ContainerState::Unknown,
    }
}

/// Engine-side container definition for `spec`.
pub fn container_config(spec: &ContainerSpec) -> Config<String> {
    let device_requests = if spec.gpu_device_ids.is_empty() {
        None
    } else {
        Some(vec![DeviceRequest {
            driver: Some("nvidia".to_string()),
            device_ids: Some(spec.gpu_device_ids.clone()),
            capabilities: Some(vec![vec!["gpu".to_string()]]),
            ..Default::default()
        }])
    };

    let host_config = HostConfig {
        binds: Some(
            spec.volumes
                .iter()
                .map(|(host, container)| format!("{host}:{container}"))
                .collect(),
        ),
        network_mode: Some(spec.network.clone()),
        ipc_mode: Some("host".to_string()),
        device_requests,
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: Some(spec.args.clone()),
        env: Some(spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect()),
        labels: Some(spec.labels.iter().cloned().collect::<HashMap<_, _>>()),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerEngine {
    async fn inspect(&self, name: &str) -> Result<Option<ContainerState>, RuntimeError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(resp) => Ok(Some(container_state(resp.state.and_then(|s| s.status)))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(command_error("inspect", name, e)),
        }
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        debug!(container = %spec.name, image = %spec.image, args = ?spec.args, "docker: create");
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        self.docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| command_error("create", &spec.name, e))?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| command_error("start", name, e))
    }

    async fn stop(&self, name: &str, grace: Duration) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match self.docker.stop_container(name, Some(options)).await {
            // 304: already stopped
            Err(e) if !is_not_found(&e) && status_code(&e) != Some(304) => {
                Err(command_error("stop", name, e))
            }
            _ => Ok(()),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Err(e) if !is_not_found(&e) => Err(command_error("remove", name, e)),
            _ => Ok(()),
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("http://{}:{}", name, self.port)
    }

    fn info(&self) -> RuntimeInfo {
        RuntimeInfo {
            name: "docker".to_string(),
            network: self.network.clone(),
        }
    }
}
