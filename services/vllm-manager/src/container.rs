use std::time::Duration;

use async_trait::async_trait;
use modelops::{launch_args, LaunchSettings, ModelCard};
use thiserror::Error;

/// Where the shared weights cache is mounted inside every backend.
pub const CONTAINER_CACHE_DIR: &str = "/root/.cache/huggingface";
pub const MODEL_LABEL: &str = "vllm-manager.model";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    /// GPU indices handed to the container.
    pub gpu_device_ids: Vec<String>,
    pub volumes: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
    pub args: Vec<String>,
}

/// Everything besides the model card that goes into a backend container.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub image: String,
    pub network: String,
    pub hf_cache_path: String,
    pub hf_token: Option<String>,
    pub launch: LaunchSettings,
}

impl ContainerSpec {
    pub fn for_model(
        card: &ModelCard,
        settings: &ContainerSettings,
        detected_vram_gb: f64,
    ) -> Self {
        let mut env = vec![("HF_HOME".to_string(), CONTAINER_CACHE_DIR.to_string())];
        if let Some(token) = &settings.hf_token {
            env.push(("HUGGING_FACE_HUB_TOKEN".to_string(), token.clone()));
        }

        Self {
            name: card.container_name(),
            image: settings.image.clone(),
            network: settings.network.clone(),
            gpu_device_ids: vec!["0".to_string()],
            volumes: vec![(settings.hf_cache_path.clone(), CONTAINER_CACHE_DIR.to_string())],
            env,
            labels: vec![(MODEL_LABEL.to_string(), card.id.clone())],
            args: launch_args(card, detected_vram_gb, &settings.launch),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("`{op}` on {name} failed: {message}")]
    Command { op: String, name: String, message: String },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RuntimeInfo {
    pub name: String,
    pub network: String,
}

/// Container runtime used by the lifecycle manager. Only the lifecycle
/// manager, holding the model's lock, calls the mutating methods.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// `None` when no container with that name exists.
    async fn inspect(&self, name: &str) -> Result<Option<ContainerState>, RuntimeError>;
    async fn create(&self, spec: &ContainerSpec) -> Result<(), RuntimeError>;
    async fn start(&self, name: &str) -> Result<(), RuntimeError>;
    /// Graceful stop, killed after `grace`. Missing containers are not an error.
    async fn stop(&self, name: &str, grace: Duration) -> Result<(), RuntimeError>;
    /// Forced removal. Missing containers are not an error.
    async fn remove(&self, name: &str) -> Result<(), RuntimeError>;
    /// Base URL of the OpenAI server inside the container, without `/v1`.
    fn endpoint(&self, name: &str) -> String;
    fn info(&self) -> RuntimeInfo;
}
