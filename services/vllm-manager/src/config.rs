use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};
use modelops::LaunchSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    AlwaysOn,
    OnDemand,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always-on" | "always_on" => Ok(Mode::AlwaysOn),
            "on-demand" | "on_demand" => Ok(Mode::OnDemand),
            other => bail!("VLLM_MODE must be 'always-on' or 'on-demand', got '{other}'"),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::AlwaysOn => write!(f, "always-on"),
            Mode::OnDemand => write!(f, "on-demand"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mode: Mode,
    pub default_model: Option<String>,
    pub gaming_mode_enabled: bool,
    pub gaming_mode_at_boot: bool,

    /// Seconds; zero or negative disables the idle reaper.
    pub idle_timeout_secs: i64,
    pub startup_timeout: Duration,

    pub models_config: PathBuf,
    pub vllm_image: String,
    pub hf_cache_path: String,
    pub hf_token: Option<String>,
    pub docker_network: String,
    pub vllm_port: u16,
    pub gpu_memory_utilization: f32,
    pub vram_override_gb: Option<f64>,

    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match var("VLLM_MODE") {
            Some(v) => v.parse()?,
            None => Mode::OnDemand,
        };
        let default_model = var("DEFAULT_MODEL");
        let gaming_mode_enabled = var("GAMING_MODE_ENABLED")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);
        let gaming_mode_at_boot = var("GAMING_MODE").map(|v| parse_flag(&v)).unwrap_or(false);

        let idle_timeout_secs = parse_or(&var, "IDLE_TIMEOUT", 600i64)?;
        let startup_timeout = Duration::from_secs(parse_or(&var, "STARTUP_TIMEOUT", 300u64)?);

        let models_config =
            PathBuf::from(var("MODELS_CONFIG").unwrap_or_else(|| "/app/models.json".to_string()));
        let vllm_image = var("VLLM_IMAGE").unwrap_or_else(|| "vllm/vllm-openai:latest".to_string());
        let hf_cache_path =
            var("HF_CACHE_PATH").unwrap_or_else(|| "/root/.cache/huggingface".to_string());
        let hf_token = var("HF_TOKEN");
        let docker_network = var("DOCKER_NETWORK").unwrap_or_else(|| "vllm-network".to_string());
        let vllm_port = parse_or(&var, "VLLM_PORT", 8000u16)?;
        let gpu_memory_utilization = parse_or(&var, "GPU_MEMORY_UTILIZATION", 0.9f32)?;
        let vram_override_gb = match var("VRAM_GB") {
            Some(v) => Some(
                v.parse::<f64>()
                    .with_context(|| format!("VRAM_GB is not a number: {v}"))?,
            ),
            None => None,
        };

        let bind_addr = var("MANAGER_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        // fail fast on values that would only blow up later inside a container
        if !(gpu_memory_utilization > 0.0 && gpu_memory_utilization <= 1.0) {
            bail!("GPU_MEMORY_UTILIZATION must be in (0, 1], got {gpu_memory_utilization}");
        }
        if startup_timeout.is_zero() {
            bail!("STARTUP_TIMEOUT must be positive");
        }
        if matches!(vram_override_gb, Some(v) if v <= 0.0) {
            bail!("VRAM_GB must be positive");
        }

        Ok(Self {
            mode,
            default_model,
            gaming_mode_enabled,
            gaming_mode_at_boot,
            idle_timeout_secs,
            startup_timeout,
            models_config,
            vllm_image,
            hf_cache_path,
            hf_token,
            docker_network,
            vllm_port,
            gpu_memory_utilization,
            vram_override_gb,
            bind_addr,
        })
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs as u64))
    }

    pub fn launch_settings(&self) -> LaunchSettings {
        LaunchSettings {
            port: self.vllm_port,
            gpu_memory_utilization: self.gpu_memory_utilization,
        }
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v, "1" | "true" | "TRUE" | "True" | "yes" | "YES" | "on")
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(v) => v.parse::<T>().with_context(|| format!("Invalid value for {key}: {v}")),
        None => Ok(default),
    }
}
