use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

/// Used when the GPU cannot be queried.
pub const DEFAULT_VRAM_GB: f64 = 8.0;

/// Total memory of the first GPU in GB. Never fails; falls back to
/// [`DEFAULT_VRAM_GB`] with a warning.
pub async fn detect_vram_gb() -> f64 {
    match query_nvidia_smi().await {
        Ok(gb) => {
            info!(vram_gb = gb, "gpu: detected");
            gb
        }
        Err(e) => {
            warn!("gpu: detection failed ({e:#}); assuming {DEFAULT_VRAM_GB} GB");
            DEFAULT_VRAM_GB
        }
    }
}

async fn query_nvidia_smi() -> Result<f64> {
    let output = Command::new("nvidia-smi")
        .arg("--query-gpu=memory.total")
        .arg("--format=csv,noheader,nounits")
        .output()
        .await
        .context("nvidia-smi not runnable")?;

    if !output.status.success() {
        bail!(
            "nvidia-smi exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_memory_total(&String::from_utf8_lossy(&output.stdout))
}

/// First line of `memory.total` in MiB → GB.
pub fn parse_memory_total(stdout: &str) -> Result<f64> {
    let first = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .context("nvidia-smi returned no GPUs")?;
    let mib: f64 = first
        .parse()
        .with_context(|| format!("unexpected nvidia-smi output: {first}"))?;
    Ok(mib / 1024.0)
}
