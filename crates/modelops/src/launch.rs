use crate::{usable_vram_gb, ModelCard};

/// GPUs with at most this much usable VRAM get the small-card launch profile.
pub const SMALL_TIER_MAX_GB: f64 = 8.0;
/// Max context on small cards, whatever the card prefers.
pub const SMALL_TIER_CONTEXT_CAP: u32 = 4096;
/// Concurrent sequences on small cards; bounds the KV-cache pre-allocation.
pub const SMALL_TIER_MAX_NUM_SEQS: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VramTier {
    Small,
    Standard,
}

impl VramTier {
    /// Keyed on usable VRAM, i.e. after the admission headroom.
    pub fn for_vram(detected_vram_gb: f64) -> Self {
        if usable_vram_gb(detected_vram_gb) <= SMALL_TIER_MAX_GB {
            VramTier::Small
        } else {
            VramTier::Standard
        }
    }
}

#[derive(Clone, Debug)]
pub struct LaunchSettings {
    pub port: u16,
    pub gpu_memory_utilization: f32,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            gpu_memory_utilization: 0.9,
        }
    }
}

pub fn max_model_len(card: &ModelCard, tier: VramTier) -> u32 {
    match tier {
        VramTier::Small => card.default_context.min(SMALL_TIER_CONTEXT_CAP),
        VramTier::Standard => card.default_context,
    }
}

/// vLLM server arguments for `card` on a GPU with `detected_vram_gb`.
///
/// Small cards always get a clamped context and eager execution (no CUDA
/// graph capture), even if the card asks for more.
pub fn launch_args(
    card: &ModelCard,
    detected_vram_gb: f64,
    settings: &LaunchSettings,
) -> Vec<String> {
    let tier = VramTier::for_vram(detected_vram_gb);

    let mut args = vec![
        "--model".to_string(),
        card.hf_model.clone(),
        "--served-model-name".to_string(),
        card.id.clone(),
        "--host".to_string(),
        "0.0.0.0".to_string(),
        "--port".to_string(),
        settings.port.to_string(),
        "--gpu-memory-utilization".to_string(),
        settings.gpu_memory_utilization.to_string(),
        "--max-model-len".to_string(),
        max_model_len(card, tier).to_string(),
    ];

    if let Some(q) = card.quantization.as_deref().filter(|q| !q.is_empty()) {
        args.push("--quantization".to_string());
        args.push(q.to_string());
    }

    if tier == VramTier::Small {
        args.push("--enforce-eager".to_string());
        args.push("--max-num-seqs".to_string());
        args.push(SMALL_TIER_MAX_NUM_SEQS.to_string());
    }

    args
}
