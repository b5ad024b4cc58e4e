use std::collections::HashSet;
use std::path::Path;

use tracing::{error, info, warn};

use crate::{is_valid_model_id, CatalogError, CatalogFile, ModelCard, Result};

/// GB kept free on the GPU for the CUDA context and driver overhead.
pub const VRAM_HEADROOM_GB: f64 = 1.0;

/// Parse the catalog file. Duplicate ids (first wins) and ids that cannot
/// become container names are dropped with a warning.
pub fn load_catalog(path: &Path) -> Result<Vec<ModelCard>> {
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_catalog(&raw).map_err(|source| CatalogError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_catalog(raw: &str) -> std::result::Result<Vec<ModelCard>, serde_json::Error> {
    let file: CatalogFile = serde_json::from_str(raw)?;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(file.models.len());
    for card in file.models {
        if !is_valid_model_id(&card.id) {
            warn!(model = %card.id, "catalog: skipping model with invalid id");
            continue;
        }
        if !seen.insert(card.id.clone()) {
            warn!(model = %card.id, "catalog: skipping duplicate model id");
            continue;
        }
        out.push(card);
    }
    Ok(out)
}

/// Usable VRAM once headroom is taken off. Never negative.
pub fn usable_vram_gb(detected_vram_gb: f64) -> f64 {
    (detected_vram_gb - VRAM_HEADROOM_GB).max(0.0)
}

pub fn fits(card: &ModelCard, detected_vram_gb: f64) -> bool {
    card.vram_gb <= detected_vram_gb - VRAM_HEADROOM_GB
}

/// Admission control: keep only models that fit in `detected - headroom`.
pub fn admit(cards: Vec<ModelCard>, detected_vram_gb: f64) -> Vec<ModelCard> {
    let usable = usable_vram_gb(detected_vram_gb);
    cards
        .into_iter()
        .filter(|card| {
            let ok = fits(card, detected_vram_gb);
            if !ok {
                info!(
                    model = %card.id,
                    required_gb = card.vram_gb,
                    usable_gb = usable,
                    "catalog: model exceeds VRAM budget, not admitted"
                );
            }
            ok
        })
        .collect()
}

/// Load + admit. A broken config yields an empty catalog so the control
/// plane can still answer /health and /status.
pub fn load_admitted(path: &Path, detected_vram_gb: f64) -> Vec<ModelCard> {
    match load_catalog(path) {
        Ok(cards) => {
            let total = cards.len();
            let admitted = admit(cards, detected_vram_gb);
            info!(
                total,
                admitted = admitted.len(),
                vram_gb = detected_vram_gb,
                "catalog: loaded"
            );
            admitted
        }
        Err(e) => {
            error!("catalog: {e}; continuing with an empty catalog");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn card(id: &str, vram_gb: f64) -> ModelCard {
        ModelCard {
            id: id.into(),
            name: None,
            hf_model: format!("org/{id}"),
            quantization: None,
            default_context: 8192,
            vram_gb,
            model_type: Default::default(),
        }
    }

    #[test]
    fn test_admit_applies_headroom() {
        let cards = vec![
            card("small", 4.0),
            card("big", 20.0),
            card("edge", 7.0),
            card("over", 7.5),
        ];
        let ids: Vec<_> = admit(cards, 8.0).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["small", "edge"]);
    }

    #[test]
    fn test_admit_tiny_gpu_admits_nothing() {
        assert!(admit(vec![card("small", 4.0)], 0.5).is_empty());
        assert_eq!(usable_vram_gb(0.5), 0.0);
    }

    #[test]
    fn test_parse_catalog_fields_and_defaults() {
        let raw = r#"{"models": [
            {"id": "qwen", "hf_model": "Qwen/Qwen2.5-7B-Instruct-AWQ", "quantization": "awq",
             "default_context": 32768, "vram_gb": 6, "type": "text"},
            {"id": "sd", "name": "Stable Diffusion", "hf_model": "x/sd",
             "default_context": 77, "vram_gb": 5.5, "type": "image"}
        ]}"#;
        let cards = parse_catalog(raw).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].quantization.as_deref(), Some("awq"));
        assert_eq!(cards[0].display_name(), "qwen");
        assert_eq!(cards[0].container_name(), "vllm-qwen");
        assert_eq!(cards[1].model_type, crate::ModelType::Image);
        assert_eq!(cards[1].display_name(), "Stable Diffusion");
    }

    #[test]
    fn test_parse_catalog_drops_duplicates_and_bad_ids() {
        let raw = r#"{"models": [
            {"id": "a", "hf_model": "x/a", "default_context": 1024, "vram_gb": 1},
            {"id": "a", "hf_model": "x/a2", "default_context": 1024, "vram_gb": 1},
            {"id": "bad id", "hf_model": "x/b", "default_context": 1024, "vram_gb": 1},
            {"id": "-lead", "hf_model": "x/c", "default_context": 1024, "vram_gb": 1}
        ]}"#;
        let cards = parse_catalog(raw).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].hf_model, "x/a");
    }

    #[test]
    fn test_load_admitted_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(load_catalog(&path), Err(CatalogError::Io { .. })));
        assert!(load_admitted(&path, 24.0).is_empty());
    }

    #[test]
    fn test_load_admitted_malformed_file_is_empty() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{\"models\": [{{\"id\": ").unwrap();
        assert!(matches!(load_catalog(f.path()), Err(CatalogError::Parse { .. })));
        assert!(load_admitted(f.path(), 24.0).is_empty());
    }

    #[test]
    fn test_load_admitted_filters_by_vram() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"models": [
                {{"id": "small", "hf_model": "x/s", "default_context": 4096, "vram_gb": 4, "type": "text"}},
                {{"id": "big", "hf_model": "x/b", "default_context": 4096, "vram_gb": 20, "type": "text"}}
            ]}}"#
        )
        .unwrap();
        let ids: Vec<_> = load_admitted(f.path(), 8.0).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["small"]);
    }
}
