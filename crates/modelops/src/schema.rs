use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Text,
    Image,
}

/// One entry of the catalog file. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub hf_model: String,
    #[serde(default)]
    pub quantization: Option<String>,
    pub default_context: u32,
    pub vram_gb: f64,
    #[serde(rename = "type", default)]
    pub model_type: ModelType,
}

impl ModelCard {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn container_name(&self) -> String {
        container_name(&self.id)
    }
}

/// On-disk shape: `{"models": [...]}`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub models: Vec<ModelCard>,
}

/// Deterministic container name: vllm-<id>
pub fn container_name(id: &str) -> String {
    format!("vllm-{id}")
}

/// Docker accepts `[a-zA-Z0-9][a-zA-Z0-9_.-]*` as container names.
pub fn is_valid_model_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read model config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed model config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CatalogError>;
