use axum::{extract::State, Json};
use modelops::ModelType;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub owned_by: &'static str,
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub vram_gb: f64,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

/// Admitted catalog only; models that did not fit the GPU never show up.
pub async fn get_models(State(st): State<SharedState>) -> Json<ModelsResponse> {
    let data = st
        .manager
        .slots()
        .map(|slot| ModelEntry {
            id: slot.card.id.clone(),
            object: "model",
            owned_by: "vllm-manager",
            name: slot.card.display_name().to_string(),
            model_type: slot.card.model_type,
            vram_gb: slot.card.vram_gb,
        })
        .collect();

    Json(ModelsResponse { object: "list", data })
}
