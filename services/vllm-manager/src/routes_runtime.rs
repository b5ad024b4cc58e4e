use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::config::Mode;
use crate::runtime::{now, ModelStatus};
use crate::state::SharedState;

pub async fn get_health(State(state): State<SharedState>) -> (StatusCode, Json<serde_json::Value>) {
    let cfg = &state.config;

    if cfg.mode == Mode::AlwaysOn {
        if let Some(default) = cfg.default_model.as_deref() {
            let status = match state.manager.slot(default) {
                Some(slot) => Some(slot.status().await),
                None => None,
            };
            if status != Some(ModelStatus::Running) {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({
                        "status": "degraded",
                        "reason": format!("default model '{default}' is not running"),
                        "default_model": default,
                        "default_model_status": status,
                    })),
                );
            }
        }
    }

    (StatusCode::OK, Json(serde_json::json!({ "status": "healthy" })))
}

#[derive(Serialize)]
pub struct RunningModel {
    pub id: String,
    pub container: String,
    pub idle_seconds: u64,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Serialize)]
pub struct StatusResp {
    pub mode: Mode,
    pub gaming_mode: bool,
    pub gaming_mode_enabled: bool,
    pub vram_gb: f64,
    pub default_model: Option<String>,
    pub idle_timeout: i64,
    pub runtime: crate::container::RuntimeInfo,
    pub running: Vec<RunningModel>,
    pub starting: Vec<String>,
    pub stopped: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Answers from recorded state only; never touches the container runtime.
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusResp> {
    let manager = &state.manager;
    let ts = now();

    let mut running = Vec::new();
    let mut starting = Vec::new();
    let mut stopped = Vec::new();
    for slot in manager.slots() {
        let snap = slot.snapshot().await;
        match snap.status {
            ModelStatus::Running => running.push(RunningModel {
                id: slot.id().to_string(),
                container: slot.container_name.clone(),
                idle_seconds: snap.idle_secs(ts),
                last_used: chrono::DateTime::from_timestamp(snap.last_used as i64, 0),
            }),
            ModelStatus::Starting => starting.push(slot.id().to_string()),
            ModelStatus::Stopped => stopped.push(slot.id().to_string()),
        }
    }

    Json(StatusResp {
        mode: state.config.mode,
        gaming_mode: manager.gaming_mode(),
        gaming_mode_enabled: state.config.gaming_mode_enabled,
        vram_gb: state.vram_gb,
        default_model: state.config.default_model.clone(),
        idle_timeout: state.config.idle_timeout_secs,
        runtime: manager.runtime_info(),
        running,
        starting,
        stopped,
        timestamp: chrono::Utc::now(),
    })
}
