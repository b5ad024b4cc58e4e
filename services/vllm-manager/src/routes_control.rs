use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, Result};
use crate::gaming::GamingToggle;
use crate::lifecycle::StartOutcome;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct GamingModeReq {
    pub enable: bool,
}

pub async fn post_gaming_mode(
    State(state): State<SharedState>,
    Json(req): Json<GamingModeReq>,
) -> Result<Json<GamingToggle>> {
    if !state.config.gaming_mode_enabled {
        return Err(ManagerError::GamingModeDisabled);
    }
    Ok(Json(state.manager.set_gaming_mode(req.enable).await))
}

#[derive(Serialize)]
pub struct StopAllResp {
    pub stopped: Vec<String>,
}

pub async fn post_stop_all(State(state): State<SharedState>) -> Json<StopAllResp> {
    let stopped = state.manager.stop_all().await;
    Json(StopAllResp { stopped })
}

#[derive(Serialize)]
pub struct LifecycleResp {
    pub model: String,
    pub status: crate::runtime::ModelStatus,
    pub message: String,
}

pub async fn post_start(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LifecycleResp>> {
    let outcome = state.manager.start(&id).await?;
    let message = match outcome {
        StartOutcome::Started => "started",
        StartOutcome::AlreadyRunning => "already running",
    };
    Ok(Json(LifecycleResp {
        model: id,
        status: crate::runtime::ModelStatus::Running,
        message: message.to_string(),
    }))
}

pub async fn post_stop(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LifecycleResp>> {
    let stopped = state.manager.stop(&id).await?;
    let message = if stopped { "stopped" } else { "nothing to do: model is not running" };
    Ok(Json(LifecycleResp {
        model: id,
        status: crate::runtime::ModelStatus::Stopped,
        message: message.to_string(),
    }))
}
