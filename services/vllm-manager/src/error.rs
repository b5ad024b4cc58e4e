use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Model '{model}' is not available on this host. Available models: {available:?}")]
    UnknownModel { model: String, available: Vec<String> },

    #[error("Request body must be a JSON object with a 'model' field")]
    MissingModel,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Gaming mode is disabled by configuration (GAMING_MODE_ENABLED=false)")]
    GamingModeDisabled,

    #[error("Gaming mode is active: cannot start model '{model}' while the GPU is reserved")]
    GamingModeBlocked { model: String },

    #[error("Model '{model}' did not become ready within {timeout_secs}s; container removed")]
    ReadinessTimeout { model: String, timeout_secs: u64 },

    #[error("Container runtime failed for model '{model}': {message}")]
    Runtime { model: String, message: String },

    #[error("Backend for model '{model}' is unreachable: {message}")]
    BackendUnreachable { model: String, message: String },
}

impl ManagerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ManagerError::UnknownModel { .. }
            | ManagerError::MissingModel
            | ManagerError::InvalidBody(_)
            | ManagerError::GamingModeDisabled => StatusCode::BAD_REQUEST,
            ManagerError::GamingModeBlocked { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ManagerError::ReadinessTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ManagerError::Runtime { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ManagerError::BackendUnreachable { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ManagerError::UnknownModel { .. } => "unknown_model",
            ManagerError::MissingModel => "missing_model",
            ManagerError::InvalidBody(_) => "invalid_request",
            ManagerError::GamingModeDisabled => "gaming_mode_disabled",
            ManagerError::GamingModeBlocked { .. } => "gaming_mode_blocked",
            ManagerError::ReadinessTimeout { .. } => "readiness_timeout",
            ManagerError::Runtime { .. } => "runtime_error",
            ManagerError::BackendUnreachable { .. } => "backend_unreachable",
        }
    }

    pub fn body(&self) -> ApiError {
        ApiError {
            error: ErrorDetail {
                message: self.to_string(),
                kind: self.kind().to_string(),
            },
        }
    }
}

/// OpenAI-style error envelope.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl IntoResponse for ManagerError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;
