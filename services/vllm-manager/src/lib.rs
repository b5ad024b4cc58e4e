//! Single-host control plane for vLLM backend containers.
//!
//! Admits models against the detected GPU memory, starts their containers
//! on first use, stops idle ones, and proxies the OpenAI API to them.

pub mod config;
pub mod container;
pub mod container_docker;
pub mod error;
pub mod gaming;
pub mod gpu;
pub mod idle_reaper;
pub mod lifecycle;
pub mod readiness;
pub mod routes_control;
pub mod routes_models;
pub mod routes_proxy;
pub mod routes_runtime;
pub mod runtime;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::SharedState;

/// Requests may carry base64 images; the axum default of 2 MiB is too small.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(routes_runtime::get_health))
        .route("/status", get(routes_runtime::get_status))
        .route("/v1/models", get(routes_models::get_models))
        .route("/gaming-mode", post(routes_control::post_gaming_mode))
        .route("/stop-all", post(routes_control::post_stop_all))
        .route("/start/:id", post(routes_control::post_start))
        .route("/stop/:id", post(routes_control::post_stop))
        .route("/v1/*path", any(routes_proxy::proxy))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
