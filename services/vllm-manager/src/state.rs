use std::sync::Arc;

use crate::config::AppConfig;
use crate::lifecycle::ModelManager;

pub type SharedState = Arc<AppState>;

/// Built once in `main`, lives until exit.
pub struct AppState {
    pub config: AppConfig,
    pub vram_gb: f64,
    pub manager: Arc<ModelManager>,
    /// Client for proxied calls. No overall timeout: a stream lives as
    /// long as the backend keeps it open.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        vram_gb: f64,
        manager: Arc<ModelManager>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            vram_gb,
            manager,
            http,
        }
    }
}
