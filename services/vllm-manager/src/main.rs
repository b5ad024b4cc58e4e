use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vllm_manager::config::AppConfig;
use vllm_manager::container_docker::DockerEngine;
use vllm_manager::lifecycle::{ManagerSettings, ModelManager};
use vllm_manager::readiness::{ReadinessProber, DEFAULT_POLL_INTERVAL};
use vllm_manager::state::AppState;
use vllm_manager::{build_router, gpu, idle_reaper};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = AppConfig::from_env()?;
    info!(
        mode = %cfg.mode,
        default_model = ?cfg.default_model,
        idle_timeout_secs = cfg.idle_timeout_secs,
        startup_timeout_secs = cfg.startup_timeout.as_secs(),
        "vllm-manager: config loaded"
    );

    // --- GPU + catalog ---
    let vram_gb = match cfg.vram_override_gb {
        Some(v) => {
            info!(vram_gb = v, "gpu: using VRAM_GB override");
            v
        }
        None => gpu::detect_vram_gb().await,
    };
    let catalog = modelops::load_admitted(&cfg.models_config, vram_gb);
    if let Some(default) = &cfg.default_model {
        if !catalog.iter().any(|c| &c.id == default) {
            warn!(model = %default, "DEFAULT_MODEL is not in the admitted catalog");
        }
    }

    // --- runtime + manager ---
    let runtime = Arc::new(
        DockerEngine::connect(cfg.docker_network.clone(), cfg.vllm_port)
            .context("Failed to connect to the Docker daemon")?,
    );
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let prober = ReadinessProber::new(http.clone(), DEFAULT_POLL_INTERVAL);

    let settings = ManagerSettings::from_config(&cfg, vram_gb);
    let manager = Arc::new(ModelManager::new(
        catalog,
        runtime,
        prober,
        settings,
        cfg.gaming_mode_at_boot,
    ));

    // RECOVERY: pick up backends left running by a previous process
    manager.reconcile().await;

    // Warm the default model in the background; /health reports degraded meanwhile.
    if !cfg.gaming_mode_at_boot {
        let m = manager.clone();
        tokio::spawn(async move {
            if let Some((id, Err(e))) = m.warm_default().await {
                error!(model = %id, "default model failed to start: {e}");
            }
        });
    }

    let cancel = CancellationToken::new();
    let reaper = tokio::spawn(idle_reaper::run_idle_reaper(
        manager.clone(),
        idle_reaper::REAPER_INTERVAL,
        cancel.clone(),
    ));

    let app_state = Arc::new(AppState::new(cfg.clone(), vram_gb, manager, http));
    let app = build_router(app_state);

    let addr = &cfg.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("vllm-manager listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // containers stay up; the next process adopts them via reconcile()
    cancel.cancel();
    let _ = reaper.await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}
