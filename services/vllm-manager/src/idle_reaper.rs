use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Mode;
use crate::lifecycle::ModelManager;
use crate::runtime::{now, ModelStatus};

pub const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// Single background sweep for all models. Exits when `cancel` fires.
pub async fn run_idle_reaper(
    manager: Arc<ModelManager>,
    interval: Duration,
    cancel: CancellationToken,
) {
    match manager.settings().idle_timeout {
        Some(t) if manager.settings().mode == Mode::OnDemand => {
            info!(idle_timeout_secs = t.as_secs(), "idle_reaper: started")
        }
        _ => info!("idle_reaper: started (inactive: always-on mode or IDLE_TIMEOUT <= 0)"),
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {
                reap_idle(&manager).await;
            }
        }
    }
    info!("idle_reaper: stopped");
}

/// One sweep. Returns the models that were stopped.
pub async fn reap_idle(manager: &ModelManager) -> Vec<String> {
    let settings = manager.settings();
    if settings.mode != Mode::OnDemand {
        return Vec::new();
    }
    let Some(timeout) = settings.idle_timeout else {
        return Vec::new();
    };

    let ts = now();
    let mut reaped = Vec::new();
    for slot in manager.slots() {
        let snap = slot.snapshot().await;
        if snap.status != ModelStatus::Running || snap.idle_secs(ts) <= timeout.as_secs() {
            continue;
        }

        info!(
            model = slot.id(),
            idle_secs = snap.idle_secs(ts),
            "idle_reaper: stopping idle model"
        );
        match manager.stop_if_idle(slot.id(), timeout).await {
            Ok(true) => reaped.push(slot.id().to_string()),
            Ok(false) => {}
            Err(e) => error!(model = slot.id(), "idle_reaper: {e}"),
        }
    }
    reaped
}
