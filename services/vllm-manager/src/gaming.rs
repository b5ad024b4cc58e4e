use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::lifecycle::ModelManager;

/// "The GPU belongs to someone else right now."
///
/// Readers only load the flag. `toggle` serializes the on/off sequences and
/// may be held across `stop_all`, so nothing on a request path takes it.
pub struct GamingSwitch {
    active: AtomicBool,
    toggle: Mutex<()>,
}

impl GamingSwitch {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
            toggle: Mutex::new(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GamingToggle {
    pub gaming_mode: bool,
    /// Models preempted by turning gaming mode on.
    pub stopped: Vec<String>,
    /// Default model brought back after turning it off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_error: Option<String>,
}

impl ModelManager {
    pub fn gaming_mode(&self) -> bool {
        self.gaming.is_active()
    }

    /// On: stop everything and report what was stopped.
    /// Off: in always-on mode, restart the default model before returning.
    pub async fn set_gaming_mode(&self, enable: bool) -> GamingToggle {
        let _toggle = self.gaming.toggle.lock().await;

        if enable {
            self.gaming.set(true);
            let stopped = self.stop_all().await;

            info!(?stopped, "gaming mode: on");
            return GamingToggle {
                gaming_mode: true,
                stopped,
                started: None,
                start_error: None,
            };
        }

        self.gaming.set(false);
        info!("gaming mode: off");

        let (started, start_error) = match self.warm_default().await {
            Some((id, Ok(_))) => (Some(id), None),
            Some((id, Err(e))) => {
                warn!(model = %id, "gaming mode: default model did not come back: {e}");
                (None, Some(e.to_string()))
            }
            None => (None, None),
        };

        GamingToggle {
            gaming_mode: false,
            stopped: Vec::new(),
            started,
            start_error,
        }
    }
}
