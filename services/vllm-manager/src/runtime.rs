use modelops::ModelCard;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Stopped,
    Starting,
    Running,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelRuntime {
    pub status: ModelStatus,
    /// Unix seconds, 0 while stopped.
    pub last_used: u64,
}

impl ModelRuntime {
    pub fn idle_secs(&self, now: u64) -> u64 {
        if self.last_used == 0 {
            0
        } else {
            now.saturating_sub(self.last_used)
        }
    }
}

/// Runtime record of one admitted model.
///
/// `lifecycle` serializes start/stop/recreate and is held for the whole
/// operation (including readiness polling). `state` is only held for reads
/// and single-field writes, so observers never wait on a lifecycle change.
pub struct ModelSlot {
    pub card: ModelCard,
    pub container_name: String,
    lifecycle: Mutex<()>,
    state: RwLock<ModelRuntime>,
}

impl ModelSlot {
    pub fn new(card: ModelCard) -> Self {
        Self {
            container_name: card.container_name(),
            card,
            lifecycle: Mutex::new(()),
            state: RwLock::new(ModelRuntime {
                status: ModelStatus::Stopped,
                last_used: 0,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.card.id
    }

    pub(crate) async fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    pub async fn snapshot(&self) -> ModelRuntime {
        *self.state.read().await
    }

    pub async fn status(&self) -> ModelStatus {
        self.state.read().await.status
    }

    pub(crate) async fn set_status(&self, status: ModelStatus) {
        self.state.write().await.status = status;
    }

    pub(crate) async fn mark_running(&self) {
        let mut st = self.state.write().await;
        st.status = ModelStatus::Running;
        st.last_used = now();
    }

    pub(crate) async fn mark_stopped(&self) {
        let mut st = self.state.write().await;
        st.status = ModelStatus::Stopped;
        st.last_used = 0;
    }

    pub async fn touch(&self) {
        self.state.write().await.last_used = now();
    }

    /// Backdates the idle clock. Integration tests only; production code
    /// goes through the lifecycle manager.
    #[doc(hidden)]
    pub async fn set_last_used(&self, unix_secs: u64) {
        self.state.write().await.last_used = unix_secs;
    }
}

pub fn now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
