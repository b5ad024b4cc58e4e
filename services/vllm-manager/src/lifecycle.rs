use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use modelops::ModelCard;
use tracing::{error, info, warn};

use crate::config::{AppConfig, Mode};
use crate::container::{
    ContainerRuntime, ContainerSettings, ContainerSpec, ContainerState, RuntimeError, RuntimeInfo,
};
use crate::error::{ManagerError, Result};
use crate::gaming::GamingSwitch;
use crate::readiness::ReadinessProber;
use crate::runtime::{ModelSlot, ModelStatus};

/// How long `docker stop` waits before killing the backend.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub mode: Mode,
    pub default_model: Option<String>,
    pub startup_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub detected_vram_gb: f64,
    pub container: ContainerSettings,
}

impl ManagerSettings {
    pub fn from_config(cfg: &AppConfig, detected_vram_gb: f64) -> Self {
        Self {
            mode: cfg.mode,
            default_model: cfg.default_model.clone(),
            startup_timeout: cfg.startup_timeout,
            idle_timeout: cfg.idle_timeout(),
            detected_vram_gb,
            container: ContainerSettings {
                image: cfg.vllm_image.clone(),
                network: cfg.docker_network.clone(),
                hf_cache_path: cfg.hf_cache_path.clone(),
                hf_token: cfg.hf_token.clone(),
                launch: cfg.launch_settings(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Owns the admitted models and is the only component that changes
/// container state.
pub struct ModelManager {
    pub(crate) settings: ManagerSettings,
    slots: BTreeMap<String, ModelSlot>,
    runtime: Arc<dyn ContainerRuntime>,
    prober: ReadinessProber,
    pub(crate) gaming: GamingSwitch,
}

impl ModelManager {
    /// `catalog` must already be admission-filtered. The slot map is fixed
    /// from here on.
    pub fn new(
        catalog: Vec<ModelCard>,
        runtime: Arc<dyn ContainerRuntime>,
        prober: ReadinessProber,
        settings: ManagerSettings,
        gaming_at_boot: bool,
    ) -> Self {
        let slots = catalog
            .into_iter()
            .map(|card| (card.id.clone(), ModelSlot::new(card)))
            .collect();

        Self {
            settings,
            slots,
            runtime,
            prober,
            gaming: GamingSwitch::new(gaming_at_boot),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn slot(&self, id: &str) -> Option<&ModelSlot> {
        self.slots.get(id)
    }

    pub fn slots(&self) -> impl Iterator<Item = &ModelSlot> {
        self.slots.values()
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn runtime_info(&self) -> RuntimeInfo {
        self.runtime.info()
    }

    fn require(&self, id: &str) -> Result<&ModelSlot> {
        self.slots.get(id).ok_or_else(|| ManagerError::UnknownModel {
            model: id.to_string(),
            available: self.model_ids(),
        })
    }

    pub fn endpoint(&self, id: &str) -> Result<String> {
        let slot = self.require(id)?;
        Ok(self.runtime.endpoint(&slot.container_name))
    }

    pub async fn touch(&self, id: &str) {
        if let Some(slot) = self.slots.get(id) {
            slot.touch().await;
        }
    }

    /// Make sure `id` is Running. Idempotent for running models.
    pub async fn start(&self, id: &str) -> Result<StartOutcome> {
        let slot = self.require(id)?;

        // Read once, outside the model lock. A start that wins the race
        // against gaming-mode activation is allowed to finish.
        let gaming = self.gaming.is_active();

        let _guard = slot.lock_lifecycle().await;

        if slot.status().await == ModelStatus::Running {
            match self.runtime.inspect(&slot.container_name).await {
                Ok(Some(ContainerState::Running)) => {
                    slot.touch().await;
                    return Ok(StartOutcome::AlreadyRunning);
                }
                Ok(state) => {
                    warn!(model = id, ?state, "lifecycle: container of a running model went away");
                    slot.mark_stopped().await;
                }
                Err(e) => {
                    warn!(model = id, "lifecycle: inspect failed ({e}); trusting recorded state");
                    slot.touch().await;
                    return Ok(StartOutcome::AlreadyRunning);
                }
            }
        }

        if gaming {
            return Err(ManagerError::GamingModeBlocked { model: id.to_string() });
        }

        slot.set_status(ModelStatus::Starting).await;
        info!(model = id, container = %slot.container_name, "lifecycle: starting");

        match self.bring_up(slot).await {
            Ok(()) => {
                slot.mark_running().await;
                info!(model = id, "lifecycle: running");
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                slot.mark_stopped().await;
                error!(model = id, "lifecycle: start failed: {e}");
                Err(e)
            }
        }
    }

    // Caller holds the slot's lifecycle lock.
    async fn bring_up(&self, slot: &ModelSlot) -> Result<()> {
        let id = slot.id();
        let name = &slot.container_name;
        let runtime_err = |e: RuntimeError| ManagerError::Runtime {
            model: id.to_string(),
            message: e.to_string(),
        };

        let adopt = match self.runtime.inspect(name).await.map_err(runtime_err)? {
            Some(ContainerState::Running) => {
                info!(model = id, "lifecycle: adopting already running container");
                true
            }
            Some(state) => {
                // never resume a stale container in place
                info!(model = id, ?state, "lifecycle: removing stale container");
                self.runtime.remove(name).await.map_err(runtime_err)?;
                false
            }
            None => false,
        };

        if !adopt {
            let spec = ContainerSpec::for_model(
                &slot.card,
                &self.settings.container,
                self.settings.detected_vram_gb,
            );
            let created = async {
                self.runtime.create(&spec).await?;
                self.runtime.start(name).await
            }
            .await;
            if let Err(e) = created {
                if let Err(cleanup) = self.runtime.remove(name).await {
                    warn!(model = id, "lifecycle: cleanup after failed start: {cleanup}");
                }
                return Err(runtime_err(e));
            }
        }

        let endpoint = self.runtime.endpoint(name);
        let timeout = self.settings.startup_timeout;
        if self.prober.wait_until_ready(id, &endpoint, timeout).await {
            return Ok(());
        }

        warn!(
            model = id,
            timeout_secs = timeout.as_secs(),
            "lifecycle: readiness timeout, tearing down"
        );
        self.teardown(slot).await;
        Err(ManagerError::ReadinessTimeout {
            model: id.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn teardown(&self, slot: &ModelSlot) {
        let name = &slot.container_name;
        if let Err(e) = self.runtime.stop(name, STOP_GRACE).await {
            warn!(model = slot.id(), "lifecycle: stop during teardown failed: {e}");
        }
        if let Err(e) = self.runtime.remove(name).await {
            warn!(model = slot.id(), "lifecycle: remove during teardown failed: {e}");
        }
    }

    /// `Ok(false)` when the model was not running.
    pub async fn stop(&self, id: &str) -> Result<bool> {
        let slot = self.require(id)?;
        let _guard = slot.lock_lifecycle().await;
        self.stop_locked(slot).await
    }

    /// Stop only if the model is still idle once its lock is held, so a
    /// request that arrived after the reaper's scan keeps its backend.
    pub(crate) async fn stop_if_idle(&self, id: &str, idle_timeout: Duration) -> Result<bool> {
        let slot = self.require(id)?;
        let _guard = slot.lock_lifecycle().await;

        let snap = slot.snapshot().await;
        let idle = snap.idle_secs(crate::runtime::now());
        if snap.status != ModelStatus::Running || idle <= idle_timeout.as_secs() {
            return Ok(false);
        }
        self.stop_locked(slot).await
    }

    async fn stop_locked(&self, slot: &ModelSlot) -> Result<bool> {
        if slot.status().await != ModelStatus::Running {
            return Ok(false);
        }

        self.runtime
            .stop(&slot.container_name, STOP_GRACE)
            .await
            .map_err(|e| ManagerError::Runtime {
                model: slot.id().to_string(),
                message: e.to_string(),
            })?;

        slot.mark_stopped().await;
        info!(model = slot.id(), "lifecycle: stopped");
        Ok(true)
    }

    /// Stops every model one after another; returns those that were running.
    pub async fn stop_all(&self) -> Vec<String> {
        let mut stopped = Vec::new();
        for id in self.slots.keys() {
            match self.stop(id).await {
                Ok(true) => stopped.push(id.clone()),
                Ok(false) => {}
                Err(e) => error!(model = %id, "lifecycle: stop_all: {e}"),
            }
        }
        stopped
    }

    /// Adopt backends that survived a manager restart.
    pub async fn reconcile(&self) -> Vec<String> {
        let mut adopted = Vec::new();
        for slot in self.slots.values() {
            let _guard = slot.lock_lifecycle().await;
            match self.runtime.inspect(&slot.container_name).await {
                Ok(Some(ContainerState::Running)) => {
                    slot.mark_running().await;
                    adopted.push(slot.id().to_string());
                }
                Ok(_) => {}
                Err(e) => warn!(model = slot.id(), "reconcile: inspect failed: {e}"),
            }
        }
        if !adopted.is_empty() {
            info!(?adopted, "reconcile: adopted running backends");
        }
        adopted
    }

    /// In always-on mode, bring the default model up. `None` when there is
    /// nothing to do.
    pub async fn warm_default(&self) -> Option<(String, Result<StartOutcome>)> {
        if self.settings.mode != Mode::AlwaysOn {
            return None;
        }
        let id = self.settings.default_model.clone()?;
        let res = self.start(&id).await;
        Some((id, res))
    }
}
