#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use modelops::ModelCard;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;

use vllm_manager::config::AppConfig;
use vllm_manager::container::{
    ContainerRuntime, ContainerSpec, ContainerState, RuntimeError, RuntimeInfo,
};
use vllm_manager::lifecycle::{ManagerSettings, ModelManager};
use vllm_manager::readiness::ReadinessProber;
use vllm_manager::state::{AppState, SharedState};

/// In-memory container runtime. Records every call so tests can assert
/// which container operations happened.
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, ContainerState>>,
    calls: Mutex<Vec<String>>,
    endpoint: Mutex<String>,
    pub create_delay: Duration,
}

impl FakeRuntime {
    pub fn new(endpoint: String) -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            endpoint: Mutex::new(endpoint),
            create_delay: Duration::ZERO,
        }
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn set_endpoint(&self, endpoint: String) {
        *self.endpoint.lock().unwrap() = endpoint;
    }

    pub fn put(&self, name: &str, state: ContainerState) {
        self.containers.lock().unwrap().insert(name.to_string(), state);
    }

    pub fn state(&self, name: &str) -> Option<ContainerState> {
        self.containers.lock().unwrap().get(name).copied()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{op} ");
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, op: &str, name: &str) {
        self.calls.lock().unwrap().push(format!("{op} {name}"));
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn inspect(&self, name: &str) -> Result<Option<ContainerState>, RuntimeError> {
        self.record("inspect", name);
        Ok(self.state(name))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        self.record("create", &spec.name);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(&spec.name) {
            return Err(RuntimeError::Command {
                op: "create".into(),
                name: spec.name.clone(),
                message: "Conflict. The container name is already in use".into(),
            });
        }
        containers.insert(spec.name.clone(), ContainerState::Created);
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("start", name);
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(name) {
            Some(state) => {
                *state = ContainerState::Running;
                Ok(())
            }
            None => Err(RuntimeError::Command {
                op: "start".into(),
                name: name.into(),
                message: format!("No such container: {name}"),
            }),
        }
    }

    async fn stop(&self, name: &str, _grace: Duration) -> Result<(), RuntimeError> {
        self.record("stop", name);
        if let Some(state) = self.containers.lock().unwrap().get_mut(name) {
            *state = ContainerState::Exited;
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("remove", name);
        self.containers.lock().unwrap().remove(name);
        Ok(())
    }

    fn endpoint(&self, _name: &str) -> String {
        self.endpoint.lock().unwrap().clone()
    }

    fn info(&self) -> RuntimeInfo {
        RuntimeInfo {
            name: "fake".into(),
            network: "test".into(),
        }
    }
}

pub fn card(id: &str, vram_gb: f64) -> ModelCard {
    ModelCard {
        id: id.into(),
        name: None,
        hf_model: format!("org/{id}"),
        quantization: None,
        default_context: 8192,
        vram_gb,
        model_type: Default::default(),
    }
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub const SSE_BODY: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
pub const PARTIAL_CHUNK: &str = "data: {\"choices\":[{\"text\":\"par\"}]}\n\n";

/// Minimal stand-in for a vLLM OpenAI server.
///
/// - `GET /v1/models` answers 200.
/// - `POST /v1/chat/completions` returns [`SSE_BODY`] for `stream: true`,
///   otherwise echoes the request body inside a JSON envelope.
/// - `POST /v1/completions` sends [`PARTIAL_CHUNK`] and then aborts.
pub async fn spawn_backend() -> String {
    async fn models() -> Json<serde_json::Value> {
        Json(serde_json::json!({"object": "list", "data": [{"id": "backend"}]}))
    }

    async fn chat(body: Bytes) -> Response {
        let req: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
        if req.get("stream").and_then(|s| s.as_bool()).unwrap_or(false) {
            ([(header::CONTENT_TYPE, "text/event-stream")], SSE_BODY).into_response()
        } else {
            Json(serde_json::json!({"object": "chat.completion", "echo": req})).into_response()
        }
    }

    async fn broken() -> Response {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(4);
        tokio::spawn(async move {
            let _ = tx.send(Ok(Bytes::from_static(PARTIAL_CHUNK.as_bytes()))).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx
                .send(Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "gpu fell off the bus",
                )))
                .await;
        });
        Response::new(Body::from_stream(ReceiverStream::new(rx)))
    }

    let app = Router::new()
        .route("/v1/models", get(models))
        .route("/v1/chat/completions", post(chat))
        .route("/v1/completions", post(broken));
    serve(app).await
}

/// Address where nothing listens.
pub async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub struct Harness {
    pub state: SharedState,
    pub manager: Arc<ModelManager>,
    pub runtime: Arc<FakeRuntime>,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl Harness {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub fn config(env: &[(&str, &str)]) -> AppConfig {
    let env: HashMap<String, String> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap()
}

/// Manager wired to `runtime` with a fast readiness poll.
pub fn manager(
    catalog: Vec<ModelCard>,
    vram_gb: f64,
    runtime: Arc<FakeRuntime>,
    cfg: &AppConfig,
) -> Arc<ModelManager> {
    let admitted = modelops::admit(catalog, vram_gb);
    let prober = ReadinessProber::new(reqwest::Client::new(), Duration::from_millis(20));
    let settings = ManagerSettings::from_config(cfg, vram_gb);
    Arc::new(ModelManager::new(admitted, runtime, prober, settings, cfg.gaming_mode_at_boot))
}

/// Full HTTP stack on an ephemeral port, backed by the fake runtime and a
/// live mock backend.
pub async fn harness(catalog: Vec<ModelCard>, vram_gb: f64, env: &[(&str, &str)]) -> Harness {
    let backend = spawn_backend().await;
    let runtime = Arc::new(FakeRuntime::new(backend));
    let cfg = config(env);
    let manager = manager(catalog, vram_gb, runtime.clone(), &cfg);

    let state: SharedState = Arc::new(AppState::new(
        cfg,
        vram_gb,
        manager.clone(),
        reqwest::Client::new(),
    ));
    let base_url = serve(vllm_manager::build_router(state.clone())).await;

    Harness {
        state,
        manager,
        runtime,
        base_url,
        client: reqwest::Client::new(),
    }
}
