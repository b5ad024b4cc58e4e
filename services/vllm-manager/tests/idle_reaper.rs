mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{card, config, manager, spawn_backend, FakeRuntime};
use tokio_util::sync::CancellationToken;
use vllm_manager::idle_reaper::{reap_idle, run_idle_reaper};
use vllm_manager::lifecycle::ModelManager;
use vllm_manager::runtime::{now, ModelStatus};

async fn running_small(env: &[(&str, &str)]) -> (Arc<ModelManager>, Arc<FakeRuntime>) {
    let runtime = Arc::new(FakeRuntime::new(spawn_backend().await));
    let cfg = config(env);
    let m = manager(vec![card("small", 4.0), card("tiny", 2.0)], 8.0, runtime.clone(), &cfg);
    m.start("small").await.unwrap();
    (m, runtime)
}

#[tokio::test]
async fn test_reaps_model_idle_past_timeout() {
    let (m, rt) = running_small(&[("VLLM_MODE", "on-demand"), ("IDLE_TIMEOUT", "600")]).await;
    let slot = m.slot("small").unwrap();
    slot.set_last_used(now() - 601).await;

    assert_eq!(reap_idle(&m).await, vec!["small".to_string()]);

    let snap = slot.snapshot().await;
    assert_eq!(snap.status, ModelStatus::Stopped);
    assert_eq!(snap.last_used, 0);
    assert_eq!(rt.count("stop"), 1);
}

#[tokio::test]
async fn test_keeps_recently_used_model() {
    let (m, rt) = running_small(&[("IDLE_TIMEOUT", "600")]).await;
    m.slot("small").unwrap().set_last_used(now() - 300).await;

    assert!(reap_idle(&m).await.is_empty());
    assert_eq!(m.slot("small").unwrap().status().await, ModelStatus::Running);
    assert_eq!(rt.count("stop"), 0);
}

#[tokio::test]
async fn test_non_positive_timeout_disables_reaping() {
    for timeout in ["0", "-5"] {
        let (m, _rt) = running_small(&[("IDLE_TIMEOUT", timeout)]).await;
        m.slot("small").unwrap().set_last_used(now() - 100_000).await;

        assert!(reap_idle(&m).await.is_empty(), "IDLE_TIMEOUT={timeout}");
        assert_eq!(m.slot("small").unwrap().status().await, ModelStatus::Running);
    }
}

#[tokio::test]
async fn test_always_on_never_reaps() {
    let (m, _rt) = running_small(&[
        ("VLLM_MODE", "always-on"),
        ("DEFAULT_MODEL", "small"),
        ("IDLE_TIMEOUT", "60"),
    ])
    .await;
    m.slot("small").unwrap().set_last_used(now() - 10_000).await;

    assert!(reap_idle(&m).await.is_empty());
    assert_eq!(m.slot("small").unwrap().status().await, ModelStatus::Running);
}

#[tokio::test]
async fn test_stopped_models_are_skipped() {
    let (m, rt) = running_small(&[("IDLE_TIMEOUT", "60")]).await;
    m.stop("small").await.unwrap();
    rt.clear_calls();

    assert!(reap_idle(&m).await.is_empty());
    assert!(rt.calls().is_empty());
}

#[tokio::test]
async fn test_background_loop_reaps_and_exits_on_cancel() {
    let (m, _rt) = running_small(&[("IDLE_TIMEOUT", "1")]).await;
    m.slot("small").unwrap().set_last_used(now() - 10).await;

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_idle_reaper(
        m.clone(),
        Duration::from_millis(20),
        cancel.clone(),
    ));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while m.slot("small").unwrap().status().await != ModelStatus::Stopped {
        assert!(tokio::time::Instant::now() < deadline, "reaper never stopped the model");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("reaper did not exit after cancel")
        .unwrap();
}
