// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::patch;
use axum::{Json, Router};
use tokio::net::TcpListener;

use super::*;
use crate::test_support::RecordingSink;

fn quick_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy { max_retries, initial_backoff: Duration::from_millis(5), jitter: 0.0 }
}

fn spawn_sync(
    sink: Arc<RecordingSink>,
    policy: RetryPolicy,
) -> (PersistenceSync, JoinHandle<()>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let (sync, handle) =
        PersistenceSync::spawn(vec![sink as Arc<dyn PersistenceSink>], policy, shutdown.clone());
    (sync, handle, shutdown)
}

#[test]
fn file_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("token.json");

    assert!(load(&path)?.is_none());

    let persisted = PersistedToken { refresh_token: "r1".to_owned(), updated_at: Utc::now() };
    save(&path, &persisted)?;

    let loaded = load(&path)?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(loaded.refresh_token, "r1");

    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap_or(dir.path()))?
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind");
    Ok(())
}

#[test]
fn empty_persisted_token_loads_as_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("token.json");
    std::fs::write(&path, r#"{"refresh_token":"","updated_at":"2026-01-01T00:00:00Z"}"#)?;
    assert!(load(&path)?.is_none());
    Ok(())
}

#[test]
fn corrupt_file_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("token.json");
    std::fs::write(&path, "not json")?;
    assert!(load(&path).is_err());
    Ok(())
}

#[tokio::test]
async fn file_sink_overwrites_previous_value() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("token.json");
    let sink = FileSink::new(path.clone());

    sink.write("r1").await?;
    sink.write("r2").await?;
    sink.write("r2").await?;

    let loaded = load(&path)?.ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(loaded.refresh_token, "r2");
    Ok(())
}

#[derive(Clone, Default)]
struct ConfigStoreState {
    bodies: Arc<parking_lot::Mutex<Vec<serde_json::Value>>>,
    auth: Arc<parking_lot::Mutex<Vec<String>>>,
}

async fn mock_config_store(status: StatusCode) -> (String, ConfigStoreState) {
    let state = ConfigStoreState::default();
    let app = Router::new()
        .route(
            "/vars",
            patch(
                move |State(state): State<ConfigStoreState>,
                      headers: HeaderMap,
                      Json(body): Json<serde_json::Value>| async move {
                    state.bodies.lock().push(body);
                    if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        state.auth.lock().push(v.to_owned());
                    }
                    status
                },
            ),
        )
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (format!("http://{addr}/vars"), state)
}

#[tokio::test]
async fn config_store_sink_patches_named_variable() -> anyhow::Result<()> {
    let (url, state) = mock_config_store(StatusCode::OK).await;
    let sink = ConfigStoreSink::new(
        url,
        Some("api-token".to_owned()),
        "REFRESH_TOKEN".to_owned(),
        Duration::from_secs(2),
    )?;

    sink.write("r1").await?;

    let bodies = state.bodies.lock().clone();
    assert_eq!(bodies, vec![serde_json::json!({ "REFRESH_TOKEN": "r1" })]);
    assert_eq!(state.auth.lock().clone(), vec!["Bearer api-token".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn config_store_sink_reports_http_failures() {
    let (url, _state) = mock_config_store(StatusCode::BAD_GATEWAY).await;
    let sink = ConfigStoreSink::new(url, None, "REFRESH_TOKEN".to_owned(), Duration::from_secs(2))
        .expect("sink");
    let err = sink.write("r1").await.expect_err("should fail");
    assert!(err.to_string().contains("502"), "{err}");
}

#[tokio::test]
async fn schedule_writes_in_background() {
    let sink = Arc::new(RecordingSink::default());
    let (sync, _handle, shutdown) = spawn_sync(Arc::clone(&sink), quick_policy(3));

    sync.schedule("r1".to_owned());

    assert_eq!(sink.wait_for(1).await, vec!["r1".to_owned()]);
    shutdown.cancel();
}

#[tokio::test]
async fn failed_writes_are_retried() {
    let sink = Arc::new(RecordingSink::failing(2));
    let (sync, _handle, shutdown) = spawn_sync(Arc::clone(&sink), quick_policy(3));

    sync.schedule("r1".to_owned());

    assert_eq!(sink.wait_for(1).await, vec!["r1".to_owned()]);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    shutdown.cancel();
}

#[tokio::test]
async fn gives_up_after_retry_budget() {
    let sink = Arc::new(RecordingSink::failing(10));
    let (sync, _handle, shutdown) = spawn_sync(Arc::clone(&sink), quick_policy(3));

    sync.schedule("r1".to_owned());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(sink.written().is_empty());
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 4);
    shutdown.cancel();
}

#[tokio::test]
async fn same_value_is_written_once() {
    let sink = Arc::new(RecordingSink::default());
    let (sync, _handle, shutdown) = spawn_sync(Arc::clone(&sink), quick_policy(0));

    sync.schedule("r1".to_owned());
    sink.wait_for(1).await;
    sync.schedule("r1".to_owned());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sink.written(), vec!["r1".to_owned()]);
    shutdown.cancel();
}

#[tokio::test]
async fn newest_value_wins() {
    let sink = Arc::new(RecordingSink::default());
    let (sync, _handle, shutdown) = spawn_sync(Arc::clone(&sink), quick_policy(0));

    // No await between schedules: the worker only ever sees the last one.
    sync.schedule("r1".to_owned());
    sync.schedule("r2".to_owned());
    sync.schedule("r3".to_owned());

    let written = sink.wait_for(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(written.last().map(String::as_str), Some("r3"));
    assert!(!sink.written().contains(&"r2".to_owned()));
    shutdown.cancel();
}

#[tokio::test]
async fn shutdown_flushes_pending_value() {
    let sink = Arc::new(RecordingSink::default());
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let (sync, handle) = PersistenceSync::spawn(
        vec![Arc::clone(&sink) as Arc<dyn PersistenceSink>],
        quick_policy(3),
        shutdown,
    );
    sync.schedule("r1".to_owned());

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker exits")
        .expect("worker join");
    assert_eq!(sink.written(), vec!["r1".to_owned()]);
}

#[tokio::test]
async fn worker_exits_when_handles_dropped() {
    let sink = Arc::new(RecordingSink::default());
    let (sync, handle, _shutdown) = spawn_sync(sink, quick_policy(0));
    drop(sync);

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker exits")
        .expect("worker join");
}
