// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mock upstream, bridge and persistence fixtures shared by unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::persist::{PersistenceSink, PersistenceSync};
use crate::refresh::RefreshCoordinator;
use crate::retry::RetryPolicy;
use crate::store::{TokenStore, DEFAULT_PROACTIVE_BUFFER};
use crate::upstream::UpstreamClient;

/// Upstream timeout used by tests; [`Reply::Hang`] outlasts it.
pub const TEST_UPSTREAM_TIMEOUT: Duration = Duration::from_millis(200);

/// One scripted reply from the mock token endpoint.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    /// Respond only after the client has timed out.
    Hang,
    /// Respond after `delay`.
    Slow(Duration, u16, String),
}

impl Reply {
    pub fn ok(body: serde_json::Value) -> Self {
        Self::Status(200, body.to_string())
    }

    pub fn oauth_error(status: u16, code: &str) -> Self {
        Self::Status(status, serde_json::json!({ "error": code }).to_string())
    }
}

/// A running mock token endpoint.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicU32>,
    /// Raw form bodies, in arrival order.
    pub bodies: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MockUpstream {
    pub fn token_url(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// `refresh_token` form values sent so far.
    pub fn refresh_tokens_sent(&self) -> Vec<String> {
        self.bodies
            .lock()
            .iter()
            .filter_map(|body| {
                body.split('&').find_map(|pair| pair.strip_prefix("refresh_token="))
            })
            .map(str::to_owned)
            .collect()
    }
}

/// Serve `replies` in order from `POST /token`, repeating the last one.
pub async fn mock_token_server(replies: Vec<Reply>) -> MockUpstream {
    let calls = Arc::new(AtomicU32::new(0));
    let bodies = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let replies = Arc::new(replies);

    let app = {
        let calls = Arc::clone(&calls);
        let bodies = Arc::clone(&bodies);
        Router::new().route(
            "/token",
            post(move |body: String| {
                let calls = Arc::clone(&calls);
                let bodies = Arc::clone(&bodies);
                let replies = Arc::clone(&replies);
                async move {
                    bodies.lock().push(body);
                    let idx = calls.fetch_add(1, Ordering::SeqCst) as usize;
                    let reply = replies
                        .get(idx)
                        .or(replies.last())
                        .cloned()
                        .unwrap_or(Reply::Status(500, "{}".to_owned()));
                    let (status, body) = match reply {
                        Reply::Status(status, body) => (status, body),
                        Reply::Hang => {
                            tokio::time::sleep(TEST_UPSTREAM_TIMEOUT * 10).await;
                            (504, "{}".to_owned())
                        }
                        Reply::Slow(delay, status, body) => {
                            tokio::time::sleep(delay).await;
                            (status, body)
                        }
                    };
                    (
                        axum::http::StatusCode::from_u16(status)
                            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                        body,
                    )
                }
            }),
        )
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    MockUpstream { addr, calls, bodies }
}

/// Successful token response body.
pub fn token_body(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
    })
}

/// Refresh schedule with millisecond backoff.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy { max_retries: 3, initial_backoff: Duration::from_millis(10), jitter: 0.2 }
}

/// Store pointed at `token_url`, seeded with `seed`.
pub fn test_store(
    token_url: String,
    seed: Option<&str>,
    persistence: Option<PersistenceSync>,
) -> Arc<TokenStore> {
    let upstream =
        UpstreamClient::new(token_url, "test-client".to_owned(), None, TEST_UPSTREAM_TIMEOUT)
            .expect("upstream client");
    let coordinator = RefreshCoordinator::new(upstream, fast_policy(), persistence);
    TokenStore::new(seed.map(str::to_owned), DEFAULT_PROACTIVE_BUFFER, coordinator)
}

/// Store whose upstream must never be contacted.
pub fn offline_store(seed: Option<&str>) -> Arc<TokenStore> {
    test_store("http://127.0.0.1:9/token".to_owned(), seed, None)
}

/// In-memory sink that records every successful write and can be told to
/// fail a number of times first.
#[derive(Default)]
pub struct RecordingSink {
    pub writes: parking_lot::Mutex<Vec<String>>,
    pub attempts: AtomicU32,
    pub fail_first: AtomicU32,
}

impl RecordingSink {
    pub fn failing(times: u32) -> Self {
        Self { fail_first: AtomicU32::new(times), ..Self::default() }
    }

    pub fn written(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// Poll until at least `count` writes landed, or give up after a second.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        for _ in 0..100 {
            if self.writes.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.written()
    }
}

#[async_trait::async_trait]
impl PersistenceSink for RecordingSink {
    fn describe(&self) -> String {
        "recording".to_owned()
    }

    async fn write(&self, refresh_token: &str) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("simulated outage");
        }
        self.writes.lock().push(refresh_token.to_owned());
        Ok(())
    }
}

pub const BRIDGE_SECRET: &str = "shared-secret";

/// Canned bridge: `/health` and `/token/refresh` reply with the given
/// status and body. Token routes require the shared secret.
pub struct MockBridge {
    pub url: String,
    pub refresh_calls: Arc<AtomicU32>,
}

pub async fn mock_bridge(
    health: (u16, serde_json::Value),
    refresh: (u16, serde_json::Value),
) -> MockBridge {
    let refresh_calls = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&refresh_calls);

    let reply = |(status, body): (u16, serde_json::Value)| {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, body.to_string())
    };
    let health = reply(health);
    let refresh = reply(refresh);

    let app = Router::new()
        .route(
            "/health",
            get(move || {
                let health = health.clone();
                async move { health }
            }),
        )
        .route(
            "/token/refresh",
            post(move |headers: HeaderMap| {
                let calls = Arc::clone(&calls);
                let refresh = refresh.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|v| v == format!("Bearer {BRIDGE_SECRET}"));
                    if !authorized {
                        return (
                            StatusCode::UNAUTHORIZED,
                            serde_json::json!({
                                "error": { "code": "UNAUTHORIZED", "message": "unauthorized" }
                            })
                            .to_string(),
                        );
                    }
                    refresh
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    MockBridge { url: format!("http://{addr}/"), refresh_calls }
}

pub fn bridge_healthy() -> (u16, serde_json::Value) {
    (
        200,
        serde_json::json!({
            "status": "ok",
            "credentials_present": true,
            "access_token_expired": false,
            "rotation_count": 3,
        }),
    )
}

pub fn bridge_token(access: &str) -> (u16, serde_json::Value) {
    (
        200,
        serde_json::json!({
            "access_token": access,
            "expires_in": 3000,
            "rotation_count": 3,
            "cached": true,
        }),
    )
}
