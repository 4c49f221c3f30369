// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort propagation of rotated refresh tokens to durable storage.
//!
//! [`PersistenceSync::schedule`] never blocks: it replaces the pending value
//! in a watch channel and a background worker writes it to every configured
//! [`PersistenceSink`] with retries. Only the newest value matters, so a value
//! superseded mid-retry is dropped in favor of its replacement. Failures are
//! logged and never reach the caller whose rotation triggered the sync.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::retry::RetryPolicy;
use crate::store::mask_token;
use crate::upstream::http_client;

/// A durable destination for the live refresh token.
#[async_trait::async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Short label for logs.
    fn describe(&self) -> String;

    /// Write `refresh_token`. Must be idempotent.
    async fn write(&self, refresh_token: &str) -> anyhow::Result<()>;
}

/// On-disk format for [`FileSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedToken {
    pub refresh_token: String,
    pub updated_at: DateTime<Utc>,
}

/// Stores the refresh token in a local JSON file.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait::async_trait]
impl PersistenceSink for FileSink {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn write(&self, refresh_token: &str) -> anyhow::Result<()> {
        let persisted =
            PersistedToken { refresh_token: refresh_token.to_owned(), updated_at: Utc::now() };
        save(&self.path, &persisted)
    }
}

/// Load a refresh token previously written by [`FileSink`].
///
/// A missing file is not an error.
pub fn load(path: &Path) -> anyhow::Result<Option<PersistedToken>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let persisted: PersistedToken = serde_json::from_str(&contents)?;
    if persisted.refresh_token.is_empty() {
        return Ok(None);
    }
    Ok(Some(persisted))
}

/// Save atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
pub fn save(path: &Path, persisted: &PersistedToken) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(persisted)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Writes the refresh token to a remote key/value config store.
///
/// Sends `PATCH <url>` with body `{"<var_name>": "<refresh_token>"}`.
pub struct ConfigStoreSink {
    url: String,
    api_token: Option<String>,
    var_name: String,
    client: reqwest::Client,
}

impl ConfigStoreSink {
    pub fn new(
        url: String,
        api_token: Option<String>,
        var_name: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self { url, api_token, var_name, client: http_client(timeout)? })
    }
}

#[async_trait::async_trait]
impl PersistenceSink for ConfigStoreSink {
    fn describe(&self) -> String {
        format!("config-store:{}", self.var_name)
    }

    async fn write(&self, refresh_token: &str) -> anyhow::Result<()> {
        let mut body = serde_json::Map::new();
        body.insert(self.var_name.clone(), serde_json::Value::String(refresh_token.to_owned()));
        let mut req = self.client.patch(&self.url).json(&body);
        if let Some(ref token) = self.api_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("config store returned {}", resp.status());
        }
        Ok(())
    }
}

/// Handle for scheduling background persistence.
#[derive(Clone)]
pub struct PersistenceSync {
    pending: Arc<watch::Sender<Option<String>>>,
}

impl PersistenceSync {
    /// Spawn the sync worker. It exits when `shutdown` fires (after one final
    /// attempt at any unsynced value) or when every handle is dropped.
    pub fn spawn(
        sinks: Vec<Arc<dyn PersistenceSink>>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(run_worker(rx, sinks, policy, shutdown));
        (Self { pending: Arc::new(tx) }, handle)
    }

    /// Queue `refresh_token` for persistence. Never blocks.
    pub fn schedule(&self, refresh_token: String) {
        debug!(refresh_token = %mask_token(&refresh_token), "persistence sync scheduled");
        self.pending.send_replace(Some(refresh_token));
    }
}

async fn run_worker(
    mut rx: watch::Receiver<Option<String>>,
    sinks: Vec<Arc<dyn PersistenceSink>>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
) {
    let mut last_synced: Option<String> = None;

    loop {
        let shutting_down = tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                false
            }
            _ = shutdown.cancelled() => true,
        };

        if shutting_down {
            let pending = rx.borrow_and_update().clone();
            if let Some(value) = pending {
                if last_synced.as_deref() != Some(value.as_str()) {
                    debug!("flushing pending refresh token before shutdown");
                    let once = RetryPolicy { max_retries: 0, ..policy.clone() };
                    sync_all(&sinks, &value, &once, &mut rx).await;
                }
            }
            break;
        }

        let Some(value) = rx.borrow_and_update().clone() else {
            continue;
        };
        if last_synced.as_deref() == Some(value.as_str()) {
            debug!("refresh token already persisted, skipping");
            continue;
        }
        if sync_all(&sinks, &value, &policy, &mut rx).await {
            last_synced = Some(value);
        }
    }
}

/// Write `value` to every sink. Returns whether all sinks succeeded.
async fn sync_all(
    sinks: &[Arc<dyn PersistenceSink>],
    value: &str,
    policy: &RetryPolicy,
    rx: &mut watch::Receiver<Option<String>>,
) -> bool {
    let mut all_ok = true;
    for sink in sinks {
        match write_with_retries(sink.as_ref(), value, policy, rx).await {
            SyncResult::Written => {
                info!(
                    sink = %sink.describe(),
                    refresh_token = %mask_token(value),
                    "refresh token persisted"
                );
            }
            SyncResult::Superseded => {
                debug!(sink = %sink.describe(), "newer refresh token queued, abandoning sync");
                return false;
            }
            SyncResult::Failed(e) => {
                error!(sink = %sink.describe(), err = %e, "persistence sync failed");
                all_ok = false;
            }
        }
    }
    all_ok
}

enum SyncResult {
    Written,
    Superseded,
    Failed(anyhow::Error),
}

async fn write_with_retries(
    sink: &dyn PersistenceSink,
    value: &str,
    policy: &RetryPolicy,
    rx: &mut watch::Receiver<Option<String>>,
) -> SyncResult {
    let mut retry = 0;
    loop {
        match sink.write(value).await {
            Ok(()) => return SyncResult::Written,
            Err(e) if retry >= policy.max_retries => return SyncResult::Failed(e),
            Err(e) => {
                let delay = policy.delay(retry);
                warn!(
                    sink = %sink.describe(),
                    attempt = retry + 1,
                    err = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "persistence write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                if rx.has_changed().unwrap_or(false) {
                    return SyncResult::Superseded;
                }
                retry += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
