// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock drift detection.
//!
//! Compares the local wall clock against a trusted reference (the `Date`
//! header of a well-known HTTP endpoint) and flags drift beyond
//! [`DRIFT_THRESHOLD_MS`]. Drift is a warning signal only: token expiry is
//! tracked with monotonic [`std::time::Instant`]s and never consults this.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::upstream::http_client;

/// Absolute drift above which a sample is flagged.
pub const DRIFT_THRESHOLD_MS: i64 = 2000;

/// Source of local wall-clock time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of trusted reference time.
#[async_trait::async_trait]
pub trait TimeReference: Send + Sync {
    async fn reference_now(&self) -> anyhow::Result<DateTime<Utc>>;
}

/// Reads reference time from the `Date` header of an HTTP endpoint.
pub struct HttpDateReference {
    url: String,
    client: reqwest::Client,
}

impl HttpDateReference {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self { url, client: http_client(timeout)? })
    }
}

#[async_trait::async_trait]
impl TimeReference for HttpDateReference {
    async fn reference_now(&self) -> anyhow::Result<DateTime<Utc>> {
        let resp = self.client.head(&self.url).send().await?;
        let header = resp
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow::anyhow!("no Date header from {}", self.url))?;
        parse_http_date(header)
    }
}

/// Parse an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn parse_http_date(value: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc2822(value.trim())
        .map_err(|e| anyhow::anyhow!("invalid Date header {value:?}: {e}"))?;
    Ok(parsed.with_timezone(&Utc))
}

/// One drift measurement. Positive drift means the local clock is ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDriftSample {
    pub observed_drift_ms: i64,
    pub sampled_at: DateTime<Utc>,
}

impl ClockDriftSample {
    pub fn has_drift(&self) -> bool {
        self.observed_drift_ms.abs() > DRIFT_THRESHOLD_MS
    }
}

/// Samples drift on demand and remembers the latest reading.
pub struct ClockDriftMonitor {
    local: Arc<dyn WallClock>,
    reference: Arc<dyn TimeReference>,
    latest: RwLock<Option<ClockDriftSample>>,
}

impl ClockDriftMonitor {
    pub fn new(local: Arc<dyn WallClock>, reference: Arc<dyn TimeReference>) -> Self {
        Self { local, reference, latest: RwLock::new(None) }
    }

    /// Monitor using the system clock against an HTTP `Date` header.
    pub fn http(url: String) -> anyhow::Result<Self> {
        let reference = HttpDateReference::new(url, Duration::from_secs(10))?;
        Ok(Self::new(Arc::new(SystemClock), Arc::new(reference)))
    }

    /// Take a fresh sample. Logs a warning when drift exceeds the threshold.
    pub async fn check_drift(&self) -> anyhow::Result<ClockDriftSample> {
        let local_before = self.local.now();
        let started = Instant::now();
        let reference = self.reference.reference_now().await?;
        let round_trip = started.elapsed();

        // Compare against the local time at the midpoint of the round trip.
        let half_trip = chrono::Duration::from_std(round_trip / 2).unwrap_or_default();
        let local_mid = local_before + half_trip;
        let sample = ClockDriftSample {
            observed_drift_ms: (local_mid - reference).num_milliseconds(),
            sampled_at: self.local.now(),
        };

        if sample.has_drift() {
            warn!(
                drift_ms = sample.observed_drift_ms,
                threshold_ms = DRIFT_THRESHOLD_MS,
                "local clock drift exceeds threshold"
            );
        } else {
            debug!(drift_ms = sample.observed_drift_ms, "clock drift within threshold");
        }

        *self.latest.write() = Some(sample);
        Ok(sample)
    }

    /// Most recent sample, if any has been taken.
    pub fn latest(&self) -> Option<ClockDriftSample> {
        *self.latest.read()
    }
}

/// Spawn a background task that re-samples drift every `interval`.
pub fn spawn_drift_sampler(
    monitor: Arc<ClockDriftMonitor>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            if let Err(e) = monitor.check_drift().await {
                warn!(err = %e, "clock drift sample failed");
            }
        }
    });
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
