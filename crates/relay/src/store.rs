// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative in-memory credential record.
//!
//! A [`TokenStore`] owns exactly one [`TokenRecord`]. Readers take snapshots
//! under a read lock; the record only changes through
//! [`TokenStore::apply_rotation`] and [`TokenStore::manual_override`], each of
//! which swaps every affected field under one write lock so no reader ever
//! sees an old access token paired with a new refresh token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::error::TokenError;
use crate::refresh::{RefreshCoordinator, RefreshedToken};

/// Default margin before expiry at which a cached token stops being served.
pub const DEFAULT_PROACTIVE_BUFFER: Duration = Duration::from_secs(300);

/// Current credential state.
#[derive(Debug, Clone, Default)]
pub struct TokenRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Monotonic expiry of `access_token`.
    pub expires_at: Option<Instant>,
    /// Wall-clock expiry, for display only.
    pub expires_at_wall: Option<DateTime<Utc>>,
    pub rotation_count: u64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub refresh_in_progress: bool,
    /// Set when the upstream rejected `refresh_token`; cleared by a rotation
    /// or a manual override.
    pub revoked: bool,
}

impl TokenRecord {
    /// Whether `access_token` may be served at `now` given `buffer`.
    pub fn is_fresh_at(&self, now: Instant, buffer: Duration) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => match expires_at.checked_sub(buffer) {
                Some(deadline) => now < deadline,
                None => false,
            },
            _ => false,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |e| now >= e)
    }
}

/// Masked, serializable view of a [`TokenRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    /// Last characters of the live refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub access_token_expired: bool,
    pub needs_refresh: bool,
    pub rotation_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub refresh_in_progress: bool,
    pub revoked: bool,
}

/// Render a secret as its last four characters.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "****".to_owned();
    }
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("…{suffix}")
}

/// Holds the single authoritative [`TokenRecord`] for this process.
pub struct TokenStore {
    record: RwLock<TokenRecord>,
    proactive_buffer: Duration,
    coordinator: RefreshCoordinator,
}

impl TokenStore {
    /// Create a store seeded with `seed_refresh_token` (if any).
    pub fn new(
        seed_refresh_token: Option<String>,
        proactive_buffer: Duration,
        coordinator: RefreshCoordinator,
    ) -> Arc<Self> {
        let record = TokenRecord {
            refresh_token: seed_refresh_token.filter(|t| !t.is_empty()),
            ..TokenRecord::default()
        };
        Arc::new(Self { record: RwLock::new(record), proactive_buffer, coordinator })
    }

    pub fn proactive_buffer(&self) -> Duration {
        self.proactive_buffer
    }

    pub(crate) fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Consistent copy of the record.
    pub fn snapshot(&self) -> TokenRecord {
        self.record.read().clone()
    }

    /// Cached access token, if it is outside the proactive buffer.
    pub fn fresh_access_token(&self) -> Option<String> {
        self.cached_token().map(|t| t.access_token)
    }

    /// Cached token with its remaining lifetime, if it is outside the
    /// proactive buffer.
    pub fn cached_token(&self) -> Option<RefreshedToken> {
        let now = Instant::now();
        let record = self.record.read();
        if !record.is_fresh_at(now, self.proactive_buffer) {
            return None;
        }
        let access_token = record.access_token.clone()?;
        let expires_in = record.expires_at.map(|e| e.saturating_duration_since(now))?;
        Some(RefreshedToken {
            access_token,
            expires_in,
            rotation_count: record.rotation_count,
            cached: true,
        })
    }

    /// Return a usable access token, refreshing first if the cached one is
    /// missing or inside the proactive buffer.
    ///
    /// Concurrent callers share a single in-flight refresh.
    pub async fn get_valid_access_token(self: &Arc<Self>) -> Result<String, TokenError> {
        if let Some(token) = self.fresh_access_token() {
            return Ok(token);
        }
        self.refresh(false).await.map(|t| t.access_token)
    }

    /// Run (or attach to) a refresh. With `force == false` a fresh cached
    /// token short-circuits the network call.
    pub async fn refresh(self: &Arc<Self>, force: bool) -> Result<RefreshedToken, TokenError> {
        RefreshCoordinator::refresh(self, force).await
    }

    /// Atomically install the result of a successful upstream exchange.
    ///
    /// `refresh_token` replaces the live one only when it is present and
    /// different; that case bumps `rotation_count`. Returns whether the
    /// refresh token rotated.
    pub fn apply_rotation(
        &self,
        access_token: String,
        expires_in: Duration,
        refresh_token: Option<String>,
    ) -> bool {
        let now = Instant::now();
        let now_wall = Utc::now();
        let mut record = self.record.write();

        record.access_token = Some(access_token);
        // Unrepresentable expiries saturate to "no expiry known", which
        // forces a refresh on the next read instead of panicking.
        record.expires_at = now.checked_add(expires_in);
        record.expires_at_wall = chrono::Duration::from_std(expires_in)
            .ok()
            .and_then(|d| now_wall.checked_add_signed(d));
        record.last_refreshed_at = Some(now_wall);
        record.revoked = false;

        match refresh_token {
            Some(new)
                if !new.is_empty() && record.refresh_token.as_deref() != Some(new.as_str()) =>
            {
                record.refresh_token = Some(new);
                record.rotation_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Operator escape hatch: install a known-good refresh token.
    ///
    /// Drops the cached access token so the next
    /// [`get_valid_access_token`](Self::get_valid_access_token) refreshes
    /// immediately. Does not count as an upstream rotation.
    pub fn manual_override(&self, refresh_token: String) {
        {
            let mut record = self.record.write();
            record.refresh_token = Some(refresh_token.clone());
            record.access_token = None;
            record.expires_at = None;
            record.expires_at_wall = None;
            record.revoked = false;
        }
        info!(refresh_token = %mask_token(&refresh_token), "refresh token manually overridden");
        self.coordinator.schedule_persist(refresh_token);
    }

    /// Masked status for diagnostics.
    pub fn status(&self) -> TokenStatus {
        let now = Instant::now();
        let record = self.record.read();
        TokenStatus {
            has_access_token: record.access_token.is_some(),
            has_refresh_token: record.refresh_token.is_some(),
            refresh_token_hint: record.refresh_token.as_deref().map(mask_token),
            expires_in_secs: record
                .expires_at
                .map(|e| e.saturating_duration_since(now).as_secs()),
            expires_at: record.expires_at_wall,
            access_token_expired: record.is_expired_at(now),
            needs_refresh: !record.is_fresh_at(now, self.proactive_buffer),
            rotation_count: record.rotation_count,
            last_refreshed_at: record.last_refreshed_at,
            refresh_in_progress: record.refresh_in_progress,
            revoked: record.revoked,
        }
    }

    /// Claim the record for a refresh attempt. Returns the refresh token the
    /// attempt must use, or `None` when there is nothing to refresh with.
    pub(crate) fn begin_refresh(&self) -> Option<String> {
        let mut record = self.record.write();
        let token = record.refresh_token.clone()?;
        record.refresh_in_progress = true;
        Some(token)
    }

    pub(crate) fn end_refresh(&self) {
        self.record.write().refresh_in_progress = false;
    }

    /// Record a terminal rejection of `consumed`, unless it has already been
    /// replaced.
    pub(crate) fn mark_revoked(&self, consumed: &str) {
        let mut record = self.record.write();
        if record.refresh_token.as_deref() == Some(consumed) {
            record.revoked = true;
        }
    }

    pub(crate) fn is_revoked(&self) -> bool {
        self.record.read().revoked
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
