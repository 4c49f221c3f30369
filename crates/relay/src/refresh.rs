// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight token refresh with retries.
//!
//! At most one refresh runs per [`TokenStore`]. The first caller claims the
//! record and spawns the attempt as a task; everyone who arrives while it is
//! running awaits the same shared future. The spawned task owns the exchange,
//! so a caller that gives up waiting cannot abandon a refresh token the
//! upstream has already consumed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{AttemptError, TokenError};
use crate::persist::PersistenceSync;
use crate::retry::RetryPolicy;
use crate::store::{mask_token, TokenStore};
use crate::upstream::{TokenResponse, UpstreamClient};

type InflightRefresh = Shared<BoxFuture<'static, Result<RefreshedToken, TokenError>>>;

/// A usable access token and the record state that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: Duration,
    pub rotation_count: u64,
    /// Whether this result came from the cache rather than the upstream.
    pub cached: bool,
}

/// Outcome of one upstream exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    TerminalFailure,
}

/// Log entry for one upstream exchange. Discarded once the refresh settles.
#[derive(Debug, Clone)]
pub struct RefreshAttempt {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
    pub error_kind: Option<&'static str>,
}

/// Executes refreshes against the upstream token endpoint.
pub struct RefreshCoordinator {
    upstream: UpstreamClient,
    policy: RetryPolicy,
    persistence: Option<PersistenceSync>,
    inflight: Mutex<Option<InflightRefresh>>,
}

impl RefreshCoordinator {
    pub fn new(
        upstream: UpstreamClient,
        policy: RetryPolicy,
        persistence: Option<PersistenceSync>,
    ) -> Self {
        Self { upstream, policy, persistence, inflight: Mutex::new(None) }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Start a refresh for `store`, or attach to the one already running.
    pub(crate) async fn refresh(
        store: &Arc<TokenStore>,
        force: bool,
    ) -> Result<RefreshedToken, TokenError> {
        let inflight = {
            let mut slot = store.coordinator().inflight.lock();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("attaching to in-flight refresh");
                    existing.clone()
                }
                None => {
                    if !force {
                        if let Some(cached) = store.cached_token() {
                            return Ok(cached);
                        }
                    }
                    if store.is_revoked() {
                        return Err(TokenError::CredentialExpired {
                            reason: "refresh token was already rejected; manual update required"
                                .to_owned(),
                        });
                    }
                    let Some(token_used) = store.begin_refresh() else {
                        return Err(TokenError::CredentialUnavailable);
                    };

                    let task_store = Arc::clone(store);
                    let handle = tokio::spawn(async move {
                        task_store.coordinator().execute(&task_store, token_used).await
                    });

                    let cleanup_store = Arc::clone(store);
                    let shared = async move {
                        match handle.await {
                            Ok(result) => result,
                            Err(e) => {
                                cleanup_store.coordinator().settle(&cleanup_store);
                                Err(TokenError::RefreshUnavailable {
                                    reason: format!("refresh task failed: {e}"),
                                })
                            }
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Some(shared.clone());
                    shared
                }
            }
        };
        inflight.await
    }

    /// Run the retry loop for `token_used` and settle the record.
    async fn execute(
        &self,
        store: &TokenStore,
        token_used: String,
    ) -> Result<RefreshedToken, TokenError> {
        let masked = mask_token(&token_used);
        let mut attempts: Vec<RefreshAttempt> = Vec::new();

        let result = self.exchange_with_retries(&token_used, &masked, &mut attempts).await;

        let outcome = match result {
            Ok(resp) => Ok(self.install(store, &token_used, resp)),
            Err(AttemptError::Terminal(reason)) => {
                store.mark_revoked(&token_used);
                error!(
                    refresh_token = %masked,
                    reason = %reason,
                    "refresh token rejected by upstream; manual update required"
                );
                Err(TokenError::CredentialExpired { reason })
            }
            Err(AttemptError::Transient(reason)) => {
                error!(
                    refresh_token = %masked,
                    attempts = attempts.len(),
                    reason = %reason,
                    "token refresh retries exhausted"
                );
                Err(TokenError::RefreshUnavailable {
                    reason: format!("{} attempts failed, last: {reason}", attempts.len()),
                })
            }
        };

        debug!(attempts = ?attempts, "refresh settled");
        self.settle(store);
        outcome
    }

    async fn exchange_with_retries(
        &self,
        token_used: &str,
        masked: &str,
        attempts: &mut Vec<RefreshAttempt>,
    ) -> Result<TokenResponse, AttemptError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt_number = 0;
        loop {
            attempt_number += 1;
            let started_at = Utc::now();
            let timer = Instant::now();
            info!(attempt = attempt_number, refresh_token = %masked, "refresh attempt started");

            let result = self.upstream.exchange(token_used).await;
            let (outcome, error_kind) = match &result {
                Ok(_) => (AttemptOutcome::Success, None),
                Err(e @ AttemptError::Transient(_)) => {
                    (AttemptOutcome::TransientFailure, Some(e.kind()))
                }
                Err(e @ AttemptError::Terminal(_)) => {
                    (AttemptOutcome::TerminalFailure, Some(e.kind()))
                }
            };
            attempts.push(RefreshAttempt {
                attempt_number,
                started_at,
                elapsed: timer.elapsed(),
                outcome,
                error_kind,
            });

            match result {
                Err(AttemptError::Transient(msg)) if attempt_number < max_attempts => {
                    let delay = self.policy.delay(attempt_number - 1);
                    warn!(
                        attempt = attempt_number,
                        max_attempts,
                        err = %msg,
                        retry_in_ms = delay.as_millis() as u64,
                        "refresh attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Apply a successful exchange to the record.
    fn install(&self, store: &TokenStore, token_used: &str, resp: TokenResponse) -> RefreshedToken {
        let lifetime = resp.lifetime();
        let new_refresh = resp.refresh_token.filter(|rt| rt != token_used);
        if new_refresh.is_none() {
            debug!("upstream did not issue a new refresh token");
        }

        let rotated =
            store.apply_rotation(resp.access_token.clone(), lifetime, new_refresh.clone());
        let rotation_count = store.snapshot().rotation_count;

        match new_refresh {
            Some(rt) if rotated => {
                info!(
                    rotation = rotation_count,
                    refresh_token = %mask_token(&rt),
                    expires_in_secs = lifetime.as_secs(),
                    "credentials refreshed, refresh token rotated"
                );
                self.schedule_persist(rt);
            }
            _ => {
                info!(expires_in_secs = lifetime.as_secs(), "credentials refreshed");
            }
        }

        RefreshedToken {
            access_token: resp.access_token,
            expires_in: lifetime,
            rotation_count,
            cached: false,
        }
    }

    /// Release the record and the single-flight slot.
    fn settle(&self, store: &TokenStore) {
        let mut slot = self.inflight.lock();
        store.end_refresh();
        *slot = None;
    }

    /// Hand `refresh_token` to the persistence queue, if one is configured.
    pub(crate) fn schedule_persist(&self, refresh_token: String) {
        if let Some(ref persistence) = self.persistence {
            persistence.schedule(refresh_token);
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
