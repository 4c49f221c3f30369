// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tokenrelay: lifecycle manager for one-time-use OAuth refresh tokens.

pub mod bridge_client;
pub mod clock;
pub mod config;
pub mod error;
pub mod persist;
pub mod provider;
pub mod refresh;
pub mod retry;
pub mod store;
pub mod upstream;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{LogArgs, PersistArgs, UpstreamArgs};
use crate::persist::PersistenceSync;
use crate::refresh::RefreshCoordinator;
use crate::retry::RetryPolicy;
use crate::store::{mask_token, TokenStore};

/// A ready-to-use store and its persistence worker, if any.
pub struct Relay {
    pub store: Arc<TokenStore>,
    /// Completes once pending persistence has drained after `shutdown` fires.
    pub persistence: Option<JoinHandle<()>>,
}

/// Build the process-wide [`TokenStore`].
///
/// A refresh token persisted by a previous run (`--persist-file`) takes
/// precedence over the configured seed, since the seed has likely been
/// consumed already.
pub fn build_relay(
    upstream: &UpstreamArgs,
    persist: &PersistArgs,
    shutdown: CancellationToken,
) -> anyhow::Result<Relay> {
    let client = upstream.client()?;

    let mut seed = upstream.refresh_token.clone().filter(|t| !t.is_empty());
    if let Some(ref path) = persist.persist_file {
        match persist::load(path) {
            Ok(Some(persisted)) => {
                info!(
                    path = %path.display(),
                    refresh_token = %mask_token(&persisted.refresh_token),
                    updated_at = %persisted.updated_at,
                    "loaded persisted refresh token"
                );
                seed = Some(persisted.refresh_token);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(path = %path.display(), err = %e, "ignoring unreadable persisted token");
            }
        }
    }
    if seed.is_none() {
        warn!("no refresh token configured; waiting for a manual update");
    }

    let sinks = persist.sinks(upstream.upstream_timeout())?;
    let (persistence, handle) = if sinks.is_empty() {
        warn!("no persistence configured; rotated refresh tokens are lost on exit");
        (None, None)
    } else {
        let (sync, handle) = PersistenceSync::spawn(sinks, RetryPolicy::persist(), shutdown);
        (Some(sync), Some(handle))
    };

    let coordinator = RefreshCoordinator::new(client, RetryPolicy::refresh(), persistence);
    let store = TokenStore::new(seed, upstream.proactive_buffer(), coordinator);
    Ok(Relay { store, persistence: handle })
}

/// Install the global tracing subscriber.
pub fn init_tracing(log: &LogArgs) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&log.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match log.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).init();
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
