// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tokenrelay bridge: serves one refresh-token chain over HTTP.

pub mod config;
pub mod error;
pub mod state;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use tokenrelay::clock::{spawn_drift_sampler, ClockDriftMonitor};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::state::BridgeState;
use crate::transport::build_router;

/// Run the bridge server until Ctrl-C.
pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addr = config.addr();
    let shutdown = CancellationToken::new();

    let relay = tokenrelay::build_relay(&config.upstream, &config.persist, shutdown.clone())?;
    let secret = config.shared_secret.clone().unwrap_or_default();
    let mut state = BridgeState::new(Arc::clone(&relay.store), secret);

    if let Some(ref url) = config.drift.drift_reference_url {
        let monitor = Arc::new(ClockDriftMonitor::http(url.clone())?);
        match config.drift_check_interval() {
            Some(interval) => {
                spawn_drift_sampler(Arc::clone(&monitor), interval, shutdown.clone());
            }
            None => {
                let monitor = Arc::clone(&monitor);
                tokio::spawn(async move {
                    if let Err(e) = monitor.check_drift().await {
                        warn!(err = %e, "clock drift sample failed");
                    }
                });
            }
        }
        state = state.with_drift(monitor);
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let router = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    info!("tokenrelay-bridge listening on {addr}");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    // Stop background tasks and let the persistence worker flush.
    shutdown.cancel();
    if let Some(handle) = relay.persistence {
        let _ = handle.await;
    }
    Ok(())
}
