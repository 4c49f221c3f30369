// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use tokenrelay::clock::ClockDriftMonitor;
use tokenrelay::config::{Command, RelayConfig};
use tokenrelay::error::TokenError;
use tokenrelay::provider::TokenProvider;

#[tokio::main]
async fn main() {
    let config = RelayConfig::parse();
    tokenrelay::init_tracing(&config.log);

    if let Err(e) = run(config).await {
        match e.downcast_ref::<TokenError>() {
            Some(token_err) => eprintln!("error: {}", token_err.user_message()),
            None => error!("fatal: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    config.validate()?;

    match config.command {
        Command::Token => {
            let shutdown = CancellationToken::new();
            let relay =
                tokenrelay::build_relay(&config.upstream, &config.persist, shutdown.clone())?;
            let provider = TokenProvider::new(relay.store, config.bridge.client()?);
            let result = provider.access_token().await;

            // Let a rotated token reach durable storage before exiting.
            shutdown.cancel();
            if let Some(handle) = relay.persistence {
                let _ = handle.await;
            }
            println!("{}", result?);
        }
        Command::Status { remote: false } => {
            let shutdown = CancellationToken::new();
            let relay =
                tokenrelay::build_relay(&config.upstream, &config.persist, shutdown.clone())?;
            println!("{}", serde_json::to_string_pretty(&relay.store.status())?);
            shutdown.cancel();
        }
        Command::Status { remote: true } => {
            let bridge = config.bridge.client()?.ok_or_else(|| anyhow::anyhow!("no bridge"))?;
            let status = bridge.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Drift => {
            let url = config
                .drift
                .drift_reference_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no drift reference"))?;
            let sample = ClockDriftMonitor::http(url)?.check_drift().await?;
            println!("{}", serde_json::to_string_pretty(&sample)?);
        }
        Command::BridgeUpdate { ref refresh_token } => {
            if refresh_token.is_empty() {
                anyhow::bail!("refresh token must not be empty");
            }
            let bridge = config.bridge.client()?.ok_or_else(|| anyhow::anyhow!("no bridge"))?;
            let resp = bridge.update(refresh_token.clone()).await?;
            println!("bridge refresh token updated ({})", resp.refresh_token_hint);
        }
    }
    Ok(())
}
