// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use tokenrelay_bridge::config::BridgeConfig;

#[tokio::main]
async fn main() {
    let config = BridgeConfig::parse();
    tokenrelay::init_tracing(&config.log);

    if let Err(e) = tokenrelay_bridge::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
