// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;
use tokenrelay::config::{DriftArgs, LogArgs, PersistArgs, UpstreamArgs};

/// HTTP service that owns a refresh-token chain and hands out access tokens.
#[derive(Debug, Clone, Parser)]
#[command(name = "tokenrelay-bridge", version, about)]
pub struct BridgeConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "TOKENRELAY_BRIDGE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "TOKENRELAY_BRIDGE_PORT")]
    pub port: u16,

    /// Bearer secret required on `/token/*` routes.
    #[arg(long, env = "TOKENRELAY_BRIDGE_SECRET", hide_env_values = true)]
    pub shared_secret: Option<String>,

    /// Clock drift sampling interval in seconds (0 = sample once at startup).
    #[arg(long, default_value_t = 300, env = "TOKENRELAY_BRIDGE_DRIFT_CHECK_SECS")]
    pub drift_check_secs: u64,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    #[command(flatten)]
    pub persist: PersistArgs,

    #[command(flatten)]
    pub drift: DriftArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl BridgeConfig {
    /// Presence checks only.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shared_secret.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("--shared-secret is required");
        }
        self.upstream.validate()
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `None` when periodic sampling is disabled.
    pub fn drift_check_interval(&self) -> Option<Duration> {
        match self.drift_check_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
