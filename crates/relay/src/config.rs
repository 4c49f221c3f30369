// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::bridge_client::BridgeClient;
use crate::persist::{ConfigStoreSink, FileSink, PersistenceSink};
use crate::upstream::UpstreamClient;

/// Upstream OAuth endpoint and client credentials.
#[derive(Debug, Clone, clap::Args)]
pub struct UpstreamArgs {
    /// OAuth token endpoint URL.
    #[arg(long, env = "TOKENRELAY_TOKEN_URL")]
    pub token_url: Option<String>,

    /// OAuth client ID.
    #[arg(long, env = "TOKENRELAY_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret.
    #[arg(long, env = "TOKENRELAY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Seed refresh token. A persisted token (see --persist-file) wins.
    #[arg(long, env = "TOKENRELAY_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// Refresh this many seconds before the access token expires.
    #[arg(long, default_value_t = 300, env = "TOKENRELAY_PROACTIVE_BUFFER_SECS")]
    pub proactive_buffer_secs: u64,

    /// Timeout for each upstream token request in milliseconds.
    #[arg(long, default_value_t = 15000, env = "TOKENRELAY_UPSTREAM_TIMEOUT_MS")]
    pub upstream_timeout_ms: u64,
}

impl UpstreamArgs {
    pub fn proactive_buffer(&self) -> Duration {
        Duration::from_secs(self.proactive_buffer_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Presence checks for the upstream exchange.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token_url.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("--token-url is required");
        }
        if self.client_id.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("--client-id is required");
        }
        Ok(())
    }

    pub fn client(&self) -> anyhow::Result<UpstreamClient> {
        self.validate()?;
        UpstreamClient::new(
            self.token_url.clone().unwrap_or_default(),
            self.client_id.clone().unwrap_or_default(),
            self.client_secret.clone().filter(|s| !s.is_empty()),
            self.upstream_timeout(),
        )
    }
}

/// Durable destinations for rotated refresh tokens.
#[derive(Debug, Clone, clap::Args)]
pub struct PersistArgs {
    /// Local JSON file holding the live refresh token.
    #[arg(long, env = "TOKENRELAY_PERSIST_FILE")]
    pub persist_file: Option<PathBuf>,

    /// Config store endpoint that accepts `PATCH {"<var>": "<token>"}`.
    #[arg(long, env = "TOKENRELAY_PERSIST_URL")]
    pub persist_url: Option<String>,

    /// Bearer token for the config store.
    #[arg(long, env = "TOKENRELAY_PERSIST_API_TOKEN", hide_env_values = true)]
    pub persist_api_token: Option<String>,

    /// Variable name written in the config store.
    #[arg(long, default_value = "REFRESH_TOKEN", env = "TOKENRELAY_PERSIST_VAR_NAME")]
    pub persist_var_name: String,
}

impl PersistArgs {
    /// Whether any durable destination is configured.
    pub fn is_configured(&self) -> bool {
        self.persist_file.is_some() || self.persist_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Build every configured sink. Empty when persistence is disabled.
    pub fn sinks(&self, timeout: Duration) -> anyhow::Result<Vec<Arc<dyn PersistenceSink>>> {
        let mut sinks: Vec<Arc<dyn PersistenceSink>> = Vec::new();
        if let Some(ref path) = self.persist_file {
            sinks.push(Arc::new(FileSink::new(path.clone())));
        }
        if let Some(ref url) = self.persist_url {
            sinks.push(Arc::new(ConfigStoreSink::new(
                url.clone(),
                self.persist_api_token.clone(),
                self.persist_var_name.clone(),
                timeout,
            )?));
        }
        Ok(sinks)
    }
}

/// Clock drift reference.
#[derive(Debug, Clone, clap::Args)]
pub struct DriftArgs {
    /// URL whose `Date` header is the reference time. Unset disables drift checks.
    #[arg(long, env = "TOKENRELAY_DRIFT_REFERENCE_URL")]
    pub drift_reference_url: Option<String>,
}

/// Where to find the bridge service.
#[derive(Debug, Clone, clap::Args)]
pub struct BridgeArgs {
    /// Bridge base URL, e.g. `http://bridge:9810`.
    #[arg(long, env = "TOKENRELAY_BRIDGE_URL")]
    pub bridge_url: Option<String>,

    /// Shared secret for the bridge's token endpoints.
    #[arg(long, env = "TOKENRELAY_BRIDGE_SECRET", hide_env_values = true)]
    pub bridge_secret: Option<String>,

    /// Timeout for bridge requests in milliseconds.
    #[arg(long, default_value_t = 15000, env = "TOKENRELAY_BRIDGE_TIMEOUT_MS")]
    pub bridge_timeout_ms: u64,
}

impl BridgeArgs {
    /// Client for the configured bridge, or `None` when no URL is set.
    pub fn client(&self) -> anyhow::Result<Option<BridgeClient>> {
        let Some(ref url) = self.bridge_url else {
            return Ok(None);
        };
        let secret = self
            .bridge_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("--bridge-secret is required with --bridge-url"))?;
        BridgeClient::new(url.clone(), secret, Duration::from_millis(self.bridge_timeout_ms))
            .map(Some)
    }
}

/// Logging options.
#[derive(Debug, Clone, clap::Args)]
pub struct LogArgs {
    /// Log level (trace, debug, info, warn, error) or an `EnvFilter` directive.
    #[arg(long, default_value = "info", env = "TOKENRELAY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "TOKENRELAY_LOG_FORMAT")]
    pub log_format: String,
}

/// OAuth refresh-token lifecycle manager.
#[derive(Debug, Parser)]
#[command(name = "tokenrelay", version, about)]
pub struct RelayConfig {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    #[command(flatten)]
    pub persist: PersistArgs,

    #[command(flatten)]
    pub bridge: BridgeArgs,

    #[command(flatten)]
    pub drift: DriftArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print a valid access token, falling back to the bridge if configured.
    Token,
    /// Print masked token state.
    Status {
        /// Ask the bridge instead of inspecting local state.
        #[arg(long)]
        remote: bool,
    },
    /// Sample local clock drift against the reference URL.
    Drift,
    /// Push a known-good refresh token to the bridge.
    BridgeUpdate {
        /// The replacement refresh token.
        refresh_token: String,
    },
}

impl RelayConfig {
    /// Presence checks for the selected subcommand.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.command {
            Command::Token => {
                self.upstream.validate()?;
                self.bridge.client()?;
                // Each run consumes the live refresh token; its replacement
                // must outlive the process.
                if !self.persist.is_configured() {
                    anyhow::bail!("--persist-file or --persist-url is required for `token`");
                }
            }
            Command::Status { remote: false } => self.upstream.validate()?,
            Command::Status { remote: true } | Command::BridgeUpdate { .. } => {
                if self.bridge.client()?.is_none() {
                    anyhow::bail!("--bridge-url is required");
                }
            }
            Command::Drift => {
                if self.drift.drift_reference_url.is_none() {
                    anyhow::bail!("--drift-reference-url is required");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
