// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for a remote bridge service.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::TokenError;
use crate::upstream::http_client;
use crate::wire::{
    ErrorCode, ErrorResponse, HealthResponse, RefreshRequest, RefreshResponse, StatusResponse,
    UpdateRequest, UpdateResponse,
};

/// Default timeout for bridge token calls.
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client wrapper for one bridge instance.
pub struct BridgeClient {
    base_url: String,
    secret: String,
    client: Client,
}

impl BridgeClient {
    pub fn new(base_url: String, secret: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = http_client(timeout)?;
        let base_url = base_url.trim_end_matches('/').to_owned();
        Ok(Self { base_url, secret, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /health` (unauthenticated).
    pub async fn health(&self) -> Result<HealthResponse, TokenError> {
        let resp = self.client.get(self.url("/health")).send().await.map_err(transport_error)?;
        decode(resp).await
    }

    /// `GET /token/status`.
    pub async fn status(&self) -> Result<StatusResponse, TokenError> {
        let req = self.client.get(self.url("/token/status")).bearer_auth(&self.secret);
        let resp = req.send().await.map_err(transport_error)?;
        decode(resp).await
    }

    /// `POST /token/refresh`.
    pub async fn refresh(&self, force: bool) -> Result<RefreshResponse, TokenError> {
        let req = self
            .client
            .post(self.url("/token/refresh"))
            .bearer_auth(&self.secret)
            .json(&RefreshRequest { force });
        let resp = req.send().await.map_err(transport_error)?;
        decode(resp).await
    }

    /// `POST /token/update`: push a manual override to the bridge.
    pub async fn update(&self, refresh_token: String) -> Result<UpdateResponse, TokenError> {
        let req = self
            .client
            .post(self.url("/token/update"))
            .bearer_auth(&self.secret)
            .json(&UpdateRequest { refresh_token });
        let resp = req.send().await.map_err(transport_error)?;
        decode(resp).await
    }

    /// Health-check the bridge, then ask it for a token.
    ///
    /// When the bridge is unreachable or unhealthy, `local` (the error that
    /// prompted the fallback) is returned unchanged.
    pub async fn fallback_token(&self, local: TokenError) -> Result<String, TokenError> {
        match self.health().await {
            Ok(health) if health.is_healthy() => {}
            Ok(health) => {
                warn!(
                    bridge = %self.base_url,
                    status = %health.status,
                    credentials_present = health.credentials_present,
                    "bridge unhealthy, not delegating"
                );
                return Err(local);
            }
            Err(e) => {
                warn!(bridge = %self.base_url, err = %e, "bridge health check failed");
                return Err(local);
            }
        }

        let token = self.refresh(false).await?;
        debug!(
            bridge = %self.base_url,
            rotation = token.rotation_count,
            cached = token.cached,
            "access token obtained from bridge"
        );
        Ok(token.access_token)
    }
}

fn transport_error(e: reqwest::Error) -> TokenError {
    TokenError::BridgeUnavailable { reason: e.to_string() }
}

/// Decode a success body, or map the error envelope to a [`TokenError`].
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TokenError> {
    let status = resp.status();
    let body = resp.bytes().await.map_err(transport_error)?;

    if status.is_success() {
        return serde_json::from_slice(&body).map_err(|e| TokenError::BridgeUnavailable {
            reason: format!("invalid bridge response: {e}"),
        });
    }

    let envelope = serde_json::from_slice::<ErrorResponse>(&body).ok();
    let code = envelope.as_ref().and_then(|r| ErrorCode::parse(&r.error.code));
    let message = envelope.map(|r| r.error.message).unwrap_or_else(|| format!("HTTP {status}"));

    Err(match code {
        Some(ErrorCode::Unauthorized) => TokenError::BridgeUnauthorized,
        Some(ErrorCode::CredentialExpired) => TokenError::CredentialExpired { reason: message },
        Some(ErrorCode::RefreshUnavailable) => TokenError::RefreshUnavailable { reason: message },
        Some(ErrorCode::CredentialUnavailable) => TokenError::CredentialUnavailable,
        _ if status == reqwest::StatusCode::UNAUTHORIZED => TokenError::BridgeUnauthorized,
        _ => TokenError::BridgeUnavailable { reason: message },
    })
}

#[cfg(test)]
#[path = "bridge_client_tests.rs"]
mod tests;
