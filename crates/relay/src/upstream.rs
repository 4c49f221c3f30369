// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the upstream OAuth token endpoint.

use std::sync::Once;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AttemptError;

/// Lifetime assumed when the upstream omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

/// Upper bound on an advertised `expires_in`.
pub const MAX_EXPIRES_IN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Error codes that mean the credential itself is unusable.
const TERMINAL_ERRORS: &[&str] = &["invalid_grant", "invalid_client"];

/// Build a reqwest client with `timeout`.
///
/// Installs the ring crypto provider on first use; reqwest needs one even
/// for plain HTTP.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    static PROVIDER: Once = Once::new();
    PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("build HTTP client: {e}"))
}

/// Successful token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Advertised lifetime, capped at [`MAX_EXPIRES_IN`].
    pub fn lifetime(&self) -> Duration {
        self.expires_in.map(Duration::from_secs).unwrap_or(DEFAULT_EXPIRES_IN).min(MAX_EXPIRES_IN)
    }
}

/// OAuth error response.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client credentials and endpoint for `grant_type=refresh_token` exchanges.
pub struct UpstreamClient {
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(
        token_url: String,
        client_id: String,
        client_secret: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self { token_url, client_id, client_secret, client: http_client(timeout)? })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange `refresh_token` for a new access token.
    ///
    /// The caller must treat `refresh_token` as consumed once this returns,
    /// whatever the outcome.
    pub async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, AttemptError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(ref secret) = self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let resp = self.client.post(&self.token_url).form(&form).send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Transient(format!("timeout: {e}"))
            } else {
                AttemptError::Transient(format!("HTTP error: {e}"))
            }
        })?;

        let status = resp.status();
        let body =
            resp.text().await.map_err(|e| AttemptError::Transient(format!("read body: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str::<TokenResponse>(&body)
            .map_err(|e| AttemptError::Transient(format!("parse response: {e}")))
    }
}

/// Decide whether a non-2xx response is worth retrying.
fn classify_failure(status: reqwest::StatusCode, body: &str) -> AttemptError {
    if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(body) {
        let detail = match err.error_description {
            Some(desc) if !desc.is_empty() => format!("{}: {desc}", err.error),
            _ => err.error.clone(),
        };
        if TERMINAL_ERRORS.contains(&err.error.as_str()) {
            return AttemptError::Terminal(detail);
        }
        return AttemptError::Transient(format!("HTTP {status}: {detail}"));
    }
    AttemptError::Transient(format!("HTTP {status}"))
}

#[cfg(test)]
#[path = "upstream_tests.rs"]
mod tests;
