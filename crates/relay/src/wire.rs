// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request and response bodies of the bridge HTTP API.
//!
//! Shared by the bridge service and [`crate::bridge_client::BridgeClient`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::ClockDriftSample;
use crate::error::TokenError;
use crate::store::TokenStatus;

/// Error codes for the bridge API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    BadRequest,
    CredentialUnavailable,
    CredentialExpired,
    RefreshUnavailable,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::CredentialUnavailable => 503,
            Self::CredentialExpired => 410,
            Self::RefreshUnavailable => 503,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::CredentialUnavailable => "CREDENTIAL_UNAVAILABLE",
            Self::CredentialExpired => "CREDENTIAL_EXPIRED",
            Self::RefreshUnavailable => "REFRESH_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "UNAUTHORIZED" => Some(Self::Unauthorized),
            "BAD_REQUEST" => Some(Self::BadRequest),
            "CREDENTIAL_UNAVAILABLE" => Some(Self::CredentialUnavailable),
            "CREDENTIAL_EXPIRED" => Some(Self::CredentialExpired),
            "REFRESH_UNAVAILABLE" => Some(Self::RefreshUnavailable),
            "INTERNAL" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Code for a local token error served over the API.
    pub fn for_token_error(err: &TokenError) -> Self {
        match err {
            TokenError::CredentialUnavailable => Self::CredentialUnavailable,
            TokenError::CredentialExpired { .. } => Self::CredentialExpired,
            TokenError::RefreshUnavailable { .. } => Self::RefreshUnavailable,
            TokenError::BridgeUnauthorized | TokenError::BridgeUnavailable { .. } => {
                Self::Internal
            }
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Clock drift as reported over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_ms: i64,
    pub has_drift: bool,
    pub sampled_at: DateTime<Utc>,
}

impl From<ClockDriftSample> for DriftReport {
    fn from(sample: ClockDriftSample) -> Self {
        Self {
            drift_ms: sample.observed_drift_ms,
            has_drift: sample.has_drift(),
            sampled_at: sample.sampled_at,
        }
    }
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub credentials_present: bool,
    pub access_token_expired: bool,
    pub rotation_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_drift: Option<DriftReport>,
}

impl HealthResponse {
    /// Whether the bridge can plausibly hand out a token.
    pub fn is_healthy(&self) -> bool {
        self.status == "ok" && self.credentials_present
    }
}

/// `POST /token/refresh` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub force: bool,
}

/// `POST /token/refresh` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub rotation_count: u64,
    pub cached: bool,
}

/// `POST /token/update` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub refresh_token: String,
}

/// `POST /token/update` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub updated: bool,
    pub refresh_token_hint: String,
}

/// `GET /token/status` (secrets masked).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    #[serde(default)]
    pub refresh_token_hint: Option<String>,
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub access_token_expired: bool,
    pub needs_refresh: bool,
    pub rotation_count: u64,
    #[serde(default)]
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub refresh_in_progress: bool,
    pub revoked: bool,
    #[serde(default)]
    pub clock_drift: Option<DriftReport>,
}

impl StatusResponse {
    pub fn new(status: TokenStatus, clock_drift: Option<DriftReport>) -> Self {
        Self {
            has_access_token: status.has_access_token,
            has_refresh_token: status.has_refresh_token,
            refresh_token_hint: status.refresh_token_hint,
            expires_in_secs: status.expires_in_secs,
            expires_at: status.expires_at,
            access_token_expired: status.access_token_expired,
            needs_refresh: status.needs_refresh,
            rotation_count: status.rotation_count,
            last_refreshed_at: status.last_refreshed_at,
            refresh_in_progress: status.refresh_in_progress,
            revoked: status.revoked,
            clock_drift,
        }
    }
}
