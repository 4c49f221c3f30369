// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the bridge API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokenrelay::store::mask_token;
use tokenrelay::wire::{
    HealthResponse, RefreshRequest, RefreshResponse, StatusResponse, UpdateRequest, UpdateResponse,
};
use tracing::info;

use crate::error::ApiError;
use crate::state::BridgeState;

/// `GET /health`
pub async fn health(State(s): State<Arc<BridgeState>>) -> Json<HealthResponse> {
    let status = s.store.status();
    let healthy = status.has_refresh_token && !status.revoked;
    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_owned(),
        credentials_present: status.has_refresh_token,
        access_token_expired: status.access_token_expired,
        rotation_count: status.rotation_count,
        clock_drift: s.drift_report(),
    })
}

/// `GET /token/status` (secrets masked)
pub async fn token_status(State(s): State<Arc<BridgeState>>) -> Json<StatusResponse> {
    Json(StatusResponse::new(s.store.status(), s.drift_report()))
}

/// `POST /token/refresh`: cached token unless stale or `force`.
pub async fn token_refresh(
    State(s): State<Arc<BridgeState>>,
    body: Option<Json<RefreshRequest>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let force = body.map(|Json(req)| req.force).unwrap_or_default();
    let token = s.store.refresh(force).await?;
    Ok(Json(RefreshResponse {
        access_token: token.access_token,
        expires_in: token.expires_in.as_secs(),
        rotation_count: token.rotation_count,
        cached: token.cached,
    }))
}

/// `POST /token/update`: operator override of the refresh token.
pub async fn token_update(
    State(s): State<Arc<BridgeState>>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let Json(req) = body?;
    let refresh_token = req.refresh_token.trim().to_owned();
    if refresh_token.is_empty() {
        return Err(ApiError::bad_request("refresh_token must not be empty"));
    }
    let hint = mask_token(&refresh_token);
    s.store.manual_override(refresh_token);
    info!(refresh_token = %hint, "refresh token updated via bridge API");
    Ok(Json(UpdateResponse { updated: true, refresh_token_hint: hint }))
}
