// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the bridge.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::BridgeState;

/// Build the axum `Router` with all bridge routes.
pub fn build_router(state: Arc<BridgeState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        // Token lifecycle
        .route("/token/status", get(http::token_status))
        .route("/token/refresh", post(http::token_refresh))
        .route("/token/update", post(http::token_update))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
