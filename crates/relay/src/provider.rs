// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tracing::warn;

use crate::bridge_client::BridgeClient;
use crate::error::TokenError;
use crate::store::TokenStore;

/// Access-token source for the primary application: the local store first,
/// then the bridge when the local credential cannot produce a token.
pub struct TokenProvider {
    store: Arc<TokenStore>,
    bridge: Option<BridgeClient>,
}

impl TokenProvider {
    pub fn new(store: Arc<TokenStore>, bridge: Option<BridgeClient>) -> Self {
        Self { store, bridge }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn bridge(&self) -> Option<&BridgeClient> {
        self.bridge.as_ref()
    }

    /// Return a valid access token.
    ///
    /// A local failure that the bridge can cover is retried through the
    /// bridge once; if the bridge is unhealthy or unreachable the local error
    /// is returned as-is.
    pub async fn access_token(&self) -> Result<String, TokenError> {
        let local = match self.store.get_valid_access_token().await {
            Ok(token) => return Ok(token),
            Err(e) => e,
        };

        let Some(ref bridge) = self.bridge else {
            return Err(local);
        };
        if !local.allows_bridge_fallback() {
            return Err(local);
        }

        warn!(bridge = %bridge.base_url(), err = %local, "local refresh failed, trying bridge");
        bridge.fallback_token(local).await
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
