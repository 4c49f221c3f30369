// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokenrelay::clock::ClockDriftMonitor;
use tokenrelay::store::TokenStore;
use tokenrelay::wire::DriftReport;

/// Shared bridge state.
pub struct BridgeState {
    pub store: Arc<TokenStore>,
    pub drift: Option<Arc<ClockDriftMonitor>>,
    pub shared_secret: String,
}

impl BridgeState {
    pub fn new(store: Arc<TokenStore>, shared_secret: String) -> Self {
        Self { store, drift: None, shared_secret }
    }

    pub fn with_drift(mut self, monitor: Arc<ClockDriftMonitor>) -> Self {
        self.drift = Some(monitor);
        self
    }

    /// Latest drift sample, if a monitor is configured and has sampled.
    pub fn drift_report(&self) -> Option<DriftReport> {
        self.drift.as_ref().and_then(|m| m.latest()).map(DriftReport::from)
    }
}
