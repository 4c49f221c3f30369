// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors surfaced to callers that need an access token.
///
/// `Clone` so a single refresh outcome can be handed to every caller
/// attached to the same in-flight attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// No refresh token is known and no usable access token is cached.
    #[error("no credentials available: seed a refresh token first")]
    CredentialUnavailable,
    /// The upstream definitively rejected the refresh token.
    #[error("refresh token rejected by upstream: {reason}")]
    CredentialExpired { reason: String },
    /// Retries were exhausted without a definitive answer.
    #[error("token refresh temporarily unavailable: {reason}")]
    RefreshUnavailable { reason: String },
    /// The bridge rejected our shared secret.
    #[error("bridge rejected credentials")]
    BridgeUnauthorized,
    /// The bridge is unreachable or reported itself unhealthy.
    #[error("bridge unavailable: {reason}")]
    BridgeUnavailable { reason: String },
}

impl TokenError {
    /// Terminal errors mean the stored refresh token is dead and only an
    /// operator (or the bridge) can recover.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CredentialExpired { .. })
    }

    /// Whether a caller holding this local error may try the bridge instead.
    pub fn allows_bridge_fallback(&self) -> bool {
        matches!(
            self,
            Self::CredentialUnavailable
                | Self::CredentialExpired { .. }
                | Self::RefreshUnavailable { .. }
        )
    }

    /// Operator-facing explanation of what to do next.
    pub fn user_message(&self) -> String {
        match self {
            Self::CredentialExpired { .. } => format!(
                "{self}. The stored refresh token is dead; regenerate it via the interactive \
                 authorization flow and supply it with a manual update."
            ),
            Self::CredentialUnavailable => format!(
                "{self}. Configure a seed refresh token or push one with a manual update."
            ),
            Self::RefreshUnavailable { .. }
            | Self::BridgeUnavailable { .. }
            | Self::BridgeUnauthorized => {
                format!("{self}. This is a temporary network/API issue; retry later.")
            }
        }
    }
}

/// Classification of a single upstream exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Network failure, timeout, 5xx, or unparseable response. Safe to retry.
    Transient(String),
    /// `invalid_grant` / `invalid_client`. Never retried.
    Terminal(String),
}

impl AttemptError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Terminal(_) => "terminal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Terminal(msg) => msg,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
