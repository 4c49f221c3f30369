// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    unavailable = { TokenError::CredentialUnavailable, true },
    expired = { TokenError::CredentialExpired { reason: "invalid_grant".into() }, true },
    refresh_unavailable = { TokenError::RefreshUnavailable { reason: "503".into() }, true },
    bridge_unauthorized = { TokenError::BridgeUnauthorized, false },
    bridge_unavailable = { TokenError::BridgeUnavailable { reason: "down".into() }, false },
)]
fn bridge_fallback_eligibility(err: TokenError, expected: bool) {
    assert_eq!(err.allows_bridge_fallback(), expected);
}

#[test]
fn only_expired_is_terminal() {
    assert!(TokenError::CredentialExpired { reason: "x".into() }.is_terminal());
    assert!(!TokenError::RefreshUnavailable { reason: "x".into() }.is_terminal());
    assert!(!TokenError::CredentialUnavailable.is_terminal());
}

#[test]
fn user_message_distinguishes_dead_token_from_outage() {
    let dead = TokenError::CredentialExpired { reason: "invalid_grant".into() }.user_message();
    assert!(dead.contains("interactive authorization flow"), "{dead}");

    let outage = TokenError::RefreshUnavailable { reason: "timeout".into() }.user_message();
    assert!(outage.contains("temporary"), "{outage}");
    assert!(!outage.contains("interactive"), "{outage}");
}

#[test]
fn attempt_error_display_includes_kind() {
    let err = AttemptError::Terminal("invalid_client".into());
    assert_eq!(err.to_string(), "terminal: invalid_client");
    assert_eq!(AttemptError::Transient("HTTP 502".into()).kind(), "transient");
}
