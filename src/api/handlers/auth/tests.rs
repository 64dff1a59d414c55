//! Cross-module flow tests wiring the in-memory collaborators together the
//! way the handlers do, without a database.

use anyhow::Result;
use axum::http::Method;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::state::test_support::auth_state;
use super::token::TokenKind;
use super::utils::{extract_verification_code, generate_verification_code};
use super::verification::{hash_password, verify_password};

fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[test]
fn signup_cycle_end_to_end() -> Result<()> {
    let (state, _sender) = auth_state();

    // Issue a CSRF pairing and confirm it guards a mutation.
    let csrf = state.csrf().issue(None)?;
    assert!(state.csrf().validate(Some(&csrf), Some(&csrf), &Method::POST));
    assert!(!state.csrf().validate(Some(&csrf), None, &Method::POST));

    // A cycle starts with a fresh code; the user echoes it back inside a
    // free-form message and the webhook path extracts it.
    let code = generate_verification_code();
    let message = format!("hi please verify {} thanks", code.to_lowercase());
    assert_eq!(extract_verification_code(&message), Some(code.clone()));

    // Verified code is exchanged for a verification-grade session.
    let token = state
        .signer()
        .mint(&code, "Alice Smith", "15551234567", "user", TokenKind::Verification)?;
    let claims = state.signer().verify(&token)?;
    assert_eq!(claims.user_id, code);
    assert_eq!(claims.kind, TokenKind::Verification);

    // Password set closes the cycle; the stored hash must round-trip.
    let hash = hash_password("s3cretpw")?;
    assert!(verify_password("s3cretpw", &hash));
    assert!(!verify_password("guess", &hash));
    Ok(())
}

#[test]
fn verification_session_does_not_pass_for_a_different_code() -> Result<()> {
    let (state, _sender) = auth_state();
    let token = state
        .signer()
        .mint("AAA111", "Alice", "15551234567", "user", TokenKind::Verification)?;
    let claims = state.signer().verify(&token)?;
    // Handler-side rule: the embedded code must match the request body.
    assert_ne!(claims.user_id, "X7K2M9");
    assert_eq!(claims.kind, TokenKind::Verification);
    Ok(())
}

#[test]
fn webhook_delivery_gates_and_dedup() -> Result<()> {
    let (state, _sender) = auth_state();
    let body = br#"{"message_id":"m-1","from":"15551234567","text":"X7K2M9"}"#;

    let signature = sign_payload("webhook-app-secret", body);
    assert!(state.webhook().verify_signature(Some(&signature), body));

    // Same body under the wrong key, a tampered body, or a missing header
    // must all fail closed.
    let forged = sign_payload("some-other-secret", body);
    assert!(!state.webhook().verify_signature(Some(&forged), body));
    assert!(!state.webhook().verify_signature(Some(&signature), b"{}"));
    assert!(!state.webhook().verify_signature(None, body));

    // First delivery claims the id; the retry is a duplicate.
    assert!(state.dedup().record("m-1"));
    assert!(!state.dedup().record("m-1"));
    assert!(state.dedup().seen("m-1"));
    Ok(())
}

#[test]
fn webhook_handshake_requires_subscribe_and_token() {
    let (state, _sender) = auth_state();
    assert!(state
        .webhook()
        .handshake_matches(Some("subscribe"), Some("webhook-verify-token")));
    assert!(!state
        .webhook()
        .handshake_matches(Some("subscribe"), Some("wrong")));
    assert!(!state
        .webhook()
        .handshake_matches(Some("unsubscribe"), Some("webhook-verify-token")));
    assert!(!state.webhook().handshake_matches(None, None));
}

#[test]
fn sweep_reclaims_nothing_on_a_fresh_state() {
    let (state, _sender) = auth_state();
    assert_eq!(state.sweep_expired(), 0);
    let _ = state.csrf().issue(None);
    state.dedup().record("m-2");
    // Entries are still live, so the sweep must not evict them.
    assert_eq!(state.sweep_expired(), 0);
    assert!(state.dedup().seen("m-2"));
}
