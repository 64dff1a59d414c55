//! Inbound webhook authenticity and message handling.
//!
//! Every POST delivery passes four hard gates in order, failing closed:
//! payload size, signature header presence, `sha256=<64 hex>` shape, and an
//! HMAC-SHA-256 digest over the raw body compared in constant time. Failures
//! are answered after an artificial delay to blunt timing-based brute force
//! of the shared secret. The GET handshake (`hub.verify_token` echo) is only
//! for registration with the sending platform and shares nothing with the
//! HMAC path.

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use super::state::AuthState;
use super::storage;
use super::types::{WebhookAck, WebhookInbound};
use super::utils::extract_verification_code;
use crate::api::handlers::auth::rate_limit::RateCategory;

type HmacSha256 = Hmac<Sha256>;

pub(crate) const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";
const SIGNATURE_HEX_LENGTH: usize = 64;
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;
/// Delay before answering a failed authenticity check.
const FAILURE_DELAY: Duration = Duration::from_secs(1);

pub struct WebhookAuthenticator {
    app_secret: String,
    verify_token: String,
    max_payload_bytes: usize,
}

impl WebhookAuthenticator {
    #[must_use]
    pub fn new(app_secret: String, verify_token: String) -> Self {
        Self {
            app_secret,
            verify_token,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    /// Run the four authenticity gates over a raw delivery.
    #[must_use]
    pub fn verify_signature(&self, signature_header: Option<&str>, payload: &[u8]) -> bool {
        if payload.len() > self.max_payload_bytes {
            debug!(size = payload.len(), "webhook payload over size limit");
            return false;
        }

        let Some(header) = signature_header else {
            debug!("webhook signature header missing");
            return false;
        };

        let Some(signature_hex) = header.strip_prefix(SIGNATURE_PREFIX) else {
            debug!("webhook signature header has wrong prefix");
            return false;
        };
        if signature_hex.len() != SIGNATURE_HEX_LENGTH
            || !signature_hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            debug!("webhook signature header has wrong shape");
            return false;
        }
        let Ok(provided) = hex::decode(signature_hex) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(self.app_secret.as_bytes()) else {
            error!("failed to initialize webhook MAC");
            return false;
        };
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        bool::from(expected.ct_eq(&provided))
    }

    /// Subscription handshake: static verify-token match, nothing more.
    #[must_use]
    pub fn handshake_matches(&self, mode: Option<&str>, token: Option<&str>) -> bool {
        mode == Some("subscribe")
            && token.is_some_and(|token| {
                bool::from(token.as_bytes().ct_eq(self.verify_token.as_bytes()))
            })
    }
}

/// Registration handshake with the sending platform.
#[utoipa::path(
    get,
    path = "/v1/auth/webhook",
    params(
        ("hub.mode" = String, Query, description = "Must be 'subscribe'"),
        ("hub.verify_token" = String, Query, description = "Static verify token"),
        ("hub.challenge" = String, Query, description = "Opaque challenge to echo")
    ),
    responses(
        (status = 200, description = "Challenge echoed", body = String),
        (status = 403, description = "Verify token mismatch")
    ),
    tag = "webhook"
)]
pub async fn webhook_verify(
    Query(params): Query<HashMap<String, String>>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if auth_state.webhook().handshake_matches(mode, token) {
        info!("webhook subscription handshake accepted");
        (StatusCode::OK, challenge).into_response()
    } else {
        warn!("webhook subscription handshake rejected");
        (StatusCode::FORBIDDEN, "Forbidden".to_string()).into_response()
    }
}

/// Signed inbound message; drives the `CREATED -> VERIFIED` transition.
#[utoipa::path(
    post,
    path = "/v1/auth/webhook",
    request_body = WebhookInbound,
    params(
        ("x-hub-signature-256" = String, Header, description = "sha256=<hex> HMAC over the raw body")
    ),
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload"),
        (status = 403, description = "Signature rejected"),
        (status = 429, description = "Sender or category quota exceeded")
    ),
    tag = "webhook"
)]
pub async fn webhook_receive(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if !auth_state.webhook().verify_signature(signature, &body) {
        // Slow down secret brute forcing before answering.
        tokio::time::sleep(FAILURE_DELAY).await;
        warn!("webhook delivery failed authenticity check");
        return (StatusCode::FORBIDDEN, "Forbidden".to_string()).into_response();
    }

    let inbound: WebhookInbound = match serde_json::from_slice(&body) {
        Ok(inbound) => inbound,
        Err(err) => {
            debug!("webhook payload failed to parse: {err}");
            return (StatusCode::BAD_REQUEST, "Invalid payload".to_string()).into_response();
        }
    };

    // Retried deliveries are acked without side effects; `record` wins the
    // slot exactly once even under concurrent redelivery.
    if !auth_state.dedup().record(&inbound.message_id) {
        debug!(message_id = %inbound.message_id, "dropping webhook retry");
        return (StatusCode::OK, Json(WebhookAck::ok())).into_response();
    }

    let sender_decision = auth_state.dedup().check_sender(&inbound.from);
    if !sender_decision.allowed {
        warn!(sender = %inbound.from, "sender over message cap");
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string()).into_response();
    }

    let category_decision = auth_state
        .rate_limiter()
        .check(RateCategory::Webhook, &inbound.from);
    if !category_decision.allowed {
        warn!(sender = %inbound.from, "webhook category quota exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string()).into_response();
    }

    let Some(code) = extract_verification_code(&inbound.text) else {
        debug!(sender = %inbound.from, "no verification code in message");
        return (StatusCode::OK, Json(WebhookAck::ok())).into_response();
    };

    let record = match storage::find_verification_by_code(&pool, &code).await {
        Ok(record) => record,
        Err(err) => {
            error!("failed to look up verification code: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
                .into_response();
        }
    };

    let Some(record) = record else {
        // Unknown or expired codes are acked silently; replying would hand
        // an oracle to arbitrary senders.
        info!(sender = %inbound.from, "code does not match an active verification");
        return (StatusCode::OK, Json(WebhookAck::ok())).into_response();
    };

    if record.phone != inbound.from {
        // The code must come from the phone that requested it.
        warn!(sender = %inbound.from, "verification code sent from a different phone");
        return (StatusCode::OK, Json(WebhookAck::ok())).into_response();
    }

    if record.verified {
        // Idempotent: a second verification is a no-op with an informational ack.
        if let Err(err) = auth_state.sender().send(
            &inbound.from,
            "This code is already verified. Return to the page to continue.",
        ) {
            warn!("failed to send already-verified ack: {err}");
        }
        return (StatusCode::OK, Json(WebhookAck::ok())).into_response();
    }

    match storage::mark_verification_verified(&pool, &code).await {
        Ok(true) => {
            info!(phone = %record.phone, "verification code confirmed");
            // A failed reply send after the flip is a soft failure; the flip
            // stands and the send is not retried.
            if let Err(err) = auth_state.sender().send(
                &inbound.from,
                "You're verified! Return to the page to set your password.",
            ) {
                warn!("failed to send verification ack: {err}");
            }
            (StatusCode::OK, Json(WebhookAck::ok())).into_response()
        }
        Ok(false) => {
            // Lost the race to a concurrent delivery; treat as already verified.
            (StatusCode::OK, Json(WebhookAck::ok())).into_response()
        }
        Err(err) => {
            error!("failed to mark verification verified: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HmacSha256, WebhookAuthenticator};
    use hmac::Mac;

    fn authenticator() -> WebhookAuthenticator {
        WebhookAuthenticator::new("app-secret".to_string(), "verify-token".to_string())
    }

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let auth = authenticator();
        let payload = br#"{"message_id":"wamid.1","from":"1555","text":"AB12C3"}"#;
        let header = sign("app-secret", payload);
        assert!(auth.verify_signature(Some(&header), payload));
    }

    #[test]
    fn wrong_secret_fails() {
        let auth = authenticator();
        let payload = b"payload";
        let header = sign("other-secret", payload);
        assert!(!auth.verify_signature(Some(&header), payload));
    }

    #[test]
    fn tampered_payload_fails() {
        let auth = authenticator();
        let header = sign("app-secret", b"original");
        assert!(!auth.verify_signature(Some(&header), b"tampered"));
    }

    #[test]
    fn missing_header_fails() {
        let auth = authenticator();
        assert!(!auth.verify_signature(None, b"payload"));
    }

    #[test]
    fn wrong_shape_fails() {
        let auth = authenticator();
        assert!(!auth.verify_signature(Some("sha1=abcd"), b"payload"));
        assert!(!auth.verify_signature(Some("sha256=tooshort"), b"payload"));
        // Uppercase hex is out of shape even when the digest would match.
        let upper = sign("app-secret", b"payload").to_uppercase();
        assert!(!auth.verify_signature(Some(&upper), b"payload"));
    }

    #[test]
    fn oversized_payload_fails_before_mac() {
        let auth = authenticator().with_max_payload_bytes(8);
        let payload = b"exceeds the configured limit";
        let header = sign("app-secret", payload);
        assert!(!auth.verify_signature(Some(&header), payload));
    }

    #[test]
    fn handshake_requires_subscribe_and_token() {
        let auth = authenticator();
        assert!(auth.handshake_matches(Some("subscribe"), Some("verify-token")));
        assert!(!auth.handshake_matches(Some("subscribe"), Some("wrong")));
        assert!(!auth.handshake_matches(Some("unsubscribe"), Some("verify-token")));
        assert!(!auth.handshake_matches(None, Some("verify-token")));
        assert!(!auth.handshake_matches(Some("subscribe"), None));
    }
}
