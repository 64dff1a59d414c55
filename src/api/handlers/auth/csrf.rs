//! Double-submit CSRF protection.
//!
//! A random 128-hex-char value is set as an `HttpOnly` cookie and returned in
//! the response body; mutating requests must echo it in the `x-csrf-token`
//! header. Validation is pure equality under constant-time comparison and is
//! deliberately independent of the session token, because the very first
//! signup call must already be protected.

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use rand::{RngCore, rngs::OsRng};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::error;

use super::kv::TtlMap;
use super::state::AuthState;
use super::types::CsrfResponse;

pub(crate) const CSRF_COOKIE_NAME: &str = "csrf-token";
pub(crate) const CSRF_HEADER_NAME: &str = "x-csrf-token";
const CSRF_TOKEN_HEX_LENGTH: usize = 128;
const DEFAULT_CSRF_TTL: Duration = Duration::from_secs(10 * 60);

pub struct CsrfGuard {
    issued: TtlMap<String, ()>,
    ttl: Duration,
}

impl CsrfGuard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            issued: TtlMap::new(),
            ttl: DEFAULT_CSRF_TTL,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub(crate) fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Issue a token, reusing a still-valid cookie value so repeated issuance
    /// does not invalidate in-flight forms.
    ///
    /// # Errors
    /// Returns an error if the system randomness source fails.
    pub fn issue(&self, existing_cookie: Option<&str>) -> Result<String> {
        if let Some(existing) = existing_cookie {
            if existing.len() == CSRF_TOKEN_HEX_LENGTH && self.issued.get(&existing.to_string()).is_some() {
                return Ok(existing.to_string());
            }
        }

        let mut bytes = [0u8; 64];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate CSRF token")?;
        let token = hex::encode(bytes);
        self.issued.insert(token.clone(), (), self.ttl);
        Ok(token)
    }

    /// Validate the cookie/header pairing for the given method. Side-effect
    /// free methods always pass; mutating methods require both values present
    /// and byte-equal. Absence of either is a failure, never an implicit pass.
    #[must_use]
    pub fn validate(&self, cookie: Option<&str>, header: Option<&str>, method: &Method) -> bool {
        if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
            return true;
        }
        let (Some(cookie), Some(header)) = (cookie, header) else {
            return false;
        };
        if cookie.is_empty() || header.is_empty() {
            return false;
        }
        bool::from(cookie.as_bytes().ct_eq(header.as_bytes()))
    }

    pub fn sweep_expired(&self) -> usize {
        self.issued.sweep_expired()
    }
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a named cookie value from the request headers.
pub(crate) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

/// Validate the double-submit pairing for a request; shared by every
/// mutating handler.
pub(crate) fn validate_request(state: &AuthState, headers: &HeaderMap, method: &Method) -> bool {
    let cookie = extract_cookie(headers, CSRF_COOKIE_NAME);
    let header = headers
        .get(CSRF_HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state
        .csrf()
        .validate(cookie.as_deref(), header.as_deref(), method)
}

fn csrf_cookie(token: &str, ttl_seconds: u64) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{CSRF_COOKIE_NAME}={token}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={ttl_seconds}"
    ))
}

/// Issue a CSRF pairing: cookie plus body copy for the companion header.
#[utoipa::path(
    get,
    path = "/v1/auth/csrf",
    responses(
        (status = 200, description = "CSRF token issued", body = CsrfResponse),
        (status = 500, description = "Token generation failed")
    ),
    tag = "auth"
)]
pub async fn issue_csrf(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let existing = extract_cookie(&headers, CSRF_COOKIE_NAME);
    let token = match auth_state.csrf().issue(existing.as_deref()) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue CSRF token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match csrf_cookie(&token, auth_state.csrf().ttl_seconds()) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build CSRF cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(CsrfResponse { token }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::{CSRF_COOKIE_NAME, CsrfGuard, extract_cookie};
    use anyhow::Result;
    use axum::http::{HeaderMap, HeaderValue, Method};
    use std::time::Duration;

    #[test]
    fn issue_returns_128_hex_chars() -> Result<()> {
        let guard = CsrfGuard::new();
        let token = guard.issue(None)?;
        assert_eq!(token.len(), 128);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn issue_reuses_valid_cookie() -> Result<()> {
        let guard = CsrfGuard::new();
        let first = guard.issue(None)?;
        let second = guard.issue(Some(&first))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn issue_replaces_unknown_or_expired_cookie() -> Result<()> {
        let guard = CsrfGuard::new().with_ttl(Duration::ZERO);
        let first = guard.issue(None)?;
        // Entry expired immediately, so the value must be replaced.
        let second = guard.issue(Some(&first))?;
        assert_ne!(first, second);

        let guard = CsrfGuard::new();
        let forged = "0".repeat(128);
        let issued = guard.issue(Some(&forged))?;
        assert_ne!(issued, forged);
        Ok(())
    }

    #[test]
    fn validate_passes_safe_methods() {
        let guard = CsrfGuard::new();
        assert!(guard.validate(None, None, &Method::GET));
        assert!(guard.validate(None, None, &Method::HEAD));
        assert!(guard.validate(None, None, &Method::OPTIONS));
    }

    #[test]
    fn validate_requires_matching_pair_for_mutations() {
        let guard = CsrfGuard::new();
        assert!(guard.validate(Some("tok"), Some("tok"), &Method::POST));
        assert!(!guard.validate(Some("tok"), Some("other"), &Method::POST));
        assert!(!guard.validate(Some("tok"), None, &Method::POST));
        assert!(!guard.validate(None, Some("tok"), &Method::POST));
        assert!(!guard.validate(None, None, &Method::DELETE));
        assert!(!guard.validate(Some(""), Some(""), &Method::POST));
    }

    #[test]
    fn extract_cookie_parses_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("a=1; csrf-token=deadbeef; b=2"),
        );
        assert_eq!(
            extract_cookie(&headers, CSRF_COOKIE_NAME),
            Some("deadbeef".to_string())
        );
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }
}
