//! Session cookie handling and introspection endpoints.
//!
//! Sessions are stateless: the cookie carries the whole signed claim set and
//! nothing is stored server-side. Missing or invalid cookies are both
//! answered as "no session" so callers cannot probe auth state.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;

use super::csrf::extract_cookie;
use super::state::AuthState;
use super::token::{Claims, TokenKind};
use super::types::SessionResponse;

pub(crate) const AUTH_COOKIE_NAME: &str = "auth_token";

/// Build the `HttpOnly` session cookie for a freshly minted token.
pub(super) fn session_cookie(
    auth_state: &AuthState,
    token: &str,
    kind: TokenKind,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let max_age = auth_state.signer().ttl_seconds(kind);
    HeaderValue::from_str(&format!(
        "{AUTH_COOKIE_NAME}={token}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={max_age}"
    ))
}

fn clear_session_cookie() -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{AUTH_COOKIE_NAME}=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0"
    ))
}

/// Decode and validate the session cookie, if present.
pub(crate) fn authenticate_session(headers: &HeaderMap, auth_state: &AuthState) -> Option<Claims> {
    let token = extract_cookie(headers, AUTH_COOKIE_NAME)?;
    auth_state.signer().verify(&token).ok()
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match authenticate_session(&headers, &auth_state) {
        Some(claims) => (
            StatusCode::OK,
            Json(SessionResponse {
                username: claims.username,
                phone: claims.phone,
                role: claims.role,
                kind: claims.kind,
            }),
        )
            .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout() -> impl IntoResponse {
    // Nothing is stored server-side; clearing the cookie ends the session.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie() {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::test_support::auth_state;
    use super::super::token::TokenKind;
    use super::{AUTH_COOKIE_NAME, authenticate_session, session_cookie};
    use anyhow::{Context, Result};
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn session_cookie_carries_expected_attributes() -> Result<()> {
        let (state, _sender) = auth_state();
        let cookie = session_cookie(&state, "tok", TokenKind::Password)?;
        let value = cookie.to_str()?;
        assert!(value.starts_with("auth_token=tok"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Secure"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("Max-Age=3600"));
        Ok(())
    }

    #[test]
    fn verification_cookie_lives_longer() -> Result<()> {
        let (state, _sender) = auth_state();
        let cookie = session_cookie(&state, "tok", TokenKind::Verification)?;
        assert!(cookie.to_str()?.contains("Max-Age=86400"));
        Ok(())
    }

    #[test]
    fn authenticate_session_round_trips_claims() -> Result<()> {
        let (state, _sender) = auth_state();
        let token = state.signer().mint(
            "X7K2M9",
            "Alice",
            "15551234567",
            "user",
            TokenKind::Verification,
        )?;
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("{AUTH_COOKIE_NAME}={token}"))?,
        );
        let claims =
            authenticate_session(&headers, &state).context("session should authenticate")?;
        assert_eq!(claims.user_id, "X7K2M9");
        assert_eq!(claims.kind, TokenKind::Verification);
        Ok(())
    }

    #[test]
    fn missing_or_garbage_cookie_yields_no_session() {
        let (state, _sender) = auth_state();
        assert!(authenticate_session(&HeaderMap::new(), &state).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("auth_token=not.a.token"),
        );
        assert!(authenticate_session(&headers, &state).is_none());
    }
}
