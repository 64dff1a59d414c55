//! Verification flow endpoints: code issuance, session exchange, password
//! set, and password login.
//!
//! State machine: `CREATED -> VERIFIED -> PASSWORD_SET`. Records are created
//! here, flipped to verified by the webhook path, and exchanged for signed
//! session cookies by the client. A fresh `CREATED` cycle is used for
//! password resets; the account row is updated in place, keyed by phone.

use anyhow::{Context, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, Method, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use super::csrf;
use super::error::AuthError;
use super::rate_limit::RateCategory;
use super::session::{authenticate_session, session_cookie};
use super::state::AuthState;
use super::storage;
use super::token::TokenKind;
use super::types::{
    LoginRequest, SessionExchangeRequest, SessionResponse, SetPasswordRequest, VerifyStartRequest,
    VerifyStartResponse,
};
use super::utils::{
    client_fingerprint, generate_session_id, normalize_phone, valid_name, valid_phone,
};

const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_PASSWORD_LENGTH: usize = 128;
const DEFAULT_ROLE: &str = "user";

/// Hash a password with an adaptive-cost function.
pub(super) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

pub(super) fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

fn require_csrf(state: &AuthState, headers: &HeaderMap, method: &Method) -> Result<(), AuthError> {
    if csrf::validate_request(state, headers, method) {
        Ok(())
    } else {
        Err(AuthError::CsrfInvalid)
    }
}

fn require_quota(
    state: &AuthState,
    category: RateCategory,
    fingerprint: &str,
) -> Result<(), AuthError> {
    let decision = state.rate_limiter().check(category, fingerprint);
    if decision.allowed {
        Ok(())
    } else {
        warn!(
            category = category.as_str(),
            fingerprint = %fingerprint,
            "request over quota"
        );
        Err(AuthError::RateLimited {
            retry_after_seconds: decision.retry_after_seconds.unwrap_or(1),
        })
    }
}

/// Start a verification cycle: create a record and hand the code back for
/// the caller to message to the platform number.
#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyStartRequest,
    responses(
        (status = 200, description = "Verification record created", body = VerifyStartResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "CSRF failure"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn verify_start(
    method: Method,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyStartRequest>>,
) -> Result<Response, AuthError> {
    require_csrf(&auth_state, &headers, &method)?;
    let fingerprint = client_fingerprint(&headers);
    require_quota(&auth_state, RateCategory::PasswordReset, &fingerprint)?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::ValidationFailed);
    };
    let name = request.name.trim().to_string();
    let phone = normalize_phone(&request.phone);
    if !valid_name(&name) || !valid_phone(&phone) {
        // Which field failed is deliberately not echoed.
        return Err(AuthError::ValidationFailed);
    }

    let record = storage::insert_verification(&pool, &name, &phone, auth_state.config())
        .await
        .context("verification record creation failed")?;

    info!(phone = %record.phone, "verification cycle started");
    Ok((
        StatusCode::OK,
        Json(VerifyStartResponse {
            code: record.code,
            expires_in_seconds: auth_state.config().verification_record_ttl_seconds(),
        }),
    )
        .into_response())
}

/// Exchange a verified code for a session cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/session",
    request_body = SessionExchangeRequest,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 403, description = "CSRF failure"),
        (status = 404, description = "Code unknown, expired, or unverified"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn session_exchange(
    method: Method,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SessionExchangeRequest>>,
) -> Result<Response, AuthError> {
    require_csrf(&auth_state, &headers, &method)?;
    let fingerprint = client_fingerprint(&headers);
    require_quota(&auth_state, RateCategory::Auth, &fingerprint)?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::ValidationFailed);
    };
    let code = request.code.trim().to_uppercase();
    if code.len() != 6 {
        return Err(AuthError::ValidationFailed);
    }

    // Unknown, expired, and unverified codes are all answered identically.
    let record = storage::find_verification_by_code(&pool, &code)
        .await
        .context("code lookup failed")?
        .filter(|record| record.verified)
        .ok_or(AuthError::RecordNotFound)?;

    let token = auth_state
        .signer()
        .mint(
            &record.code,
            &record.name,
            &record.phone,
            DEFAULT_ROLE,
            TokenKind::Verification,
        )
        .context("token minting failed")?;

    respond_with_session(&auth_state, &token, TokenKind::Verification, &record.name, &record.phone)
}

/// Set (or reset) the account password; terminal transition of the flow.
#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = SetPasswordRequest,
    responses(
        (status = 200, description = "Password set, session re-issued", body = SessionResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "CSRF failure or cross-session code mismatch"),
        (status = 410, description = "Verification record expired"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn set_password(
    method: Method,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SetPasswordRequest>>,
) -> Result<Response, AuthError> {
    require_csrf(&auth_state, &headers, &method)?;
    let fingerprint = client_fingerprint(&headers);
    require_quota(&auth_state, RateCategory::Auth, &fingerprint)?;

    let claims = authenticate_session(&headers, &auth_state).ok_or(AuthError::AuthRequired)?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::ValidationFailed);
    };
    let code = request.code.trim().to_uppercase();
    // The session must have been minted for this exact code; a valid session
    // for some other code must not set this account's password.
    if claims.kind != TokenKind::Verification || claims.user_id != code {
        return Err(AuthError::Unauthorized);
    }

    let password_length = request.password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password_length) {
        return Err(AuthError::ValidationFailed);
    }

    // The session can outlive the record; a gone record means the 10-minute
    // verification window has lapsed and the cycle must restart.
    let record = storage::find_verification_by_code(&pool, &code)
        .await
        .context("code lookup failed")?
        .filter(|record| record.verified)
        .ok_or(AuthError::CodeExpired)?;

    let password_hash = hash_password(&request.password)?;
    let user = storage::upsert_user(&pool, &record.phone, &record.name, &password_hash)
        .await
        .context("account upsert failed")?;

    let session_id = generate_session_id()?;
    let token = auth_state
        .signer()
        .mint(
            &session_id,
            &user.name,
            &user.phone,
            DEFAULT_ROLE,
            TokenKind::Password,
        )
        .context("token minting failed")?;

    info!(phone = %user.phone, "password set, session upgraded");
    respond_with_session(&auth_state, &token, TokenKind::Password, &user.name, &user.phone)
}

/// Password login for an existing account.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "CSRF failure"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn login(
    method: Method,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, AuthError> {
    require_csrf(&auth_state, &headers, &method)?;
    let fingerprint = client_fingerprint(&headers);
    require_quota(&auth_state, RateCategory::Auth, &fingerprint)?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::ValidationFailed);
    };
    let phone = normalize_phone(&request.phone);
    if !valid_phone(&phone) || request.password.is_empty() {
        // Malformed input gets the same answer as wrong credentials.
        return Err(AuthError::AuthInvalid);
    }

    // Unknown phone and wrong password are indistinguishable; no lockout
    // state is kept or leaked.
    let user = storage::find_user_by_phone(&pool, &phone)
        .await
        .context("account lookup failed")?
        .ok_or(AuthError::AuthInvalid)?;
    if !verify_password(&request.password, &user.password_hash) {
        return Err(AuthError::AuthInvalid);
    }

    let session_id = generate_session_id()?;
    let token = auth_state
        .signer()
        .mint(
            &session_id,
            &user.name,
            &user.phone,
            DEFAULT_ROLE,
            TokenKind::Password,
        )
        .context("token minting failed")?;

    info!(phone = %user.phone, "password login succeeded");
    respond_with_session(&auth_state, &token, TokenKind::Password, &user.name, &user.phone)
}

fn respond_with_session(
    auth_state: &AuthState,
    token: &str,
    kind: TokenKind,
    username: &str,
    phone: &str,
) -> Result<Response, AuthError> {
    let mut response_headers = HeaderMap::new();
    let cookie = session_cookie(auth_state, token, kind)
        .map_err(|err| AuthError::Upstream(anyhow!("failed to build session cookie: {err}")))?;
    response_headers.insert(SET_COOKIE, cookie);

    Ok((
        StatusCode::OK,
        response_headers,
        Json(SessionResponse {
            username: username.to_string(),
            phone: phone.to_string(),
            role: DEFAULT_ROLE.to_string(),
            kind,
        }),
    )
        .into_response())
}
