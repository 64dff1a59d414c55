//! Error taxonomy for the auth and verification endpoints.
//!
//! Client-visible payloads always come from the fixed generic-message table
//! below; the underlying cause (store error codes, validation detail) is
//! logged server-side only. `RateLimited` is the one variant that carries
//! machine-readable data outward, via the `Retry-After` header.

use axum::{
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication required")]
    AuthRequired,
    #[error("invalid credentials")]
    AuthInvalid,
    #[error("cross-binding violation")]
    Unauthorized,
    #[error("validation failed")]
    ValidationFailed,
    #[error("csrf validation failed")]
    CsrfInvalid,
    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
    #[error("record not found")]
    RecordNotFound,
    #[error("record already exists")]
    RecordExists,
    #[error("verification code expired")]
    CodeExpired,
    #[error("upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl AuthError {
    /// Fixed generic message table; never echoes which field or cause failed.
    const fn client_message(&self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication required",
            Self::AuthInvalid => "Invalid credentials",
            Self::Unauthorized => "Not authorized",
            Self::ValidationFailed => "Invalid input",
            Self::CsrfInvalid => "Invalid CSRF token",
            Self::RateLimited { .. } => "Too many requests",
            Self::RecordNotFound => "Not found",
            Self::RecordExists => "Account already exists",
            Self::CodeExpired => "Verification code expired",
            Self::Upstream(_) => "Internal error",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::AuthRequired | Self::AuthInvalid => StatusCode::UNAUTHORIZED,
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::CsrfInvalid => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::RecordNotFound => StatusCode::NOT_FOUND,
            Self::RecordExists => StatusCode::CONFLICT,
            Self::CodeExpired => StatusCode::GONE,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Upstream detail is for the server log only.
        if let Self::Upstream(ref err) = self {
            error!("Upstream failure: {err:#}");
        }

        let status = self.status();
        let message = self.client_message().to_string();

        if let Self::RateLimited {
            retry_after_seconds,
        } = self
        {
            let mut response = (status, message).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            return response;
        }

        (status, message).into_response()
    }
}
