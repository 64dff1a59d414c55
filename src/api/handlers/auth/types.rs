//! Request/response types for auth and verification endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::token::TokenKind;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CsrfResponse {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyStartRequest {
    pub name: String,
    pub phone: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyStartResponse {
    /// Code the caller must message to the platform number.
    pub code: String,
    pub expires_in_seconds: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionExchangeRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetPasswordRequest {
    pub code: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub username: String,
    pub phone: String,
    pub role: String,
    pub kind: TokenKind,
}

/// Inbound webhook payload after signature validation.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebhookInbound {
    pub message_id: String,
    pub from: String,
    pub text: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
