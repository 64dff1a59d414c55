//! Small helpers for verification codes, input validation, and caller
//! fingerprinting.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{Rng, RngCore, rngs::OsRng};
use regex::Regex;

const CODE_LENGTH: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const USER_AGENT_FINGERPRINT_LENGTH: usize = 32;

/// Draw a 6-character candidate from {A-Z, 0-9} containing at least one
/// letter and one digit. Rejection sampling keeps the distribution uniform
/// over the admissible codes.
#[must_use]
pub fn generate_verification_code() -> String {
    let mut rng = OsRng;
    loop {
        let code: String = (0..CODE_LENGTH)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect();
        if code.chars().any(|c| c.is_ascii_alphabetic())
            && code.chars().any(|c| c.is_ascii_digit())
        {
            return code;
        }
    }
}

/// Scan message text for the first whitespace-delimited 6-character run with
/// both a letter and a digit. Plain words and pure numbers never match.
#[must_use]
pub fn extract_verification_code(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|word| {
            word.len() == CODE_LENGTH
                && word.chars().all(|c| c.is_ascii_alphanumeric())
                && word.chars().any(|c| c.is_ascii_alphabetic())
                && word.chars().any(|c| c.is_ascii_digit())
        })
        .map(str::to_uppercase)
}

/// Display names: 2-100 chars, letters, spaces, hyphens, apostrophes.
#[must_use]
pub fn valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    (2..=100).contains(&trimmed.chars().count())
        && Regex::new(r"^[\p{L} '\-]+$").is_ok_and(|re| re.is_match(trimmed))
}

/// E.164-like digit strings, 10-15 digits, optional leading `+` stripped by
/// [`normalize_phone`] before validation.
#[must_use]
pub fn valid_phone(phone: &str) -> bool {
    Regex::new(r"^[0-9]{10,15}$").is_ok_and(|re| re.is_match(phone))
}

#[must_use]
pub fn normalize_phone(phone: &str) -> String {
    phone.trim().trim_start_matches('+').replace([' ', '-'], "")
}

/// Random session identifier for password-backed sessions. The raw value only
/// ever lives inside the signed token.
///
/// # Errors
/// Returns an error if the system randomness source fails.
pub fn generate_session_id() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session id")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(crate) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Caller fingerprint: forwarded IP plus a truncated user-agent. A heuristic
/// for quota bucketing, not an identity.
pub(crate) fn client_fingerprint(headers: &axum::http::HeaderMap) -> String {
    let ip = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let truncated: String = user_agent
        .chars()
        .take(USER_AGENT_FINGERPRINT_LENGTH)
        .collect();
    format!("{ip}|{truncated}")
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
