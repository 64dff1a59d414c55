//! Database helpers for verification records and user accounts.
//!
//! Expired verification records are inert, never deleted: every lookup
//! filters on `expires_at > NOW()`, so an expired code is indistinguishable
//! from one that never existed.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthConfig;
use super::utils::{generate_verification_code, is_unique_violation};

/// Probes before giving up on an unused code; exhaustion of the code space is
/// a store inconsistency, not a user-facing error.
const CODE_GENERATION_ATTEMPTS: usize = 10;

pub(crate) struct VerificationRecord {
    pub(crate) code: String,
    pub(crate) name: String,
    pub(crate) phone: String,
    pub(crate) verified: bool,
    pub(crate) expires_at: DateTime<Utc>,
}

pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) phone: String,
    pub(crate) name: String,
    pub(crate) password_hash: String,
}

/// Look up an unexpired verification record by code.
pub(crate) async fn find_verification_by_code(
    pool: &PgPool,
    code: &str,
) -> Result<Option<VerificationRecord>> {
    let query = r"
        SELECT code, name, phone, verified, expires_at
        FROM verifications
        WHERE code = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(code)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup verification record")?;

    Ok(row.map(|row| VerificationRecord {
        code: row.get("code"),
        name: row.get("name"),
        phone: row.get("phone"),
        verified: row.get("verified"),
        expires_at: row.get("expires_at"),
    }))
}

/// Insert a fresh verification record with a unique unexpired code.
///
/// The probe-then-insert sequence is not transactional; a duplicate-key
/// failure on insert is treated as a late collision and retried like a
/// probe miss.
pub(crate) async fn insert_verification(
    pool: &PgPool,
    name: &str,
    phone: &str,
    config: &AuthConfig,
) -> Result<VerificationRecord> {
    let query = r"
        INSERT INTO verifications (code, name, phone, verified, expires_at)
        VALUES ($1, $2, $3, FALSE, NOW() + ($4 * INTERVAL '1 second'))
        RETURNING expires_at
    ";

    for _ in 0..CODE_GENERATION_ATTEMPTS {
        let code = generate_verification_code();
        if find_verification_by_code(pool, &code).await?.is_some() {
            continue;
        }

        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&code)
            .bind(name)
            .bind(phone)
            .bind(config.verification_record_ttl_seconds())
            .fetch_one(pool)
            .instrument(span)
            .await;

        match result {
            Ok(row) => {
                return Ok(VerificationRecord {
                    code,
                    name: name.to_string(),
                    phone: phone.to_string(),
                    verified: false,
                    expires_at: row.get("expires_at"),
                });
            }
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert verification record"),
        }
    }

    Err(anyhow!(
        "failed to generate a unique verification code after {CODE_GENERATION_ATTEMPTS} attempts"
    ))
}

/// Flip an unexpired record to verified. Returns `true` only for the caller
/// that performed the flip; a record is never verified twice.
pub(crate) async fn mark_verification_verified(pool: &PgPool, code: &str) -> Result<bool> {
    let query = r"
        UPDATE verifications
        SET verified = TRUE,
            verified_at = NOW()
        WHERE code = $1
          AND verified = FALSE
          AND expires_at > NOW()
        RETURNING code
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(code)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to mark verification verified")?;
    Ok(row.is_some())
}

pub(crate) async fn find_user_by_phone(pool: &PgPool, phone: &str) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, phone, name, password_hash
        FROM users
        WHERE phone = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(phone)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by phone")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        phone: row.get("phone"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
    }))
}

/// Create the account on first password set; later resets update the same
/// row in place. Uniqueness on `phone` is the binding invariant.
pub(crate) async fn upsert_user(
    pool: &PgPool,
    phone: &str,
    name: &str,
    password_hash: &str,
) -> Result<UserRecord> {
    let query = r"
        INSERT INTO users (phone, name, password_hash, verified)
        VALUES ($1, $2, $3, TRUE)
        ON CONFLICT (phone) DO UPDATE
        SET name = EXCLUDED.name,
            password_hash = EXCLUDED.password_hash,
            verified = TRUE,
            updated_at = NOW()
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(phone)
        .bind(name)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to upsert user")?;

    Ok(UserRecord {
        id: row.get("id"),
        phone: phone.to_string(),
        name: name.to_string(),
        password_hash: password_hash.to_string(),
    })
}
