//! # Konfirmi
//!
//! `konfirmi` verifies account ownership over a phone-messaging platform and
//! manages the resulting browser sessions.
//!
//! ## Verification flow
//!
//! A signup or password-reset request creates a short-lived verification
//! record with a random six-character code. The user messages that code to
//! the platform number; the platform delivers it back to us through a signed
//! webhook, which flips the record to verified. The client then exchanges
//! the verified code for a signed session cookie and finishes by setting a
//! password.
//!
//! ## Security posture
//!
//! - Session tokens are HMAC-SHA256 signed with an explicit `kind` claim;
//!   a pre-password verification session can never pass for a full one.
//! - Mutating endpoints require a double-submit CSRF pairing.
//! - Webhook deliveries are authenticated with `X-Hub-Signature-256` under
//!   constant-time comparison, deduplicated by message id, and rate limited
//!   per sender.
//! - Failed logins, unknown phones, and unknown codes all produce the same
//!   generic answers so the API leaks no account-existence oracle.

pub mod api;
pub mod cli;

#[cfg(test)]
mod tests {
    use crate::api::{APP_USER_AGENT, GIT_COMMIT_HASH};

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains('/'));
    }
}
