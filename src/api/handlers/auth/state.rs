//! Auth configuration and shared request state.

use std::sync::Arc;
use std::time::Duration;

use super::csrf::CsrfGuard;
use super::dedup::MessageDedupGuard;
use super::messaging::MessageSender;
use super::rate_limit::RateLimiter;
use super::token::TokenSigner;
use super::webhook::WebhookAuthenticator;

const DEFAULT_ISSUER: &str = "konfirmi";
const DEFAULT_AUDIENCE: &str = "konfirmi-web";
const DEFAULT_VERIFICATION_RECORD_TTL_SECONDS: i64 = 10 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    platform_number: String,
    issuer: String,
    audience: String,
    verification_record_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, platform_number: String) -> Self {
        Self {
            frontend_base_url,
            platform_number,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            verification_record_ttl_seconds: DEFAULT_VERIFICATION_RECORD_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_verification_record_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_record_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Number users message their verification code to.
    #[must_use]
    pub fn platform_number(&self) -> &str {
        &self.platform_number
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn verification_record_ttl_seconds(&self) -> i64 {
        self.verification_record_ttl_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    signer: TokenSigner,
    csrf: CsrfGuard,
    rate_limiter: Arc<dyn RateLimiter>,
    dedup: MessageDedupGuard,
    webhook: WebhookAuthenticator,
    sender: Arc<dyn MessageSender>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        signer: TokenSigner,
        rate_limiter: Arc<dyn RateLimiter>,
        webhook: WebhookAuthenticator,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            config,
            signer,
            csrf: CsrfGuard::new(),
            rate_limiter,
            dedup: MessageDedupGuard::new(),
            webhook,
            sender,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    #[must_use]
    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    #[must_use]
    pub fn dedup(&self) -> &MessageDedupGuard {
        &self.dedup
    }

    #[must_use]
    pub fn webhook(&self) -> &WebhookAuthenticator {
        &self.webhook
    }

    pub(super) fn sender(&self) -> &dyn MessageSender {
        self.sender.as_ref()
    }

    /// Drop expired CSRF pairings, dedup entries, and rolled-over rate-limit
    /// windows.
    pub fn sweep_expired(&self) -> usize {
        self.csrf.sweep_expired()
            + self.dedup.sweep_expired()
            + self.rate_limiter.sweep_expired()
    }
}

/// Spawn the background sweep for the ephemeral auth maps.
pub fn spawn_sweeper(state: Arc<AuthState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let removed = state.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "swept expired auth entries");
            }
        }
    });
}
