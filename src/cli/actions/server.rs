use crate::api;
use crate::api::handlers::auth::{
    AuthConfig, AuthState,
    messaging::LogMessageSender,
    rate_limit::{RateLimiter, SlidingWindowLimiter},
    token::{SigningSecret, TokenSigner},
    webhook::WebhookAuthenticator,
};
use anyhow::{Context, Result};
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: String,
    pub webhook_app_secret: String,
    pub webhook_verify_token: String,
    pub frontend_base_url: String,
    pub platform_number: String,
    pub verification_ttl_seconds: i64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing secret fails the policy check or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // Weak secrets are a deploy mistake, refuse to start with one.
    let secret = SigningSecret::new(&args.token_secret)
        .context("token secret rejected by the signing policy")?;

    let config = AuthConfig::new(args.frontend_base_url, args.platform_number)
        .with_verification_record_ttl_seconds(args.verification_ttl_seconds);
    let signer = TokenSigner::new(
        secret,
        config.issuer().to_string(),
        config.audience().to_string(),
    );
    let webhook = WebhookAuthenticator::new(args.webhook_app_secret, args.webhook_verify_token);
    let limiter: Arc<dyn RateLimiter> = Arc::new(SlidingWindowLimiter::new());

    let auth_state = Arc::new(AuthState::new(
        config,
        signer,
        limiter,
        webhook,
        Arc::new(LogMessageSender),
    ));

    api::new(args.port, args.dsn, auth_state).await
}
