use anyhow::{Context, Result};
use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_webhook_args(command);
    with_flow_args(command)
}

fn with_token_args(command: Command) -> Command {
    command.arg(
        Arg::new("token-secret")
            .long("token-secret")
            .help("HMAC secret for session token signing (min 64 chars, high entropy)")
            .env("KONFIRMI_TOKEN_SECRET")
            .required(true),
    )
}

fn with_webhook_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("webhook-app-secret")
                .long("webhook-app-secret")
                .help("Messaging platform app secret for webhook signature verification")
                .env("KONFIRMI_WEBHOOK_APP_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("webhook-verify-token")
                .long("webhook-verify-token")
                .help("Token expected during the webhook subscription handshake")
                .env("KONFIRMI_WEBHOOK_VERIFY_TOKEN")
                .required(true),
        )
}

fn with_flow_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL, used as the only allowed CORS origin")
                .env("KONFIRMI_FRONTEND_BASE_URL")
                .default_value("https://konfirmi.dev"),
        )
        .arg(
            Arg::new("platform-number")
                .long("platform-number")
                .help("Phone number users message their verification code to")
                .env("KONFIRMI_PLATFORM_NUMBER")
                .required(true),
        )
        .arg(
            Arg::new("verification-ttl-seconds")
                .long("verification-ttl-seconds")
                .help("Verification record TTL in seconds")
                .env("KONFIRMI_VERIFICATION_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub token_secret: String,
    pub webhook_app_secret: String,
    pub webhook_verify_token: String,
    pub frontend_base_url: String,
    pub platform_number: String,
    pub verification_ttl_seconds: i64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            token_secret: matches
                .get_one::<String>("token-secret")
                .cloned()
                .context("missing required argument: --token-secret")?,
            webhook_app_secret: matches
                .get_one::<String>("webhook-app-secret")
                .cloned()
                .context("missing required argument: --webhook-app-secret")?,
            webhook_verify_token: matches
                .get_one::<String>("webhook-verify-token")
                .cloned()
                .context("missing required argument: --webhook-verify-token")?,
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            platform_number: matches
                .get_one::<String>("platform-number")
                .cloned()
                .context("missing required argument: --platform-number")?,
            verification_ttl_seconds: matches
                .get_one::<i64>("verification-ttl-seconds")
                .copied()
                .context("missing required argument: --verification-ttl-seconds")?,
        })
    }
}
