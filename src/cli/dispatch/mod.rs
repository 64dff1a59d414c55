//! Command-line argument dispatch and server initialization.
//!
//! Maps validated CLI arguments to the appropriate action, such as starting
//! the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret: auth_opts.token_secret,
        webhook_app_secret: auth_opts.webhook_app_secret,
        webhook_verify_token: auth_opts.webhook_verify_token,
        frontend_base_url: auth_opts.frontend_base_url,
        platform_number: auth_opts.platform_number,
        verification_ttl_seconds: auth_opts.verification_ttl_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars([("KONFIRMI_LOG_LEVEL", None::<String>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec![
                "konfirmi",
                "--dsn",
                "postgres://user@localhost:5432/konfirmi",
                "--token-secret",
                "secret",
                "--webhook-app-secret",
                "app-secret",
                "--webhook-verify-token",
                "verify-token",
                "--platform-number",
                "15550000000",
            ]);
            let action = handler(&matches).expect("handler should succeed");
            let Action::Server(args) = action;
            assert_eq!(args.port, 8080);
            assert_eq!(args.platform_number, "15550000000");
            assert_eq!(args.verification_ttl_seconds, 600);
        });
    }
}
