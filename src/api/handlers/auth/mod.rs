//! Phone-message verification and session lifecycle.
//!
//! A signup or password-reset cycle creates a short-lived verification
//! record, an inbound platform message flips it to verified, and the client
//! exchanges the verified code for a signed session cookie. Everything the
//! flow needs sits behind [`state::AuthState`]: token signing, CSRF
//! issuance, rate limiting, inbound-message dedup, and webhook
//! authentication.

pub mod csrf;
pub mod dedup;
pub mod error;
pub mod kv;
pub mod messaging;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod storage;
pub mod token;
pub mod types;
pub mod utils;
pub mod verification;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use csrf::issue_csrf;
pub use session::{logout, session};
pub use state::{AuthConfig, AuthState, spawn_sweeper};
pub use verification::{login, session_exchange, set_password, verify_start};
pub use webhook::{webhook_receive, webhook_verify};
