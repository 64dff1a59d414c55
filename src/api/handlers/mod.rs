//! Route handlers for the konfirmi API.

pub mod auth;
pub mod health;
pub mod root;

pub use self::health::health;
pub use self::root::root;
