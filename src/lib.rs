//! turnstile: session authentication with pluggable accounts, credential storage
//! and password hashing, plus an optional axum adapter.

pub mod config;
pub mod error;
pub mod identity;
pub mod server;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use identity::{Authenticator, Guard, Session, StepGate};
