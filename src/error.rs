//! Authentication error taxonomy shared by the core and the HTTP adapter.
//! Every variant is a recoverable, caller-visible outcome; collaborator failures
//! that are not a known not-found case collapse into `Internal`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("bad credentials")]
    BadCredentials,
    #[error("credentials mismatch")]
    CredentialsMismatch,
    #[error("credentials not found")]
    CredentialsNotFound,
    #[error("credentials already exists")]
    CredentialsConflict,
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("access denied")]
    AccessDenied,
    #[error("role already exists")]
    RoleConflict,
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("internal: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn internal<S: Into<String>>(msg: S) -> Self { AuthError::Internal(msg.into()) }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::BadCredentials => "bad_credentials",
            AuthError::CredentialsMismatch => "credentials_mismatch",
            AuthError::CredentialsNotFound => "credentials_not_found",
            AuthError::CredentialsConflict => "credentials_conflict",
            AuthError::SessionNotFound => "session_not_found",
            AuthError::SessionExpired => "session_expired",
            AuthError::AccessDenied => "access_denied",
            AuthError::RoleConflict => "role_conflict",
            AuthError::Cancelled => "cancelled",
            AuthError::DeadlineExceeded => "deadline_exceeded",
            AuthError::Internal(_) => "internal",
        }
    }

    /// Map to HTTP status code.
    /// Unknown login and wrong password share 403 so callers cannot enumerate users.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::BadCredentials => 400,
            AuthError::CredentialsNotFound | AuthError::CredentialsMismatch => 403,
            AuthError::CredentialsConflict | AuthError::RoleConflict => 409,
            AuthError::SessionNotFound | AuthError::SessionExpired => 401,
            AuthError::AccessDenied => 403,
            AuthError::Cancelled | AuthError::DeadlineExceeded => 503,
            AuthError::Internal(_) => 500,
        }
    }

    /// True for the outcomes a guard reports as "not authenticated".
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AuthError::SessionNotFound | AuthError::SessionExpired)
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        // Typed auth errors wrapped by a collaborator keep their identity
        match err.downcast::<AuthError>() {
            Ok(auth) => auth,
            Err(other) => AuthError::Internal(format!("{:#}", other)),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
