//! Collaborator contracts the authenticator is built from. Implementations are
//! injected at construction; the core never reaches past these traits.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::credentials::{Credentials, SharedAccount};
use crate::error::AuthResult;

/// Application account lifecycle.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// Create an account from the application-specific sign-up payload.
    async fn create_account(&self, payload: JsonValue) -> AuthResult<SharedAccount>;
    async fn account_by_id(&self, id: i64) -> AuthResult<SharedAccount>;
    async fn delete_account(&self, id: i64) -> AuthResult<()>;
}

/// Credential persistence. Each call is its own transactional boundary; lookups
/// that find nothing return `AuthError::CredentialsNotFound`.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Idempotent schema initialisation.
    async fn migrate(&self) -> AuthResult<()>;
    async fn credentials_by_login(&self, login: &str) -> AuthResult<Credentials>;
    async fn credentials_by_id(&self, id: i64) -> AuthResult<Credentials>;
    async fn create_credentials(&self, credentials: &Credentials) -> AuthResult<()>;
    /// Rewrite login/passhash and reconcile the stored role set with `credentials.roles`.
    async fn update_credentials(&self, credentials: &Credentials) -> AuthResult<()>;
    async fn delete_credentials(&self, id: i64) -> AuthResult<()>;
}

#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, password: &str) -> AuthResult<String>;
    async fn compare(&self, hash: &str, password: &str) -> bool;
}

/// Policy hook applied to sign-up input.
pub trait CredentialValidator: Send + Sync {
    fn validate(&self, login: &str, password: &str) -> bool;
}
