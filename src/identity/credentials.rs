use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Application-side account object. The core only needs its stable id; everything
/// else stays opaque and is handed back to the application through the session.
pub trait Account: Debug + Send + Sync {
    fn id(&self) -> i64;
}

pub type SharedAccount = Arc<dyn Account>;

/// Minimal account carrying nothing but its id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAccount {
    pub id: i64,
}

impl Account for BasicAccount {
    fn id(&self) -> i64 { self.id }
}

/// Stored identity record: one per account, `login` unique across records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub id: i64,
    pub login: String,
    pub passhash: String,
    pub roles: Vec<String>,
}

impl Credentials {
    pub fn new(id: i64, login: impl Into<String>, passhash: impl Into<String>) -> Self {
        Self { id, login: login.into(), passhash: passhash.into(), roles: Vec::new() }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool { self.roles.iter().any(|r| r == role) }
}

/// How the superuser password is checked.
#[derive(Clone, PartialEq, Eq)]
pub enum AdminSecret {
    /// Compared verbatim against the supplied password; the hasher is never consulted.
    Plain(String),
    /// Pre-hashed secret verified through the configured `PasswordHasher`.
    Hashed(String),
}

impl Debug for AdminSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminSecret::Plain(_) => f.write_str("Plain(<redacted>)"),
            AdminSecret::Hashed(_) => f.write_str("Hashed(<redacted>)"),
        }
    }
}

/// Configured superuser. Lives outside the credential repository.
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub login: String,
    pub secret: AdminSecret,
    pub account: SharedAccount,
}

impl AdminIdentity {
    pub const ROLE: &'static str = "admin";
    /// Credentials id used for the synthesized admin session.
    pub const CREDENTIALS_ID: i64 = 0;

    pub fn plain(login: impl Into<String>, password: impl Into<String>, account: SharedAccount) -> Self {
        Self { login: login.into(), secret: AdminSecret::Plain(password.into()), account }
    }

    pub fn hashed(login: impl Into<String>, passhash: impl Into<String>, account: SharedAccount) -> Self {
        Self { login: login.into(), secret: AdminSecret::Hashed(passhash.into()), account }
    }

    pub(crate) fn credentials(&self) -> Credentials {
        Credentials::new(Self::CREDENTIALS_ID, self.login.clone(), String::new()).with_roles([Self::ROLE])
    }
}
