//! Session-based access checks for application code.

use std::fmt;
use std::sync::Arc;

use super::authenticator::Authenticator;
use super::credentials::AdminIdentity;
use super::session::Session;
use crate::error::{AuthError, AuthResult};

type Predicate = Arc<dyn Fn(&Session) -> bool + Send + Sync>;

/// Resolves a session id and applies a predicate to the live session.
#[derive(Clone)]
pub struct Guard {
    auth: Arc<Authenticator>,
    predicate: Predicate,
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Guard") }
}

impl Guard {
    pub fn new(auth: Arc<Authenticator>, predicate: impl Fn(&Session) -> bool + Send + Sync + 'static) -> Self {
        Self { auth, predicate: Arc::new(predicate) }
    }

    /// Any live session passes.
    pub fn allow_all(auth: Arc<Authenticator>) -> Self { Self::new(auth, |_| true) }

    pub fn has_role(auth: Arc<Authenticator>, role: impl Into<String>) -> Self {
        let role = role.into();
        Self::new(auth, move |s| s.has_role(&role))
    }

    pub fn any_role<I, S>(auth: Arc<Authenticator>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        Self::new(auth, move |s| roles.iter().any(|r| s.has_role(r)))
    }

    pub fn admin_only(auth: Arc<Authenticator>) -> Self {
        Self::new(auth, |s| s.is_admin() || s.has_role(AdminIdentity::ROLE))
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> { &self.auth }

    /// Session errors pass through unchanged; a failed predicate is `AccessDenied`.
    pub fn check(&self, session_id: &str) -> AuthResult<Session> {
        let session = self.auth.session(session_id)?;
        if (self.predicate)(&session) { Ok(session) } else { Err(AuthError::AccessDenied) }
    }
}
