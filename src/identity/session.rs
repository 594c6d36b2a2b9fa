use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::credentials::{Credentials, SharedAccount};
use crate::error::{AuthError, AuthResult};

pub type SessionId = String;

/// One authenticated context. Immutable once issued: role changes replace the whole
/// session in the store with a copy carrying a fresh credentials snapshot.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    account: SharedAccount,
    credentials: Arc<Credentials>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    admin: bool,
}

fn gen_id() -> AuthResult<SessionId> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| AuthError::internal(format!("session id entropy: {e}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Leading characters of a session id, safe to put in logs.
pub(crate) fn short_id(id: &str) -> &str { id.get(..8).unwrap_or(id) }

impl Session {
    /// Issue a fresh session with a random id, `expires_at = now + ttl`.
    pub fn issue(account: SharedAccount, credentials: Arc<Credentials>, ttl: Duration, admin: bool) -> AuthResult<Self> {
        let ttl = TimeDelta::from_std(ttl).map_err(|_| AuthError::internal("session ttl out of range"))?;
        if ttl <= TimeDelta::zero() {
            return Err(AuthError::internal("session ttl must be positive"));
        }
        let issued_at = Utc::now();
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::internal("session expiry overflows"))?;
        Ok(Self { id: gen_id()?, account, credentials, issued_at, expires_at, admin })
    }

    /// Same session, new authorization snapshot.
    pub fn with_credentials(&self, credentials: Arc<Credentials>) -> Self {
        Self { credentials, ..self.clone() }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn account(&self) -> &SharedAccount { &self.account }
    pub fn credentials(&self) -> &Arc<Credentials> { &self.credentials }
    pub fn login(&self) -> &str { &self.credentials.login }
    pub fn roles(&self) -> &[String] { &self.credentials.roles }
    pub fn has_role(&self, role: &str) -> bool { self.credentials.has_role(role) }
    pub fn issued_at(&self) -> DateTime<Utc> { self.issued_at }
    pub fn expires_at(&self) -> DateTime<Utc> { self.expires_at }
    pub fn is_admin(&self) -> bool { self.admin }

    /// A session is dead once `expires_at <= at`.
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool { self.expires_at <= at }
}

/// Keyed container of live sessions.
///
/// Lookups never check expiry; that is the caller's job. `for_each` walks a
/// point-in-time snapshot without holding any lock, so the callback may create or
/// revoke sessions. Entries changed concurrently may or may not be visited.
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite by id. No uniqueness check on login.
    fn create(&self, session: Session) -> AuthResult<()>;
    fn invoke(&self, id: &str) -> AuthResult<Session>;
    /// Remove if present. Absence is not an error.
    fn revoke(&self, id: &str) -> AuthResult<()>;
    fn count(&self) -> usize;
    fn reset(&self) -> AuthResult<()>;
    fn snapshot(&self) -> Vec<Session>;

    /// Overwrite a session that is still present. Returns false, and stores
    /// nothing, when the id has been revoked in the meantime.
    fn replace(&self, session: Session) -> AuthResult<bool> {
        match self.invoke(session.id()) {
            Ok(_) => self.create(session).map(|_| true),
            Err(AuthError::SessionNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Visit every session of a snapshot; the first callback error stops the walk.
    fn for_each(&self, f: &mut dyn FnMut(&Session) -> AuthResult<()>) -> AuthResult<()> {
        for session in self.snapshot() {
            f(&session)?;
        }
        Ok(())
    }
}

/// Process-local store: readers share the lock, writers take it exclusively.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self { Self::default() }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, session: Session) -> AuthResult<()> {
        debug!(target: "turnstile::session", sid = short_id(session.id()), login = session.login(), "session.create");
        self.sessions.write().insert(session.id.clone(), session);
        Ok(())
    }

    fn invoke(&self, id: &str) -> AuthResult<Session> {
        self.sessions.read().get(id).cloned().ok_or(AuthError::SessionNotFound)
    }

    fn revoke(&self, id: &str) -> AuthResult<()> {
        if self.sessions.write().remove(id).is_some() {
            debug!(target: "turnstile::session", sid = short_id(id), "session.revoke");
        }
        Ok(())
    }

    fn count(&self) -> usize { self.sessions.read().len() }

    fn reset(&self) -> AuthResult<()> {
        self.sessions.write().clear();
        Ok(())
    }

    fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    fn replace(&self, session: Session) -> AuthResult<bool> {
        match self.sessions.write().get_mut(session.id()) {
            Some(slot) => {
                *slot = session;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod session_tests;
