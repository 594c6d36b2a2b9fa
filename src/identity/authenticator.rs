//! Sign-in, sign-up, sign-out, session validation and role mutation.
//!
//! Every multi-step operation takes a [`StepGate`] and checks it before each step,
//! in particular before every call into a collaborator. Nothing here serialises a
//! whole sign-in or sign-up: two concurrent sign-ups for one login can both pass
//! the conflict check (the repository's unique login is the backstop), and two
//! concurrent sign-ins for one login can both survive until the next sign-in.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::credentials::{Account, AdminIdentity, AdminSecret, Credentials, SharedAccount};
use super::hasher::Argon2Hasher;
use super::provider::{AccountProvider, CredentialRepository, CredentialValidator, PasswordHasher};
use super::session::{short_id, MemorySessionStore, Session, SessionStore};
use super::steps::StepGate;
use super::sweeper::ExpirySweeper;
use super::validator::DefaultValidator;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

pub struct Authenticator {
    accounts: Arc<dyn AccountProvider>,
    repository: Arc<dyn CredentialRepository>,
    hasher: Arc<dyn PasswordHasher>,
    validator: Arc<dyn CredentialValidator>,
    store: Arc<dyn SessionStore>,
    admin: Option<AdminIdentity>,
    ttl: Duration,
    cleanup_interval: Duration,
    default_roles: Vec<String>,
    /// Hash compared against on unknown logins so they cost the same as a wrong password.
    decoy: OnceCell<String>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

const DECOY_PASSWORD: &str = "turnstile-decoy";

pub struct AuthenticatorBuilder {
    accounts: Arc<dyn AccountProvider>,
    repository: Arc<dyn CredentialRepository>,
    hasher: Option<Arc<dyn PasswordHasher>>,
    validator: Option<Arc<dyn CredentialValidator>>,
    store: Option<Arc<dyn SessionStore>>,
    config: AuthConfig,
}

impl AuthenticatorBuilder {
    pub fn config(mut self, config: AuthConfig) -> Self { self.config = config; self }
    pub fn hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self { self.hasher = Some(hasher); self }
    pub fn validator(mut self, validator: Arc<dyn CredentialValidator>) -> Self { self.validator = Some(validator); self }
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self { self.store = Some(store); self }

    /// Missing collaborators fall back to Argon2, non-empty validation and an in-memory store.
    pub fn build(self) -> Authenticator {
        let config = self.config.normalized();
        Authenticator {
            accounts: self.accounts,
            repository: self.repository,
            hasher: self.hasher.unwrap_or_else(|| Arc::new(Argon2Hasher::new())),
            validator: self.validator.unwrap_or_else(|| Arc::new(DefaultValidator)),
            store: self.store.unwrap_or_else(|| Arc::new(MemorySessionStore::new())),
            admin: config.admin,
            ttl: config.ttl,
            cleanup_interval: config.cleanup_interval,
            default_roles: config.default_roles,
            decoy: OnceCell::new(),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }
}

/// Turn a lookup into an existence check: found is a conflict, not-found is fine.
fn ensure_absent<T>(lookup: AuthResult<T>) -> AuthResult<()> {
    match lookup {
        Ok(_) => Err(AuthError::CredentialsConflict),
        Err(AuthError::CredentialsNotFound) => Ok(()),
        Err(e) => Err(e),
    }
}

impl Authenticator {
    pub fn builder(accounts: Arc<dyn AccountProvider>, repository: Arc<dyn CredentialRepository>) -> AuthenticatorBuilder {
        AuthenticatorBuilder { accounts, repository, hasher: None, validator: None, store: None, config: AuthConfig::default() }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> { &self.store }
    pub fn ttl(&self) -> Duration { self.ttl }
    pub fn cleanup_interval(&self) -> Duration { self.cleanup_interval }

    /// Gate for one request: closed when the authenticator shuts down.
    pub fn gate(&self) -> StepGate { StepGate::with_token(self.shutdown.child_token()) }

    /// Prepare the credential schema, warm the decoy hash and start the expiry
    /// sweeper (once).
    pub async fn open(&self) -> AuthResult<()> {
        self.repository.migrate().await?;
        self.decoy_hash().await?;
        let mut slot = self.sweeper.lock();
        if slot.is_none() {
            let sweeper = ExpirySweeper::new(self.store.clone(), self.cleanup_interval);
            *slot = Some(sweeper.spawn(self.shutdown.child_token()));
            info!(
                target: "turnstile::auth",
                ttl_secs = self.ttl.as_secs(), cleanup_secs = self.cleanup_interval.as_secs(),
                "authenticator opened"
            );
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool { self.sweeper.lock().is_some() }

    /// Stop the sweeper and close every outstanding request gate.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(target: "turnstile::auth", error = %e, "sweeper task ended abnormally");
            }
        }
    }

    pub async fn sign_in(&self, gate: &StepGate, login: &str, password: &str) -> AuthResult<Session> {
        if login.is_empty() || password.is_empty() {
            return Err(AuthError::BadCredentials);
        }

        let revoked = gate.run(|| self.revoke_login(login))?;
        if revoked > 0 {
            debug!(target: "turnstile::auth", login, revoked, "previous sessions revoked");
        }

        if let Some(admin) = self.admin.as_ref().filter(|a| a.login == login) {
            let matches = gate.step(async { Ok::<_, AuthError>(self.admin_password_matches(admin, password).await) }).await?;
            if matches {
                return self.sign_in_as_admin(gate, admin);
            }
        }

        // unknown login and wrong password look the same to the caller, in result and in cost
        let credentials = match gate.step(self.repository.credentials_by_login(login)).await {
            Ok(c) => c,
            Err(AuthError::CredentialsNotFound) => {
                gate.step(self.compare_decoy(password)).await?;
                debug!(target: "turnstile::auth", login, "sign-in for unknown login");
                return Err(AuthError::CredentialsMismatch);
            }
            Err(e) => return Err(e),
        };
        let account = gate.step(self.accounts.account_by_id(credentials.id)).await?;
        let matches = gate.step(async { Ok::<_, AuthError>(self.hasher.compare(&credentials.passhash, password).await) }).await?;
        if !matches {
            return Err(AuthError::CredentialsMismatch);
        }

        let session = Session::issue(account, Arc::new(credentials), self.ttl, false)?;
        gate.run(|| self.store.create(session.clone()))?;
        info!(target: "turnstile::auth", login, sid = short_id(session.id()), "auth.signin");
        Ok(session)
    }

    async fn admin_password_matches(&self, admin: &AdminIdentity, password: &str) -> bool {
        match &admin.secret {
            AdminSecret::Plain(expected) => expected == password,
            AdminSecret::Hashed(hash) => self.hasher.compare(hash, password).await,
        }
    }

    async fn decoy_hash(&self) -> AuthResult<&String> {
        self.decoy.get_or_try_init(|| self.hasher.hash(DECOY_PASSWORD)).await
    }

    async fn compare_decoy(&self, password: &str) -> AuthResult<()> {
        let hash = self.decoy_hash().await?;
        let _ = self.hasher.compare(hash, password).await;
        Ok(())
    }

    fn sign_in_as_admin(&self, gate: &StepGate, admin: &AdminIdentity) -> AuthResult<Session> {
        let session = Session::issue(admin.account.clone(), Arc::new(admin.credentials()), self.ttl, true)?;
        gate.run(|| self.store.create(session.clone()))?;
        info!(target: "turnstile::auth", login = %admin.login, sid = short_id(session.id()), "auth.signin(admin)");
        Ok(session)
    }

    /// Revoke every live session held by `login`.
    fn revoke_login(&self, login: &str) -> AuthResult<usize> {
        let mut revoked = 0usize;
        self.store.for_each(&mut |s| {
            if s.login() != login {
                return Ok(());
            }
            self.store.revoke(s.id())?;
            revoked += 1;
            Ok(())
        })?;
        Ok(revoked)
    }

    /// Register credentials for a new application account. If anything fails after
    /// the account exists, the account is deleted again (best effort) and the
    /// original error is returned.
    pub async fn sign_up(&self, gate: &StepGate, payload: JsonValue, login: &str, password: &str) -> AuthResult<SharedAccount> {
        gate.run(|| {
            if self.validator.validate(login, password) { Ok(()) } else { Err(AuthError::BadCredentials) }
        })?;
        // the admin login is reserved; sharing it would make each sign-in evict the other
        if self.admin.as_ref().is_some_and(|a| a.login == login) {
            return Err(AuthError::CredentialsConflict);
        }

        let account = gate.step(self.accounts.create_account(payload)).await?;
        let account_id = account.id();

        if let Err(err) = self.register_credentials(gate, account_id, login, password).await {
            // rollback is not bound to the caller's gate: it must run even after cancellation
            match self.accounts.delete_account(account_id).await {
                Ok(()) => debug!(target: "turnstile::auth", account_id, cause = %err, "sign-up rolled back"),
                Err(rollback) => warn!(
                    target: "turnstile::auth",
                    account_id, cause = %err, error = %rollback,
                    "sign-up rollback failed; account left behind"
                ),
            }
            return Err(err);
        }

        info!(target: "turnstile::auth", login, account_id, "auth.signup");
        Ok(account)
    }

    async fn register_credentials(&self, gate: &StepGate, account_id: i64, login: &str, password: &str) -> AuthResult<()> {
        ensure_absent(gate.step(self.repository.credentials_by_id(account_id)).await)?;
        ensure_absent(gate.step(self.repository.credentials_by_login(login)).await)?;
        let passhash = gate.step(self.hasher.hash(password)).await?;
        let credentials = Credentials::new(account_id, login, passhash).with_roles(self.default_roles.iter().cloned());
        gate.step(self.repository.create_credentials(&credentials)).await
    }

    /// Revoke a session. Unknown ids are not an error.
    pub async fn sign_out(&self, gate: &StepGate, session_id: &str) -> AuthResult<()> {
        if self.store.count() == 0 {
            return Ok(());
        }
        gate.run(|| self.store.revoke(session_id))?;
        debug!(target: "turnstile::auth", sid = short_id(session_id), "auth.signout");
        Ok(())
    }

    /// Resolve a live session. An expired one is revoked in the background and
    /// reported as `SessionExpired`.
    pub fn session(&self, session_id: &str) -> AuthResult<Session> {
        if self.store.count() == 0 {
            return Err(AuthError::SessionNotFound);
        }
        let session = self.store.invoke(session_id)?;
        if !session.is_expired_at(Utc::now()) {
            return Ok(session);
        }
        self.revoke_detached(session_id);
        Err(AuthError::SessionExpired)
    }

    fn revoke_detached(&self, session_id: &str) {
        let store = self.store.clone();
        let id = session_id.to_string();
        let revoke = move || {
            if let Err(e) = store.revoke(&id) {
                warn!(target: "turnstile::auth", sid = short_id(&id), error = %e, "lazy expiry revoke failed");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => { handle.spawn(async move { revoke() }); }
            Err(_) => revoke(),
        }
    }

    /// Add `role` to the credentials of `account_id`. Requires an admin session.
    pub async fn grant_role(&self, gate: &StepGate, acting_session: &str, account_id: i64, role: &str) -> AuthResult<Credentials> {
        self.mutate_roles(gate, acting_session, account_id, |c| {
            if c.has_role(role) {
                return Err(AuthError::RoleConflict);
            }
            c.roles.push(role.to_string());
            Ok(true)
        })
        .await
    }

    /// Remove `role` from the credentials of `account_id`; absent roles are a no-op.
    pub async fn revoke_role(&self, gate: &StepGate, acting_session: &str, account_id: i64, role: &str) -> AuthResult<Credentials> {
        self.mutate_roles(gate, acting_session, account_id, |c| {
            let before = c.roles.len();
            c.roles.retain(|r| r != role);
            Ok(c.roles.len() != before)
        })
        .await
    }

    async fn mutate_roles<F>(&self, gate: &StepGate, acting_session: &str, account_id: i64, edit: F) -> AuthResult<Credentials>
    where
        F: FnOnce(&mut Credentials) -> AuthResult<bool> + Send,
    {
        let actor = gate.run(|| self.session(acting_session))?;
        if !actor.is_admin() {
            return Err(AuthError::AccessDenied);
        }

        let mut credentials = gate.step(self.repository.credentials_by_id(account_id)).await?;
        if !edit(&mut credentials)? {
            return Ok(credentials);
        }
        gate.step(self.repository.update_credentials(&credentials)).await?;

        let snapshot = Arc::new(credentials);
        let refreshed = gate.run(|| self.propagate(&snapshot))?;
        info!(
            target: "turnstile::auth",
            account_id, roles = ?snapshot.roles, refreshed,
            "auth.roles updated"
        );
        Ok(Credentials::clone(&snapshot))
    }

    /// Swap the credentials snapshot of every live session of that account.
    fn propagate(&self, credentials: &Arc<Credentials>) -> AuthResult<usize> {
        let mut refreshed = 0usize;
        self.store.for_each(&mut |s| {
            if s.credentials().id != credentials.id {
                return Ok(());
            }
            if self.store.replace(s.with_credentials(credentials.clone()))? {
                refreshed += 1;
            }
            Ok(())
        })?;
        Ok(refreshed)
    }
}

impl Drop for Authenticator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "authenticator_tests.rs"]
mod authenticator_tests;
