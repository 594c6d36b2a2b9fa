//! In-memory credential repository shaped like the relational schema: a credentials
//! table, a roles table and a permissions join table. Every public operation holds
//! the write lock for its whole body, which is its transaction.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::credentials::Credentials;
use super::provider::CredentialRepository;
use super::roles::diff_roles;
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone)]
struct CredentialRow {
    login: String,
    passhash: String,
}

#[derive(Debug, Default)]
struct Tables {
    migrated: bool,
    credentials: BTreeMap<i64, CredentialRow>,
    logins: HashMap<String, i64>,
    /// role name -> role id
    roles: HashMap<String, i32>,
    next_role_id: i32,
    /// (credentials id, role id), in grant order
    permissions: Vec<(i64, i32)>,
}

impl Tables {
    fn role_id_or_create(&mut self, role: &str) -> i32 {
        if let Some(id) = self.roles.get(role) { return *id; }
        self.next_role_id += 1;
        let id = self.next_role_id;
        self.roles.insert(role.to_string(), id);
        id
    }

    fn role_name(&self, role_id: i32) -> Option<&str> {
        self.roles.iter().find(|(_, id)| **id == role_id).map(|(name, _)| name.as_str())
    }

    fn roles_of(&self, creds_id: i64) -> Vec<String> {
        self.permissions
            .iter()
            .filter(|(c, _)| *c == creds_id)
            .filter_map(|(_, r)| self.role_name(*r).map(str::to_string))
            .collect()
    }

    fn grant(&mut self, creds_id: i64, role: &str) {
        let role_id = self.role_id_or_create(role);
        if !self.permissions.contains(&(creds_id, role_id)) {
            self.permissions.push((creds_id, role_id));
        }
    }

    fn ungrant(&mut self, creds_id: i64, role: &str) {
        if let Some(role_id) = self.roles.get(role).copied() {
            self.permissions.retain(|p| *p != (creds_id, role_id));
        }
    }

    fn load(&self, creds_id: i64) -> AuthResult<Credentials> {
        let row = self.credentials.get(&creds_id).ok_or(AuthError::CredentialsNotFound)?;
        Ok(Credentials {
            id: creds_id,
            login: row.login.clone(),
            passhash: row.passhash.clone(),
            roles: self.roles_of(creds_id),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialRepository {
    tables: RwLock<Tables>,
}

impl MemoryCredentialRepository {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.tables.read().credentials.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn is_migrated(&self) -> bool { self.tables.read().migrated }
}

#[async_trait]
impl CredentialRepository for MemoryCredentialRepository {
    async fn migrate(&self) -> AuthResult<()> {
        self.tables.write().migrated = true;
        Ok(())
    }

    async fn credentials_by_login(&self, login: &str) -> AuthResult<Credentials> {
        let t = self.tables.read();
        let id = *t.logins.get(login).ok_or(AuthError::CredentialsNotFound)?;
        t.load(id)
    }

    async fn credentials_by_id(&self, id: i64) -> AuthResult<Credentials> {
        self.tables.read().load(id)
    }

    async fn create_credentials(&self, credentials: &Credentials) -> AuthResult<()> {
        let mut t = self.tables.write();
        if t.credentials.contains_key(&credentials.id) || t.logins.contains_key(&credentials.login) {
            return Err(AuthError::CredentialsConflict);
        }
        t.credentials.insert(
            credentials.id,
            CredentialRow { login: credentials.login.clone(), passhash: credentials.passhash.clone() },
        );
        t.logins.insert(credentials.login.clone(), credentials.id);
        for role in &credentials.roles {
            t.grant(credentials.id, role);
        }
        debug!(target: "turnstile::repo", id = credentials.id, login = %credentials.login, "credentials.create");
        Ok(())
    }

    async fn update_credentials(&self, credentials: &Credentials) -> AuthResult<()> {
        let mut t = self.tables.write();
        let prev = t.credentials.get(&credentials.id).cloned().ok_or(AuthError::CredentialsNotFound)?;
        if prev.login != credentials.login {
            if t.logins.contains_key(&credentials.login) {
                return Err(AuthError::CredentialsConflict);
            }
            t.logins.remove(&prev.login);
            t.logins.insert(credentials.login.clone(), credentials.id);
        }
        t.credentials.insert(
            credentials.id,
            CredentialRow { login: credentials.login.clone(), passhash: credentials.passhash.clone() },
        );

        let stored = t.roles_of(credentials.id);
        let (to_delete, to_add) = diff_roles(&stored, &credentials.roles);
        for role in &to_delete {
            t.ungrant(credentials.id, role);
        }
        for role in &to_add {
            t.grant(credentials.id, role);
        }
        debug!(
            target: "turnstile::repo",
            id = credentials.id, removed = ?to_delete, added = ?to_add,
            "credentials.update"
        );
        Ok(())
    }

    async fn delete_credentials(&self, id: i64) -> AuthResult<()> {
        let mut t = self.tables.write();
        t.permissions.retain(|(c, _)| *c != id);
        if let Some(row) = t.credentials.remove(&id) {
            t.logins.remove(&row.login);
        }
        Ok(())
    }
}
