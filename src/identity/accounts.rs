use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::credentials::{Account, SharedAccount};
use super::provider::AccountProvider;
use crate::error::{AuthError, AuthResult};

/// Account created from a sign-up payload; the payload is kept as the profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileAccount {
    pub id: i64,
    pub profile: JsonValue,
}

impl Account for ProfileAccount {
    fn id(&self) -> i64 { self.id }
}

/// Process-local account provider with sequential ids, used by the demo binary
/// and as a stand-in when the host application has no account system yet.
#[derive(Debug)]
pub struct MemoryAccountProvider {
    accounts: RwLock<BTreeMap<i64, Arc<ProfileAccount>>>,
    next_id: RwLock<i64>,
}

impl Default for MemoryAccountProvider {
    fn default() -> Self { Self::starting_at(1) }
}

impl MemoryAccountProvider {
    pub fn new() -> Self { Self::default() }

    /// Ids are handed out from `first_id` upwards.
    pub fn starting_at(first_id: i64) -> Self {
        Self { accounts: RwLock::new(BTreeMap::new()), next_id: RwLock::new(first_id) }
    }

    /// Register an account under a fixed id, replacing any previous one.
    pub fn insert(&self, id: i64, profile: JsonValue) -> Arc<ProfileAccount> {
        let account = Arc::new(ProfileAccount { id, profile });
        self.accounts.write().insert(id, account.clone());
        let mut next = self.next_id.write();
        if *next <= id { *next = id + 1; }
        account
    }

    pub fn contains(&self, id: i64) -> bool { self.accounts.read().contains_key(&id) }

    pub fn len(&self) -> usize { self.accounts.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl AccountProvider for MemoryAccountProvider {
    async fn create_account(&self, payload: JsonValue) -> AuthResult<SharedAccount> {
        let id = {
            let mut next = self.next_id.write();
            let id = *next;
            *next += 1;
            id
        };
        let account = Arc::new(ProfileAccount { id, profile: payload });
        self.accounts.write().insert(id, account.clone());
        Ok(account)
    }

    async fn account_by_id(&self, id: i64) -> AuthResult<SharedAccount> {
        self.accounts
            .read()
            .get(&id)
            .cloned()
            .map(|a| a as SharedAccount)
            .ok_or_else(|| AuthError::internal(format!("account {id} not found")))
    }

    async fn delete_account(&self, id: i64) -> AuthResult<()> {
        self.accounts.write().remove(&id);
        Ok(())
    }
}
