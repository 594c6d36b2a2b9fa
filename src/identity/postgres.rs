//! PostgreSQL credential repository (feature `postgres`).
//!
//! Three tables: `turnstile_creds`, `turnstile_roles` and the join table
//! `turnstile_permissions`. Every repository call runs in its own transaction.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Transaction};
use tracing::{debug, error};

use super::credentials::Credentials;
use super::provider::CredentialRepository;
use super::roles::diff_roles;
use crate::error::{AuthError, AuthResult};

const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS turnstile_roles (
    role_id SERIAL PRIMARY KEY,
    role_name VARCHAR(60) NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS turnstile_creds (
    creds_id BIGINT PRIMARY KEY,
    creds_login VARCHAR(60) NOT NULL UNIQUE,
    creds_passhash VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS turnstile_permissions (
    creds_id BIGINT NOT NULL REFERENCES turnstile_creds(creds_id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES turnstile_roles(role_id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (creds_id, role_id)
);
"#;

fn db_err(e: tokio_postgres::Error) -> AuthError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return AuthError::CredentialsConflict;
    }
    AuthError::internal(format!("postgres: {e}"))
}

pub struct PostgresCredentialRepository {
    client: Mutex<Client>,
}

impl PostgresCredentialRepository {
    pub fn new(client: Client) -> Self { Self { client: Mutex::new(client) } }

    /// Connect without TLS and drive the connection on a background task.
    pub async fn connect(dsn: &str) -> AuthResult<Self> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls).await.map_err(db_err)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(target: "turnstile::repo", error = %e, "postgres connection error");
            }
        });
        Ok(Self::new(client))
    }
}

async fn role_id(tx: &Transaction<'_>, role: &str) -> AuthResult<i32> {
    let row = tx
        .query_one(
            "INSERT INTO turnstile_roles (role_name) VALUES ($1) \
             ON CONFLICT (role_name) DO UPDATE SET role_name = EXCLUDED.role_name \
             RETURNING role_id",
            &[&role],
        )
        .await
        .map_err(db_err)?;
    Ok(row.get(0))
}

async fn grant(tx: &Transaction<'_>, creds_id: i64, role: &str) -> AuthResult<()> {
    let rid = role_id(tx, role).await?;
    tx.execute(
        "INSERT INTO turnstile_permissions (creds_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        &[&creds_id, &rid],
    )
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn ungrant(tx: &Transaction<'_>, creds_id: i64, role: &str) -> AuthResult<()> {
    tx.execute(
        "DELETE FROM turnstile_permissions USING turnstile_roles \
         WHERE turnstile_permissions.creds_id = $1 \
           AND turnstile_permissions.role_id = turnstile_roles.role_id \
           AND turnstile_roles.role_name = $2",
        &[&creds_id, &role],
    )
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn roles_of(tx: &Transaction<'_>, creds_id: i64) -> AuthResult<Vec<String>> {
    let rows = tx
        .query(
            "SELECT r.role_name FROM turnstile_permissions p \
             JOIN turnstile_roles r ON p.role_id = r.role_id \
             WHERE p.creds_id = $1 ORDER BY p.created_at, r.role_id",
            &[&creds_id],
        )
        .await
        .map_err(db_err)?;
    Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
}

async fn load(tx: &Transaction<'_>, column: &str, key: &(dyn tokio_postgres::types::ToSql + Sync)) -> AuthResult<Credentials> {
    let sql = format!("SELECT creds_id, creds_login, creds_passhash FROM turnstile_creds WHERE {column} = $1");
    let row = tx.query_opt(sql.as_str(), &[key]).await.map_err(db_err)?.ok_or(AuthError::CredentialsNotFound)?;
    let id: i64 = row.get(0);
    Ok(Credentials { id, login: row.get(1), passhash: row.get(2), roles: roles_of(tx, id).await? })
}

#[async_trait]
impl CredentialRepository for PostgresCredentialRepository {
    async fn migrate(&self) -> AuthResult<()> {
        self.client.lock().await.batch_execute(MIGRATION).await.map_err(db_err)?;
        debug!(target: "turnstile::repo", "postgres schema ready");
        Ok(())
    }

    async fn credentials_by_login(&self, login: &str) -> AuthResult<Credentials> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(db_err)?;
        let creds = load(&tx, "creds_login", &login).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(creds)
    }

    async fn credentials_by_id(&self, id: i64) -> AuthResult<Credentials> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(db_err)?;
        let creds = load(&tx, "creds_id", &id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(creds)
    }

    async fn create_credentials(&self, credentials: &Credentials) -> AuthResult<()> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(db_err)?;
        tx.execute(
            "INSERT INTO turnstile_creds (creds_id, creds_login, creds_passhash) VALUES ($1, $2, $3)",
            &[&credentials.id, &credentials.login, &credentials.passhash],
        )
        .await
        .map_err(db_err)?;
        for role in &credentials.roles {
            grant(&tx, credentials.id, role).await?;
        }
        tx.commit().await.map_err(db_err)?;
        debug!(target: "turnstile::repo", id = credentials.id, login = %credentials.login, "credentials.create");
        Ok(())
    }

    async fn update_credentials(&self, credentials: &Credentials) -> AuthResult<()> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(db_err)?;
        let updated = tx
            .execute(
                "UPDATE turnstile_creds SET creds_login = $1, creds_passhash = $2, updated_at = now() WHERE creds_id = $3",
                &[&credentials.login, &credentials.passhash, &credentials.id],
            )
            .await
            .map_err(db_err)?;
        if updated == 0 {
            return Err(AuthError::CredentialsNotFound);
        }
        let stored = roles_of(&tx, credentials.id).await?;
        let (to_delete, to_add) = diff_roles(&stored, &credentials.roles);
        for role in &to_delete {
            ungrant(&tx, credentials.id, role).await?;
        }
        for role in &to_add {
            grant(&tx, credentials.id, role).await?;
        }
        tx.commit().await.map_err(db_err)?;
        debug!(
            target: "turnstile::repo",
            id = credentials.id, removed = ?to_delete, added = ?to_add,
            "credentials.update"
        );
        Ok(())
    }

    async fn delete_credentials(&self, id: i64) -> AuthResult<()> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(db_err)?;
        tx.execute("DELETE FROM turnstile_permissions WHERE creds_id = $1", &[&id]).await.map_err(db_err)?;
        tx.execute("DELETE FROM turnstile_creds WHERE creds_id = $1", &[&id]).await.map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
