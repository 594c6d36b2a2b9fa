use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use turnstile::identity::{AccountProvider, CredentialRepository, Guard, MemoryAccountProvider, MemoryCredentialRepository};
use turnstile::server::{self, AuthState};
use turnstile::{AuthConfig, Authenticator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AuthConfig::from_env().context("reading TURNSTILE_* configuration")?;
    let http_port: u16 = match std::env::var("TURNSTILE_HTTP_PORT") {
        Ok(v) => v.trim().parse().with_context(|| format!("TURNSTILE_HTTP_PORT: invalid port '{}'", v))?,
        Err(_) => 7979,
    };
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "turnstile",
        "turnstile starting: RUST_LOG='{}', http_port={}, ttl={:?}, cleanup_interval={:?}, admin={}",
        rust_log, http_port, config.ttl, config.cleanup_interval, config.admin.is_some()
    );

    let accounts: Arc<dyn AccountProvider> = Arc::new(MemoryAccountProvider::new());
    let repository = credential_repository().await?;
    let cookie_name = config.cookie_name.clone();
    let auth = Arc::new(Authenticator::builder(accounts, repository).config(config).build());
    auth.open().await.context("opening authenticator")?;

    let state = AuthState::with_cookie(auth.clone(), &cookie_name);
    let me = server::guarded(Router::new().route("/me", get(server::whoami)), &state, Guard::allow_all(auth.clone()));
    let app = Router::new()
        .route("/", get(|| async { "turnstile ok" }))
        .merge(server::router(state))
        .merge(me);

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!(target: "turnstile", "shutting down");
        on_signal.cancel();
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", http_port)).await?;
    server::serve(listener, app, shutdown).await?;
    auth.shutdown().await;
    Ok(())
}

#[cfg(feature = "postgres")]
async fn credential_repository() -> anyhow::Result<Arc<dyn CredentialRepository>> {
    if let Ok(dsn) = std::env::var("TURNSTILE_PG_DSN") {
        let repo = turnstile::identity::PostgresCredentialRepository::connect(&dsn)
            .await
            .context("connecting to TURNSTILE_PG_DSN")?;
        info!(target: "turnstile", "credentials stored in postgres");
        return Ok(Arc::new(repo));
    }
    Ok(Arc::new(MemoryCredentialRepository::new()))
}

#[cfg(not(feature = "postgres"))]
async fn credential_repository() -> anyhow::Result<Arc<dyn CredentialRepository>> {
    Ok(Arc::new(MemoryCredentialRepository::new()))
}
