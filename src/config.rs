//! Authenticator configuration: defaults plus `TURNSTILE_*` environment loading.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::identity::{AdminIdentity, BasicAccount};

pub const DEFAULT_TTL: Duration = Duration::from_secs(8 * 60 * 60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_COOKIE_NAME: &str = "turnstile_session";
/// Upper bound for every configured duration; timers past it overflow.
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Session lifetime applied at issuance.
    pub ttl: Duration,
    /// Period between proactive expiry sweeps.
    pub cleanup_interval: Duration,
    pub admin: Option<AdminIdentity>,
    /// Roles every new credential record starts with.
    pub default_roles: Vec<String>,
    pub cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            admin: None,
            default_roles: Vec::new(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }
}

impl AuthConfig {
    /// Replace zero durations and an empty cookie name with the defaults, and cap
    /// durations at [`MAX_DURATION`].
    pub fn normalized(mut self) -> Self {
        if self.ttl.is_zero() { self.ttl = DEFAULT_TTL; }
        if self.cleanup_interval.is_zero() { self.cleanup_interval = DEFAULT_CLEANUP_INTERVAL; }
        self.ttl = self.ttl.min(MAX_DURATION);
        self.cleanup_interval = self.cleanup_interval.min(MAX_DURATION);
        if self.cookie_name.is_empty() { self.cookie_name = DEFAULT_COOKIE_NAME.to_string(); }
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self { self.ttl = ttl; self }
    pub fn with_cleanup_interval(mut self, ci: Duration) -> Self { self.cleanup_interval = ci; self }
    pub fn with_admin(mut self, admin: AdminIdentity) -> Self { self.admin = Some(admin); self }
    pub fn with_default_roles<I: IntoIterator<Item = S>, S: Into<String>>(mut self, roles: I) -> Self {
        self.default_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_env() -> Result<Self> { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = AuthConfig::default();
        if let Some(v) = get("TURNSTILE_SESSION_TTL_SECS") {
            cfg.ttl = parse_secs("TURNSTILE_SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = get("TURNSTILE_CLEANUP_INTERVAL_SECS") {
            cfg.cleanup_interval = parse_secs("TURNSTILE_CLEANUP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("TURNSTILE_DEFAULT_ROLES") {
            cfg.default_roles = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
        }
        if let Some(v) = get("TURNSTILE_COOKIE") {
            cfg.cookie_name = v;
        }
        if let Some(login) = get("TURNSTILE_ADMIN_LOGIN").filter(|s| !s.is_empty()) {
            let account_id = match get("TURNSTILE_ADMIN_ACCOUNT_ID") {
                Some(v) => v.trim().parse::<i64>().with_context(|| format!("TURNSTILE_ADMIN_ACCOUNT_ID: invalid integer '{}'", v))?,
                None => 0,
            };
            let account = Arc::new(BasicAccount { id: account_id });
            cfg.admin = match (get("TURNSTILE_ADMIN_PASSHASH"), get("TURNSTILE_ADMIN_PASSWORD")) {
                (Some(hash), _) if !hash.is_empty() => Some(AdminIdentity::hashed(login, hash, account)),
                (_, Some(pw)) if !pw.is_empty() => Some(AdminIdentity::plain(login, pw, account)),
                _ => anyhow::bail!("TURNSTILE_ADMIN_LOGIN set without TURNSTILE_ADMIN_PASSWORD or TURNSTILE_ADMIN_PASSHASH"),
            };
        }
        Ok(cfg.normalized())
    }
}

fn parse_secs(key: &str, v: &str) -> Result<Duration> {
    let secs = v.trim().parse::<u64>().with_context(|| format!("{}: invalid integer '{}'", key, v))?;
    let d = Duration::from_secs(secs);
    if d > MAX_DURATION {
        anyhow::bail!("{}: {} seconds exceeds the maximum of {}", key, secs, MAX_DURATION.as_secs());
    }
    Ok(d)
}
