//!
//! turnstile HTTP adapter
//! ----------------------
//! Thin axum layer over the [`Authenticator`]: JSON request bodies in, a session
//! cookie out. Nothing in here holds auth state of its own.
//!
//! Routes:
//! - `POST /signin`        `{login, password}`            sets the session cookie
//! - `POST /signup`        `{account, login, password}`   `account` is handed to the account provider
//! - `POST /signout`       revokes the cookie's session and clears the cookie
//! - `PATCH /roles/grant`  `{account, role}`              admin session required
//! - `PATCH /roles/revoke` `{account, role}`              admin session required
//!
//! [`guarded`] wraps application routes with a [`Guard`]; handlers behind it read
//! the live [`Session`] from request extensions.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_COOKIE_NAME;
use crate::error::{AuthError, AuthResult};
use crate::identity::{Account, Authenticator, Guard, Session};

/// Where the session id travels between client and server.
pub trait SessionCarrier: Send + Sync {
    fn session_id(&self, headers: &HeaderMap) -> Option<String>;
    fn attach(&self, headers: &mut HeaderMap, session: &Session) -> AuthResult<()>;
    fn clear(&self, headers: &mut HeaderMap) -> AuthResult<()>;
}

/// HttpOnly cookie whose `Expires` matches the session expiry.
#[derive(Debug, Clone)]
pub struct CookieCarrier {
    name: String,
    secure: bool,
}

impl Default for CookieCarrier {
    fn default() -> Self { Self::new(DEFAULT_COOKIE_NAME) }
}

impl CookieCarrier {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), secure: false } }

    /// Add the `Secure` attribute (HTTPS deployments).
    pub fn secure(mut self, secure: bool) -> Self { self.secure = secure; self }

    pub fn name(&self) -> &str { &self.name }

    fn cookie(&self, value: &str, expires: DateTime<Utc>) -> AuthResult<HeaderValue> {
        let secure = if self.secure { "; Secure" } else { "" };
        let raw = format!(
            "{}={}; Expires={}; HttpOnly; SameSite=Strict; Path=/{}",
            self.name,
            value,
            expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            secure
        );
        HeaderValue::from_str(&raw).map_err(|e| AuthError::internal(format!("cookie header: {e}")))
    }
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(s) = value.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

impl SessionCarrier for CookieCarrier {
    fn session_id(&self, headers: &HeaderMap) -> Option<String> { parse_cookie(headers, &self.name) }

    fn attach(&self, headers: &mut HeaderMap, session: &Session) -> AuthResult<()> {
        headers.append(header::SET_COOKIE, self.cookie(session.id(), session.expires_at())?);
        Ok(())
    }

    fn clear(&self, headers: &mut HeaderMap) -> AuthResult<()> {
        headers.append(header::SET_COOKIE, self.cookie("deleted", DateTime::<Utc>::UNIX_EPOCH)?);
        Ok(())
    }
}

/// Shared state injected into all handlers.
#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<Authenticator>,
    pub carrier: Arc<dyn SessionCarrier>,
}

impl AuthState {
    pub fn new(auth: Arc<Authenticator>, carrier: Arc<dyn SessionCarrier>) -> Self { Self { auth, carrier } }

    pub fn with_cookie(auth: Arc<Authenticator>, cookie_name: &str) -> Self {
        Self::new(auth, Arc::new(CookieCarrier::new(cookie_name)))
    }
}

/// What a client gets to see of its session. The id stays in the cookie.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub account: i64,
    pub login: String,
    pub roles: Vec<String>,
    pub admin: bool,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(s: &Session) -> Self {
        Self {
            account: s.account().id(),
            login: s.login().to_string(),
            roles: s.roles().to_vec(),
            admin: s.is_admin(),
            issued_at: s.issued_at(),
            expires_at: s.expires_at(),
        }
    }
}

#[derive(Deserialize)]
struct SignInPayload {
    login: String,
    password: String,
}

#[derive(Deserialize)]
struct SignUpPayload {
    #[serde(default)]
    account: JsonValue,
    login: String,
    password: String,
}

#[derive(Deserialize)]
struct RolePayload {
    account: i64,
    role: String,
}

pub fn error_response(err: AuthError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(target: "turnstile::server", error = %err, "request failed");
    } else {
        debug!(target: "turnstile::server", code = err.code(), "request rejected");
    }
    (status, Json(json!({"status": "error", "code": err.code()}))).into_response()
}

fn malformed(rejection: Option<JsonRejection>) -> Response {
    if let Some(r) = rejection {
        debug!(target: "turnstile::server", error = %r, "malformed body");
    }
    (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "code": "malformed_body"}))).into_response()
}

async fn sign_in(State(state): State<AuthState>, body: Result<Json<SignInPayload>, JsonRejection>) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(r) => return malformed(Some(r)),
    };
    let session = match state.auth.sign_in(&state.auth.gate(), &req.login, &req.password).await {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    let mut headers = HeaderMap::new();
    if let Err(e) = state.carrier.attach(&mut headers, &session) {
        return error_response(e);
    }
    (StatusCode::OK, headers, Json(json!({"status": "ok", "session": SessionView::from(&session)}))).into_response()
}

async fn sign_up(State(state): State<AuthState>, body: Result<Json<SignUpPayload>, JsonRejection>) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(r) => return malformed(Some(r)),
    };
    match state.auth.sign_up(&state.auth.gate(), req.account, &req.login, &req.password).await {
        Ok(account) => Json(json!({"status": "ok", "account": account.id()})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn sign_out(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    if let Some(sid) = state.carrier.session_id(&headers) {
        if let Err(e) = state.auth.sign_out(&state.auth.gate(), &sid).await {
            return error_response(e);
        }
    }
    let mut out = HeaderMap::new();
    if let Err(e) = state.carrier.clear(&mut out) {
        return error_response(e);
    }
    (StatusCode::OK, out, Json(json!({"status": "ok"}))).into_response()
}

#[derive(Clone, Copy)]
enum RoleChange {
    Grant,
    Revoke,
}

async fn change_role(
    state: AuthState,
    headers: HeaderMap,
    body: Result<Json<RolePayload>, JsonRejection>,
    change: RoleChange,
) -> Response {
    let Some(sid) = state.carrier.session_id(&headers) else {
        return error_response(AuthError::SessionNotFound);
    };
    let req = match body {
        Ok(Json(req)) if !req.role.is_empty() => req,
        Ok(_) => return malformed(None),
        Err(r) => return malformed(Some(r)),
    };
    let gate = state.auth.gate();
    let res = match change {
        RoleChange::Grant => state.auth.grant_role(&gate, &sid, req.account, &req.role).await,
        RoleChange::Revoke => state.auth.revoke_role(&gate, &sid, req.account, &req.role).await,
    };
    match res {
        Ok(creds) => Json(json!({"status": "ok", "account": creds.id, "roles": creds.roles})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn grant_role(State(state): State<AuthState>, headers: HeaderMap, body: Result<Json<RolePayload>, JsonRejection>) -> Response {
    change_role(state, headers, body, RoleChange::Grant).await
}

async fn revoke_role(State(state): State<AuthState>, headers: HeaderMap, body: Result<Json<RolePayload>, JsonRejection>) -> Response {
    change_role(state, headers, body, RoleChange::Revoke).await
}

/// The authentication endpoints.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/signin", post(sign_in))
        .route("/signup", post(sign_up))
        .route("/signout", post(sign_out))
        .route("/roles/grant", patch(grant_role))
        .route("/roles/revoke", patch(revoke_role))
        .with_state(state)
}

#[derive(Clone)]
struct GuardState {
    guard: Guard,
    carrier: Arc<dyn SessionCarrier>,
}

async fn guard_layer(State(gs): State<GuardState>, mut req: Request, next: Next) -> Response {
    let Some(sid) = gs.carrier.session_id(req.headers()) else {
        return error_response(AuthError::SessionNotFound);
    };
    match gs.guard.check(&sid) {
        Ok(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Err(e) => error_response(e),
    }
}

/// Put `routes` behind `guard`: 401 without a live session, 403 when the guard's
/// predicate rejects it. Handlers can take `Extension<Session>`.
pub fn guarded(routes: Router, state: &AuthState, guard: Guard) -> Router {
    let gs = GuardState { guard, carrier: state.carrier.clone() };
    routes.route_layer(middleware::from_fn_with_state(gs, guard_layer))
}

/// `GET /me`-style handler: echoes the guarded session.
pub async fn whoami(axum::Extension(session): axum::Extension<Session>) -> Json<SessionView> {
    Json(SessionView::from(&session))
}

/// Serve `app` until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(target: "turnstile::server", %addr, "HTTP listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!(target: "turnstile::server", "HTTP stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{BasicAccount, Credentials};
    use std::time::Duration;

    fn session() -> Session {
        let creds = Arc::new(Credentials::new(5, "eve", "h").with_roles(["user"]));
        Session::issue(Arc::new(BasicAccount { id: 5 }), creds, Duration::from_secs(60), false).unwrap()
    }

    #[test]
    fn parse_cookie_picks_named_value() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("a=1; sid=abc=; b=2"));
        assert_eq!(parse_cookie(&h, "sid").as_deref(), Some("abc="));
        assert_eq!(parse_cookie(&h, "b").as_deref(), Some("2"));
        assert_eq!(parse_cookie(&h, "missing"), None);
    }

    #[test]
    fn attach_sets_http_only_cookie_with_expiry() {
        let carrier = CookieCarrier::new("sid");
        let s = session();
        let mut h = HeaderMap::new();
        carrier.attach(&mut h, &s).unwrap();
        let v = h.get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(v.starts_with(&format!("sid={};", s.id())));
        assert!(v.contains("HttpOnly"));
        assert!(v.contains(&s.expires_at().format("%d %b %Y").to_string()));
        assert!(!v.contains("Secure"));

        let mut back = HeaderMap::new();
        back.insert(header::COOKIE, HeaderValue::from_str(&format!("sid={}", s.id())).unwrap());
        assert_eq!(carrier.session_id(&back).as_deref(), Some(s.id()));
    }

    #[test]
    fn clear_expires_in_the_past() {
        let carrier = CookieCarrier::new("sid").secure(true);
        let mut h = HeaderMap::new();
        carrier.clear(&mut h).unwrap();
        let v = h.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(v.starts_with("sid=deleted;"));
        assert!(v.contains("Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(v.ends_with("; Secure"));
    }

    #[test]
    fn session_view_hides_the_id() {
        let view = serde_json::to_value(SessionView::from(&session())).unwrap();
        assert_eq!(view["account"], 5);
        assert_eq!(view["login"], "eve");
        assert_eq!(view["roles"], json!(["user"]));
        assert!(view.get("id").is_none());
    }

    #[test]
    fn error_response_uses_mapped_status() {
        assert_eq!(error_response(AuthError::CredentialsMismatch).status(), StatusCode::FORBIDDEN);
        assert_eq!(error_response(AuthError::SessionExpired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_response(AuthError::internal("x")).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
