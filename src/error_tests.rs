use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AuthError::BadCredentials.http_status(), 400);
    assert_eq!(AuthError::CredentialsNotFound.http_status(), 403);
    assert_eq!(AuthError::CredentialsMismatch.http_status(), 403);
    assert_eq!(AuthError::CredentialsConflict.http_status(), 409);
    assert_eq!(AuthError::RoleConflict.http_status(), 409);
    assert_eq!(AuthError::SessionNotFound.http_status(), 401);
    assert_eq!(AuthError::SessionExpired.http_status(), 401);
    assert_eq!(AuthError::AccessDenied.http_status(), 403);
    assert_eq!(AuthError::Cancelled.http_status(), 503);
    assert_eq!(AuthError::internal("boom").http_status(), 500);
}

#[test]
fn unknown_login_and_wrong_password_look_alike() {
    assert_eq!(
        AuthError::CredentialsNotFound.http_status(),
        AuthError::CredentialsMismatch.http_status()
    );
}

#[test]
fn anyhow_keeps_typed_auth_errors() {
    let wrapped = anyhow::Error::new(AuthError::CredentialsNotFound);
    assert_eq!(AuthError::from(wrapped), AuthError::CredentialsNotFound);

    let opaque = anyhow::anyhow!("connection reset");
    match AuthError::from(opaque) {
        AuthError::Internal(msg) => assert!(msg.contains("connection reset")),
        other => panic!("expected internal, got {other:?}"),
    }
}

#[test]
fn codes_are_stable() {
    assert_eq!(AuthError::SessionExpired.code(), "session_expired");
    assert_eq!(AuthError::internal("x").code(), "internal");
    assert!(AuthError::SessionNotFound.is_unauthenticated());
    assert!(!AuthError::AccessDenied.is_unauthenticated());
}
