use super::*;
use crate::identity::credentials::BasicAccount;

fn session_for(login: &str, account: i64, ttl: Duration) -> Session {
    let creds = Arc::new(Credentials::new(account, login, "hash").with_roles(["user"]));
    Session::issue(Arc::new(BasicAccount { id: account }), creds, ttl, false).unwrap()
}

#[test]
fn issue_derives_expiry_from_ttl() {
    let ttl = Duration::from_secs(90);
    let s = session_for("alice", 1, ttl);
    assert_eq!(s.expires_at() - s.issued_at(), TimeDelta::seconds(90));
    assert!(s.expires_at() > s.issued_at());
    assert!(!s.is_expired_at(s.issued_at()));
    assert!(s.is_expired_at(s.expires_at()));
}

#[test]
fn issue_rejects_zero_ttl() {
    let creds = Arc::new(Credentials::new(1, "alice", "hash"));
    let res = Session::issue(Arc::new(BasicAccount { id: 1 }), creds, Duration::ZERO, false);
    assert!(matches!(res, Err(AuthError::Internal(_))));
}

#[test]
fn ids_are_unique_and_opaque() {
    let a = session_for("alice", 1, Duration::from_secs(60));
    let b = session_for("alice", 1, Duration::from_secs(60));
    assert_ne!(a.id(), b.id());
    assert_eq!(a.id().len(), 43);
    assert!(a.id().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

#[test]
fn with_credentials_keeps_identity_fields() {
    let s = session_for("bob", 7, Duration::from_secs(60));
    let fresh = Arc::new(Credentials::new(7, "bob", "hash").with_roles(["user", "editor"]));
    let replaced = s.with_credentials(fresh);
    assert_eq!(replaced.id(), s.id());
    assert_eq!(replaced.issued_at(), s.issued_at());
    assert_eq!(replaced.expires_at(), s.expires_at());
    assert_eq!(replaced.is_admin(), s.is_admin());
    assert!(replaced.has_role("editor"));
    assert!(!s.has_role("editor"));
}

#[test]
fn store_create_invoke_revoke() {
    let store = MemorySessionStore::new();
    let s = session_for("alice", 1, Duration::from_secs(60));
    store.create(s.clone()).unwrap();
    assert_eq!(store.count(), 1);
    assert_eq!(store.invoke(s.id()).unwrap().login(), "alice");

    store.revoke(s.id()).unwrap();
    assert_eq!(store.count(), 0);
    assert_eq!(store.invoke(s.id()).unwrap_err(), AuthError::SessionNotFound);
    // idempotent
    store.revoke(s.id()).unwrap();
    store.revoke("never-existed").unwrap();
}

#[test]
fn store_create_overwrites_by_id_and_allows_same_login() {
    let store = MemorySessionStore::new();
    let a = session_for("alice", 1, Duration::from_secs(60));
    let b = session_for("alice", 1, Duration::from_secs(60));
    store.create(a.clone()).unwrap();
    store.create(b).unwrap();
    assert_eq!(store.count(), 2);

    let upgraded = a.with_credentials(Arc::new(Credentials::new(1, "alice", "hash").with_roles(["ops"])));
    store.create(upgraded).unwrap();
    assert_eq!(store.count(), 2);
    assert!(store.invoke(a.id()).unwrap().has_role("ops"));
}

#[test]
fn invoke_does_not_check_expiry() {
    let store = MemorySessionStore::new();
    let s = session_for("alice", 1, Duration::from_millis(1));
    store.create(s.clone()).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    assert!(store.invoke(s.id()).is_ok());
}

#[test]
fn for_each_callback_may_reenter_the_store() {
    let store = MemorySessionStore::new();
    for i in 0..10 {
        store.create(session_for(&format!("user{i}"), i, Duration::from_secs(60))).unwrap();
    }
    let mut visited = 0;
    store
        .for_each(&mut |s| {
            visited += 1;
            store.revoke(s.id())?;
            store.create(session_for("late", 99, Duration::from_secs(60)))
        })
        .unwrap();
    assert_eq!(visited, 10);
    // every original revoked, one newcomer per visit
    assert_eq!(store.count(), 10);
    assert!(store.snapshot().iter().all(|s| s.login() == "late"));
}

#[test]
fn for_each_stops_on_first_error() {
    let store = MemorySessionStore::new();
    for i in 0..5 {
        store.create(session_for("x", i, Duration::from_secs(60))).unwrap();
    }
    let mut visited = 0;
    let res = store.for_each(&mut |_| {
        visited += 1;
        Err(AuthError::internal("stop"))
    });
    assert!(res.is_err());
    assert_eq!(visited, 1);
}

#[test]
fn replace_only_touches_present_sessions() {
    let store = MemorySessionStore::new();
    let s = session_for("carol", 3, Duration::from_secs(60));
    store.create(s.clone()).unwrap();

    let promoted = s.with_credentials(Arc::new(Credentials::new(3, "carol", "hash").with_roles(["user", "editor"])));
    assert!(store.replace(promoted.clone()).unwrap());
    assert!(store.invoke(s.id()).unwrap().has_role("editor"));

    store.revoke(s.id()).unwrap();
    assert!(!store.replace(promoted).unwrap());
    assert_eq!(store.count(), 0);
}

#[test]
fn reset_clears_everything() {
    let store = MemorySessionStore::new();
    store.create(session_for("a", 1, Duration::from_secs(60))).unwrap();
    store.create(session_for("b", 2, Duration::from_secs(60))).unwrap();
    store.reset().unwrap();
    assert_eq!(store.count(), 0);
}

#[test]
fn stress_concurrent_create_invoke_revoke() {
    let store = Arc::new(MemorySessionStore::new());
    let threads = 8;
    let per_thread = 200;

    let kept: Vec<Vec<SessionId>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let store = store.clone();
                scope.spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..per_thread {
                        let s = session_for(&format!("u{t}"), t as i64, Duration::from_secs(60));
                        let id = s.id().to_string();
                        store.create(s).unwrap();
                        assert_eq!(store.invoke(&id).unwrap().id(), id);
                        let _ = store.count();
                        if i % 2 == 0 {
                            store.revoke(&id).unwrap();
                            assert!(store.invoke(&id).is_err());
                        } else {
                            kept.push(id);
                        }
                    }
                    kept
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let kept: Vec<SessionId> = kept.into_iter().flatten().collect();
    assert_eq!(store.count(), threads * per_thread / 2);
    for id in &kept {
        assert!(store.invoke(id).is_ok(), "lost session entry");
    }
}
