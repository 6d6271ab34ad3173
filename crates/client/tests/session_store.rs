//! File-backed session persistence.

use std::sync::Arc;

use vr180_client::session::{AuthTokens, FileStore, KeyValueStore, Session, User};

fn tokens() -> AuthTokens {
    AuthTokens {
        access: "acc-1".into(),
        refresh: Some("ref-1".into()),
        user: Some(User {
            id: "7".into(),
            username: Some("fan".into()),
            nick_name: None,
            email: "fan@example.com".into(),
            profile_picture: None,
        }),
    }
}

#[test]
fn session_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");

    Session::file(&path).begin(&tokens()).unwrap();
    assert!(path.exists());

    let reopened = Session::file(&path);
    assert!(reopened.is_authenticated());
    assert_eq!(reopened.access_token().unwrap().as_deref(), Some("acc-1"));
    assert_eq!(reopened.refresh_token().unwrap().as_deref(), Some("ref-1"));
    assert_eq!(reopened.user().unwrap().unwrap().display_name(), "fan");
}

#[test]
fn end_forgets_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let session = Session::file(&path);
    session.begin(&tokens()).unwrap();
    session.end().unwrap();

    let reopened = Session::file(&path);
    assert!(!reopened.is_authenticated());
    assert!(reopened.user().unwrap().is_none());
}

#[test]
fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let store = FileStore::new(&path);

    assert!(store.get("accessToken").unwrap().is_none());
    store.remove("accessToken").unwrap();
    store.clear().unwrap();
    assert!(!path.exists());
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&path));
    assert!(store.get("accessToken").is_err());

    // Signing in again overwrites the damaged file.
    let session = Session::new(store);
    session.begin(&tokens()).unwrap();
    assert!(session.is_authenticated());
}
