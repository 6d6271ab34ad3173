//! Persisted authentication session.
//!
//! Tokens and the signed-in user live in a small key-value store so a
//! session survives restarts of the client. The store is the only shared
//! mutable state between the REST gateway and the rest of the client.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use vr180_core::job::deserialize_opaque_id;

const ACCESS_TOKEN_KEY: &str = "accessToken";
const REFRESH_TOKEN_KEY: &str = "refreshToken";
const USER_KEY: &str = "user";

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Errors from reading or writing the session store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    /// Drop every key.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Volatile store, for tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.clear();
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// Every write rewrites the whole file; the session holds three keys, so
/// there is nothing to gain from anything smarter. The lock serializes
/// writers within one process.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, values: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The signed-in account as reported by `auth/login`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "deserialize_opaque_id")]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub nick_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl User {
    /// Name to greet the user with.
    pub fn display_name(&self) -> &str {
        self.nick_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(&self.email)
    }
}

/// Credentials obtained from a successful sign-in.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access: String,
    pub refresh: Option<String>,
    pub user: Option<User>,
}

/// Access to the persisted tokens.
///
/// Cloning shares the same underlying store.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Session persisted to a JSON file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    /// The stored user, if any. An unreadable record counts as absent.
    pub fn user(&self) -> Result<Option<User>, StorageError> {
        let Some(raw) = self.store.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable stored user");
                Ok(None)
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.access_token(), Ok(Some(_)))
    }

    /// Store a fresh set of credentials, replacing any previous session.
    pub fn begin(&self, tokens: &AuthTokens) -> Result<(), StorageError> {
        self.store.clear()?;
        self.store.set(ACCESS_TOKEN_KEY, &tokens.access)?;
        if let Some(refresh) = &tokens.refresh {
            self.store.set(REFRESH_TOKEN_KEY, refresh)?;
        }
        if let Some(user) = &tokens.user {
            self.store.set(USER_KEY, &serde_json::to_string(user)?)?;
        }
        Ok(())
    }

    /// Replace the access token after a refresh.
    pub fn set_access_token(&self, access: &str) -> Result<(), StorageError> {
        self.store.set(ACCESS_TOKEN_KEY, access)
    }

    /// Forget every credential.
    pub fn end(&self) -> Result<(), StorageError> {
        self.store.remove(ACCESS_TOKEN_KEY)?;
        self.store.remove(REFRESH_TOKEN_KEY)?;
        self.store.remove(USER_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> AuthTokens {
        AuthTokens {
            access: "acc-1".into(),
            refresh: Some("ref-1".into()),
            user: Some(User {
                id: "7".into(),
                username: None,
                nick_name: Some("beachfan".into()),
                email: "fan@example.com".into(),
                profile_picture: None,
            }),
        }
    }

    #[test]
    fn begin_and_end() {
        let session = Session::in_memory();
        assert!(!session.is_authenticated());

        session.begin(&tokens()).unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.access_token().unwrap().as_deref(), Some("acc-1"));
        assert_eq!(session.refresh_token().unwrap().as_deref(), Some("ref-1"));
        assert_eq!(session.user().unwrap().unwrap().display_name(), "beachfan");

        session.end().unwrap();
        assert!(!session.is_authenticated());
        assert!(session.refresh_token().unwrap().is_none());
        assert!(session.user().unwrap().is_none());
    }

    #[test]
    fn begin_replaces_previous_refresh_token() {
        let session = Session::in_memory();
        session.begin(&tokens()).unwrap();
        session
            .begin(&AuthTokens {
                access: "acc-2".into(),
                refresh: None,
                user: None,
            })
            .unwrap();
        assert!(session.refresh_token().unwrap().is_none());
        assert_eq!(session.access_token().unwrap().as_deref(), Some("acc-2"));
    }

    #[test]
    fn user_accepts_numeric_id() {
        let user: User =
            serde_json::from_str(r#"{"id": 12, "email": "fan@example.com"}"#).unwrap();
        assert_eq!(user.id, "12");
        assert_eq!(user.display_name(), "fan@example.com");
    }

    #[test]
    fn corrupt_user_record_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.set(USER_KEY, "{not json").unwrap();
        let session = Session::new(store);
        assert!(session.user().unwrap().is_none());
    }
}
