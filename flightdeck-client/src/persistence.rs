//! Persistence for the session credential.
//!
//! The only persisted client state is the bearer token, stored under
//! [`AUTH_TOKEN_KEY`] in a small JSON document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Well-known key the session token is stored under.
pub const AUTH_TOKEN_KEY: &str = "flightdeck.auth_token";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Storage for the session credential.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Result<Option<String>, PersistenceError>;
    fn set_token(&self, token: &str) -> Result<(), PersistenceError>;
    fn clear(&self) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(flatten)]
    pub values: BTreeMap<String, String>,
}

pub fn load(path: &Path) -> Result<Option<PersistedState>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let state = serde_json::from_str::<PersistedState>(&contents)?;
    Ok(Some(state))
}

pub fn save(path: &Path, state: &PersistedState) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(state)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Credential store backed by a JSON file.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Result<Option<String>, PersistenceError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(load(&self.path)?.and_then(|mut state| state.values.remove(AUTH_TOKEN_KEY)))
    }

    fn set_token(&self, token: &str) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = load(&self.path)?.unwrap_or_default();
        state
            .values
            .insert(AUTH_TOKEN_KEY.to_string(), token.to_string());
        save(&self.path, &state)
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut state) = load(&self.path)? else {
            return Ok(());
        };
        if state.values.remove(AUTH_TOKEN_KEY).is_some() {
            save(&self.path, &state)?;
        }
        Ok(())
    }
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Result<Option<String>, PersistenceError> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set_token(&self, token: &str) -> Result<(), PersistenceError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/credentials.json"));

        assert_eq!(store.token().unwrap(), None);
        store.set_token("abc").unwrap();
        assert_eq!(store.token().unwrap(), Some("abc".to_string()));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains(AUTH_TOKEN_KEY));

        store.clear().unwrap();
        assert_eq!(store.token().unwrap(), None);
    }

    #[test]
    fn test_clear_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let mut state = PersistedState::default();
        state.values.insert("flightdeck.theme".to_string(), "dark".to_string());
        state.values.insert(AUTH_TOKEN_KEY.to_string(), "abc".to_string());
        save(&path, &state).unwrap();

        FileCredentialStore::new(&path).clear().unwrap();

        let reloaded = load(&path).unwrap().unwrap();
        assert_eq!(reloaded.values.get("flightdeck.theme").map(String::as_str), Some("dark"));
        assert!(!reloaded.values.contains_key(AUTH_TOKEN_KEY));
    }

    #[test]
    fn test_clear_without_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("missing.json"));
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::with_token("t");
        assert_eq!(store.token().unwrap(), Some("t".to_string()));
        store.clear().unwrap();
        assert_eq!(store.token().unwrap(), None);
    }
}
