use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The three slots a session occupies in durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    User,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [StoreKey::AccessToken, StoreKey::RefreshToken, StoreKey::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::AccessToken => "accessToken",
            StoreKey::RefreshToken => "refreshToken",
            StoreKey::User => "user",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed stored data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential store lock poisoned")]
    Poisoned,
}

/// Durable string-keyed storage for session credentials.
///
/// Only get/set/delete by key are required. Deleting a key that holds
/// nothing succeeds.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError>;

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError>;

    fn delete(&self, key: StoreKey) -> Result<(), StoreError>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: StoreKey) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: StoreKey) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}
