use keyring::Entry;
use tracing::debug;

use super::store::{CredentialStore, StoreError, StoreKey};

/// Default keychain service name
pub const SERVICE_NAME: &str = "unigate";

/// Credential store in the OS keychain, one entry per key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: StoreKey) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key.as_str())?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn delete(&self, key: StoreKey) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!(key = %key, "No keychain entry to delete");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
