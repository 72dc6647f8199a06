use std::collections::HashMap;
use std::sync::Mutex;

use super::store::{CredentialStore, StoreError, StoreKey};

/// In-process credential store. Nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;
        slots.insert(key, value.to_string());
        Ok(())
    }

    fn delete(&self, key: StoreKey) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().map_err(|_| StoreError::Poisoned)?;
        slots.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_slots() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get(StoreKey::AccessToken).unwrap(), None);

        store.set(StoreKey::AccessToken, "a1").unwrap();
        store.set(StoreKey::RefreshToken, "r1").unwrap();
        store.set(StoreKey::AccessToken, "a2").unwrap();
        assert_eq!(store.get(StoreKey::AccessToken).unwrap().as_deref(), Some("a2"));
        assert_eq!(store.len(), 2);

        store.delete(StoreKey::AccessToken).unwrap();
        // Deleting an empty slot is fine
        store.delete(StoreKey::User).unwrap();
        assert_eq!(store.get(StoreKey::AccessToken).unwrap(), None);
        assert_eq!(store.len(), 1);
    }
}
