//! Character persistence seam.
//!
//! The durable store (a database in production) is an opaque async
//! collaborator. Calls are best-effort: a failed load falls back to
//! defaults, a failed save is logged and forgotten. Gameplay never
//! blocks on this trait.

use std::collections::HashMap;
use std::sync::Mutex;

use aethercore_protocol::{CharacterClass, StatBlock};

/// What the store remembers about one character.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRecord {
    pub level: u32,
    pub stats: StatBlock,
}

impl Default for CharacterRecord {
    fn default() -> Self {
        Self {
            level: 1,
            stats: StatBlock::default(),
        }
    }
}

/// Errors from the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store couldn't be reached or answered badly.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Async load/save seam for character data, keyed by account and class.
pub trait CharacterStore: Send + Sync + 'static {
    /// Loads a character, `Ok(None)` if it was never saved.
    fn load_character(
        &self,
        account_id: &str,
        class: CharacterClass,
    ) -> impl std::future::Future<Output = Result<Option<CharacterRecord>, StoreError>> + Send;

    /// Saves a character, overwriting any previous record.
    fn save_character(
        &self,
        account_id: &str,
        class: CharacterClass,
        record: CharacterRecord,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// In-memory [`CharacterStore`] for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, CharacterClass), CharacterRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CharacterStore for MemoryStore {
    async fn load_character(
        &self,
        account_id: &str,
        class: CharacterClass,
    ) -> Result<Option<CharacterRecord>, StoreError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records.get(&(account_id.to_string(), class)).cloned())
    }

    async fn save_character(
        &self,
        account_id: &str,
        class: CharacterClass,
        record: CharacterRecord,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        records.insert((account_id.to_string(), class), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_load_missing_returns_none() {
        let store = MemoryStore::new();
        let loaded = store
            .load_character("acct", CharacterClass::Mage)
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_save_then_load() {
        let store = MemoryStore::new();
        let record = CharacterRecord {
            level: 7,
            stats: StatBlock::default(),
        };
        store
            .save_character("acct", CharacterClass::Mage, record.clone())
            .await
            .unwrap();

        let loaded = store
            .load_character("acct", CharacterClass::Mage)
            .await
            .unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_memory_store_keys_by_class() {
        let store = MemoryStore::new();
        store
            .save_character("acct", CharacterClass::Mage, CharacterRecord::default())
            .await
            .unwrap();

        let other = store
            .load_character("acct", CharacterClass::Warrior)
            .await
            .unwrap();
        assert!(other.is_none());
    }
}
