//! In-memory key-value store implementation.
//!
//! This implementation is NOT durable - data is lost on process exit.
//! Use for testing and development only.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::store::{validate_key, KeyValueStore};
use crate::watch::{WatchEvent, WatchSender, WatchStream};

/// In-memory implementation of [`KeyValueStore`].
///
/// Uses a BTreeMap for ordered key iteration and RwLock for concurrency.
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, String>>>,
    watcher: WatchSender,
    fail_reads: Arc<RwLock<bool>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            watcher: WatchSender::default(),
            fail_reads: Arc::new(RwLock::new(false)),
        }
    }

    /// Get the number of keys in the store.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Make every subsequent read fail with a storage error.
    ///
    /// Lets callers exercise the "store broken" path without a real backend.
    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.write() = fail;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        if *self.fail_reads.read() {
            return Err(StoreError::Storage(format!("read of '{}' failed", key)));
        }
        Ok(self.data.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<()> {
        validate_key(key)?;

        let previous = self.data.write().insert(key.to_string(), value.clone());
        self.watcher.send(WatchEvent::for_write(key, previous, value));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let removed = self.data.write().remove(key);
        if let Some(old) = removed {
            self.watcher.send(WatchEvent::deleted(key, old));
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }

    fn watch(&self, pattern: &str) -> Result<WatchStream> {
        Ok(self.watcher.subscribe(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::EventType;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();

        store.set_item("pets", "[]".to_string()).await.unwrap();
        let value = store.get_item("pets").await.unwrap();
        assert_eq!(value.as_deref(), Some("[]"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new();

        store.set_item("active_pet_id", "a".to_string()).await.unwrap();
        store.set_item("active_pet_id", "b".to_string()).await.unwrap();

        let value = store.get_item("active_pet_id").await.unwrap();
        assert_eq!(value.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = MemoryStore::new();
        assert!(store.get_item("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();

        store.set_item("tasks", "[]".to_string()).await.unwrap();
        store.remove_item("tasks").await.unwrap();
        assert!(store.get_item("tasks").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_remove_nonexistent() {
        let store = MemoryStore::new();
        // Should not error
        store.remove_item("nonexistent").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_sorted() {
        let store = MemoryStore::new();

        store.set_item("tasks", "[]".to_string()).await.unwrap();
        store.set_item("meals", "[]".to_string()).await.unwrap();
        store.set_item("pets", "[]".to_string()).await.unwrap();

        let keys = store.keys().await.unwrap();
        assert_eq!(keys, vec!["meals", "pets", "tasks"]);
    }

    #[tokio::test]
    async fn test_failing_reads() {
        let store = MemoryStore::new();
        store.set_item("pets", "[]".to_string()).await.unwrap();

        store.set_fail_reads(true);
        assert!(matches!(
            store.get_item("pets").await,
            Err(StoreError::Storage(_))
        ));

        store.set_fail_reads(false);
        assert!(store.get_item("pets").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_watch_events() {
        let store = MemoryStore::new();
        let mut stream = store.watch("pets").unwrap();

        store.set_item("pets", "[]".to_string()).await.unwrap();
        store.set_item("pets", "[1]".to_string()).await.unwrap();
        store.remove_item("pets").await.unwrap();

        assert_eq!(stream.recv().await.unwrap().event_type, EventType::Created);
        assert_eq!(stream.recv().await.unwrap().event_type, EventType::Updated);
        assert_eq!(stream.recv().await.unwrap().event_type, EventType::Deleted);
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let store = MemoryStore::new();

        let result = store.set_item("", "v".to_string()).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }
}
