//! KeyValueStore trait - the single I/O primitive every other component uses.
//!
//! A store maps string keys to string values. Values are opaque to the store;
//! the JSON helpers on `dyn KeyValueStore` handle (de)serialization so the
//! repository and migration layers can work with typed data.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, StoreError};
use crate::watch::WatchStream;

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 256;

/// Validate that a key is well-formed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StoreError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(StoreError::InvalidKey(format!(
            "key must not contain whitespace: {:?}",
            key
        )));
    }
    Ok(())
}

/// The asynchronous string key/value store.
///
/// Backends (SQLite, memory) implement this trait. Code should depend on
/// `Arc<dyn KeyValueStore>`, not on specific implementations.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the raw value stored under `key`.
    ///
    /// Returns `None` if the key does not exist.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: String) -> Result<()>;

    /// Remove a key.
    ///
    /// Returns `Ok(())` if the key was removed or didn't exist.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// List all keys in lexicographic order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Watch for changes matching a pattern.
    ///
    /// Pattern can be an exact key or end with `*` for prefix matching.
    fn watch(&self, pattern: &str) -> Result<WatchStream>;

    /// Release backend resources. The store must not be used afterwards.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl<'s> dyn KeyValueStore + 's {
    /// Get a value and deserialize it as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_item(key).await? {
            Some(raw) => {
                let value: T = serde_json::from_str(&raw).map_err(|e| {
                    StoreError::Serialization(format!("corrupt value under '{}': {}", key, e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Serialize a value as JSON and store it under `key`.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_item(key, raw).await
    }

    /// Check if a key exists.
    pub async fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }
}
