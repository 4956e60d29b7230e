//! Scalar app-state keys kept next to the collections.

use std::sync::Arc;

use crate::error::Result;
use crate::store::KeyValueStore;

pub const ACTIVE_PET_KEY: &str = "active_pet_id";
pub const DB_INITIALIZED_KEY: &str = "db_initialized";

/// Typed access to `active_pet_id` and `db_initialized`.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn KeyValueStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The pet currently selected in the UI, if any.
    pub async fn active_pet_id(&self) -> Result<Option<String>> {
        self.store.get_json(ACTIVE_PET_KEY).await
    }

    pub async fn set_active_pet_id(&self, pet_id: &str) -> Result<()> {
        self.store.set_json(ACTIVE_PET_KEY, pet_id).await
    }

    pub async fn clear_active_pet_id(&self) -> Result<()> {
        self.store.remove_item(ACTIVE_PET_KEY).await
    }

    /// Whether first-run setup has completed on this device.
    pub async fn is_initialized(&self) -> Result<bool> {
        Ok(self
            .store
            .get_json::<bool>(DB_INITIALIZED_KEY)
            .await?
            .unwrap_or(false))
    }

    pub async fn mark_initialized(&self) -> Result<()> {
        self.store.set_json(DB_INITIALIZED_KEY, &true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_active_pet_roundtrip() {
        let state = AppState::new(Arc::new(MemoryStore::new()));
        assert_eq!(state.active_pet_id().await.unwrap(), None);

        state.set_active_pet_id("pet-1").await.unwrap();
        assert_eq!(state.active_pet_id().await.unwrap().as_deref(), Some("pet-1"));

        state.clear_active_pet_id().await.unwrap();
        assert_eq!(state.active_pet_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_initialized_flag() {
        let state = AppState::new(Arc::new(MemoryStore::new()));
        assert!(!state.is_initialized().await.unwrap());
        state.mark_initialized().await.unwrap();
        assert!(state.is_initialized().await.unwrap());
    }
}
