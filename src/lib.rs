//! # petcare-store
//!
//! Local-first persistence for a pet-care app.
//!
//! Every collection (pets, tasks, health records, ...) is one JSON array in a
//! key-value store. On top of that the crate provides:
//!
//! - **Typed repositories**: CRUD plus domain queries per entity
//! - **Schema validation**: field rules checked on every write
//! - **Serialized writes**: a per-collection async lock, no lost updates
//! - **Versioned migrations**: with a failure ledger and quarantine
//! - **Remote mirror**: best-effort write-through to a Supabase project
//! - **Watch streams**: change notifications per collection key
//!
//! ## Backends
//!
//! - [`SqliteStore`]: Embedded SQLite database (default)
//! - [`MemoryStore`]: In-memory store (testing and development)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use petcare_store::entities::{Pet, Species};
//! use petcare_store::{AppContext, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> petcare_store::Result<()> {
//!     let ctx = AppContext::init(StoreConfig::in_memory()).await?;
//!
//!     let rex = ctx.pets().create(Pet::new("Rex", Species::Dog)).await?;
//!     ctx.app_state().set_active_pet_id(&rex.id).await?;
//!
//!     let dogs = ctx.pets().by_species(Species::Dog).await?;
//!     println!("{} dog(s)", dogs.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Updates
//!
//! ```rust,no_run
//! use petcare_store::entities::{Pet, Species};
//! use petcare_store::{AppContext, StoreConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> petcare_store::Result<()> {
//!     let ctx = AppContext::init(StoreConfig::load(None)?).await?;
//!     let pets = ctx.pets();
//!
//!     let rex = pets.create(Pet::new("Rex", Species::Dog)).await?;
//!
//!     // Shallow merge; the patch is validated before it is written.
//!     let max = pets.update(&rex.id, json!({"name": "Max"})).await?;
//!     assert_eq!(max.map(|p| p.name).as_deref(), Some("Max"));
//!
//!     ctx.shutdown().await
//! }
//! ```

pub mod app_state;
pub mod config;
pub mod context;
pub mod entities;
pub mod entity;
pub mod error;
pub mod logging;
pub mod memory;
pub mod migration;
pub mod remote;
pub mod repository;
pub mod sqlite;
pub mod store;
pub mod validation;
pub mod watch;

// Re-export main types
pub use app_state::AppState;
pub use config::{StorageBackend, StoreConfig};
pub use context::AppContext;
pub use entity::{new_id, Entity};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use migration::{MigrationReport, MigrationRunner, MigrationStatus, MigrationStep};
pub use remote::{RemoteBackend, RemoteMirror, Session, SupabaseBackend};
pub use repository::{CollectionLocks, Repository};
pub use sqlite::SqliteStore;
pub use store::{KeyValueStore, MAX_KEY_LENGTH};
pub use validation::{FieldError, FieldSchema, Schema, SchemaRegistry, ValidationErrors};
pub use watch::{EventType, WatchEvent, WatchStream};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::context::AppContext;
    pub use crate::entities::*;
    pub use crate::entity::{new_id, Entity};
    pub use crate::error::{Result, StoreError};
    pub use crate::memory::MemoryStore;
    pub use crate::repository::Repository;
    pub use crate::sqlite::SqliteStore;
    pub use crate::store::KeyValueStore;
    pub use crate::watch::{EventType, WatchEvent, WatchStream};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();

        store.set_item("pets", "[]".to_string()).await.unwrap();
        assert_eq!(store.get_item("pets").await.unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_stores_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<MemoryStore>();
        assert_send_sync::<SqliteStore>();
        assert_send_sync::<AppContext>();
    }
}
