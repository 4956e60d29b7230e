//! Generic CRUD repository over one collection.
//!
//! A collection is a single JSON array stored under [`Entity::COLLECTION`].
//! Every mutation reads the whole array, changes it and writes it back. To
//! keep concurrent callers from losing each other's writes, mutations on the
//! same collection are serialized through [`CollectionLocks`]; repositories
//! must share one `CollectionLocks` (the [`AppContext`](crate::AppContext)
//! does this) for the guarantee to hold.
//!
//! The lock covers the local read-modify-write only. Remote mirroring runs
//! after it is released, so a slow or offline backend never stalls writers.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::remote::RemoteMirror;
use crate::store::KeyValueStore;
use crate::validation::{FieldError, SchemaRegistry, ValidationErrors};
use crate::watch::WatchStream;

/// One async write lock per collection key.
#[derive(Default)]
pub struct CollectionLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `collection`, created on first use.
    pub fn lock_for(&self, collection: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(collection.to_string())
            .or_default()
            .clone()
    }
}

fn invalid(path: &str, message: &str) -> StoreError {
    StoreError::Validation(ValidationErrors::from(vec![FieldError::new(path, message)]))
}

/// CRUD access to the collection of `E`.
pub struct Repository<E: Entity> {
    store: Arc<dyn KeyValueStore>,
    schemas: Arc<SchemaRegistry>,
    locks: Arc<CollectionLocks>,
    mirror: Option<RemoteMirror>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            schemas: Arc::clone(&self.schemas),
            locks: Arc::clone(&self.locks),
            mirror: self.mirror.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        schemas: Arc<SchemaRegistry>,
        locks: Arc<CollectionLocks>,
    ) -> Self {
        Self {
            store,
            schemas,
            locks,
            mirror: None,
            _marker: PhantomData,
        }
    }

    /// Push successful writes to the remote backend as well.
    pub fn with_mirror(mut self, mirror: RemoteMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Store key of the collection.
    pub fn collection(&self) -> &'static str {
        E::COLLECTION
    }

    async fn load(&self) -> Result<Vec<E>> {
        Ok(self
            .store
            .get_json::<Vec<E>>(E::COLLECTION)
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, items: &[E]) -> Result<()> {
        self.store.set_json(E::COLLECTION, items).await?;
        debug!(collection = E::COLLECTION, count = items.len(), "collection written");
        Ok(())
    }

    fn validate(&self, record: &Value) -> Result<()> {
        self.schemas
            .validate(E::ENTITY_TYPE, record)
            .map_err(StoreError::from)
    }

    /// All entities in insertion order. An absent collection is empty.
    pub async fn get_all(&self) -> Result<Vec<E>> {
        self.load().await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<E>> {
        Ok(self.load().await?.into_iter().find(|e| e.id() == id))
    }

    /// Like [`get_by_id`](Self::get_by_id), but an unknown id is `NotFound`.
    pub async fn require(&self, id: &str) -> Result<E> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", E::COLLECTION, id)))
    }

    /// Validate and append a new entity, returning it unchanged.
    pub async fn create(&self, entity: E) -> Result<E> {
        let record = serde_json::to_value(&entity)?;
        self.validate(&record)?;

        let lock = self.locks.lock_for(E::COLLECTION);
        let guard = lock.lock().await;

        let mut items = self.load().await?;
        if items.iter().any(|e| e.id() == entity.id()) {
            return Err(StoreError::DuplicateId {
                collection: E::COLLECTION.to_string(),
                id: entity.id().to_string(),
            });
        }
        items.push(entity.clone());
        self.save(&items).await?;
        drop(guard);

        if let Some(mirror) = &self.mirror {
            mirror.push::<E>(&record).await;
        }
        Ok(entity)
    }

    /// Shallow-merge the fields of `patch` onto the entity with `id`.
    ///
    /// Returns `None` if no such entity exists. The merged record is
    /// validated before anything is written; `id` cannot be changed.
    pub async fn update(&self, id: &str, patch: Value) -> Result<Option<E>> {
        let Value::Object(patch) = patch else {
            return Err(invalid("", "update must be a JSON object"));
        };
        if let Some(new_id) = patch.get("id") {
            if new_id.as_str() != Some(id) {
                return Err(invalid("id", "cannot be changed"));
            }
        }

        let lock = self.locks.lock_for(E::COLLECTION);
        let guard = lock.lock().await;

        let mut items = self.load().await?;
        let Some(pos) = items.iter().position(|e| e.id() == id) else {
            return Ok(None);
        };

        let mut merged = serde_json::to_value(&items[pos])?;
        if let Value::Object(fields) = &mut merged {
            fields.extend(patch);
        }
        self.validate(&merged)?;
        let updated: E =
            serde_json::from_value(merged).map_err(|e| invalid("", &e.to_string()))?;

        items[pos] = updated.clone();
        self.save(&items).await?;
        drop(guard);

        if let Some(mirror) = &self.mirror {
            mirror.push::<E>(&serde_json::to_value(&updated)?).await;
        }
        Ok(Some(updated))
    }

    /// Remove the entity with `id`. Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let lock = self.locks.lock_for(E::COLLECTION);
        let guard = lock.lock().await;

        let mut items = self.load().await?;
        let before = items.len();
        items.retain(|e| e.id() != id);
        if items.len() == before {
            return Ok(false);
        }
        self.save(&items).await?;
        drop(guard);

        if let Some(mirror) = &self.mirror {
            mirror.remove::<E>(id).await;
        }
        Ok(true)
    }

    /// Empty the local collection. The remote copy is left alone.
    pub async fn delete_all(&self) -> Result<()> {
        let lock = self.locks.lock_for(E::COLLECTION);
        let _guard = lock.lock().await;

        self.save(&[]).await
    }

    /// Entities for which `predicate` holds, in collection order.
    pub async fn find<P>(&self, predicate: P) -> Result<Vec<E>>
    where
        P: Fn(&E) -> bool,
    {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|e| predicate(e))
            .collect())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.load().await?.len())
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.load().await?.iter().any(|e| e.id() == id))
    }

    /// Append a batch in one write. Nothing is written unless every entity
    /// is valid and no id collides within the batch or with the collection.
    pub async fn create_many(&self, entities: Vec<E>) -> Result<Vec<E>> {
        let mut records = Vec::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            let record = serde_json::to_value(entity)?;
            self.validate(&record).map_err(|e| match e {
                StoreError::Validation(errors) => {
                    StoreError::Validation(errors.prefixed(&format!("[{}]", index)))
                }
                other => other,
            })?;
            records.push(record);
        }

        let mut seen = HashSet::new();
        for entity in &entities {
            if !seen.insert(entity.id()) {
                return Err(StoreError::DuplicateId {
                    collection: E::COLLECTION.to_string(),
                    id: entity.id().to_string(),
                });
            }
        }

        let lock = self.locks.lock_for(E::COLLECTION);
        let guard = lock.lock().await;

        let mut items = self.load().await?;
        if let Some(existing) = items.iter().find(|e| seen.contains(e.id())) {
            return Err(StoreError::DuplicateId {
                collection: E::COLLECTION.to_string(),
                id: existing.id().to_string(),
            });
        }
        items.extend(entities.iter().cloned());
        self.save(&items).await?;
        drop(guard);

        if let Some(mirror) = &self.mirror {
            for record in &records {
                mirror.push::<E>(record).await;
            }
        }
        Ok(entities)
    }

    /// Subscribe to writes of this collection.
    pub fn watch(&self) -> Result<WatchStream> {
        self.store.watch(E::COLLECTION)
    }
}
