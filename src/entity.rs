//! The `Entity` trait implemented by every stored record type.

use serde::{de::DeserializeOwned, Serialize};

/// A uniquely identified record stored in its own collection.
///
/// The whole collection lives as one JSON array under [`Entity::COLLECTION`].
/// Ids are generated on the client with [`new_id`] and never reassigned.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Store key holding the collection.
    const COLLECTION: &'static str;

    /// Tag used to look up the schema in the [`SchemaRegistry`](crate::SchemaRegistry).
    const ENTITY_TYPE: &'static str;

    /// Table name on the remote backend.
    const REMOTE_TABLE: &'static str = Self::COLLECTION;

    /// Whether remote rows carry the signed-in user's `user_id` column.
    const REMOTE_OWNED: bool = true;

    fn id(&self) -> &str;
}

/// Generate a new client-side entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
