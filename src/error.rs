//! Error types for repository, store, migration and remote operations.
//!
//! Every fallible operation in the crate returns [`Result`]. Callers can tell
//! "not found", "invalid record" and "store broken" apart instead of getting an
//! empty collection back.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Errors that can occur in the persistence core.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity or key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity with this id already exists in the collection.
    #[error("duplicate id in {collection}: {id}")]
    DuplicateId { collection: String, id: String },

    /// The record failed schema validation.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The underlying store could not complete the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Database error from SQLx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The remote backend rejected the request or could not be reached.
    #[error("remote error: {0}")]
    Remote(String),

    /// An operation did not finish within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Storage(_)
                | StoreError::Database(_)
                | StoreError::Remote(_)
                | StoreError::Timeout(_)
                | StoreError::Io(_)
        )
    }

    /// Returns the validation failures if this is a validation error.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            StoreError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Remote(err.to_string())
    }
}

impl From<figment::Error> for StoreError {
    fn from(err: figment::Error) -> Self {
        StoreError::Config(err.to_string())
    }
}

impl From<ValidationErrors> for StoreError {
    fn from(errors: ValidationErrors) -> Self {
        StoreError::Validation(errors)
    }
}
