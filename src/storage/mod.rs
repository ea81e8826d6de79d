//! Document store abstraction.
//!
//! The lock service and history recorder persist their records in a remote
//! document store that supports create/get/update/delete with optimistic
//! concurrency. Every stored document carries a [`DocVersion`]; updates must
//! present the version the caller last observed and fail with
//! [`StorageError::VersionConflict`] otherwise.
//!
//! This module provides the trait plus pluggable backends (in-memory,
//! SQLite).

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryDocumentStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The version presented with a write no longer matches the stored one,
    /// or a create raced with another create of the same id.
    #[error("version conflict on {collection}/{id}")]
    VersionConflict { collection: String, id: String },

    /// The document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

impl StorageError {
    /// Whether this error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }

    /// Whether this error means the document or its collection is gone.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_) | StorageError::CollectionNotFound(_)
        )
    }

    pub(crate) fn conflict(collection: &str, id: &str) -> Self {
        StorageError::VersionConflict {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Opaque compare-and-swap token of a stored document.
///
/// A pair of counters assigned by the store. Callers only ever compare
/// versions for equality; [`DocVersion::UNASSIGNED`] marks a record that
/// has never been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocVersion {
    seq_no: i64,
    primary_term: i64,
}

impl DocVersion {
    /// Version of a document that has not been stored yet.
    pub const UNASSIGNED: DocVersion = DocVersion {
        seq_no: -2,
        primary_term: 0,
    };

    /// Build a version from store-assigned counters.
    ///
    /// Only document store implementations should need this.
    pub fn new(seq_no: i64, primary_term: i64) -> Self {
        Self {
            seq_no,
            primary_term,
        }
    }

    /// Whether the store has assigned this version.
    pub fn is_assigned(&self) -> bool {
        *self != Self::UNASSIGNED
    }

    /// Sequence counter, for stores that persist it.
    pub fn seq_no(&self) -> i64 {
        self.seq_no
    }

    /// Term counter, for stores that persist it.
    pub fn primary_term(&self) -> i64 {
        self.primary_term
    }
}

/// A stored document with its current version.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id within its collection.
    pub id: String,
    /// JSON body.
    pub body: Value,
    /// Current CAS token.
    pub version: DocVersion,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The document existed and was removed.
    Deleted,
    /// There was nothing to delete.
    NotFound,
}

/// Storage trait for an optimistically concurrent document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether a collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Create a collection with the given schema.
    ///
    /// Idempotent: returns `Ok(false)` if it already existed.
    async fn create_collection(&self, name: &str, schema: &Value) -> Result<bool, StorageError>;

    /// Create a document that must not already exist.
    ///
    /// Fails with [`StorageError::VersionConflict`] if the id is taken.
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<DocVersion, StorageError>;

    /// Read a document. Missing documents are `Ok(None)`.
    async fn get_document(&self, collection: &str, id: &str)
    -> Result<Option<Document>, StorageError>;

    /// Replace a document's body if its version still equals `expected`.
    ///
    /// Fails with [`StorageError::VersionConflict`] on mismatch and
    /// [`StorageError::NotFound`] if the document is gone.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected: DocVersion,
    ) -> Result<DocVersion, StorageError>;

    /// Delete a document.
    async fn delete_document(&self, collection: &str, id: &str)
    -> Result<DeleteOutcome, StorageError>;
}
