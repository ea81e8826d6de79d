//! In-memory document store implementation.
//!
//! Provides a thread-safe in-memory backend for testing and single-process
//! deployments. Versions are drawn from a per-collection sequence that never
//! rewinds, so a deleted-and-recreated document never reuses an old version.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{DeleteOutcome, DocVersion, Document, DocumentStore, StorageError};

const PRIMARY_TERM: i64 = 1;

struct Collection {
    docs: HashMap<String, (Value, DocVersion)>,
    next_seq: i64,
}

impl Collection {
    fn new() -> Self {
        Self {
            docs: HashMap::new(),
            next_seq: 0,
        }
    }

    fn next_version(&mut self) -> DocVersion {
        let version = DocVersion::new(self.next_seq, PRIMARY_TERM);
        self.next_seq += 1;
        version
    }
}

/// In-memory document store.
///
/// Thread-safe storage using RwLock for concurrent access.
/// Data is not persisted across restarts.
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents in a collection (0 if it does not exist).
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map(|c| c.docs.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn collection_exists(&self, name: &str) -> Result<bool, StorageError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(collections.contains_key(name))
    }

    async fn create_collection(&self, name: &str, _schema: &Value) -> Result<bool, StorageError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(name.to_string(), Collection::new());
        Ok(true)
    }

    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<DocVersion, StorageError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        if coll.docs.contains_key(id) {
            return Err(StorageError::conflict(collection, id));
        }
        let version = coll.next_version();
        coll.docs.insert(id.to_string(), (body, version));
        Ok(version)
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        Ok(coll.docs.get(id).map(|(body, version)| Document {
            id: id.to_string(),
            body: body.clone(),
            version: *version,
        }))
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected: DocVersion,
    ) -> Result<DocVersion, StorageError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        let current = match coll.docs.get(id) {
            Some((_, version)) => *version,
            None => return Err(StorageError::NotFound(format!("{}/{}", collection, id))),
        };
        if current != expected {
            return Err(StorageError::conflict(collection, id));
        }
        let version = coll.next_version();
        coll.docs.insert(id.to_string(), (body, version));
        Ok(version)
    }

    async fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<DeleteOutcome, StorageError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        Ok(match coll.docs.remove(id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }
}
