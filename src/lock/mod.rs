//! Lease locks built on optimistic concurrency.
//!
//! There is no distributed lock primitive underneath: every lease lives as a
//! versioned document in a shared [`DocumentStore`], and every mutation is
//! conditioned on the version the caller last observed. At most one caller
//! wins each race; losers see `Ok(None)` / `Ok(false)`, never an error.
//!
//! Lease state is computed from `acquired_at + lease_duration_seconds`
//! against the local [`Clock`]. Clock skew between processes is not
//! corrected for.

mod record;

pub use record::{LockRecord, ResourceAttributes, job_lock_id, resource_lock_id};

use chrono::{DateTime, Utc};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::clock::{Clock, SystemClock, truncate_to_seconds};
use crate::core::context::JobExecutionContext;
use crate::core::job::JobDefinition;
use crate::storage::{DeleteOutcome, DocVersion, DocumentStore, StorageError};

/// Default name of the collection holding lease documents.
pub const DEFAULT_LOCK_COLLECTION: &str = ".leasehold-locks";

/// Errors surfaced by the lock service.
///
/// Contention is not an error; see the module docs.
#[derive(Debug, Error)]
pub enum LockError {
    /// A required argument was missing or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The document store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

fn require(value: &str, name: &str) -> Result<(), LockError> {
    if value.is_empty() {
        return Err(LockError::InvalidArgument(format!("{} must not be empty", name)));
    }
    Ok(())
}

fn require_duration(seconds: i64) -> Result<(), LockError> {
    if seconds < 0 {
        return Err(LockError::InvalidArgument(format!(
            "lease duration must not be negative, got {}",
            seconds
        )));
    }
    Ok(())
}

/// Mapping used when the lock collection is created.
fn lock_collection_schema() -> serde_json::Value {
    json!({
        "properties": {
            "job_index_name": { "type": "keyword" },
            "job_id": { "type": "keyword" },
            "lock_time": { "type": "date", "format": "epoch_second" },
            "lock_duration_seconds": { "type": "long" },
            "released": { "type": "boolean" },
            "resource_type": { "type": "keyword" },
            "resource": { "type": "object", "enabled": false },
        }
    })
}

/// Lease manager over a shared document store.
///
/// Cheap to clone; clones share the store and clock.
#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn DocumentStore>,
    collection: String,
    clock: Arc<dyn Clock>,
}

impl LockService {
    /// Create a lock service writing to [`DEFAULT_LOCK_COLLECTION`].
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            collection: DEFAULT_LOCK_COLLECTION.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different lock collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Name of the lock collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether the lock collection has been created yet.
    pub async fn lock_collection_exists(&self) -> Result<bool, LockError> {
        Ok(self.store.collection_exists(&self.collection).await?)
    }

    /// Acquire the lease for `owner_id` in `owner_collection`.
    ///
    /// Returns `Ok(None)` if another holder has an active lease or won a
    /// concurrent attempt.
    pub async fn acquire(
        &self,
        owner_collection: &str,
        owner_id: &str,
        lease_duration_seconds: i64,
    ) -> Result<Option<LockRecord>, LockError> {
        require(owner_collection, "owner collection")?;
        require(owner_id, "owner id")?;
        require_duration(lease_duration_seconds)?;

        let candidate =
            LockRecord::for_job(owner_collection, owner_id, self.now(), lease_duration_seconds);
        self.acquire_record(candidate).await
    }

    /// Acquire a lease on an arbitrary resource described by `attributes`.
    ///
    /// Callers naming the same resource type and attributes contend on the
    /// same lease regardless of attribute insertion order.
    pub async fn acquire_on_resource(
        &self,
        owner_collection: &str,
        lease_duration_seconds: i64,
        resource_type: &str,
        attributes: &ResourceAttributes,
    ) -> Result<Option<LockRecord>, LockError> {
        require(owner_collection, "owner collection")?;
        require(resource_type, "resource type")?;
        require_duration(lease_duration_seconds)?;

        let candidate = LockRecord::for_resource(
            owner_collection,
            resource_type,
            attributes.clone(),
            self.now(),
            lease_duration_seconds,
        )?;
        self.acquire_record(candidate).await
    }

    /// Acquire the lease of the job being executed in `ctx`, using the job's
    /// configured lease duration.
    pub async fn acquire_for_job(
        &self,
        job: &JobDefinition,
        ctx: &JobExecutionContext,
    ) -> Result<Option<LockRecord>, LockError> {
        let duration = job.lock_duration_seconds().ok_or_else(|| {
            LockError::InvalidArgument(format!(
                "job '{}' has no lock duration configured",
                job.name()
            ))
        })?;
        self.acquire(ctx.collection(), ctx.job_id().as_str(), duration)
            .await
    }

    /// Extend a held lease from now, keeping its duration.
    ///
    /// Succeeds whether or not the lease has already expired, as long as
    /// nobody else wrote the document since `lock` was read.
    pub async fn renew(&self, lock: &LockRecord) -> Result<Option<LockRecord>, LockError> {
        let renewed = lock.renewed_at(self.now());
        match self.write_if_unchanged(&renewed, lock).await? {
            Some(version) => Ok(Some(renewed.with_version(version))),
            None => {
                debug!(lock_id = %lock.lock_id(), "lease renewal lost to a concurrent update");
                Ok(None)
            }
        }
    }

    /// Give up a lease.
    ///
    /// Returns `false` if the lease was taken over or deleted since `lock`
    /// was read, and for `None` without touching the store.
    pub async fn release(&self, lock: Option<&LockRecord>) -> Result<bool, LockError> {
        let Some(lock) = lock else {
            return Ok(false);
        };
        let released = lock.as_released();
        match self.write_if_unchanged(&released, lock).await? {
            Some(_) => Ok(true),
            None => {
                debug!(lock_id = %lock.lock_id(), "lease release lost to a concurrent update");
                Ok(false)
            }
        }
    }

    /// Read a lease by id.
    pub async fn find(&self, lock_id: &str) -> Result<Option<LockRecord>, LockError> {
        require(lock_id, "lock id")?;
        match self.store.get_document(&self.collection, lock_id).await {
            Ok(Some(document)) => Ok(Some(LockRecord::from_document(document)?)),
            Ok(None) | Err(StorageError::CollectionNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a lease document.
    ///
    /// A missing document or lock collection counts as deleted.
    pub async fn delete(&self, lock_id: &str) -> Result<bool, LockError> {
        require(lock_id, "lock id")?;
        match self.store.delete_document(&self.collection, lock_id).await {
            Ok(DeleteOutcome::Deleted) => Ok(true),
            Ok(DeleteOutcome::NotFound) => {
                debug!(lock_id, "lease already gone");
                Ok(true)
            }
            Err(e) if e.is_missing() => Ok(true),
            Err(e) => {
                warn!(lock_id, error = %e, "failed to delete lease");
                Err(e.into())
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        truncate_to_seconds(self.clock.now())
    }

    async fn ensure_collection(&self) -> Result<(), LockError> {
        if self.store.collection_exists(&self.collection).await? {
            return Ok(());
        }
        if self
            .store
            .create_collection(&self.collection, &lock_collection_schema())
            .await?
        {
            debug!(collection = %self.collection, "created lock collection");
        }
        Ok(())
    }

    async fn acquire_record(&self, candidate: LockRecord) -> Result<Option<LockRecord>, LockError> {
        self.ensure_collection().await?;

        let now = candidate.acquired_at();
        match self.find(candidate.lock_id()).await? {
            None => self.create(candidate).await,
            Some(existing) if existing.is_active(now) => {
                debug!(
                    lock_id = %existing.lock_id(),
                    acquired_at = %existing.acquired_at(),
                    "lease is held by another owner"
                );
                Ok(None)
            }
            Some(existing) => match self.write_if_unchanged(&candidate, &existing).await? {
                Some(version) => Ok(Some(candidate.with_version(version))),
                None => {
                    debug!(lock_id = %existing.lock_id(), "lost race to take over lease");
                    Ok(None)
                }
            },
        }
    }

    async fn create(&self, candidate: LockRecord) -> Result<Option<LockRecord>, LockError> {
        match self
            .store
            .create_document(&self.collection, candidate.lock_id(), candidate.to_body()?)
            .await
        {
            Ok(version) => Ok(Some(candidate.with_version(version))),
            Err(e) if e.is_conflict() => {
                debug!(lock_id = %candidate.lock_id(), "lost race to create lease");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// CAS-write `record`'s body over the document `observed` was read from.
    ///
    /// `Ok(None)` means the document changed or vanished in between.
    async fn write_if_unchanged(
        &self,
        record: &LockRecord,
        observed: &LockRecord,
    ) -> Result<Option<DocVersion>, LockError> {
        match self
            .store
            .update_document(
                &self.collection,
                observed.lock_id(),
                record.to_body()?,
                observed.version(),
            )
            .await
        {
            Ok(version) => Ok(Some(version)),
            Err(e) if e.is_conflict() || e.is_missing() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl fmt::Debug for LockService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockService")
            .field("collection", &self.collection)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
