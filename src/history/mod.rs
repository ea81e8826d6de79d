//! Best-effort execution history.
//!
//! One document per `(collection, job_id, start_time)` records when a run
//! started, when it ended and the status the runner reported. History is
//! telemetry: store failures are logged and reported as `Ok(false)`, never
//! as errors, so they cannot disturb the schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::storage::{DocVersion, DocumentStore, StorageError};

/// Default name of the collection holding execution history.
pub const DEFAULT_HISTORY_COLLECTION: &str = ".leasehold-job-history";

/// Errors surfaced by the history recorder.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A required argument was missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The document store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A stored execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_index_name: String,
    pub job_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    pub completion_status: i32,
}

/// Deterministic id of the history document for one run.
pub fn history_id(collection: &str, job_id: &str, start_time: DateTime<Utc>) -> String {
    format!("{}-{}-{}", collection, job_id, start_time.timestamp_millis())
}

/// Records job executions in a document store.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl HistoryRecorder {
    /// Create a recorder writing to [`DEFAULT_HISTORY_COLLECTION`].
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            collection: DEFAULT_HISTORY_COLLECTION.to_string(),
        }
    }

    /// Use a different history collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Name of the history collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Record the outcome of one run.
    ///
    /// Creates the record, or updates it if the run was already recorded
    /// (e.g. its start was recorded before it finished). Returns `Ok(false)`
    /// if the store could not be written.
    pub async fn record_execution(
        &self,
        collection: &str,
        job_id: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        status: i32,
    ) -> Result<bool, HistoryError> {
        if collection.is_empty() {
            return Err(HistoryError::InvalidArgument(
                "collection must not be empty".into(),
            ));
        }
        if job_id.is_empty() {
            return Err(HistoryError::InvalidArgument(
                "job id must not be empty".into(),
            ));
        }

        let record = ExecutionRecord {
            job_index_name: collection.to_string(),
            job_id: job_id.to_string(),
            start_time,
            end_time,
            completion_status: status,
        };

        match self.write(&record).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(
                    collection,
                    job_id,
                    start_time = %start_time,
                    error = %e,
                    "Failed to record job history"
                );
                Ok(false)
            }
        }
    }

    /// Read the record of one run.
    pub async fn find_history(
        &self,
        collection: &str,
        job_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<Option<ExecutionRecord>, HistoryError> {
        let id = history_id(collection, job_id, start_time);
        match self.store.get_document(&self.collection, &id).await {
            Ok(Some(document)) => Ok(Some(
                serde_json::from_value(document.body).map_err(StorageError::from)?,
            )),
            Ok(None) | Err(StorageError::CollectionNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, record: &ExecutionRecord) -> Result<(), StorageError> {
        if !self.store.collection_exists(&self.collection).await? {
            self.store
                .create_collection(&self.collection, &history_collection_schema())
                .await?;
        }

        let id = history_id(&record.job_index_name, &record.job_id, record.start_time);
        let body = serde_json::to_value(record)?;

        match self.store.get_document(&self.collection, &id).await? {
            Some(existing) => self.update(&id, body, existing.version).await,
            None => match self
                .store
                .create_document(&self.collection, &id, body.clone())
                .await
            {
                Ok(_) => Ok(()),
                Err(e) if e.is_conflict() => {
                    // Someone recorded the same run first; overwrite once.
                    let existing = self
                        .store
                        .get_document(&self.collection, &id)
                        .await?
                        .ok_or_else(|| StorageError::NotFound(id.clone()))?;
                    self.update(&id, body, existing.version).await
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn update(
        &self,
        id: &str,
        body: serde_json::Value,
        version: DocVersion,
    ) -> Result<(), StorageError> {
        self.store
            .update_document(&self.collection, id, body, version)
            .await?;
        Ok(())
    }
}

impl fmt::Debug for HistoryRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryRecorder")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn history_collection_schema() -> serde_json::Value {
    json!({
        "properties": {
            "job_index_name": { "type": "keyword" },
            "job_id": { "type": "keyword" },
            "start_time": { "type": "date", "format": "epoch_millis" },
            "end_time": { "type": "date", "format": "epoch_millis" },
            "completion_status": { "type": "integer" },
        }
    })
}
