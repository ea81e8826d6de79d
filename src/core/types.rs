//! Core identifier types for the scheduler.
//!
//! These types provide type-safe identifiers for jobs and locks, plus the
//! version triple a job document carries when it is handed to a runner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a job within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

/// Identifier of a lock document in the lock collection.
///
/// Always derived from the owning collection and job id (or resource);
/// see [`crate::lock::LockRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(String);

impl JobId {
    /// Create a new JobId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&JobId> for JobId {
    fn from(id: &JobId) -> Self {
        id.clone()
    }
}

impl LockId {
    /// Create a LockId from an already-derived string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LockId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LockId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of the job document a schedule was created from.
///
/// Passed through to runners untouched so they can detect that the job
/// they are executing has since been updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobVersion {
    /// Document version counter.
    pub version: i64,
    /// Sequence number of the job document.
    pub seq_no: i64,
    /// Primary term of the job document.
    pub primary_term: i64,
}

impl JobVersion {
    /// Create a job version triple.
    pub fn new(version: i64, seq_no: i64, primary_term: i64) -> Self {
        Self {
            version,
            seq_no,
            primary_term,
        }
    }
}
