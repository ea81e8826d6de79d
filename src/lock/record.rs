//! The lease record stored in the lock collection.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::core::types::LockId;
use crate::storage::{DocVersion, Document, StorageError};

/// Attributes identifying an arbitrary locked resource.
///
/// Kept sorted so the derived lock id does not depend on insertion order.
pub type ResourceAttributes = BTreeMap<String, String>;

/// Lock id for a lease held on behalf of a job.
pub fn job_lock_id(owner_collection: &str, owner_id: &str) -> LockId {
    LockId::new(format!("{}-{}", owner_collection, owner_id))
}

/// Lock id for a lease on an arbitrary resource.
///
/// The attributes are serialized as canonical JSON and hashed with xxh3-128,
/// so every process contending for the same logical resource lands on the
/// same document. Distinct attribute sets may collide.
pub fn resource_lock_id(
    owner_collection: &str,
    resource_type: &str,
    attributes: &ResourceAttributes,
) -> Result<LockId, StorageError> {
    Ok(LockId::new(format!(
        "{}-{}",
        owner_collection,
        resource_owner_id(resource_type, attributes)?
    )))
}

/// Owner id stored on resource locks: `{resource_type}-{hash}`.
fn resource_owner_id(
    resource_type: &str,
    attributes: &ResourceAttributes,
) -> Result<String, StorageError> {
    let bytes = serde_json::to_vec(attributes)?;
    let digest = xxh3_128(&bytes);
    Ok(format!(
        "{}-{}",
        resource_type,
        URL_SAFE_NO_PAD.encode(digest.to_be_bytes())
    ))
}

fn unassigned() -> DocVersion {
    DocVersion::UNASSIGNED
}

/// A lease over a job or a named resource.
///
/// The serialized shape is what lives in the document store. The lock id and
/// version are document metadata, not body fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(skip)]
    lock_id: String,
    #[serde(rename = "job_index_name")]
    owner_collection: String,
    #[serde(rename = "job_id")]
    owner_id: String,
    #[serde(rename = "lock_time", with = "chrono::serde::ts_seconds")]
    acquired_at: DateTime<Utc>,
    #[serde(rename = "lock_duration_seconds")]
    lease_duration_seconds: i64,
    released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,
    #[serde(rename = "resource", default, skip_serializing_if = "Option::is_none")]
    resource_attributes: Option<ResourceAttributes>,
    #[serde(skip, default = "unassigned")]
    version: DocVersion,
}

impl LockRecord {
    /// A fresh, unreleased lease for a job. The version is unassigned until
    /// the store accepts it.
    pub fn for_job(
        owner_collection: impl Into<String>,
        owner_id: impl Into<String>,
        acquired_at: DateTime<Utc>,
        lease_duration_seconds: i64,
    ) -> Self {
        let owner_collection = owner_collection.into();
        let owner_id = owner_id.into();
        Self {
            lock_id: job_lock_id(&owner_collection, &owner_id).as_str().to_string(),
            owner_collection,
            owner_id,
            acquired_at,
            lease_duration_seconds,
            released: false,
            resource_type: None,
            resource_attributes: None,
            version: DocVersion::UNASSIGNED,
        }
    }

    /// A fresh, unreleased lease for an arbitrary resource.
    pub fn for_resource(
        owner_collection: impl Into<String>,
        resource_type: impl Into<String>,
        attributes: ResourceAttributes,
        acquired_at: DateTime<Utc>,
        lease_duration_seconds: i64,
    ) -> Result<Self, StorageError> {
        let owner_collection = owner_collection.into();
        let resource_type = resource_type.into();
        let owner_id = resource_owner_id(&resource_type, &attributes)?;
        Ok(Self {
            lock_id: format!("{}-{}", owner_collection, owner_id),
            owner_collection,
            owner_id,
            acquired_at,
            lease_duration_seconds,
            released: false,
            resource_type: Some(resource_type),
            resource_attributes: Some(attributes),
            version: DocVersion::UNASSIGNED,
        })
    }

    /// Rebuild a record from a stored document.
    pub(crate) fn from_document(document: Document) -> Result<Self, StorageError> {
        let mut record: LockRecord = serde_json::from_value(document.body)?;
        record.lock_id = document.id;
        record.version = document.version;
        Ok(record)
    }

    pub(crate) fn to_body(&self) -> Result<serde_json::Value, StorageError> {
        Ok(serde_json::to_value(self)?)
    }

    pub(crate) fn with_version(mut self, version: DocVersion) -> Self {
        self.version = version;
        self
    }

    /// Copy of this lease re-acquired at `now`.
    pub(crate) fn renewed_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            acquired_at: now,
            released: false,
            ..self.clone()
        }
    }

    /// Copy of this lease marked released.
    pub(crate) fn as_released(&self) -> Self {
        Self {
            released: true,
            ..self.clone()
        }
    }

    /// Document id of this lease.
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Collection of the lease owner.
    pub fn owner_collection(&self) -> &str {
        &self.owner_collection
    }

    /// Owner id: the job id, or `{resource_type}-{hash}` for resource locks.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Resource type, for resource locks.
    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    /// Resource attributes, for resource locks.
    pub fn resource_attributes(&self) -> Option<&ResourceAttributes> {
        self.resource_attributes.as_ref()
    }

    /// When the lease was (re)acquired, to the second.
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Lease length in seconds.
    pub fn lease_duration_seconds(&self) -> i64 {
        self.lease_duration_seconds
    }

    /// Store-assigned CAS token.
    pub fn version(&self) -> DocVersion {
        self.version
    }

    /// Whether the holder gave the lease up.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether the lease ran out at `now`.
    ///
    /// A lease whose end lies beyond the representable range never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(end) => now >= end,
            None => false,
        }
    }

    /// End of the lease, or `None` if it overflows the calendar.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        TimeDelta::try_seconds(self.lease_duration_seconds)
            .and_then(|duration| self.acquired_at.checked_add_signed(duration))
    }

    /// Held and not expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.released && !self.is_expired(now)
    }
}
