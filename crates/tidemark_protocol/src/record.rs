//! Syncable records and their remote representation.

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque domain payload carried by a record.
///
/// The sync core never interprets these fields, except that a dependent
/// collection stores a reference to its parent under a configured key.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The `(version, updated_at)` pair that decides conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    /// Push-time version counter.
    pub version: u64,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl Stamp {
    /// Creates a stamp.
    pub fn new(version: u64, updated_at: Timestamp) -> Self {
        Self {
            version,
            updated_at,
        }
    }
}

/// A row of a synchronized collection, as held by the local store.
///
/// # Invariants
///
/// - `version` never decreases and is bumped only when a push is confirmed
/// - a dirty record must not be overwritten by a pull merge
/// - a tombstone is kept until it is clean and older than the retention cutoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Stable identifier.
    pub id: String,
    /// Push-time version counter.
    pub version: u64,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
    /// Local content not yet confirmed written to the remote store.
    pub is_dirty: bool,
    /// Soft-delete marker.
    pub is_deleted: bool,
    /// When the record was soft-deleted.
    pub deleted_at: Option<Timestamp>,
    /// Domain payload.
    pub fields: Fields,
}

impl SyncRecord {
    /// Creates a record that exists only locally: version 0, dirty.
    pub fn new_local(id: impl Into<String>, fields: Fields, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            version: 0,
            created_at: now,
            updated_at: now,
            is_dirty: true,
            is_deleted: false,
            deleted_at: None,
            fields,
        }
    }

    /// Applies a user edit. The version is left alone; it only moves at push time.
    pub fn edit(&mut self, fields: Fields, now: Timestamp) {
        self.fields = fields;
        self.updated_at = now;
        self.is_dirty = true;
    }

    /// Soft-deletes the record.
    pub fn tombstone(&mut self, now: Timestamp) {
        self.is_deleted = true;
        self.deleted_at = Some(now);
        self.updated_at = now;
        self.is_dirty = true;
    }

    /// Returns the conflict-deciding stamp.
    pub fn stamp(&self) -> Stamp {
        Stamp::new(self.version, self.updated_at)
    }

    /// Returns a string field of the payload.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|value| value.as_str())
    }

    /// Returns true if the tombstone may be hard-purged.
    pub fn is_purgeable(&self, cutoff: Timestamp) -> bool {
        self.is_deleted && !self.is_dirty && self.deleted_at.is_some_and(|at| at < cutoff)
    }
}

/// A document as stored remotely.
///
/// Remote writers are not trusted: `version`, `created_at` and `updated_at`
/// may be absent. Use [`SyncRecord::try_from`] to validate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteDocument {
    /// Document identifier.
    pub id: String,
    /// Version counter, if the writer set one.
    pub version: Option<u64>,
    /// Creation time, if the writer set one.
    pub created_at: Option<Timestamp>,
    /// Last modification time, if the writer set one.
    pub updated_at: Option<Timestamp>,
    /// Soft-delete marker.
    #[serde(default)]
    pub is_deleted: bool,
    /// When the document was soft-deleted.
    pub deleted_at: Option<Timestamp>,
    /// Domain payload.
    #[serde(default)]
    pub fields: Fields,
}

impl RemoteDocument {
    /// Builds the document a push writes for `record`.
    pub fn from_record(record: &SyncRecord) -> Self {
        Self {
            id: record.id.clone(),
            version: Some(record.version),
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            is_deleted: record.is_deleted,
            deleted_at: record.deleted_at,
            fields: record.fields.clone(),
        }
    }

    /// Returns the stamp if both mandatory fields are present.
    pub fn stamp(&self) -> Option<Stamp> {
        Some(Stamp::new(self.version?, self.updated_at?))
    }

    /// Returns true if both `version` and `updated_at` are present.
    pub fn is_well_formed(&self) -> bool {
        self.stamp().is_some()
    }

    /// Returns a string field of the payload.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|value| value.as_str())
    }
}

/// Why a remote document could not become a [`SyncRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The document has no id.
    #[error("document has a blank id")]
    BlankId,

    /// The document has no `updated_at`.
    #[error("document {id} is missing updated_at")]
    MissingUpdatedAt {
        /// Document id.
        id: String,
    },

    /// The document has no `version`.
    #[error("document {id} is missing version")]
    MissingVersion {
        /// Document id.
        id: String,
    },
}

impl TryFrom<RemoteDocument> for SyncRecord {
    type Error = MappingError;

    /// Validates a remote document. Pulled records are always clean.
    ///
    /// A missing version is an error, never a default: a synthesized
    /// version would hide a writer bug and could let a stale row win later.
    fn try_from(doc: RemoteDocument) -> Result<Self, Self::Error> {
        if doc.id.trim().is_empty() {
            return Err(MappingError::BlankId);
        }
        let updated_at = doc
            .updated_at
            .ok_or_else(|| MappingError::MissingUpdatedAt { id: doc.id.clone() })?;
        let version = doc
            .version
            .ok_or_else(|| MappingError::MissingVersion { id: doc.id.clone() })?;

        Ok(Self {
            id: doc.id,
            version,
            created_at: doc.created_at.unwrap_or(updated_at),
            updated_at,
            is_dirty: false,
            is_deleted: doc.is_deleted,
            deleted_at: doc.deleted_at,
            fields: doc.fields,
        })
    }
}
