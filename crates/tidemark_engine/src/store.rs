//! Store abstractions the engines run against.
//!
//! These traits are the seams between the sync core and its collaborators:
//! the local database, the authoritative remote store, and the durable
//! cursor record. Every call may suspend; none of them hold locks across
//! calls.

use crate::error::SyncResult;
use async_trait::async_trait;
use tidemark_protocol::{Cursor, RemoteDocument, SyncRecord, Timestamp};

/// Per-row instruction for [`LocalStore::mark_clean`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanMark {
    /// Row id.
    pub id: String,
    /// Version confirmed by the remote.
    pub version: u64,
    /// `updated_at` of the local row when it was read for pushing.
    pub pushed_updated_at: Timestamp,
}

/// The local durable store of one or more collections.
///
/// # Invariants
///
/// - `upsert_batch` writes the whole batch or nothing
/// - `query_dirty` returns rows ordered by `updated_at` ascending
/// - `mark_clean` only clears the dirty flag of rows whose `updated_at` is
///   still the pushed snapshot; rows edited since keep `is_dirty = true`
///   while still taking the new version and `updated_at`
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Inserts or replaces rows, last write wins.
    async fn upsert_batch(&self, collection: &str, records: Vec<SyncRecord>) -> SyncResult<()>;

    /// Reads one row.
    async fn get_by_id(&self, collection: &str, id: &str) -> SyncResult<Option<SyncRecord>>;

    /// Reads the rows that exist among `ids`.
    async fn get_by_ids(&self, collection: &str, ids: &[String]) -> SyncResult<Vec<SyncRecord>>;

    /// Returns up to `limit` dirty rows, oldest `updated_at` first.
    async fn query_dirty(&self, collection: &str, limit: usize) -> SyncResult<Vec<SyncRecord>>;

    /// Records confirmed pushes.
    async fn mark_clean(
        &self,
        collection: &str,
        marks: &[CleanMark],
        updated_at: Timestamp,
    ) -> SyncResult<()>;

    /// Returns up to `limit` ids of clean tombstones deleted before `cutoff`.
    async fn query_purgeable(
        &self,
        collection: &str,
        cutoff: Timestamp,
        limit: usize,
    ) -> SyncResult<Vec<String>>;

    /// Hard-deletes rows.
    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> SyncResult<()>;
}

/// A range query over one collection ordered by `(updated_at, id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// Collection name.
    pub collection: String,
    /// Lower bound, inclusive, on `updated_at`.
    pub since: Timestamp,
    /// Resume strictly after this `(updated_at, id)` position.
    pub start_after: Option<(Timestamp, String)>,
    /// Maximum documents returned.
    pub limit: usize,
}

/// An equality query over one field, ordered by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    /// Collection name.
    pub collection: String,
    /// Field to match.
    pub field: String,
    /// Value the field must equal.
    pub value: String,
    /// Resume strictly after this id.
    pub start_after: Option<String>,
    /// Maximum documents returned.
    pub limit: usize,
}

/// One write in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite a document.
    Set {
        /// Collection name.
        collection: String,
        /// Document to store.
        document: RemoteDocument,
    },
    /// Delete a document.
    Delete {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },
}

/// An atomic multi-document write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    /// Writes, applied all together or not at all.
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a set.
    pub fn set(&mut self, collection: &str, document: RemoteDocument) {
        self.ops.push(WriteOp::Set {
            collection: collection.to_string(),
            document,
        });
    }

    /// Adds a delete.
    pub fn delete(&mut self, collection: &str, id: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.into(),
        });
    }

    /// Number of writes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch has no writes.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The authoritative remote store.
///
/// Reads must come from the server, never from a local cache of remote
/// state: the push conflict check and the cascade re-read depend on it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads one document from the server.
    async fn get_document(&self, collection: &str, id: &str)
        -> SyncResult<Option<RemoteDocument>>;

    /// Runs a page of a `(updated_at, id)`-ordered range query.
    ///
    /// Documents without `updated_at` cannot match the range filter.
    async fn query_page(&self, query: &PageQuery) -> SyncResult<Vec<RemoteDocument>>;

    /// Runs a page of an equality query ordered by id.
    async fn query_by_field(&self, query: &FieldQuery) -> SyncResult<Vec<RemoteDocument>>;

    /// Commits a batch atomically. Fails without applying anything if the
    /// batch is larger than [`RemoteStore::max_batch_size`].
    async fn commit_batch(&self, batch: WriteBatch) -> SyncResult<()>;

    /// Deletes one document. Deleting a missing document succeeds.
    async fn delete_document(&self, collection: &str, id: &str) -> SyncResult<()>;

    /// Largest batch [`RemoteStore::commit_batch`] accepts.
    fn max_batch_size(&self) -> usize {
        500
    }
}

/// Durable per-collection cursor storage.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Loads the cursor of `collection`, if one was ever saved.
    async fn load(&self, collection: &str) -> SyncResult<Option<Cursor>>;

    /// Saves the cursor of `collection`.
    async fn save(&self, collection: &str, cursor: &Cursor) -> SyncResult<()>;
}
