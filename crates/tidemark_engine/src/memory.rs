//! In-memory stores for tests and embedding.

use crate::error::{RemoteErrorKind, SyncError, SyncResult};
use crate::store::{
    CleanMark, CursorStore, FieldQuery, LocalStore, PageQuery, RemoteStore, WriteBatch, WriteOp,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tidemark_protocol::{Cursor, RemoteDocument, SyncRecord, Timestamp};

type Collections<T> = HashMap<String, BTreeMap<String, T>>;

/// An in-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    collections: RwLock<Collections<SyncRecord>>,
    failing: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a row directly.
    pub fn insert(&self, collection: &str, record: SyncRecord) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Reads a row directly.
    pub fn get(&self, collection: &str, id: &str) -> Option<SyncRecord> {
        self.collections
            .read()
            .get(collection)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    /// Returns every row of a collection, ordered by id.
    pub fn all(&self, collection: &str) -> Vec<SyncRecord> {
        self.collections
            .read()
            .get(collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `upsert_batch` calls so far.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SyncError::local("local store unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn upsert_batch(&self, collection: &str, records: Vec<SyncRecord>) -> SyncResult<()> {
        self.check_failing()?;
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write();
        let rows = collections.entry(collection.to_string()).or_default();
        for record in records {
            rows.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> SyncResult<Option<SyncRecord>> {
        self.check_failing()?;
        Ok(self.get(collection, id))
    }

    async fn get_by_ids(&self, collection: &str, ids: &[String]) -> SyncResult<Vec<SyncRecord>> {
        self.check_failing()?;
        let collections = self.collections.read();
        let Some(rows) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| rows.get(id)).cloned().collect())
    }

    async fn query_dirty(&self, collection: &str, limit: usize) -> SyncResult<Vec<SyncRecord>> {
        self.check_failing()?;
        let mut dirty: Vec<SyncRecord> = self
            .all(collection)
            .into_iter()
            .filter(|record| record.is_dirty)
            .collect();
        dirty.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));
        dirty.truncate(limit);
        Ok(dirty)
    }

    async fn mark_clean(
        &self,
        collection: &str,
        marks: &[CleanMark],
        updated_at: Timestamp,
    ) -> SyncResult<()> {
        self.check_failing()?;
        let mut collections = self.collections.write();
        let rows = collections.entry(collection.to_string()).or_default();
        for mark in marks {
            let Some(row) = rows.get_mut(&mark.id) else {
                continue;
            };
            row.version = row.version.max(mark.version);
            if row.updated_at == mark.pushed_updated_at {
                row.is_dirty = false;
                row.updated_at = updated_at;
            } else {
                // Edited after the push snapshot; the edit goes out next round.
                row.updated_at = row.updated_at.max(updated_at);
            }
        }
        Ok(())
    }

    async fn query_purgeable(
        &self,
        collection: &str,
        cutoff: Timestamp,
        limit: usize,
    ) -> SyncResult<Vec<String>> {
        self.check_failing()?;
        Ok(self
            .all(collection)
            .into_iter()
            .filter(|record| record.is_purgeable(cutoff))
            .take(limit)
            .map(|record| record.id)
            .collect())
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> SyncResult<()> {
        self.check_failing()?;
        if let Some(rows) = self.collections.write().get_mut(collection) {
            for id in ids {
                rows.remove(id);
            }
        }
        Ok(())
    }
}

/// Remote operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// [`RemoteStore::get_document`].
    Get,
    /// [`RemoteStore::query_page`].
    QueryPage,
    /// [`RemoteStore::query_by_field`].
    QueryByField,
    /// [`RemoteStore::commit_batch`].
    Commit,
    /// [`RemoteStore::delete_document`].
    Delete,
}

/// An in-memory [`RemoteStore`] that records its traffic.
///
/// Failures can be queued per operation with [`MemoryRemoteStore::fail_next`],
/// and documents can be pinned so that deletes silently do not take effect.
///
/// Page queries order documents by the `updated_at` they were last indexed
/// under. A document rewritten without `updated_at` keeps its previous
/// position, the way a stale index entry behaves, so readers still see it.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    collections: RwLock<Collections<RemoteDocument>>,
    index: RwLock<HashMap<(String, String), Timestamp>>,
    faults: Mutex<HashMap<RemoteOp, VecDeque<RemoteErrorKind>>>,
    pinned: RwLock<HashSet<(String, String)>>,
    page_queries: Mutex<Vec<PageQuery>>,
    commit_sizes: Mutex<Vec<usize>>,
    get_calls: AtomicUsize,
    max_batch_size: usize,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    /// Creates an empty store with a 500-write batch limit.
    pub fn new() -> Self {
        Self::with_max_batch_size(500)
    }

    /// Creates an empty store with a custom batch limit.
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            pinned: RwLock::new(HashSet::new()),
            page_queries: Mutex::new(Vec::new()),
            commit_sizes: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
            max_batch_size,
        }
    }

    /// Stores a document directly, as another writer would.
    pub fn put(&self, collection: &str, document: RemoteDocument) {
        if let Some(at) = document.updated_at {
            self.index
                .write()
                .insert((collection.to_string(), document.id.clone()), at);
        }
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(document.id.clone(), document);
    }

    /// Reads a document directly.
    pub fn get(&self, collection: &str, id: &str) -> Option<RemoteDocument> {
        self.collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Queues a failure for the next call of `op`.
    pub fn fail_next(&self, op: RemoteOp, kind: RemoteErrorKind) {
        self.faults.lock().entry(op).or_default().push_back(kind);
    }

    /// Makes deletes of this document silently not take effect.
    pub fn pin(&self, collection: &str, id: &str) {
        self.pinned
            .write()
            .insert((collection.to_string(), id.to_string()));
    }

    /// Page queries received so far.
    pub fn page_queries(&self) -> Vec<PageQuery> {
        self.page_queries.lock().clone()
    }

    /// Sizes of the batches committed so far.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.commit_sizes.lock().clone()
    }

    /// Number of single-document reads so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn take_fault(&self, op: RemoteOp) -> SyncResult<()> {
        let fault = self.faults.lock().get_mut(&op).and_then(VecDeque::pop_front);
        match fault {
            Some(kind) => Err(SyncError::remote(kind, format!("injected {op:?} failure"))),
            None => Ok(()),
        }
    }

    fn is_pinned(&self, collection: &str, id: &str) -> bool {
        self.pinned
            .read()
            .contains(&(collection.to_string(), id.to_string()))
    }

    fn remove(&self, collection: &str, id: &str) {
        if self.is_pinned(collection, id) {
            return;
        }
        if let Some(docs) = self.collections.write().get_mut(collection) {
            docs.remove(id);
        }
        self.index
            .write()
            .remove(&(collection.to_string(), id.to_string()));
    }

    fn indexed_at(&self, collection: &str, doc: &RemoteDocument) -> Option<Timestamp> {
        doc.updated_at.or_else(|| {
            self.index
                .read()
                .get(&(collection.to_string(), doc.id.clone()))
                .copied()
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> SyncResult<Option<RemoteDocument>> {
        self.take_fault(RemoteOp::Get)?;
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(collection, id))
    }

    async fn query_page(&self, query: &PageQuery) -> SyncResult<Vec<RemoteDocument>> {
        self.take_fault(RemoteOp::QueryPage)?;
        self.page_queries.lock().push(query.clone());

        let collections = self.collections.read();
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<(Timestamp, &RemoteDocument)> = docs
            .values()
            .filter_map(|doc| self.indexed_at(&query.collection, doc).map(|at| (at, doc)))
            .filter(|(at, _)| *at >= query.since)
            .collect();
        matching.sort_by(|a, b| (a.0, &a.1.id).cmp(&(b.0, &b.1.id)));

        Ok(matching
            .into_iter()
            .filter(|(at, doc)| match &query.start_after {
                Some((after_at, after_id)) => (*at, &doc.id) > (*after_at, after_id),
                None => true,
            })
            .take(query.limit)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn query_by_field(&self, query: &FieldQuery) -> SyncResult<Vec<RemoteDocument>> {
        self.take_fault(RemoteOp::QueryByField)?;
        let collections = self.collections.read();
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };
        // BTreeMap iteration is already ordered by id.
        Ok(docs
            .values()
            .filter(|doc| doc.field_str(&query.field) == Some(query.value.as_str()))
            .filter(|doc| match &query.start_after {
                Some(after) => doc.id.as_str() > after.as_str(),
                None => true,
            })
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn commit_batch(&self, batch: WriteBatch) -> SyncResult<()> {
        self.take_fault(RemoteOp::Commit)?;
        if batch.len() > self.max_batch_size {
            return Err(SyncError::remote(
                RemoteErrorKind::InvalidArgument,
                format!(
                    "batch of {} writes exceeds the limit of {}",
                    batch.len(),
                    self.max_batch_size
                ),
            ));
        }
        self.commit_sizes.lock().push(batch.len());
        for op in batch.ops {
            match op {
                WriteOp::Set {
                    collection,
                    document,
                } => self.put(&collection, document),
                WriteOp::Delete { collection, id } => self.remove(&collection, &id),
            }
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> SyncResult<()> {
        self.take_fault(RemoteOp::Delete)?;
        self.remove(collection, id);
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

/// An in-memory [`CursorStore`] that keeps a history of saves.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<String, Cursor>>,
    saves: Mutex<Vec<(String, Cursor)>>,
}

impl MemoryCursorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a cursor directly, without recording a save.
    pub fn set(&self, collection: &str, cursor: Cursor) {
        self.cursors.write().insert(collection.to_string(), cursor);
    }

    /// Reads a cursor directly.
    pub fn get(&self, collection: &str) -> Option<Cursor> {
        self.cursors.read().get(collection).cloned()
    }

    /// Every save, in order.
    pub fn saves(&self) -> Vec<(String, Cursor)> {
        self.saves.lock().clone()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, collection: &str) -> SyncResult<Option<Cursor>> {
        Ok(self.get(collection))
    }

    async fn save(&self, collection: &str, cursor: &Cursor) -> SyncResult<()> {
        self.set(collection, cursor.clone());
        self.saves
            .lock()
            .push((collection.to_string(), cursor.clone()));
        Ok(())
    }
}
