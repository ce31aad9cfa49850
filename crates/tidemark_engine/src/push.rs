//! Push of locally dirty rows.
//!
//! Dirty rows are checked one by one against the live remote document.
//! Rows the remote has overtaken are adopted locally as clean; the rest get
//! `version + 1` and the push time as `updated_at`, and are written in
//! atomic batches. A row is marked clean only after its batch committed.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::guard::InFlight;
use crate::outcome::{RunOutcome, Stage};
use crate::store::{CleanMark, LocalStore, RemoteStore, WriteBatch};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidemark_protocol::{ConflictResolver, RemoteDocument, Side, SyncRecord};
use tracing::{debug, info, warn};

/// Summary of one push run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Collection pushed.
    pub collection: String,
    /// The run did nothing because another push of this collection was in flight.
    pub skipped: bool,
    /// Dirty rows considered.
    pub considered: usize,
    /// Rows written to the remote store and marked clean.
    pub pushed: usize,
    /// Rows the remote had overtaken, adopted locally instead.
    pub adopted_remote: usize,
    /// Rows pushed over a remote document lacking version or updated_at.
    pub over_malformed: usize,
    /// Batches committed.
    pub batches: usize,
}

impl PushReport {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Default::default()
        }
    }
}

/// Pushes dirty local rows, one collection per run.
pub struct PushEngine<L: LocalStore, R: RemoteStore> {
    config: SyncConfig,
    local: Arc<L>,
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    in_flight: InFlight,
    cancelled: AtomicBool,
}

impl<L: LocalStore, R: RemoteStore> PushEngine<L, R> {
    /// Creates a push engine on the system clock.
    pub fn new(config: SyncConfig, local: Arc<L>, remote: Arc<R>) -> Self {
        Self {
            config,
            local,
            remote,
            clock: Arc::new(SystemClock),
            in_flight: InFlight::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cancels in-flight runs before their next remote call.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Runs one push of `collection`. Every error requests a retry.
    pub async fn run(&self, collection: &str) -> RunOutcome<PushReport> {
        let Some(_guard) = self.in_flight.try_claim(collection) else {
            info!(collection, "push already in flight; skipping");
            return RunOutcome::Success(PushReport {
                skipped: true,
                ..PushReport::new(collection)
            });
        };
        let result = self.try_run(collection).await;
        RunOutcome::from_result(Stage::Push, Some(collection), result)
    }

    /// Runs one push, returning errors instead of an outcome.
    pub async fn try_run(&self, collection: &str) -> SyncResult<PushReport> {
        self.config.validate()?;
        let mut report = PushReport::new(collection);

        let dirty = self
            .local
            .query_dirty(collection, self.config.push_batch_size)
            .await?;
        report.considered = dirty.len();
        if dirty.is_empty() {
            debug!(collection, "nothing to push");
            return Ok(report);
        }
        info!(collection, dirty = dirty.len(), "push started");

        let mut to_push = Vec::with_capacity(dirty.len());
        let mut adopted = Vec::new();
        for row in dirty {
            self.check_cancelled()?;
            match self.remote.get_document(collection, &row.id).await? {
                None => to_push.push(row),
                Some(doc) => match self.classify(collection, row, doc, &mut report) {
                    Decision::Push(row) => to_push.push(row),
                    Decision::Adopt(record) => adopted.push(record),
                },
            }
        }

        if !adopted.is_empty() {
            report.adopted_remote = adopted.len();
            self.local.upsert_batch(collection, adopted).await?;
        }

        let pushed_at = self.clock.now();
        let limit = self.remote.max_batch_size().max(1);
        for chunk in to_push.chunks(limit) {
            self.check_cancelled()?;

            let mut batch = WriteBatch::new();
            let mut marks = Vec::with_capacity(chunk.len());
            for row in chunk {
                let mut outgoing = row.clone();
                outgoing.version += 1;
                outgoing.updated_at = pushed_at;
                outgoing.is_dirty = false;
                batch.set(collection, RemoteDocument::from_record(&outgoing));
                marks.push(CleanMark {
                    id: row.id.clone(),
                    version: outgoing.version,
                    pushed_updated_at: row.updated_at,
                });
            }

            self.remote.commit_batch(batch).await?;
            self.local.mark_clean(collection, &marks, pushed_at).await?;
            report.pushed += chunk.len();
            report.batches += 1;
            debug!(collection, rows = chunk.len(), "committed push batch");
        }

        info!(
            collection,
            pushed = report.pushed,
            adopted_remote = report.adopted_remote,
            over_malformed = report.over_malformed,
            batches = report.batches,
            "push finished"
        );
        Ok(report)
    }

    fn classify(
        &self,
        collection: &str,
        row: SyncRecord,
        doc: RemoteDocument,
        report: &mut PushReport,
    ) -> Decision {
        let Some(remote_stamp) = doc.stamp() else {
            warn!(
                collection,
                id = %row.id,
                "remote document lacks version or updated_at; pushing local copy over it"
            );
            report.over_malformed += 1;
            return Decision::Push(row);
        };
        if !ConflictResolver::remote_wins(row.stamp(), remote_stamp) {
            return Decision::Push(row);
        }

        let remote = match SyncRecord::try_from(doc) {
            Ok(remote) => remote,
            Err(err) => {
                warn!(
                    collection,
                    id = %row.id,
                    reason = %err,
                    "cannot adopt remote document; pushing"
                );
                report.over_malformed += 1;
                return Decision::Push(row);
            }
        };
        debug!(collection, id = %row.id, version = remote.version, "remote is newer; adopting");
        match ConflictResolver::merge(row, remote) {
            (Side::Remote, record) => Decision::Adopt(record),
            // remote_wins already ruled this out
            (Side::Local, row) => Decision::Push(row),
        }
    }
}

enum Decision {
    Push(SyncRecord),
    Adopt(SyncRecord),
}
