//! Incremental delta pull.
//!
//! A pull run resumes from the persisted [`Cursor`] of a collection, pages
//! through remote rows ordered by `(updated_at, id)`, merges them into the
//! local store without ever touching dirty rows, and advances the cursor.
//!
//! ## Run outline
//!
//! 1. Load the cursor (absent means "replay from the epoch").
//! 2. Reset a poisoned cursor, one lying beyond `now + guard_window`, to
//!    `now - extended_overlap` and persist the reset immediately.
//! 3. Pick an overlap window and subtract it from the cursor.
//! 4. Page the remote store until a short page or the page cap.
//! 5. Per page: drop malformed rows, merge, upsert the page in one batch.
//! 6. Persist the new watermark (guarded again) and the success time.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::guard::InFlight;
use crate::outcome::{RunContext, RunOutcome, Stage};
use crate::store::{CursorStore, LocalStore, PageQuery, RemoteStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tidemark_protocol::{
    is_beyond_guard, ConflictResolver, Cursor, RemoteDocument, Side, SyncRecord, Timestamp,
};
use tracing::{debug, info, warn};

/// Summary of one pull run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullReport {
    /// Collection pulled.
    pub collection: String,
    /// The run did nothing because another pull of this collection was in flight.
    pub skipped: bool,
    /// Lower bound used for the query.
    pub since: Timestamp,
    /// Overlap window subtracted from the cursor.
    pub overlap: Duration,
    /// Pages requested.
    pub pages: usize,
    /// Remote rows received.
    pub fetched: usize,
    /// Rows written locally.
    pub applied: usize,
    /// Rows where the local copy was kept.
    pub kept_local: usize,
    /// Malformed remote rows skipped.
    pub rejected: usize,
    /// A poisoned cursor or watermark was reset this run.
    pub cursor_reset: bool,
    /// The page cap stopped the run before the remote ran dry.
    pub hit_page_cap: bool,
    /// The last page of the budget resumed after the stored watermark
    /// instead of finishing the overlap re-read.
    pub resumed_after_watermark: bool,
    /// Cursor persisted at the end of the run.
    pub cursor: Option<Cursor>,
}

impl PullReport {
    fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Default::default()
        }
    }
}

/// Pulls remote changes into the local store, one collection per run.
pub struct DeltaPullEngine<L: LocalStore, R: RemoteStore, C: CursorStore> {
    config: SyncConfig,
    local: Arc<L>,
    remote: Arc<R>,
    cursors: Arc<C>,
    clock: Arc<dyn Clock>,
    in_flight: InFlight,
    cancelled: AtomicBool,
}

impl<L: LocalStore, R: RemoteStore, C: CursorStore> DeltaPullEngine<L, R, C> {
    /// Creates a pull engine on the system clock.
    pub fn new(config: SyncConfig, local: Arc<L>, remote: Arc<R>, cursors: Arc<C>) -> Self {
        Self {
            config,
            local,
            remote,
            cursors,
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

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Cancels in-flight runs at their next page boundary.
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

    /// Runs one pull of `collection`.
    ///
    /// A second concurrent run for the same collection returns a skipped
    /// report instead of overlapping.
    pub async fn run(&self, collection: &str, ctx: RunContext) -> RunOutcome<PullReport> {
        let Some(_guard) = self.in_flight.try_claim(collection) else {
            info!(collection, "pull already in flight; skipping");
            return RunOutcome::Success(PullReport {
                skipped: true,
                ..PullReport::new(collection)
            });
        };
        let result = self.try_run(collection, ctx).await;
        RunOutcome::from_result(Stage::Pull, Some(collection), result)
    }

    /// Runs one pull, returning errors instead of an outcome.
    pub async fn try_run(&self, collection: &str, ctx: RunContext) -> SyncResult<PullReport> {
        self.config.validate()?;
        let mut report = PullReport::new(collection);
        let now = self.clock.now();

        let mut cursor = self
            .cursors
            .load(collection)
            .await?
            .unwrap_or_else(Cursor::origin);

        if cursor.is_poisoned(now, self.config.guard_window) {
            let reset = self.reset_cursor(now);
            warn!(
                collection,
                poisoned = %cursor.last_seen,
                reset_to = %reset.last_seen,
                "cursor lies beyond the guard window; resetting"
            );
            self.cursors.save(collection, &reset).await?;
            cursor = reset;
            report.cursor_reset = true;
        }

        // A reset cursor already sits an extended overlap behind `now`.
        report.overlap = if report.cursor_reset {
            Duration::ZERO
        } else {
            self.overlap_for(&cursor, now, ctx)
        };
        report.since = cursor.last_seen.saturating_sub(report.overlap);

        info!(
            collection,
            since = %report.since,
            overlap_secs = report.overlap.as_secs(),
            attempt = ctx.attempt,
            "pull started"
        );

        let resume = (!cursor.last_seen_id.is_empty() && !report.overlap.is_zero())
            .then(|| (cursor.last_seen, cursor.last_seen_id.clone()));
        let candidate = self.pull_pages(collection, resume, &mut report).await?;

        let finished = self.clock.now();
        let mut next = cursor;
        if let Some((at, id)) = candidate {
            if is_beyond_guard(at, finished, self.config.guard_window) {
                warn!(
                    collection,
                    watermark = %at,
                    id = %id,
                    "new watermark lies beyond the guard window; saving a reset cursor"
                );
                next = self.reset_cursor(finished);
                report.cursor_reset = true;
            } else if (at, id.as_str()) > next.watermark() {
                next.last_seen = at;
                next.last_seen_id = id;
            }
        }
        next.last_success = Some(finished);
        self.cursors.save(collection, &next).await?;
        report.cursor = Some(next);

        info!(
            collection,
            pages = report.pages,
            fetched = report.fetched,
            applied = report.applied,
            kept_local = report.kept_local,
            rejected = report.rejected,
            hit_page_cap = report.hit_page_cap,
            "pull finished"
        );
        Ok(report)
    }

    /// Pages the remote and merges each page. Returns the candidate watermark.
    ///
    /// `resume` is the stored watermark. If the overlap re-read is still
    /// behind it when one page of budget remains, that page resumes after
    /// the watermark, so a crowded overlap window cannot stall the cursor.
    async fn pull_pages(
        &self,
        collection: &str,
        resume: Option<(Timestamp, String)>,
        report: &mut PullReport,
    ) -> SyncResult<Option<(Timestamp, String)>> {
        let page_size = self.config.pull_page_size;
        let mut start_after: Option<(Timestamp, String)> = None;
        let mut candidate = None;

        for page_index in 0..self.config.pull_max_pages {
            self.check_cancelled()?;

            if page_index + 1 == self.config.pull_max_pages {
                if let Some(watermark) = &resume {
                    let behind = start_after.as_ref().is_none_or(|at| at < watermark);
                    if behind {
                        debug!(
                            collection,
                            watermark = %watermark.0,
                            id = %watermark.1,
                            "overlap re-read exhausted the page budget; resuming after watermark"
                        );
                        start_after = Some(watermark.clone());
                        report.resumed_after_watermark = true;
                    }
                }
            }

            let query = PageQuery {
                collection: collection.to_string(),
                since: report.since,
                start_after: start_after.clone(),
                limit: page_size,
            };
            let docs = self.remote.query_page(&query).await?;
            report.pages += 1;
            report.fetched += docs.len();
            debug!(collection, page = page_index, rows = docs.len(), "pulled page");

            let Some(last) = docs.last() else {
                break;
            };
            match last.stamp() {
                Some(stamp) => candidate = Some((stamp.updated_at, last.id.clone())),
                None => warn!(
                    collection,
                    id = %last.id,
                    "trailing row lacks version or updated_at; watermark not advanced"
                ),
            }
            let anchor = docs
                .iter()
                .rev()
                .find_map(|doc| doc.updated_at.map(|at| (at, doc.id.clone())));
            let full = docs.len() >= page_size;

            self.merge_page(collection, docs, report).await?;

            if !full {
                break;
            }
            if page_index + 1 == self.config.pull_max_pages {
                report.hit_page_cap = true;
                break;
            }
            match anchor {
                Some(anchor) => start_after = Some(anchor),
                None => {
                    warn!(collection, "page has no orderable row to resume after; stopping");
                    break;
                }
            }
        }
        Ok(candidate)
    }

    /// Maps, merges and upserts one page.
    async fn merge_page(
        &self,
        collection: &str,
        docs: Vec<RemoteDocument>,
        report: &mut PullReport,
    ) -> SyncResult<()> {
        let mut incoming = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.id.clone();
            match SyncRecord::try_from(doc) {
                Ok(record) => incoming.push(record),
                Err(err) => {
                    report.rejected += 1;
                    warn!(collection, id = %id, reason = %err, "rejecting malformed remote row");
                }
            }
        }
        if incoming.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = incoming.iter().map(|record| record.id.clone()).collect();
        let mut locals: HashMap<String, SyncRecord> = self
            .local
            .get_by_ids(collection, &ids)
            .await?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        let mut writes = Vec::with_capacity(incoming.len());
        for remote in incoming {
            match locals.remove(&remote.id) {
                None => writes.push(remote),
                Some(local) if local.is_dirty => {
                    // Unpushed edit: the push path reconciles it.
                    debug!(collection, id = %local.id, "keeping dirty local row");
                    report.kept_local += 1;
                }
                Some(local) => match ConflictResolver::merge(local, remote) {
                    (Side::Remote, merged) => writes.push(merged),
                    (Side::Local, _) => report.kept_local += 1,
                },
            }
        }

        if !writes.is_empty() {
            report.applied += writes.len();
            self.local.upsert_batch(collection, writes).await?;
        }
        Ok(())
    }

    /// Chooses the overlap subtracted from the cursor.
    fn overlap_for(&self, cursor: &Cursor, now: Timestamp, ctx: RunContext) -> Duration {
        let stale = match cursor.last_success {
            None => true,
            Some(last) => now.duration_since(last) > self.config.offline_threshold,
        };
        if ctx.is_retry() || stale {
            self.config.extended_overlap
        } else {
            self.config.normal_overlap
        }
    }

    fn reset_cursor(&self, now: Timestamp) -> Cursor {
        Cursor::new(now.saturating_sub(self.config.extended_overlap), "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::RemoteErrorKind;
    use crate::memory::{MemoryCursorStore, MemoryLocalStore, MemoryRemoteStore, RemoteOp};
    use serde_json::json;
    use tidemark_protocol::Fields;

    const HOUR: u64 = 3600;
    const NOW: i64 = 1_700_000_000;

    struct Harness {
        local: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        cursors: Arc<MemoryCursorStore>,
        clock: Arc<ManualClock>,
        engine: DeltaPullEngine<MemoryLocalStore, MemoryRemoteStore, MemoryCursorStore>,
    }

    fn harness(config: SyncConfig) -> Harness {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let cursors = Arc::new(MemoryCursorStore::new());
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(NOW)));
        let engine = DeltaPullEngine::new(
            config,
            Arc::clone(&local),
            Arc::clone(&remote),
            Arc::clone(&cursors),
        )
        .with_clock(clock.clone());
        Harness {
            local,
            remote,
            cursors,
            clock,
            engine,
        }
    }

    fn doc(id: &str, version: u64, updated: i64, title: &str) -> RemoteDocument {
        let mut fields = Fields::new();
        fields.insert("title".into(), json!(title));
        RemoteDocument {
            id: id.into(),
            version: Some(version),
            created_at: Some(Timestamp::from_secs(updated)),
            updated_at: Some(Timestamp::from_secs(updated)),
            fields,
            ..Default::default()
        }
    }

    fn healthy_cursor(at: i64) -> Cursor {
        Cursor {
            last_seen: Timestamp::from_secs(at),
            last_seen_id: "x".into(),
            last_success: Some(Timestamp::from_secs(NOW - 60)),
        }
    }

    #[tokio::test]
    async fn first_pull_inserts_clean_rows_and_sets_cursor() {
        let h = harness(SyncConfig::default());
        h.remote.put("events", doc("a", 1, NOW - 100, "a"));
        h.remote.put("events", doc("b", 1, NOW - 50, "b"));

        let report = h.engine.run("events", RunContext::first()).await;
        let report = report.report().cloned().unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.since, Timestamp::EPOCH);

        let a = h.local.get("events", "a").unwrap();
        assert!(!a.is_dirty);

        let cursor = h.cursors.get("events").unwrap();
        assert_eq!(cursor.last_seen, Timestamp::from_secs(NOW - 50));
        assert_eq!(cursor.last_seen_id, "b");
        assert_eq!(cursor.last_success, Some(Timestamp::from_secs(NOW)));
    }

    #[tokio::test]
    async fn healthy_cursor_uses_normal_overlap() {
        let h = harness(SyncConfig::default());
        h.cursors.set("events", healthy_cursor(NOW - 1000));

        let outcome = h.engine.run("events", RunContext::first()).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.overlap, Duration::from_secs(600));
        assert_eq!(report.since, Timestamp::from_secs(NOW - 1600));
    }

    #[tokio::test]
    async fn retry_and_offline_use_extended_overlap() {
        let h = harness(SyncConfig::default());
        h.cursors.set("events", healthy_cursor(NOW - 1000));
        let outcome = h.engine.run("events", RunContext::retry(1)).await;
        assert_eq!(
            outcome.report().unwrap().overlap,
            Duration::from_secs(12 * HOUR)
        );

        // Last success was a minute ago; seven hours pass offline.
        let h = harness(SyncConfig::default());
        h.cursors.set("events", healthy_cursor(NOW - 1000));
        h.clock.advance(Duration::from_secs(7 * HOUR));
        let outcome = h.engine.run("events", RunContext::first()).await;
        assert_eq!(
            outcome.report().unwrap().overlap,
            Duration::from_secs(12 * HOUR)
        );
    }

    #[tokio::test]
    async fn poisoned_cursor_is_reset_before_querying() {
        let h = harness(SyncConfig::default());
        h.cursors.set(
            "events",
            Cursor {
                last_seen: Timestamp::from_secs(NOW + 10 * HOUR as i64),
                last_seen_id: "future".into(),
                last_success: Some(Timestamp::from_secs(NOW - 60)),
            },
        );

        let outcome = h.engine.run("events", RunContext::first()).await;
        let report = outcome.report().unwrap();
        let baseline = Timestamp::from_secs(NOW - 12 * HOUR as i64);
        assert!(report.cursor_reset);
        assert_eq!(h.remote.page_queries()[0].since, baseline);

        // Reset persisted before the query, then kept as the baseline.
        let saves = h.cursors.saves();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[0].1.last_seen, baseline);
        assert!(saves[0].1.last_seen_id.is_empty());
        assert!(saves[0].1.last_success.is_none());
        let stored = h.cursors.get("events").unwrap();
        assert_eq!(stored.last_seen, baseline);
        assert_eq!(stored.last_success, Some(Timestamp::from_secs(NOW)));
    }

    #[tokio::test]
    async fn poisoned_watermark_is_not_persisted() {
        let h = harness(SyncConfig::default());
        h.remote
            .put("events", doc("skewed", 1, NOW + 9 * HOUR as i64, "from the future"));

        let outcome = h.engine.run("events", RunContext::first()).await;
        assert!(outcome.report().unwrap().cursor_reset);

        let stored = h.cursors.get("events").unwrap();
        assert_eq!(stored.last_seen, Timestamp::from_secs(NOW - 12 * HOUR as i64));
        assert!(stored.last_seen_id.is_empty());
        // The row itself is still merged.
        assert!(h.local.get("events", "skewed").is_some());
    }

    #[tokio::test]
    async fn malformed_trailing_row_does_not_advance_watermark() {
        let h = harness(SyncConfig::default());
        h.cursors.set("events", healthy_cursor(NOW - 1000));
        h.remote.put("events", doc("good", 1, NOW - 900, "ok"));
        let mut bad = doc("bad", 1, NOW - 800, "no version");
        bad.version = None;
        h.remote.put("events", bad);

        let outcome = h.engine.run("events", RunContext::first()).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(report.applied, 1);
        assert!(h.local.get("events", "bad").is_none());

        let stored = h.cursors.get("events").unwrap();
        assert_eq!(stored.last_seen, Timestamp::from_secs(NOW - 1000));
        assert_eq!(stored.last_seen_id, "x");
    }

    #[tokio::test]
    async fn trailing_row_without_updated_at_does_not_advance_watermark() {
        let h = harness(SyncConfig::default());
        h.cursors.set("events", healthy_cursor(NOW - 1000));
        h.remote.put("events", doc("good", 1, NOW - 900, "ok"));
        h.remote.put("events", doc("stripped", 2, NOW - 800, "indexed"));
        let mut stripped = doc("stripped", 2, NOW - 800, "rewritten");
        stripped.updated_at = None;
        h.remote.put("events", stripped);

        let outcome = h.engine.run("events", RunContext::first()).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.applied, 1);
        assert!(h.local.get("events", "stripped").is_none());

        let stored = h.cursors.get("events").unwrap();
        assert_eq!(stored.last_seen, Timestamp::from_secs(NOW - 1000));
        assert_eq!(stored.last_seen_id, "x");
    }

    #[tokio::test]
    async fn crowded_overlap_still_reaches_new_rows() {
        let config = SyncConfig::default()
            .with_pull_page_size(2)
            .with_pull_max_pages(2);
        let h = harness(config);
        h.cursors.set("events", healthy_cursor(NOW - 1000));
        for (i, at) in [1500, 1400, 1300, 1200, 1100].into_iter().enumerate() {
            h.remote
                .put("events", doc(&format!("old-{i}"), 1, NOW - at, "seen"));
        }
        h.remote.put("events", doc("new", 1, NOW - 500, "unseen"));

        let outcome = h.engine.run("events", RunContext::first()).await;
        let report = outcome.report().unwrap();
        assert!(report.resumed_after_watermark);
        assert!(h.local.get("events", "new").is_some());

        let queries = h.remote.page_queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(
            queries[1].start_after,
            Some((Timestamp::from_secs(NOW - 1000), "x".to_string()))
        );
        let stored = h.cursors.get("events").unwrap();
        assert_eq!(stored.last_seen, Timestamp::from_secs(NOW - 500));
        assert_eq!(stored.last_seen_id, "new");
    }

    #[tokio::test]
    async fn dirty_local_rows_are_never_clobbered() {
        let h = harness(SyncConfig::default());
        let mut fields = Fields::new();
        fields.insert("title".into(), json!("local edit"));
        let mut local = SyncRecord::new_local("a", fields, Timestamp::from_secs(NOW - 500));
        local.version = 1;
        h.local.insert("events", local.clone());
        h.remote.put("events", doc("a", 9, NOW - 10, "remote"));

        let outcome = h.engine.run("events", RunContext::first()).await;
        assert_eq!(outcome.report().unwrap().kept_local, 1);
        assert_eq!(h.local.get("events", "a").unwrap(), local);
        assert_eq!(h.local.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn clean_local_rows_follow_the_resolver() {
        let h = harness(SyncConfig::default());
        let mut older = SyncRecord::try_from(doc("a", 1, NOW - 500, "old")).unwrap();
        older.created_at = Timestamp::from_secs(NOW - 5000);
        h.local.insert("events", older);
        let newer = SyncRecord::try_from(doc("b", 5, NOW - 500, "newer local")).unwrap();
        h.local.insert("events", newer);
        h.remote.put("events", doc("a", 2, NOW - 100, "new"));
        h.remote.put("events", doc("b", 4, NOW - 100, "stale remote"));

        h.engine.run("events", RunContext::first()).await;

        let a = h.local.get("events", "a").unwrap();
        assert_eq!(a.version, 2);
        assert_eq!(a.field_str("title"), Some("new"));
        assert_eq!(a.created_at, Timestamp::from_secs(NOW - 5000));

        let b = h.local.get("events", "b").unwrap();
        assert_eq!(b.version, 5);
        assert_eq!(b.field_str("title"), Some("newer local"));
    }

    #[tokio::test]
    async fn pages_until_short_page() {
        let h = harness(SyncConfig::default().with_pull_page_size(2));
        for i in 0..5 {
            h.remote.put("events", doc(&format!("r{i}"), 1, NOW - 100 + i, "x"));
        }
        let outcome = h.engine.run("events", RunContext::first()).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.applied, 5);
        assert_eq!(h.cursors.get("events").unwrap().last_seen_id, "r4");

        let queries = h.remote.page_queries();
        assert_eq!(
            queries[1].start_after,
            Some((Timestamp::from_secs(NOW - 99), "r1".into()))
        );
    }

    #[tokio::test]
    async fn page_cap_bounds_one_run() {
        let h = harness(
            SyncConfig::default()
                .with_pull_page_size(2)
                .with_pull_max_pages(2),
        );
        for i in 0..10 {
            h.remote.put("events", doc(&format!("r{i}"), 1, NOW - 100 + i, "x"));
        }
        let outcome = h.engine.run("events", RunContext::first()).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.pages, 2);
        assert!(report.hit_page_cap);
        assert_eq!(h.cursors.get("events").unwrap().last_seen_id, "r3");
    }

    #[tokio::test]
    async fn remote_errors_are_classified() {
        let h = harness(SyncConfig::default());
        h.remote
            .fail_next(RemoteOp::QueryPage, RemoteErrorKind::Unavailable);
        assert!(h.engine.run("events", RunContext::first()).await.is_retry());

        h.remote
            .fail_next(RemoteOp::QueryPage, RemoteErrorKind::PermissionDenied);
        let outcome = h.engine.run("events", RunContext::first()).await;
        let RunOutcome::Fail(payload) = outcome else {
            panic!("expected terminal failure");
        };
        assert_eq!(payload.error_class, "PERMISSION_DENIED");
        assert_eq!(payload.entity_id.as_deref(), Some("events"));

        // A failed run never records success.
        assert!(h.cursors.get("events").is_none());
    }

    #[tokio::test]
    async fn cancelled_pull_requests_retry() {
        let h = harness(SyncConfig::default());
        h.engine.cancel();
        assert!(h.engine.run("events", RunContext::first()).await.is_retry());
        h.engine.reset_cancel();
        assert!(h.engine.run("events", RunContext::first()).await.is_success());
    }

    #[tokio::test]
    async fn concurrent_run_of_same_collection_is_skipped() {
        let h = harness(SyncConfig::default());
        let _held = h.engine.in_flight.try_claim("events").unwrap();
        let outcome = h.engine.run("events", RunContext::first()).await;
        assert!(outcome.report().unwrap().skipped);
        assert!(h.remote.page_queries().is_empty());

        let other = h.engine.run("attendance", RunContext::first()).await;
        assert!(!other.report().unwrap().skipped);
    }
}
