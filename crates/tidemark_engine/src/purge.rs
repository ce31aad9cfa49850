//! Hard purge of expired tombstones.
//!
//! A soft-deleted row is kept until it has been pushed and its
//! `deleted_at` is older than the retention window. Dirty tombstones are
//! never purged, or the delete would never reach the remote store.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::guard::InFlight;
use crate::outcome::{RunOutcome, Stage};
use crate::store::LocalStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidemark_protocol::Timestamp;
use tracing::{debug, info};

/// Summary of one purge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Collection purged.
    pub collection: String,
    /// The run did nothing because another purge of this collection was in flight.
    pub skipped: bool,
    /// Tombstones deleted before this instant were eligible.
    pub cutoff: Timestamp,
    /// Rows hard-deleted.
    pub purged: usize,
}

/// Hard-deletes clean tombstones past their retention.
pub struct TombstonePurger<L: LocalStore> {
    config: SyncConfig,
    local: Arc<L>,
    clock: Arc<dyn Clock>,
    in_flight: InFlight,
    cancelled: AtomicBool,
}

impl<L: LocalStore> TombstonePurger<L> {
    /// Creates a purger on the system clock.
    pub fn new(config: SyncConfig, local: Arc<L>) -> Self {
        Self {
            config,
            local,
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

    /// Cancels in-flight runs at their next page boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Runs one purge of `collection`.
    pub async fn run(&self, collection: &str) -> RunOutcome<PurgeReport> {
        let Some(_guard) = self.in_flight.try_claim(collection) else {
            return RunOutcome::Success(PurgeReport {
                collection: collection.to_string(),
                skipped: true,
                ..Default::default()
            });
        };
        let result = self.try_run(collection).await;
        RunOutcome::from_result(Stage::Purge, Some(collection), result)
    }

    /// Runs one purge, returning errors instead of an outcome.
    pub async fn try_run(&self, collection: &str) -> SyncResult<PurgeReport> {
        self.config.validate()?;
        let cutoff = self
            .clock
            .now()
            .saturating_sub(self.config.tombstone_retention);
        let mut report = PurgeReport {
            collection: collection.to_string(),
            cutoff,
            ..Default::default()
        };

        let limit = self.config.purge_page_size;
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(SyncError::Cancelled);
            }
            let ids = self.local.query_purgeable(collection, cutoff, limit).await?;
            if ids.is_empty() {
                break;
            }
            self.local.delete_by_ids(collection, &ids).await?;
            report.purged += ids.len();
            debug!(collection, rows = ids.len(), "purged tombstone page");
            if ids.len() < limit {
                break;
            }
        }

        if report.purged > 0 {
            info!(collection, purged = report.purged, cutoff = %cutoff, "purged tombstones");
        }
        Ok(report)
    }
}
