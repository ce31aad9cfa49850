//! Job dispatch and in-process retry.

use crate::cascade::{CascadeDeleteEngine, CascadeReport, CascadeTrigger};
use crate::clock::{Clock, SystemClock};
use crate::config::{CascadeSpec, SyncConfig};
use crate::error::SyncError;
use crate::outcome::{RunContext, RunOutcome, Stage};
use crate::pull::{DeltaPullEngine, PullReport};
use crate::purge::{PurgeReport, TombstonePurger};
use crate::push::{PushEngine, PushReport};
use crate::scheduler::WorkRequest;
use crate::store::{CursorStore, LocalStore, RemoteStore};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A unit of work the runner can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncJob {
    /// Delta pull of a collection.
    Pull {
        /// Collection name.
        collection: String,
    },
    /// Push of a collection's dirty rows.
    Push {
        /// Collection name.
        collection: String,
    },
    /// Cascade delete described by a trigger payload.
    CascadeDelete(CascadeTrigger),
    /// Hard purge of a collection's expired tombstones.
    PurgeTombstones {
        /// Collection name.
        collection: String,
    },
}

impl SyncJob {
    /// Stage that runs this job.
    pub fn stage(&self) -> Stage {
        match self {
            SyncJob::Pull { .. } => Stage::Pull,
            SyncJob::Push { .. } => Stage::Push,
            SyncJob::CascadeDelete(_) => Stage::CascadeDelete,
            SyncJob::PurgeTombstones { .. } => Stage::Purge,
        }
    }
}

/// Report of a successful job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobReport {
    /// Pull report.
    Pull(PullReport),
    /// Push report.
    Push(PushReport),
    /// Cascade delete report.
    CascadeDelete(CascadeReport),
    /// Purge report.
    Purge(PurgeReport),
}

/// Statistics across every job a runner executed.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Jobs that succeeded.
    pub jobs_succeeded: u64,
    /// Job attempts that asked to be retried.
    pub jobs_retried: u64,
    /// Jobs that failed terminally.
    pub jobs_failed: u64,
    /// Retry attempts made by [`SyncRunner::run_with_retry`].
    pub retries: u64,
    /// Rows written locally by pulls.
    pub rows_pulled: u64,
    /// Rows pushed.
    pub rows_pushed: u64,
    /// Remote dependents removed by cascade deletes.
    pub dependents_deleted: u64,
    /// Tombstones purged.
    pub tombstones_purged: u64,
    /// Last successful job.
    pub last_success: Option<Instant>,
    /// Last retry reason or failure message.
    pub last_error: Option<String>,
}

/// Wires the engines to one set of stores and dispatches jobs to them.
pub struct SyncRunner<L: LocalStore, R: RemoteStore, C: CursorStore> {
    config: SyncConfig,
    pull: DeltaPullEngine<L, R, C>,
    push: PushEngine<L, R>,
    purge: TombstonePurger<L>,
    cascade: Option<CascadeDeleteEngine<R>>,
    remote: Arc<R>,
    stats: RwLock<SyncStats>,
}

impl<L: LocalStore, R: RemoteStore, C: CursorStore> SyncRunner<L, R, C> {
    /// Creates a runner on the system clock.
    pub fn new(config: SyncConfig, local: Arc<L>, remote: Arc<R>, cursors: Arc<C>) -> Self {
        Self::with_clock(config, local, remote, cursors, Arc::new(SystemClock))
    }

    /// Creates a runner on an explicit clock.
    pub fn with_clock(
        config: SyncConfig,
        local: Arc<L>,
        remote: Arc<R>,
        cursors: Arc<C>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pull = DeltaPullEngine::new(
            config.clone(),
            Arc::clone(&local),
            Arc::clone(&remote),
            cursors,
        )
        .with_clock(Arc::clone(&clock));
        let push = PushEngine::new(config.clone(), Arc::clone(&local), Arc::clone(&remote))
            .with_clock(Arc::clone(&clock));
        let purge = TombstonePurger::new(config.clone(), local).with_clock(clock);
        Self {
            config,
            pull,
            push,
            purge,
            cascade: None,
            remote,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Enables cascade deletes between two collections.
    pub fn with_cascade(mut self, spec: CascadeSpec) -> Self {
        self.cascade = Some(CascadeDeleteEngine::new(
            self.config.clone(),
            spec,
            Arc::clone(&self.remote),
        ));
        self
    }

    /// Returns the pull engine.
    pub fn pull_engine(&self) -> &DeltaPullEngine<L, R, C> {
        &self.pull
    }

    /// Returns the push engine.
    pub fn push_engine(&self) -> &PushEngine<L, R> {
        &self.push
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels every engine at its next page or batch boundary.
    pub fn cancel(&self) {
        self.pull.cancel();
        self.push.cancel();
        self.purge.cancel();
        if let Some(cascade) = &self.cascade {
            cascade.cancel();
        }
    }

    /// Clears a previous [`SyncRunner::cancel`].
    pub fn reset_cancel(&self) {
        self.pull.reset_cancel();
        self.push.reset_cancel();
        self.purge.reset_cancel();
        if let Some(cascade) = &self.cascade {
            cascade.reset_cancel();
        }
    }

    /// Runs one attempt of a job.
    pub async fn run(&self, job: &SyncJob, ctx: RunContext) -> RunOutcome<JobReport> {
        let outcome = match job {
            SyncJob::Pull { collection } => {
                self.pull.run(collection, ctx).await.map(JobReport::Pull)
            }
            SyncJob::Push { collection } => self.push.run(collection).await.map(JobReport::Push),
            SyncJob::PurgeTombstones { collection } => {
                self.purge.run(collection).await.map(JobReport::Purge)
            }
            SyncJob::CascadeDelete(trigger) => match &self.cascade {
                Some(cascade) => cascade.run(trigger).await.map(JobReport::CascadeDelete),
                None => RunOutcome::from_result(
                    Stage::CascadeDelete,
                    None,
                    Err(SyncError::InvalidConfig(
                        "no cascade configured for this runner".into(),
                    )),
                ),
            },
        };
        self.record(&outcome);
        outcome
    }

    /// Runs a job, retrying `Retry` outcomes with exponential backoff.
    ///
    /// Each retry passes its attempt number on, so a retried pull uses the
    /// extended overlap window.
    pub async fn run_with_retry(&self, job: &SyncJob) -> RunOutcome<JobReport> {
        let retry = &self.config.retry;
        let mut outcome = RunOutcome::Retry {
            reason: "no attempt was made".into(),
        };

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt);
                debug!(
                    stage = %job.stage(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "waiting before retry"
                );
                tokio::time::sleep(delay).await;
                self.stats.write().retries += 1;
            }

            outcome = self.run(job, RunContext::retry(attempt)).await;
            if !outcome.is_retry() {
                break;
            }
        }
        outcome
    }

    /// Runs the job behind a scheduler request.
    pub async fn run_request(&self, request: &WorkRequest) -> RunOutcome<JobReport> {
        info!(name = %request.name, "running scheduled work");
        self.run_with_retry(&request.job()).await
    }

    fn record(&self, outcome: &RunOutcome<JobReport>) {
        let mut stats = self.stats.write();
        match outcome {
            RunOutcome::Success(report) => {
                stats.jobs_succeeded += 1;
                stats.last_success = Some(Instant::now());
                match report {
                    JobReport::Pull(r) => stats.rows_pulled += r.applied as u64,
                    JobReport::Push(r) => stats.rows_pushed += r.pushed as u64,
                    JobReport::CascadeDelete(r) => {
                        stats.dependents_deleted += r.dependents_deleted as u64;
                    }
                    JobReport::Purge(r) => stats.tombstones_purged += r.purged as u64,
                }
            }
            RunOutcome::Retry { reason } => {
                stats.jobs_retried += 1;
                stats.last_error = Some(reason.clone());
            }
            RunOutcome::Fail(payload) => {
                stats.jobs_failed += 1;
                stats.last_error = Some(payload.error_message.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RetryConfig;
    use crate::error::RemoteErrorKind;
    use crate::memory::{MemoryCursorStore, MemoryLocalStore, MemoryRemoteStore, RemoteOp};
    use std::time::Duration;
    use tidemark_protocol::{Cursor, Fields, SyncRecord, Timestamp};

    const NOW: i64 = 1_700_000_000;

    type Runner = SyncRunner<MemoryLocalStore, MemoryRemoteStore, MemoryCursorStore>;

    fn runner(
        retry: RetryConfig,
    ) -> (Runner, Arc<MemoryLocalStore>, Arc<MemoryRemoteStore>, Arc<MemoryCursorStore>) {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let cursors = Arc::new(MemoryCursorStore::new());
        let runner = SyncRunner::with_clock(
            SyncConfig::default().with_retry(retry),
            Arc::clone(&local),
            Arc::clone(&remote),
            Arc::clone(&cursors),
            Arc::new(ManualClock::new(Timestamp::from_secs(NOW))),
        );
        (runner, local, remote, cursors)
    }

    fn quick_retry(attempts: u32) -> RetryConfig {
        RetryConfig::new(attempts)
            .with_initial_delay(Duration::from_millis(1))
            .without_jitter()
    }

    fn pull(collection: &str) -> SyncJob {
        SyncJob::Pull {
            collection: collection.into(),
        }
    }

    #[tokio::test]
    async fn retried_pull_widens_overlap() {
        let (runner, _, remote, cursors) = runner(quick_retry(3));
        cursors.set(
            "events",
            Cursor {
                last_seen: Timestamp::from_secs(NOW - 100),
                last_seen_id: "a".into(),
                last_success: Some(Timestamp::from_secs(NOW - 60)),
            },
        );
        remote.fail_next(RemoteOp::QueryPage, RemoteErrorKind::Unavailable);

        let outcome = runner.run_with_retry(&pull("events")).await;
        let Some(JobReport::Pull(report)) = outcome.report() else {
            panic!("expected a pull report");
        };
        assert_eq!(report.overlap, Duration::from_secs(12 * 3600));

        let stats = runner.stats();
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.jobs_retried, 1);
        assert_eq!(stats.jobs_succeeded, 1);
    }

    #[tokio::test]
    async fn retry_stops_at_max_attempts() {
        let (runner, _, remote, _) = runner(quick_retry(2));
        for _ in 0..3 {
            remote.fail_next(RemoteOp::QueryPage, RemoteErrorKind::DeadlineExceeded);
        }
        assert!(runner.run_with_retry(&pull("events")).await.is_retry());
        assert_eq!(runner.stats().jobs_retried, 2);
    }

    #[tokio::test]
    async fn terminal_failure_is_not_retried() {
        let (runner, _, remote, _) = runner(quick_retry(5));
        remote.fail_next(RemoteOp::QueryPage, RemoteErrorKind::Unauthenticated);

        assert!(runner.run_with_retry(&pull("events")).await.is_fail());
        let stats = runner.stats();
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.retries, 0);
    }

    #[tokio::test]
    async fn dispatches_push_and_purge() {
        let (runner, local, remote, _) = runner(RetryConfig::no_retry());
        local.insert(
            "events",
            SyncRecord::new_local("a", Fields::new(), Timestamp::from_secs(NOW - 10)),
        );

        let job = SyncJob::Push {
            collection: "events".into(),
        };
        assert!(runner.run(&job, RunContext::first()).await.is_success());
        assert_eq!(remote.get("events", "a").unwrap().version, Some(1));

        let purge = SyncJob::PurgeTombstones {
            collection: "events".into(),
        };
        assert!(runner.run(&purge, RunContext::first()).await.is_success());
        assert_eq!(runner.stats().rows_pushed, 1);
    }

    #[tokio::test]
    async fn cascade_requires_configuration() {
        let (runner, _, _, _) = runner(RetryConfig::no_retry());
        let job = SyncJob::CascadeDelete(CascadeTrigger::parent("e1"));
        assert!(runner.run(&job, RunContext::first()).await.is_fail());

        let runner = runner.with_cascade(CascadeSpec::new("events", "attendance", "eventId"));
        assert!(runner.run(&job, RunContext::first()).await.is_success());
    }

    #[tokio::test]
    async fn cancel_reaches_every_engine() {
        let (runner, _, _, _) = runner(RetryConfig::no_retry());
        runner.cancel();
        assert!(runner
            .run(&pull("events"), RunContext::first())
            .await
            .is_retry());
        runner.reset_cancel();
        assert!(runner
            .run(&pull("events"), RunContext::first())
            .await
            .is_success());
    }

    #[tokio::test]
    async fn runs_scheduler_requests() {
        let (runner, _, remote, _) = runner(RetryConfig::no_retry());
        let outcome = runner.run_request(&WorkRequest::pull_now("events")).await;
        assert!(outcome.is_success());
        assert_eq!(remote.page_queries().len(), 1);
    }
}
