//! Contract between the engines and a background-work scheduler.
//!
//! The scheduler itself lives outside this crate. It decides cadence and
//! connectivity gating; the engines only describe the work they want run
//! through [`WorkRequest`]s with stable unique names, so enqueueing the same
//! request twice never produces two parallel jobs.

use crate::error::{SyncError, SyncResult};
use crate::runner::SyncJob;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const NAME_PREFIX: &str = "tidemark";

/// Kind of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    /// Pull on a cadence.
    PeriodicPull,
    /// Pull once, now.
    OnDemandPull,
    /// Push on a cadence.
    PeriodicPush,
    /// Push once, now.
    OnDemandPush,
}

impl WorkKind {
    fn name_part(self) -> &'static str {
        match self {
            WorkKind::PeriodicPull => "pull.periodic",
            WorkKind::OnDemandPull => "pull.now",
            WorkKind::PeriodicPush => "push.periodic",
            WorkKind::OnDemandPush => "push.now",
        }
    }

    /// Returns true for the periodic kinds.
    pub fn is_periodic(self) -> bool {
        matches!(self, WorkKind::PeriodicPull | WorkKind::PeriodicPush)
    }
}

/// What to do when work with the same unique name is already enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    /// Cancel the existing work and enqueue the new request.
    Replace,
    /// Keep the existing instance but adopt the new parameters.
    Update,
    /// Leave the existing work alone and drop the new request.
    Keep,
}

/// A unit of background work, identified by its unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    /// Stable unique name, e.g. `tidemark.pull.periodic.events`.
    pub name: String,
    /// Kind of work.
    pub kind: WorkKind,
    /// Collection the work applies to.
    pub collection: String,
    /// Policy on a name clash.
    pub policy: ExistingWorkPolicy,
    /// Run only while the network is reachable.
    pub requires_network: bool,
    /// Cadence of periodic work.
    pub interval: Option<Duration>,
}

impl WorkRequest {
    fn build(kind: WorkKind, collection: &str, interval: Option<Duration>) -> Self {
        let policy = if kind.is_periodic() {
            ExistingWorkPolicy::Update
        } else {
            ExistingWorkPolicy::Replace
        };
        Self {
            name: format!("{NAME_PREFIX}.{}.{collection}", kind.name_part()),
            kind,
            collection: collection.to_string(),
            policy,
            requires_network: true,
            interval,
        }
    }

    /// Periodic pull of a collection.
    pub fn periodic_pull(collection: &str, interval: Duration) -> Self {
        Self::build(WorkKind::PeriodicPull, collection, Some(interval))
    }

    /// One-off pull of a collection.
    pub fn pull_now(collection: &str) -> Self {
        Self::build(WorkKind::OnDemandPull, collection, None)
    }

    /// Periodic push of a collection.
    pub fn periodic_push(collection: &str, interval: Duration) -> Self {
        Self::build(WorkKind::PeriodicPush, collection, Some(interval))
    }

    /// One-off push of a collection.
    pub fn push_now(collection: &str) -> Self {
        Self::build(WorkKind::OnDemandPush, collection, None)
    }

    /// Overrides the clash policy.
    pub fn with_policy(mut self, policy: ExistingWorkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets whether the work waits for connectivity.
    pub fn with_requires_network(mut self, requires_network: bool) -> Self {
        self.requires_network = requires_network;
        self
    }

    /// The job the runner executes for this request.
    pub fn job(&self) -> SyncJob {
        match self.kind {
            WorkKind::PeriodicPull | WorkKind::OnDemandPull => SyncJob::Pull {
                collection: self.collection.clone(),
            },
            WorkKind::PeriodicPush | WorkKind::OnDemandPush => SyncJob::Push {
                collection: self.collection.clone(),
            },
        }
    }

    fn validate(&self) -> SyncResult<()> {
        if self.collection.trim().is_empty() {
            return Err(SyncError::InvalidConfig(format!(
                "work request {} has no collection",
                self.name
            )));
        }
        if self.kind.is_periodic() && self.interval.map_or(true, |i| i.is_zero()) {
            return Err(SyncError::InvalidConfig(format!(
                "periodic work request {} needs a non-zero interval",
                self.name
            )));
        }
        Ok(())
    }
}

/// What an enqueue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// No work had this name; the request was scheduled.
    Scheduled,
    /// Existing work was cancelled and replaced.
    Replaced,
    /// Existing work took over the new parameters.
    Updated,
    /// Existing work was kept; the request was dropped.
    Kept,
}

/// Idempotent enqueueing of background sync work.
pub trait SyncScheduler: Send + Sync {
    /// Enqueues a request under its unique name.
    fn enqueue(&self, request: WorkRequest) -> SyncResult<Enqueued>;

    /// Cancels work by unique name. Returns false if none was enqueued.
    fn cancel(&self, name: &str) -> bool;
}

/// Work held by a [`MemoryScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledWork {
    /// The current request.
    pub request: WorkRequest,
    /// Bumped whenever the work is replaced rather than updated.
    pub generation: u64,
}

/// An in-memory [`SyncScheduler`] with unique-name semantics.
#[derive(Debug)]
pub struct MemoryScheduler {
    work: Mutex<BTreeMap<String, ScheduledWork>>,
    network: AtomicBool,
}

impl Default for MemoryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScheduler {
    /// Creates an empty scheduler with the network reachable.
    pub fn new() -> Self {
        Self {
            work: Mutex::new(BTreeMap::new()),
            network: AtomicBool::new(true),
        }
    }

    /// Sets network reachability.
    pub fn set_network(&self, available: bool) {
        self.network.store(available, Ordering::SeqCst);
    }

    /// Returns the work enqueued under `name`.
    pub fn get(&self, name: &str) -> Option<ScheduledWork> {
        self.work.lock().get(name).cloned()
    }

    /// Number of distinct enqueued names.
    pub fn len(&self) -> usize {
        self.work.lock().len()
    }

    /// Returns true if nothing is enqueued.
    pub fn is_empty(&self) -> bool {
        self.work.lock().is_empty()
    }

    /// Requests whose constraints are met right now, ordered by name.
    pub fn runnable(&self) -> Vec<WorkRequest> {
        let network = self.network.load(Ordering::SeqCst);
        self.work
            .lock()
            .values()
            .filter(|work| network || !work.request.requires_network)
            .map(|work| work.request.clone())
            .collect()
    }

    /// Marks one-off work as done. Periodic work stays enqueued.
    pub fn complete(&self, name: &str) {
        let mut work = self.work.lock();
        if work
            .get(name)
            .is_some_and(|entry| !entry.request.kind.is_periodic())
        {
            work.remove(name);
        }
    }
}

impl SyncScheduler for MemoryScheduler {
    fn enqueue(&self, request: WorkRequest) -> SyncResult<Enqueued> {
        request.validate()?;
        let mut work = self.work.lock();
        let Some(existing) = work.get_mut(&request.name) else {
            work.insert(
                request.name.clone(),
                ScheduledWork {
                    request,
                    generation: 0,
                },
            );
            return Ok(Enqueued::Scheduled);
        };
        Ok(match request.policy {
            ExistingWorkPolicy::Keep => Enqueued::Kept,
            ExistingWorkPolicy::Update => {
                existing.request = request;
                Enqueued::Updated
            }
            ExistingWorkPolicy::Replace => {
                existing.request = request;
                existing.generation += 1;
                Enqueued::Replaced
            }
        })
    }

    fn cancel(&self, name: &str) -> bool {
        self.work.lock().remove(name).is_some()
    }
}
