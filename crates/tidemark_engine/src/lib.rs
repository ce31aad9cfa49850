//! # Tidemark Sync Engine
//!
//! Offline-first, bidirectional synchronization between a local durable
//! store and an authoritative remote store, one collection at a time.
//!
//! This crate provides:
//! - Delta pull with an overlap window and a self-healing cursor
//! - Push of dirty rows with per-row conflict checks and batched commit
//! - Cascade delete of a parent document and its dependents
//! - Hard purge of expired tombstones
//! - Explicit run outcomes (`Success`, `Retry`, `Fail`) for a scheduler
//! - In-memory and file-backed store implementations
//!
//! ## Architecture
//!
//! Pull and push are independent runs. A user edit marks a local row dirty;
//! the push engine reconciles it against the live remote copy and writes
//! it. The pull engine periodically merges remote changes and never
//! overwrites a dirty row, so an unpushed edit can only be superseded by a
//! push round.
//!
//! ## Key Invariants
//!
//! - `version` never decreases and only moves at push time
//! - A dirty row is never overwritten by a pull
//! - A row is marked clean only after the remote write was confirmed
//! - The cursor never lands beyond the poisoning guard
//! - Every commit is idempotent, so a run may be killed between any two

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cascade;
mod clock;
mod config;
mod error;
mod file_cursor;
mod guard;
mod memory;
mod outcome;
mod pull;
mod purge;
mod push;
mod runner;
mod scheduler;
mod store;

pub use cascade::{CascadeDeleteEngine, CascadeReport, CascadeTarget, CascadeTrigger};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CascadeSpec, RetryConfig, SyncConfig, CASCADE_PAGE_SIZE, EXTENDED_OVERLAP, GUARD_WINDOW,
    MAX_PAGES, NORMAL_OVERLAP, OFFLINE_THRESHOLD, PAGE_SIZE, PUSH_MAX_BATCH, TOMBSTONE_RETENTION,
};
pub use error::{RemoteErrorKind, SyncError, SyncResult};
pub use file_cursor::FileCursorStore;
pub use guard::{InFlight, RunGuard};
pub use memory::{MemoryCursorStore, MemoryLocalStore, MemoryRemoteStore, RemoteOp};
pub use outcome::{ErrorClass, FailurePayload, RunContext, RunOutcome, Stage};
pub use pull::{DeltaPullEngine, PullReport};
pub use purge::{PurgeReport, TombstonePurger};
pub use push::{PushEngine, PushReport};
pub use runner::{JobReport, SyncJob, SyncRunner, SyncStats};
pub use scheduler::{
    Enqueued, ExistingWorkPolicy, MemoryScheduler, ScheduledWork, SyncScheduler, WorkKind,
    WorkRequest,
};
pub use store::{
    CleanMark, CursorStore, FieldQuery, LocalStore, PageQuery, RemoteStore, WriteBatch, WriteOp,
};
