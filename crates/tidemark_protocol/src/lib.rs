//! # Tidemark Protocol
//!
//! Record, cursor and conflict-resolution types for the tidemark sync engine.
//!
//! This crate provides:
//! - [`Timestamp`] with nanosecond ordering
//! - [`SyncRecord`] (local rows) and [`RemoteDocument`] (untrusted remote rows)
//! - [`Cursor`] for resuming incremental pulls
//! - [`ConflictResolver`], the pure local-vs-remote decision function
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod cursor;
mod record;
mod timestamp;

pub use conflict::{ConflictResolver, Side, Verdict};
pub use cursor::{is_beyond_guard, Cursor};
pub use record::{Fields, MappingError, RemoteDocument, Stamp, SyncRecord};
pub use timestamp::Timestamp;
