//! Persisted pull cursors.

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The position an incremental pull resumes from.
///
/// One cursor exists per collection. It is the sole source of truth for
/// resuming pulls and must survive process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// `updated_at` of the newest row known to be completely pulled.
    pub last_seen: Timestamp,
    /// Id of that row, the tie-breaker for rows sharing `last_seen`.
    pub last_seen_id: String,
    /// Wall-clock time of the last successful pull run, if any.
    pub last_success: Option<Timestamp>,
}

impl Cursor {
    /// Creates a cursor at a watermark with no recorded success.
    pub fn new(last_seen: Timestamp, last_seen_id: impl Into<String>) -> Self {
        Self {
            last_seen,
            last_seen_id: last_seen_id.into(),
            last_success: None,
        }
    }

    /// A cursor that replays everything from the epoch.
    pub fn origin() -> Self {
        Self::new(Timestamp::EPOCH, "")
    }

    /// Returns true if the watermark lies more than `guard` past `now`.
    ///
    /// Such a cursor can never advance and would stall pulls forever.
    pub fn is_poisoned(&self, now: Timestamp, guard: Duration) -> bool {
        is_beyond_guard(self.last_seen, now, guard)
    }

    /// The `(updated_at, id)` pair used for ordering.
    pub fn watermark(&self) -> (Timestamp, &str) {
        (self.last_seen, self.last_seen_id.as_str())
    }
}

/// Returns true if `value` lies more than `guard` past `now`.
pub fn is_beyond_guard(value: Timestamp, now: Timestamp, guard: Duration) -> bool {
    value > now.saturating_add(guard)
}
