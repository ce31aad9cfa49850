//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

/// Default poisoning guard: cursors more than this far in the future are reset.
pub const GUARD_WINDOW: Duration = Duration::from_secs(5 * 3600);
/// Default overlap after a failure, a long offline spell, or a cursor reset.
pub const EXTENDED_OVERLAP: Duration = Duration::from_secs(12 * 3600);
/// Default overlap for a healthy, recent cursor.
pub const NORMAL_OVERLAP: Duration = Duration::from_secs(10 * 60);
/// Default offline threshold after which the extended overlap applies.
pub const OFFLINE_THRESHOLD: Duration = Duration::from_secs(6 * 3600);
/// Default rows per pull page.
pub const PAGE_SIZE: usize = 500;
/// Default page cap per pull run.
pub const MAX_PAGES: usize = 50;
/// Default dirty rows per push run.
pub const PUSH_MAX_BATCH: usize = 500;
/// Default dependents per cascade-delete page, under the remote batch limit.
pub const CASCADE_PAGE_SIZE: usize = 450;
/// Default retention for clean tombstones before hard purge.
pub const TOMBSTONE_RETENTION: Duration = Duration::from_secs(30 * 24 * 3600);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cursors beyond `now + guard_window` are treated as poisoned.
    pub guard_window: Duration,
    /// Overlap used on retries, without a recorded success, or after the
    /// offline threshold.
    pub extended_overlap: Duration,
    /// Overlap used for a healthy cursor.
    pub normal_overlap: Duration,
    /// Time since the last success after which the extended overlap applies.
    pub offline_threshold: Duration,
    /// Rows per pull page.
    pub pull_page_size: usize,
    /// Maximum pages fetched by one pull run.
    pub pull_max_pages: usize,
    /// Maximum dirty rows considered by one push run.
    pub push_batch_size: usize,
    /// Dependents deleted per cascade page.
    pub cascade_page_size: usize,
    /// Retention for clean tombstones.
    pub tombstone_retention: Duration,
    /// Tombstones hard-deleted per purge page.
    pub purge_page_size: usize,
    /// Retry configuration for [`crate::SyncRunner::run_with_retry`].
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with the default windows and sizes.
    pub fn new() -> Self {
        Self {
            guard_window: GUARD_WINDOW,
            extended_overlap: EXTENDED_OVERLAP,
            normal_overlap: NORMAL_OVERLAP,
            offline_threshold: OFFLINE_THRESHOLD,
            pull_page_size: PAGE_SIZE,
            pull_max_pages: MAX_PAGES,
            push_batch_size: PUSH_MAX_BATCH,
            cascade_page_size: CASCADE_PAGE_SIZE,
            tombstone_retention: TOMBSTONE_RETENTION,
            purge_page_size: PAGE_SIZE,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the pull page size.
    pub fn with_pull_page_size(mut self, size: usize) -> Self {
        self.pull_page_size = size;
        self
    }

    /// Sets the maximum pages per pull run.
    pub fn with_pull_max_pages(mut self, pages: usize) -> Self {
        self.pull_max_pages = pages;
        self
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the cascade page size.
    pub fn with_cascade_page_size(mut self, size: usize) -> Self {
        self.cascade_page_size = size;
        self
    }

    /// Sets the poisoning guard, in hours.
    pub fn with_guard_hours(mut self, hours: u32) -> Self {
        self.guard_window = HOUR * hours;
        self
    }

    /// Sets both overlap windows.
    pub fn with_overlaps(mut self, normal: Duration, extended: Duration) -> Self {
        self.normal_overlap = normal;
        self.extended_overlap = extended;
        self
    }

    /// Sets the offline threshold.
    pub fn with_offline_threshold(mut self, threshold: Duration) -> Self {
        self.offline_threshold = threshold;
        self
    }

    /// Sets the tombstone retention.
    pub fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = retention;
        self
    }

    /// Sets the purge page size.
    pub fn with_purge_page_size(mut self, size: usize) -> Self {
        self.purge_page_size = size;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks that the sizes and windows are usable.
    pub fn validate(&self) -> SyncResult<()> {
        if self.pull_page_size == 0
            || self.push_batch_size == 0
            || self.cascade_page_size == 0
            || self.purge_page_size == 0
        {
            return Err(SyncError::InvalidConfig(
                "page and batch sizes must be non-zero".into(),
            ));
        }
        if self.pull_max_pages == 0 {
            return Err(SyncError::InvalidConfig(
                "pull_max_pages must be non-zero".into(),
            ));
        }
        if self.normal_overlap > self.extended_overlap {
            return Err(SyncError::InvalidConfig(
                "normal overlap must not exceed the extended overlap".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Names the collections linked by a cascade delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeSpec {
    /// Collection holding the parent documents.
    pub parent_collection: String,
    /// Collection holding the dependent rows.
    pub dependent_collection: String,
    /// Field of a dependent row that stores the parent id.
    pub parent_field: String,
}

impl CascadeSpec {
    /// Creates a cascade spec.
    pub fn new(
        parent_collection: impl Into<String>,
        dependent_collection: impl Into<String>,
        parent_field: impl Into<String>,
    ) -> Self {
        Self {
            parent_collection: parent_collection.into(),
            dependent_collection: dependent_collection.into(),
            parent_field: parent_field.into(),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(15 * 60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * rand_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Cheap time-derived jitter in `[0, 1)`; no RNG dependency.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
