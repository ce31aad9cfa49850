//! Per-key run exclusivity.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Set of keys with a run in flight.
///
/// A run for a key may not overlap another run for the same key; runs for
/// different keys proceed independently. The lock is never held across an
/// await point.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, or returns `None` if a run already holds it.
    ///
    /// The claim is released when the guard drops, including when the
    /// run's future is dropped mid-flight.
    pub fn try_claim(&self, key: &str) -> Option<RunGuard> {
        let mut keys = self.keys.lock();
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(RunGuard {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }

    /// Returns true if `key` is claimed.
    pub fn is_claimed(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }
}

/// Releases a claimed key on drop.
#[derive(Debug)]
pub struct RunGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.key);
    }
}
