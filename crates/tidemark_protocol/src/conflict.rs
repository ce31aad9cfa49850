//! Deterministic conflict resolution between a local and a remote copy.

use crate::record::{Stamp, SyncRecord};

/// Outcome of comparing two stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The local copy is newer.
    LocalWins,
    /// The remote copy is newer.
    RemoteWins,
    /// Same version and same `updated_at`, to the nanosecond.
    Tie,
}

/// Which side's content a resolution kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Local content was kept.
    Local,
    /// Remote content was adopted.
    Remote,
}

/// Resolves `(local, remote)` pairs of the same entity into one winner.
///
/// The result depends only on both versions, both `updated_at` values and
/// the local dirty flag. There are no side effects.
///
/// # Rules
///
/// - the higher `version` wins
/// - on equal versions the strictly newer `updated_at` wins
/// - on an exact tie a dirty local copy wins, otherwise the remote does
/// - whatever wins, `created_at` becomes the earlier of the two and
///   `updated_at` the later of the two
pub struct ConflictResolver;

impl ConflictResolver {
    /// Compares two stamps with the version-then-timestamp rule.
    pub fn compare(local: Stamp, remote: Stamp) -> Verdict {
        if remote.version != local.version {
            return if remote.version > local.version {
                Verdict::RemoteWins
            } else {
                Verdict::LocalWins
            };
        }
        match remote.updated_at.cmp(&local.updated_at) {
            std::cmp::Ordering::Greater => Verdict::RemoteWins,
            std::cmp::Ordering::Less => Verdict::LocalWins,
            std::cmp::Ordering::Equal => Verdict::Tie,
        }
    }

    /// Returns true if the remote copy should replace the local one.
    ///
    /// This is the bare comparison used by the push conflict check; ties
    /// go to the local side there, since a dirty row is being pushed.
    pub fn remote_wins(local: Stamp, remote: Stamp) -> bool {
        Self::compare(local, remote) == Verdict::RemoteWins
    }

    /// Resolves a pair into the record that should be stored.
    ///
    /// Returns `None` only when both sides are absent.
    pub fn resolve(local: Option<SyncRecord>, remote: Option<SyncRecord>) -> Option<SyncRecord> {
        Self::resolve_with_winner(local, remote).map(|(_, record)| record)
    }

    /// Like [`ConflictResolver::resolve`], also reporting whose content won.
    pub fn resolve_with_winner(
        local: Option<SyncRecord>,
        remote: Option<SyncRecord>,
    ) -> Option<(Side, SyncRecord)> {
        match (local, remote) {
            (None, None) => None,
            (Some(local), None) => Some((Side::Local, local)),
            (None, Some(mut remote)) => {
                remote.is_dirty = false;
                Some((Side::Remote, remote))
            }
            (Some(local), Some(remote)) => Some(Self::merge(local, remote)),
        }
    }

    /// Resolves two present copies, reporting whose content won.
    pub fn merge(local: SyncRecord, remote: SyncRecord) -> (Side, SyncRecord) {
        let created_at = local.created_at.min(remote.created_at);
        let updated_at = local.updated_at.max(remote.updated_at);
        let id = if local.id.trim().is_empty() {
            remote.id.clone()
        } else {
            local.id.clone()
        };

        let side = match Self::compare(local.stamp(), remote.stamp()) {
            Verdict::RemoteWins => Side::Remote,
            Verdict::LocalWins => Side::Local,
            Verdict::Tie if local.is_dirty => Side::Local,
            Verdict::Tie => Side::Remote,
        };

        let mut winner = match side {
            Side::Local => local,
            Side::Remote => {
                let mut remote = remote;
                remote.is_dirty = false;
                remote
            }
        };
        winner.id = id;
        winner.created_at = created_at;
        winner.updated_at = updated_at;
        (side, winner)
    }
}
