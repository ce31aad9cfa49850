//! Error types for the sync engine.

use std::fmt;
use std::io;
use thiserror::Error;
use tidemark_protocol::MappingError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Status reported by the remote store for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// The service is unreachable or the network is down.
    Unavailable,
    /// The call timed out.
    DeadlineExceeded,
    /// The caller lacks permission.
    PermissionDenied,
    /// The caller is not authenticated.
    Unauthenticated,
    /// The request was malformed.
    InvalidArgument,
    /// The target does not exist.
    NotFound,
    /// The call was aborted, usually by contention.
    Aborted,
    /// A quota or rate limit was hit.
    ResourceExhausted,
    /// The service failed internally.
    Internal,
    /// Anything else.
    Unknown,
}

impl RemoteErrorKind {
    /// Returns true for authorization failures, which retrying cannot fix.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            RemoteErrorKind::PermissionDenied | RemoteErrorKind::Unauthenticated
        )
    }

    /// Stable upper-case name, as used in failure payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::Unavailable => "UNAVAILABLE",
            RemoteErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
            RemoteErrorKind::PermissionDenied => "PERMISSION_DENIED",
            RemoteErrorKind::Unauthenticated => "UNAUTHENTICATED",
            RemoteErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            RemoteErrorKind::NotFound => "NOT_FOUND",
            RemoteErrorKind::Aborted => "ABORTED",
            RemoteErrorKind::ResourceExhausted => "RESOURCE_EXHAUSTED",
            RemoteErrorKind::Internal => "INTERNAL",
            RemoteErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store rejected or failed a call.
    #[error("remote error ({kind}): {message}")]
    Remote {
        /// Status reported by the remote.
        kind: RemoteErrorKind,
        /// Error message.
        message: String,
    },

    /// The local store failed.
    #[error("local store error: {0}")]
    LocalStore(String),

    /// The cursor store failed.
    #[error("cursor store error: {0}")]
    CursorStore(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(String),

    /// A remote document failed validation.
    #[error("invalid remote document: {0}")]
    Mapping(#[from] MappingError),

    /// A deleted parent document is still visible on a server read.
    #[error("parent {collection}/{id} still exists after delete")]
    ParentStillPresent {
        /// Parent collection.
        collection: String,
        /// Parent id.
        id: String,
    },

    /// The trigger payload could not be read.
    #[error("invalid trigger payload: {0}")]
    InvalidTrigger(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a remote error.
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            message: message.into(),
        }
    }

    /// Creates a local store error.
    pub fn local(message: impl Into<String>) -> Self {
        Self::LocalStore(message.into())
    }

    /// Returns the remote status, if this is a remote error.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            SyncError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Remote permission, authentication and invalid-argument failures
    /// will not heal by themselves; neither will a bad configuration or
    /// trigger payload. Everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { kind, .. } => {
                !kind.is_auth() && *kind != RemoteErrorKind::InvalidArgument
            }
            SyncError::InvalidConfig(_) | SyncError::InvalidTrigger(_) => false,
            _ => true,
        }
    }

    /// Short class name for failure payloads.
    pub fn class_name(&self) -> String {
        match self {
            SyncError::Remote { kind, .. } => kind.as_str().to_string(),
            SyncError::LocalStore(_) => "LOCAL_STORE".into(),
            SyncError::CursorStore(_) => "CURSOR_STORE".into(),
            SyncError::Io(_) => "IO".into(),
            SyncError::Codec(_) => "CODEC".into(),
            SyncError::Mapping(_) => "MAPPING".into(),
            SyncError::ParentStillPresent { .. } => "PARENT_STILL_PRESENT".into(),
            SyncError::InvalidTrigger(_) => "INVALID_TRIGGER".into(),
            SyncError::InvalidConfig(_) => "INVALID_CONFIG".into(),
            SyncError::Cancelled => "CANCELLED".into(),
        }
    }
}
