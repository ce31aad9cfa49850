//! Run outcomes handed back to the scheduler.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

/// Which engine produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Delta pull.
    Pull,
    /// Push of dirty rows.
    Push,
    /// Cascade delete of a parent and its dependents.
    CascadeDelete,
    /// Hard purge of expired tombstones.
    Purge,
}

impl Stage {
    /// Classifies an error raised during this stage.
    ///
    /// - pull: non-retryable remote errors are terminal
    /// - push: every error is retried
    /// - cascade delete: only permission and authentication errors are terminal
    /// - purge: every error is retried
    pub fn classify(&self, err: &SyncError) -> ErrorClass {
        let terminal = match self {
            Stage::Pull => !err.is_retryable(),
            Stage::Push | Stage::Purge => false,
            Stage::CascadeDelete => {
                err.remote_kind().is_some_and(|kind| kind.is_auth())
                    || matches!(err, SyncError::InvalidConfig(_))
            }
        };
        if terminal {
            ErrorClass::Terminal
        } else {
            ErrorClass::Retryable
        }
    }

    /// Stable lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pull => "pull",
            Stage::Push => "push",
            Stage::CascadeDelete => "cascade_delete",
            Stage::Purge => "purge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an error may heal by retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Try again later.
    Retryable,
    /// Retrying cannot help.
    Terminal,
}

/// Diagnostics emitted when a run fails terminally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePayload {
    /// Stage that failed.
    pub stage: Stage,
    /// Collection or document the run was working on.
    pub entity_id: Option<String>,
    /// Error class name, e.g. `PERMISSION_DENIED`.
    pub error_class: String,
    /// Human-readable message.
    pub error_message: String,
}

impl FailurePayload {
    /// Builds a payload from an error.
    pub fn new(stage: Stage, entity_id: Option<&str>, err: &SyncError) -> Self {
        Self {
            stage,
            entity_id: entity_id.map(str::to_string),
            error_class: err.class_name(),
            error_message: err.to_string(),
        }
    }

    /// Serializes the payload as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Result of one run, as reported to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<R> {
    /// The run completed.
    Success(R),
    /// The run should be retried later.
    Retry {
        /// Why the run did not complete.
        reason: String,
    },
    /// The run failed and must not be retried.
    Fail(FailurePayload),
}

impl<R> RunOutcome<R> {
    /// Converts an inner result at a run boundary.
    ///
    /// Errors default to [`RunOutcome::Retry`]; only errors the stage
    /// classifies as terminal become [`RunOutcome::Fail`].
    pub fn from_result(stage: Stage, entity_id: Option<&str>, result: SyncResult<R>) -> Self {
        match result {
            Ok(report) => RunOutcome::Success(report),
            Err(err) => match stage.classify(&err) {
                ErrorClass::Retryable => {
                    warn!(
                        %stage,
                        entity = entity_id.unwrap_or(""),
                        error = %err,
                        "run will be retried"
                    );
                    RunOutcome::Retry {
                        reason: err.to_string(),
                    }
                }
                ErrorClass::Terminal => {
                    let payload = FailurePayload::new(stage, entity_id, &err);
                    error!(%stage, failure = %payload.to_json(), "run failed terminally");
                    RunOutcome::Fail(payload)
                }
            },
        }
    }

    /// Returns true for [`RunOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    /// Returns true for [`RunOutcome::Retry`].
    pub fn is_retry(&self) -> bool {
        matches!(self, RunOutcome::Retry { .. })
    }

    /// Returns true for [`RunOutcome::Fail`].
    pub fn is_fail(&self) -> bool {
        matches!(self, RunOutcome::Fail(_))
    }

    /// Returns the report of a successful run.
    pub fn report(&self) -> Option<&R> {
        match self {
            RunOutcome::Success(report) => Some(report),
            _ => None,
        }
    }

    /// Maps the success report.
    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> RunOutcome<U> {
        match self {
            RunOutcome::Success(report) => RunOutcome::Success(f(report)),
            RunOutcome::Retry { reason } => RunOutcome::Retry { reason },
            RunOutcome::Fail(payload) => RunOutcome::Fail(payload),
        }
    }
}

/// Context the scheduler passes to a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Zero for a first attempt, otherwise the number of earlier failed attempts.
    pub attempt: u32,
}

impl RunContext {
    /// Context of a first attempt.
    pub fn first() -> Self {
        Self { attempt: 0 }
    }

    /// Context of a retry.
    pub fn retry(attempt: u32) -> Self {
        Self { attempt }
    }

    /// Returns true if an earlier attempt failed.
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;

    #[test]
    fn pull_classification() {
        let stage = Stage::Pull;
        for kind in [
            RemoteErrorKind::PermissionDenied,
            RemoteErrorKind::Unauthenticated,
            RemoteErrorKind::InvalidArgument,
        ] {
            assert_eq!(
                stage.classify(&SyncError::remote(kind, "x")),
                ErrorClass::Terminal
            );
        }
        assert_eq!(
            stage.classify(&SyncError::remote(RemoteErrorKind::Unavailable, "x")),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn push_always_retries() {
        let err = SyncError::remote(RemoteErrorKind::PermissionDenied, "rules");
        assert_eq!(Stage::Push.classify(&err), ErrorClass::Retryable);
    }

    #[test]
    fn cascade_terminal_only_on_auth() {
        let stage = Stage::CascadeDelete;
        assert_eq!(
            stage.classify(&SyncError::remote(RemoteErrorKind::Unauthenticated, "x")),
            ErrorClass::Terminal
        );
        assert_eq!(
            stage.classify(&SyncError::remote(RemoteErrorKind::InvalidArgument, "x")),
            ErrorClass::Retryable
        );
        assert_eq!(
            stage.classify(&SyncError::ParentStillPresent {
                collection: "events".into(),
                id: "e".into()
            }),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn from_result_builds_payload() {
        let outcome: RunOutcome<()> = RunOutcome::from_result(
            Stage::Pull,
            Some("events"),
            Err(SyncError::remote(RemoteErrorKind::PermissionDenied, "rules")),
        );
        let RunOutcome::Fail(payload) = outcome else {
            panic!("expected a terminal failure");
        };
        assert_eq!(payload.stage, Stage::Pull);
        assert_eq!(payload.entity_id.as_deref(), Some("events"));
        assert_eq!(payload.error_class, "PERMISSION_DENIED");

        let json = payload.to_json();
        assert!(json.contains("\"stage\":\"pull\""));
        assert!(json.contains("\"entityId\":\"events\""));
        assert!(json.contains("\"errorClass\""));
        assert!(json.contains("\"errorMessage\""));
    }

    #[test]
    fn from_result_defaults_to_retry() {
        let outcome: RunOutcome<()> =
            RunOutcome::from_result(Stage::Push, None, Err(SyncError::local("locked")));
        assert!(outcome.is_retry());

        let outcome = RunOutcome::from_result(Stage::Push, None, Ok(7));
        assert_eq!(outcome.report(), Some(&7));
        assert_eq!(outcome.map(|n| n * 2), RunOutcome::Success(14));
    }

    #[test]
    fn run_context() {
        assert!(!RunContext::first().is_retry());
        assert!(RunContext::retry(2).is_retry());
    }
}
