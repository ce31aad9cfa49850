//! Cascade delete of a parent document and its dependents.
//!
//! The parent is deleted first and its absence confirmed by an
//! authoritative re-read. Dependents referencing the parent are then paged
//! by id and removed one batch per page.

use crate::config::{CascadeSpec, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::guard::InFlight;
use crate::outcome::{RunOutcome, Stage};
use crate::store::{FieldQuery, RemoteStore, WriteBatch};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Trigger payload for a cascade delete.
///
/// Older producers send the parent id as `eventId`; current ones send
/// `parentId`. Call [`CascadeTrigger::target`] once and pass the result on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeTrigger {
    /// Parent id, current field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Parent id, legacy field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl CascadeTrigger {
    /// A trigger using the current field name.
    pub fn parent(id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(id.into()),
            event_id: None,
        }
    }

    /// Parses a JSON trigger payload.
    pub fn from_json(payload: &str) -> SyncResult<Self> {
        serde_json::from_str(payload).map_err(|err| SyncError::InvalidTrigger(err.to_string()))
    }

    /// Resolves the parent to delete. `None` means there is nothing to do.
    pub fn target(&self) -> Option<CascadeTarget> {
        let non_blank = |id: &Option<String>| {
            id.as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        };
        non_blank(&self.parent_id)
            .or_else(|| non_blank(&self.event_id))
            .map(|parent_id| CascadeTarget { parent_id })
    }
}

/// The parent a cascade delete removes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CascadeTarget {
    /// Parent document id.
    pub parent_id: String,
}

/// Summary of one cascade delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Parent id, empty for a no-op trigger.
    pub parent_id: String,
    /// The run did nothing: blank trigger or the same parent already in flight.
    pub skipped: bool,
    /// The parent's absence was confirmed by a re-read.
    pub parent_confirmed_absent: bool,
    /// Dependent pages fetched.
    pub pages: usize,
    /// Dependents deleted.
    pub dependents_deleted: usize,
}

/// Deletes a parent remote document together with its dependents.
pub struct CascadeDeleteEngine<R: RemoteStore> {
    config: SyncConfig,
    spec: CascadeSpec,
    remote: Arc<R>,
    in_flight: InFlight,
    cancelled: AtomicBool,
}

impl<R: RemoteStore> CascadeDeleteEngine<R> {
    /// Creates a cascade engine for one parent/dependent pair.
    pub fn new(config: SyncConfig, spec: CascadeSpec, remote: Arc<R>) -> Self {
        Self {
            config,
            spec,
            remote,
            in_flight: InFlight::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the collections this engine links.
    pub fn spec(&self) -> &CascadeSpec {
        &self.spec
    }

    /// Cancels in-flight runs at their next page boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Runs a cascade delete for a trigger payload.
    ///
    /// Only permission and authentication errors fail terminally.
    pub async fn run(&self, trigger: &CascadeTrigger) -> RunOutcome<CascadeReport> {
        let Some(target) = trigger.target() else {
            info!("cascade trigger carries no parent id; nothing to delete");
            return RunOutcome::Success(CascadeReport {
                skipped: true,
                ..Default::default()
            });
        };
        self.run_target(&target).await
    }

    /// Runs a cascade delete for an already-resolved target.
    pub async fn run_target(&self, target: &CascadeTarget) -> RunOutcome<CascadeReport> {
        let parent_id = target.parent_id.as_str();
        let Some(_guard) = self.in_flight.try_claim(parent_id) else {
            info!(parent_id, "cascade delete already in flight; skipping");
            return RunOutcome::Success(CascadeReport {
                parent_id: parent_id.to_string(),
                skipped: true,
                ..Default::default()
            });
        };
        let result = self.try_run(target).await;
        RunOutcome::from_result(Stage::CascadeDelete, Some(parent_id), result)
    }

    /// Dependent page size, clamped to what one remote batch may hold.
    fn page_size(&self) -> usize {
        let limit = self.remote.max_batch_size().max(1);
        let configured = self.config.cascade_page_size;
        if configured > limit {
            warn!(
                configured,
                limit,
                "cascade page size exceeds the remote batch limit; clamping"
            );
        }
        configured.min(limit)
    }

    /// Runs a cascade delete, returning errors instead of an outcome.
    pub async fn try_run(&self, target: &CascadeTarget) -> SyncResult<CascadeReport> {
        self.config.validate()?;
        let spec = &self.spec;
        let parent_id = target.parent_id.as_str();
        let mut report = CascadeReport {
            parent_id: parent_id.to_string(),
            ..Default::default()
        };
        info!(
            parent = %spec.parent_collection,
            parent_id,
            dependents = %spec.dependent_collection,
            "cascade delete started"
        );

        self.remote
            .delete_document(&spec.parent_collection, parent_id)
            .await?;
        if self
            .remote
            .get_document(&spec.parent_collection, parent_id)
            .await?
            .is_some()
        {
            return Err(SyncError::ParentStillPresent {
                collection: spec.parent_collection.clone(),
                id: parent_id.to_string(),
            });
        }
        report.parent_confirmed_absent = true;

        let page_size = self.page_size();
        let mut start_after: Option<String> = None;
        loop {
            self.check_cancelled()?;
            let query = FieldQuery {
                collection: spec.dependent_collection.clone(),
                field: spec.parent_field.clone(),
                value: parent_id.to_string(),
                start_after: start_after.take(),
                limit: page_size,
            };
            let page = self.remote.query_by_field(&query).await?;
            report.pages += 1;

            let Some(last) = page.last() else {
                break;
            };
            start_after = Some(last.id.clone());
            let rows = page.len();

            let mut batch = WriteBatch::new();
            for doc in page {
                batch.delete(&spec.dependent_collection, doc.id);
            }
            self.remote.commit_batch(batch).await?;
            report.dependents_deleted += rows;
            debug!(parent_id, rows, "deleted dependent page");

            if rows < page_size {
                break;
            }
        }

        info!(
            parent_id,
            pages = report.pages,
            dependents_deleted = report.dependents_deleted,
            "cascade delete finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use crate::memory::{MemoryRemoteStore, RemoteOp};
    use serde_json::json;
    use tidemark_protocol::{Fields, RemoteDocument, Timestamp};

    fn engine(remote: &Arc<MemoryRemoteStore>) -> CascadeDeleteEngine<MemoryRemoteStore> {
        CascadeDeleteEngine::new(
            SyncConfig::default().with_cascade_page_size(3),
            CascadeSpec::new("events", "attendance", "eventId"),
            Arc::clone(remote),
        )
    }

    fn seed(remote: &MemoryRemoteStore, parent: &str, dependents: usize) {
        remote.put(
            "events",
            RemoteDocument {
                id: parent.into(),
                version: Some(1),
                updated_at: Some(Timestamp::from_secs(10)),
                ..Default::default()
            },
        );
        for i in 0..dependents {
            let mut fields = Fields::new();
            fields.insert("eventId".into(), json!(parent));
            remote.put(
                "attendance",
                RemoteDocument {
                    id: format!("{parent}-att-{i:03}"),
                    version: Some(1),
                    updated_at: Some(Timestamp::from_secs(10)),
                    fields,
                    ..Default::default()
                },
            );
        }
    }

    #[test]
    fn trigger_prefers_current_field() {
        let both = CascadeTrigger::from_json(r#"{"parentId":"new","eventId":"old"}"#).unwrap();
        assert_eq!(both.target().unwrap().parent_id, "new");

        let legacy = CascadeTrigger::from_json(r#"{"eventId":"old"}"#).unwrap();
        assert_eq!(legacy.target().unwrap().parent_id, "old");

        let blank_current =
            CascadeTrigger::from_json(r#"{"parentId":"  ","eventId":"old"}"#).unwrap();
        assert_eq!(blank_current.target().unwrap().parent_id, "old");
    }

    #[test]
    fn blank_or_missing_trigger_has_no_target() {
        assert!(CascadeTrigger::from_json("{}").unwrap().target().is_none());
        assert!(CascadeTrigger::from_json(r#"{"parentId":""}"#)
            .unwrap()
            .target()
            .is_none());
        assert!(matches!(
            CascadeTrigger::from_json("not json"),
            Err(SyncError::InvalidTrigger(_))
        ));
    }

    #[tokio::test]
    async fn deletes_parent_and_pages_dependents() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed(&remote, "e1", 7);
        seed(&remote, "e2", 2);

        let outcome = engine(&remote).run(&CascadeTrigger::parent("e1")).await;
        let report = outcome.report().unwrap();
        assert!(report.parent_confirmed_absent);
        assert_eq!(report.dependents_deleted, 7);
        assert_eq!(remote.commit_sizes(), vec![3, 3, 1]);

        assert!(remote.get("events", "e1").is_none());
        assert_eq!(remote.count("attendance"), 2);
    }

    #[tokio::test]
    async fn exact_multiple_needs_a_final_empty_page() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed(&remote, "e1", 6);

        let outcome = engine(&remote).run(&CascadeTrigger::parent("e1")).await;
        assert_eq!(outcome.report().unwrap().pages, 3);
        assert_eq!(remote.commit_sizes(), vec![3, 3]);
    }

    #[tokio::test]
    async fn page_size_is_clamped_to_the_batch_limit() {
        let remote = Arc::new(MemoryRemoteStore::with_max_batch_size(2));
        seed(&remote, "e1", 5);

        let outcome = engine(&remote).run(&CascadeTrigger::parent("e1")).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.report().unwrap().dependents_deleted, 5);
        assert_eq!(remote.commit_sizes(), vec![2, 2, 1]);
        assert_eq!(remote.count("attendance"), 0);
    }

    #[tokio::test]
    async fn blank_trigger_is_a_no_op() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let outcome = engine(&remote).run(&CascadeTrigger::default()).await;
        assert!(outcome.report().unwrap().skipped);
        assert_eq!(remote.get_calls(), 0);
    }

    #[tokio::test]
    async fn parent_still_present_requests_retry() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed(&remote, "e1", 2);
        remote.pin("events", "e1");

        let outcome = engine(&remote).run(&CascadeTrigger::parent("e1")).await;
        assert!(outcome.is_retry());
        assert_eq!(remote.count("attendance"), 2);
    }

    #[tokio::test]
    async fn auth_errors_are_terminal_others_retry() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed(&remote, "e1", 2);
        let engine = engine(&remote);

        remote.fail_next(RemoteOp::Delete, RemoteErrorKind::PermissionDenied);
        let outcome = engine.run(&CascadeTrigger::parent("e1")).await;
        let RunOutcome::Fail(payload) = outcome else {
            panic!("expected terminal failure");
        };
        assert_eq!(payload.stage, Stage::CascadeDelete);
        assert_eq!(payload.entity_id.as_deref(), Some("e1"));

        remote.fail_next(RemoteOp::QueryByField, RemoteErrorKind::InvalidArgument);
        assert!(engine.run(&CascadeTrigger::parent("e1")).await.is_retry());

        // Deleting again is harmless.
        assert!(engine.run(&CascadeTrigger::parent("e1")).await.is_success());
        assert_eq!(remote.count("attendance"), 0);
    }
}
