use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::models::{NodeId, NodePatch, PathId};

/// Server receipt of an inbound event. Edits are ordered by `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub seq: u64,
    pub at: DateTime<Utc>,
}

/// Receipt sequence of the last applied write per (node, field) of one path.
#[derive(Debug, Default)]
pub struct FieldVersions {
    applied: HashMap<(NodeId, &'static str), u64>,
}

impl FieldVersions {
    /// Remove the fields of `patch` that a later receipt already wrote.
    /// Returns the names of the dropped fields.
    pub fn discard_stale(&self, node_id: &str, patch: &mut NodePatch, seq: u64) -> Vec<&'static str> {
        let mut dropped = Vec::new();
        for field in patch.fields() {
            let newer = self
                .applied
                .get(&(node_id.to_string(), field))
                .map(|applied| *applied > seq)
                .unwrap_or(false);
            if newer {
                patch.clear_field(field);
                dropped.push(field);
            }
        }
        dropped
    }

    pub fn commit(&mut self, node_id: &str, patch: &NodePatch, seq: u64) {
        for field in patch.fields() {
            let entry = self.applied.entry((node_id.to_string(), field)).or_insert(seq);
            if *entry < seq {
                *entry = seq;
            }
        }
    }

    pub fn forget_nodes(&mut self, node_ids: &[NodeId]) {
        self.applied.retain(|(node_id, _), _| !node_ids.contains(node_id));
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

struct PathVersions {
    versions: Arc<Mutex<FieldVersions>>,
    pending: usize,
}

/// Hands out receipts and serializes writes per learning path.
///
/// A write holds the path's guard from validation through persistence and
/// fan-out, so every member observes writes to one path in receipt order.
/// The version table of a path lives exactly as long as some ticket for it
/// is outstanding: once none is, every future receipt is newer than all
/// committed writes and the table has nothing left to arbitrate.
#[derive(Default)]
pub struct EditSequencer {
    next: AtomicU64,
    paths: StdMutex<HashMap<PathId, PathVersions>>,
}

impl EditSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    fn paths(&self) -> MutexGuard<'_, HashMap<PathId, PathVersions>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stamp(&self) -> Receipt {
        Receipt {
            seq: self.next.fetch_add(1, Ordering::SeqCst) + 1,
            at: Utc::now(),
        }
    }

    /// Stamp an inbound event. Events that target a path register with it
    /// until the ticket is dropped.
    pub fn admit(&self, path_id: Option<&str>) -> EditTicket<'_> {
        let Some(path_id) = path_id else {
            return EditTicket {
                sequencer: self,
                path_id: None,
                receipt: self.stamp(),
            };
        };

        // Stamped under the table lock so a table is never dropped between
        // issuing a receipt and registering it.
        let mut paths = self.paths();
        let receipt = self.stamp();
        paths
            .entry(path_id.to_string())
            .or_insert_with(|| PathVersions {
                versions: Arc::default(),
                pending: 0,
            })
            .pending += 1;
        EditTicket {
            sequencer: self,
            path_id: Some(path_id.to_string()),
            receipt,
        }
    }

    fn release(&self, path_id: &str) {
        let mut paths = self.paths();
        let idle = match paths.get_mut(path_id) {
            Some(entry) => {
                entry.pending = entry.pending.saturating_sub(1);
                entry.pending == 0
            }
            None => false,
        };
        if idle {
            paths.remove(path_id);
            debug!("Edit versions dropped for path {}", path_id);
        }
    }

    /// Paths with events in flight.
    pub fn tracked_paths(&self) -> usize {
        self.paths().len()
    }
}

/// Receipt of one inbound event, registered with the path it targets.
pub struct EditTicket<'a> {
    sequencer: &'a EditSequencer,
    path_id: Option<PathId>,
    receipt: Receipt,
}

impl EditTicket<'_> {
    pub fn receipt(&self) -> Receipt {
        self.receipt
    }

    /// Wait for exclusive write access to the ticket's path.
    pub async fn lock(&self) -> OwnedMutexGuard<FieldVersions> {
        let versions = self.path_id.as_deref().and_then(|path_id| {
            self.sequencer
                .paths()
                .get(path_id)
                .map(|entry| entry.versions.clone())
        });
        // A ticket without a path orders nothing
        versions.unwrap_or_default().lock_owned().await
    }
}

impl Drop for EditTicket<'_> {
    fn drop(&mut self) {
        if let Some(path_id) = &self.path_id {
            self.sequencer.release(path_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeStatus;

    fn patch(title: Option<&str>, status: Option<NodeStatus>) -> NodePatch {
        NodePatch {
            title: title.map(|t| t.to_string()),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_receipts_increase() {
        let sequencer = EditSequencer::new();
        let a = sequencer.admit(Some("P1")).receipt();
        let b = sequencer.admit(None).receipt();
        assert!(b.seq > a.seq);
        assert!(b.at >= a.at);
    }

    #[test]
    fn test_late_write_loses_only_contested_fields() {
        let mut versions = FieldVersions::default();
        versions.commit("N1", &patch(Some("newer"), None), 5);

        let mut late = patch(Some("older"), Some(NodeStatus::Completed));
        let dropped = versions.discard_stale("N1", &mut late, 3);
        assert_eq!(dropped, vec!["title"]);
        assert_eq!(late.title, None);
        assert_eq!(late.status, Some(NodeStatus::Completed));
    }

    #[test]
    fn test_fields_are_versioned_per_node() {
        let mut versions = FieldVersions::default();
        versions.commit("N1", &patch(Some("a"), None), 9);

        let mut other = patch(Some("b"), None);
        assert!(versions.discard_stale("N2", &mut other, 1).is_empty());
        assert_eq!(other.title.as_deref(), Some("b"));
    }

    #[test]
    fn test_commit_never_moves_backwards() {
        let mut versions = FieldVersions::default();
        versions.commit("N1", &patch(Some("a"), None), 9);
        versions.commit("N1", &patch(Some("b"), None), 4);

        let mut p = patch(Some("c"), None);
        assert_eq!(versions.discard_stale("N1", &mut p, 8), vec!["title"]);
    }

    #[test]
    fn test_forget_nodes() {
        let mut versions = FieldVersions::default();
        versions.commit("N1", &patch(Some("a"), Some(NodeStatus::InProgress)), 2);
        versions.commit("N2", &patch(Some("a"), None), 2);
        versions.forget_nodes(&["N1".to_string()]);
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_serializes_writes_to_a_path() {
        let sequencer = Arc::new(EditSequencer::new());
        let first = sequencer.admit(Some("P1"));
        let guard = first.lock().await;

        let other = sequencer.clone();
        let waiter = tokio::spawn(async move {
            let ticket = other.admit(Some("P1"));
            let _g = ticket.lock().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // A different path is not blocked
        let second = sequencer.admit(Some("P2"));
        let _p2 = second.lock().await;

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_versions_outlive_every_pending_ticket() {
        let sequencer = EditSequencer::new();
        let older = sequencer.admit(Some("P1"));

        let newer = sequencer.admit(Some("P1"));
        newer
            .lock()
            .await
            .commit("N1", &patch(Some("newer"), None), newer.receipt().seq);
        drop(newer);
        assert_eq!(sequencer.tracked_paths(), 1);

        let mut late = patch(Some("older"), None);
        let versions = older.lock().await;
        assert_eq!(versions.discard_stale("N1", &mut late, older.receipt().seq), vec!["title"]);
        drop(versions);
        drop(older);
        assert_eq!(sequencer.tracked_paths(), 0);
    }

    #[test]
    fn test_pathless_tickets_track_nothing() {
        let sequencer = EditSequencer::new();
        let ping = sequencer.admit(None);
        assert_eq!(sequencer.tracked_paths(), 0);
        drop(ping);
        assert_eq!(sequencer.tracked_paths(), 0);
    }
}
