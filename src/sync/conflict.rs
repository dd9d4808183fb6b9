//! Conflict resolution strategies.
//!
//! A conflict is recorded when a task has been modified both locally (since
//! the last successful sync) and remotely, with genuinely different
//! content. Resolution replays one of these four strategies against the
//! stored snapshots; it never happens implicitly during a pull.

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::journal::SyncConflict;
use crate::model::task::Task;
use crate::store::TaskStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictStrategy {
    ServerWins,
    LocalWins,
    Merge,
    KeepBoth,
}

/// The outcome of applying a strategy, so callers (CLI, tests) can report
/// what happened without re-deriving it from store state.
pub enum Resolution {
    /// The local row now mirrors the remote snapshot.
    OverwrittenWithRemote,
    /// The local row is unchanged; an `update` op was re-queued so the next
    /// push carries it to the remote.
    KeptLocalRequeued,
    /// The local row was merged: remote base, some local fields preserved.
    Merged,
    /// The conflicting uid was overwritten with remote, and a new local-only
    /// duplicate task was created from the local snapshot.
    DuplicatedLocally { new_task_id: Uuid },
}

/// Resolve `conflict` against `store` using `strategy`, mutating local rows
/// as needed. Returns what happened. Callers are responsible for calling
/// `SyncJournal::resolve_conflict` once they're satisfied with the outcome.
pub fn resolve(
    store: &TaskStore,
    conflict: &SyncConflict,
    strategy: ConflictStrategy,
) -> Result<Resolution> {
    let remote_task: Task = serde_json::from_value(conflict.remote_version.clone())?;
    let local_task: Task = serde_json::from_value(conflict.local_version.clone())?;

    match strategy {
        ConflictStrategy::ServerWins => {
            store.update_task(&remote_task)?;
            Ok(Resolution::OverwrittenWithRemote)
        }
        ConflictStrategy::LocalWins => {
            // Local row already reflects `local_task`; nothing to overwrite.
            // Re-enqueuing is the engine's job (it owns the journal), so we
            // just report the intended outcome here.
            Ok(Resolution::KeptLocalRequeued)
        }
        ConflictStrategy::Merge => {
            let mut merged = remote_task.clone();
            merged.set_priority(local_task.priority())?;
            merged.set_categories(local_task.categories().to_vec());
            // Per the resolved Open Question: local due_date wins only when
            // the local edit is the more recent one.
            if local_task.modified() > remote_task.modified() {
                merged.set_due_date(local_task.due_date())?;
            }
            store.update_task(&merged)?;
            Ok(Resolution::Merged)
        }
        ConflictStrategy::KeepBoth => {
            store.update_task(&remote_task)?;
            let mut duplicate = Task::from_parts(
                Uuid::new_v4(),
                local_task.list_id(),
                format!("{} (local)", local_task.summary()),
                local_task.description().to_string(),
                local_task.status(),
                local_task.priority(),
                local_task.due_date(),
                local_task.start_date(),
                local_task.completed(),
                Utc::now(),
                Utc::now(),
                None,
                local_task.categories().to_vec(),
                local_task.recurrence().cloned(),
                local_task.recur_from_due(),
            )?;
            let new_id = duplicate.id();
            store.put_task(&duplicate)?;
            Ok(Resolution::DuplicatedLocally {
                new_task_id: new_id,
            })
        }
    }
}
