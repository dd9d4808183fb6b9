//! The reconciliation engine: drains the push queue against one
//! [`RemoteProvider`], pulls remote state back into the [`TaskStore`], and
//! records conflicts instead of silently overwriting local edits.
//!
//! Grounded on the teacher's own `provider::sync`/`run_sync_inner` shape: a
//! push pass, a pull pass, and a report struct, except the unit of work here
//! is a list/task pair instead of a calendar/item pair.

use std::collections::HashSet;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::error::{Error, ErrorKind, Result};
use crate::journal::{OpType, SyncJournal, SyncOperation};
use crate::model::list::List;
use crate::model::task::{Status, Task};
use crate::provider::{deadline_from_now, Deadline, RemoteProvider};
use crate::store::TaskStore;
use crate::sync::conflict::{self, ConflictStrategy};
use crate::sync::progress::{SyncEvent, SyncProgress};
use crate::utils::Cancellation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfflineMode {
    Auto,
    Online,
    Offline,
}

#[derive(Clone, Copy, Debug)]
pub struct SyncEngineConfig {
    pub offline_mode: OfflineMode,
    pub conflict_strategy: ConflictStrategy,
    pub connectivity_timeout: StdDuration,
    pub op_timeout: StdDuration,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            offline_mode: OfflineMode::Auto,
            conflict_strategy: ConflictStrategy::ServerWins,
            connectivity_timeout: StdDuration::from_secs(5),
            op_timeout: StdDuration::from_secs(30),
        }
    }
}

/// Recorded when the engine had to downgrade a task's status on push because
/// the provider doesn't support it, so the operator can see the local and
/// remote copies have diverged on that field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusMapping {
    pub from: Status,
    pub to: Status,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub push_errors: usize,
    pub pulled_new: usize,
    pub pulled_updated: usize,
    pub pulled_deleted: usize,
    pub skipped: usize,
    pub status_mappings: Vec<StatusMapping>,
}

pub struct SyncEngine<'a> {
    store: &'a TaskStore,
    journal: &'a SyncJournal,
    provider: &'a (dyn RemoteProvider + Send + Sync),
    config: SyncEngineConfig,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        store: &'a TaskStore,
        journal: &'a SyncJournal,
        provider: &'a (dyn RemoteProvider + Send + Sync),
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            store,
            journal,
            provider,
            config,
        }
    }

    fn deadline(&self) -> Deadline {
        deadline_from_now(self.config.op_timeout)
    }

    pub async fn is_reachable(&self) -> bool {
        let deadline = deadline_from_now(self.config.connectivity_timeout);
        tokio::time::timeout(self.config.connectivity_timeout, self.provider.lists(deadline))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Full reconciliation: push pending ops, then pull (allowing local
    /// deletions for lists/tasks gone remotely).
    pub async fn reconcile(
        &self,
        progress: &mut SyncProgress,
        cancel: &Cancellation,
    ) -> Result<SyncReport> {
        progress.feedback(SyncEvent::Started);
        match self.check_connectivity().await? {
            None => {
                progress.feedback(SyncEvent::Finished { success: true });
                return Ok(SyncReport::default());
            }
            Some(()) => {}
        }

        let ops = self.journal.pending_ops()?;
        let (processed, pushed, push_errors, push_skipped, status_mappings) =
            self.push_phase(&ops, progress, cancel).await?;
        self.journal.clear_ops(&processed)?;

        let pull_stats = self.pull(true, progress, cancel).await?;
        self.journal.set_last_sync(Utc::now())?;

        let success = push_errors == 0 && progress.is_success();
        progress.feedback(SyncEvent::Finished { success });
        Ok(SyncReport {
            pushed,
            push_errors,
            pulled_new: pull_stats.new,
            pulled_updated: pull_stats.updated,
            pulled_deleted: pull_stats.deleted,
            skipped: push_skipped + pull_stats.skipped,
            status_mappings,
        })
    }

    /// Pull-only reconciliation used by background reads: never deletes a
    /// local list or task just because it's absent remotely, so a
    /// concurrent in-flight push can't be cannibalized.
    pub async fn pull_only(
        &self,
        progress: &mut SyncProgress,
        cancel: &Cancellation,
    ) -> Result<SyncReport> {
        progress.feedback(SyncEvent::Started);
        if self.check_connectivity().await?.is_none() {
            progress.feedback(SyncEvent::Finished { success: true });
            return Ok(SyncReport::default());
        }
        let pull_stats = self.pull(false, progress, cancel).await?;
        self.journal.set_last_sync(Utc::now())?;
        progress.feedback(SyncEvent::Finished {
            success: progress.is_success(),
        });
        Ok(SyncReport {
            pulled_new: pull_stats.new,
            pulled_updated: pull_stats.updated,
            pulled_deleted: pull_stats.deleted,
            skipped: pull_stats.skipped,
            ..SyncReport::default()
        })
    }

    /// `Ok(None)` means "skip the sync, offline is acceptable right now".
    async fn check_connectivity(&self) -> Result<Option<()>> {
        match self.config.offline_mode {
            OfflineMode::Offline => Ok(None),
            OfflineMode::Auto => {
                if self.is_reachable().await {
                    Ok(Some(()))
                } else {
                    log::info!("provider unreachable, skipping this sync cycle");
                    Ok(None)
                }
            }
            OfflineMode::Online => {
                if self.is_reachable().await {
                    Ok(Some(()))
                } else {
                    Err(Error::Transport("provider unreachable".into()))
                }
            }
        }
    }

    // ---- push ----------------------------------------------------------

    async fn push_phase(
        &self,
        ops: &[SyncOperation],
        progress: &mut SyncProgress,
        cancel: &Cancellation,
    ) -> Result<(Vec<i64>, usize, usize, usize, Vec<StatusMapping>)> {
        let mut processed = Vec::new();
        let mut pushed = 0usize;
        let mut push_errors = 0usize;
        let mut skipped = 0usize;
        let mut status_mappings = Vec::new();

        for op in ops {
            cancel.check()?;
            let outcome = match op.op_type {
                OpType::Create => self.push_create(op, progress).await,
                OpType::Update => self.push_update(op, progress).await,
                OpType::Delete => self.push_delete(op).await.map(|o| (o, None)),
            };
            match outcome {
                Ok((PushOutcome::Pushed, mapping)) => {
                    pushed += 1;
                    processed.push(op.id);
                    status_mappings.extend(mapping);
                }
                Ok((PushOutcome::Skipped, _)) => {
                    progress.warn(&format!(
                        "skipped pushing {:?} for {:?}: provider lacks the required capability",
                        op.op_type, op.task_summary
                    ));
                    skipped += 1;
                    processed.push(op.id);
                }
                Ok((PushOutcome::Gone, _)) => {
                    // The local task no longer exists; nothing left to push.
                    processed.push(op.id);
                }
                Err(e) if e.kind() == ErrorKind::Transport => {
                    self.journal.record_attempt(op.id, true)?;
                    progress.warn(&format!("transport error pushing {:?}: {e}", op.task_summary));
                    push_errors += 1;
                }
                Err(e) => {
                    self.journal.record_attempt(op.id, false)?;
                    progress.error(&format!("failed to push {:?}: {e}", op.task_summary));
                    push_errors += 1;
                }
            }
        }
        Ok((processed, pushed, push_errors, skipped, status_mappings))
    }

    /// If the task is `InProgress` and the provider can't represent that,
    /// downgrade the pushed copy to `Todo` and report the mapping.
    fn map_status_for_push(&self, task: &mut Task) -> Option<StatusMapping> {
        if task.status() == Status::InProgress && !self.provider.supports_in_progress_status() {
            task.set_status(Status::Todo);
            Some(StatusMapping {
                from: Status::InProgress,
                to: Status::Todo,
            })
        } else {
            None
        }
    }

    async fn ensure_remote_list(&self, local_list: &List) -> Result<Option<List>> {
        let deadline = self.deadline();
        if let Some(remote) = self.provider.list_by_name(local_list.name(), deadline).await? {
            return Ok(Some(remote));
        }
        if !self.provider.supports_list_creation() {
            return Ok(None);
        }
        Ok(Some(self.provider.create_list(local_list.name(), deadline).await?))
    }

    async fn push_create(
        &self,
        op: &SyncOperation,
        _progress: &mut SyncProgress,
    ) -> Result<(PushOutcome, Option<StatusMapping>)> {
        let mut task = match self.store.get_task(op.list_id, op.task_uid) {
            Ok(t) => t,
            Err(_) => return Ok((PushOutcome::Gone, None)),
        };
        let local_list = self.store.get_list(op.list_id)?;
        let Some(remote_list) = self.ensure_remote_list(&local_list).await? else {
            return Ok((PushOutcome::Skipped, None));
        };
        // The remote list's id rarely matches the local one; a provider
        // keying tasks off the `list_id` argument (as the mock does) would
        // otherwise store the task under an id that never shows up on a
        // later pull, so a full reconcile's local-deletion pass would
        // reclaim it right back out from under us.
        task.retarget_list(remote_list.id());
        let mapping = self.map_status_for_push(&mut task);
        match self.provider.create_task(remote_list.id(), &task, self.deadline()).await {
            Ok(_) => Ok((PushOutcome::Pushed, mapping)),
            // Re-queued creates are idempotent: the remote already has it.
            Err(e) if e.kind() == ErrorKind::Conflict => Ok((PushOutcome::Pushed, mapping)),
            Err(e) => Err(e),
        }
    }

    async fn push_update(
        &self,
        op: &SyncOperation,
        _progress: &mut SyncProgress,
    ) -> Result<(PushOutcome, Option<StatusMapping>)> {
        let mut task = match self.store.get_task(op.list_id, op.task_uid) {
            Ok(t) => t,
            Err(_) => return Ok((PushOutcome::Gone, None)),
        };
        let local_list = self.store.get_list(op.list_id)?;
        let Some(remote_list) = self.ensure_remote_list(&local_list).await? else {
            return Ok((PushOutcome::Skipped, None));
        };
        task.retarget_list(remote_list.id());
        let mapping = self.map_status_for_push(&mut task);
        match self.provider.update_task(&task, self.deadline()).await {
            Ok(_) => Ok((PushOutcome::Pushed, mapping)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Remote deleted it concurrently; nothing to update onto.
                Ok((PushOutcome::Pushed, mapping))
            }
            Err(e) => Err(e),
        }
    }

    async fn push_delete(&self, op: &SyncOperation) -> Result<PushOutcome> {
        let deadline = self.deadline();
        let lists = self.provider.lists(deadline).await?;
        for list in lists {
            match self.provider.delete_task(list.id(), op.task_uid, deadline).await {
                Ok(()) => return Ok(PushOutcome::Pushed),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }
        // Not found anywhere remote: already gone, which is success.
        Ok(PushOutcome::Pushed)
    }

    // ---- pull ------------------------------------------------------------

    async fn pull(
        &self,
        allow_local_deletions: bool,
        progress: &mut SyncProgress,
        cancel: &Cancellation,
    ) -> Result<PullStats> {
        let deadline = self.deadline();
        let last_sync = self.journal.last_sync()?.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let remote_lists = self.provider.lists(deadline).await?;
        let mut stats = PullStats::default();
        let mut seen_list_ids = HashSet::new();

        for remote_list in &remote_lists {
            cancel.check()?;
            progress.feedback(SyncEvent::ListInProgress {
                list_name: remote_list.name().to_string(),
                detail: "pulling".to_string(),
            });

            let local_list = match self.store.get_list_by_name(remote_list.name()) {
                Ok(l) => l,
                Err(_) => self.store.create_list(remote_list.name())?,
            };
            seen_list_ids.insert(local_list.id());

            let remote_tasks = self.provider.tasks(remote_list.id(), deadline).await?;
            let mut seen_task_ids = HashSet::new();

            for remote_task in remote_tasks {
                cancel.check()?;
                seen_task_ids.insert(remote_task.id());
                self.pull_one_task(&local_list, remote_task, last_sync, progress, &mut stats)?;
            }

            if allow_local_deletions {
                for local_task in self.store.get_tasks(local_list.id())? {
                    if !seen_task_ids.contains(&local_task.id()) {
                        self.store.delete_task(local_list.id(), local_task.id())?;
                        stats.deleted += 1;
                    }
                }
            }
        }

        if allow_local_deletions {
            for local_list in self.store.list_lists()? {
                if !seen_list_ids.contains(&local_list.id()) {
                    self.store.delete_list(local_list.id())?;
                }
            }
        }

        Ok(stats)
    }

    fn pull_one_task(
        &self,
        local_list: &List,
        mut remote_task: Task,
        last_sync: DateTime<Utc>,
        progress: &mut SyncProgress,
        stats: &mut PullStats,
    ) -> Result<()> {
        remote_task.retarget_list(local_list.id());

        match self.store.get_task(local_list.id(), remote_task.id()) {
            Ok(local_task) => {
                if remote_task.modified() <= local_task.modified() {
                    return Ok(());
                }
                let locally_edited_since_sync = local_task.modified() > last_sync;
                let remotely_edited_since_sync = remote_task.modified() > last_sync;
                if locally_edited_since_sync
                    && remotely_edited_since_sync
                    && !tasks_equivalent(&local_task, &remote_task)
                {
                    self.record_and_resolve_conflict(&local_task, &remote_task, progress)?;
                } else {
                    self.store.put_task(&remote_task)?;
                    stats.updated += 1;
                }
            }
            Err(_) => {
                self.store.put_task(&remote_task)?;
                stats.new += 1;
            }
        }
        Ok(())
    }

    fn record_and_resolve_conflict(
        &self,
        local_task: &Task,
        remote_task: &Task,
        progress: &mut SyncProgress,
    ) -> Result<()> {
        let local_json = serde_json::to_value(local_task)?;
        let remote_json = serde_json::to_value(remote_task)?;
        let conflict_id = self.journal.record_conflict(
            local_task.id(),
            local_task.summary(),
            local_task.list_id(),
            &local_json,
            &remote_json,
            local_task.modified(),
            remote_task.modified(),
        )?;
        progress.info(&format!(
            "conflict on {:?}, resolving with {:?}",
            local_task.summary(),
            self.config.conflict_strategy
        ));

        let recorded = self.journal.conflict_by_uid(local_task.id())?.ok_or_else(|| {
            Error::Invariant("conflict vanished immediately after being recorded".into())
        })?;
        conflict::resolve(self.store, &recorded, self.config.conflict_strategy)?;
        if self.config.conflict_strategy == ConflictStrategy::LocalWins {
            self.journal
                .queue_op(local_task.id(), local_task.summary(), local_task.list_id(), OpType::Update)?;
        }
        self.journal.resolve_conflict(conflict_id)?;
        Ok(())
    }
}

enum PushOutcome {
    Pushed,
    Skipped,
    Gone,
}

#[derive(Default)]
struct PullStats {
    new: usize,
    updated: usize,
    deleted: usize,
    skipped: usize,
}

fn tasks_equivalent(a: &Task, b: &Task) -> bool {
    a.summary() == b.summary()
        && a.description() == b.description()
        && a.status() == b.status()
        && a.priority() == b.priority()
        && a.due_date() == b.due_date()
        && a.start_date() == b.start_date()
        && a.categories() == b.categories()
}

#[cfg(all(test, feature = "mock_provider"))]
mod tests {
    use super::*;
    use crate::provider_mock::MockProvider;

    fn setup() -> (TaskStore, SyncJournal, MockProvider) {
        let store = TaskStore::open_in_memory("mock").unwrap();
        let journal = SyncJournal::new(store.shared_connection());
        let provider = MockProvider::full_capabilities();
        (store, journal, provider)
    }

    #[tokio::test]
    async fn push_then_pull_round_trips_a_new_task() {
        let (store, journal, provider) = setup();
        let list = store.create_list("Home").unwrap();
        let task = store.create_task(list.id(), "Buy milk").unwrap();
        journal
            .queue_op(task.id(), task.summary(), list.id(), OpType::Create)
            .unwrap();

        let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
        let mut progress = SyncProgress::new();
        let cancel = Cancellation::new();
        let report = engine.reconcile(&mut progress, &cancel).await.unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(report.push_errors, 0);
        assert_eq!(journal.pending_count().unwrap(), 0);
        let remote_tasks = provider
            .tasks(
                provider.list_by_name("Home", deadline_from_now(StdDuration::from_secs(5))).await.unwrap().unwrap().id(),
                deadline_from_now(StdDuration::from_secs(5)),
            )
            .await
            .unwrap();
        assert_eq!(remote_tasks.len(), 1);
    }

    #[tokio::test]
    async fn pull_creates_local_list_and_task() {
        let (store, journal, provider) = setup();
        let remote_list = List::new("mock".into(), "Groceries".into()).unwrap();
        provider.seed_list(remote_list.clone());
        let remote_task = Task::new(remote_list.id(), "Eggs".into()).unwrap();
        provider.seed_task(remote_task);

        let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
        let mut progress = SyncProgress::new();
        let cancel = Cancellation::new();
        let report = engine.reconcile(&mut progress, &cancel).await.unwrap();

        assert_eq!(report.pulled_new, 1);
        let local_list = store.get_list_by_name("Groceries").unwrap();
        assert_eq!(store.get_tasks(local_list.id()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn in_progress_downgrades_to_todo_when_unsupported() {
        let (store, journal, _) = setup();
        let provider = MockProvider::new(crate::provider::Capabilities::LIST_CREATION);
        let list = store.create_list("Home").unwrap();
        let mut task = store.create_task(list.id(), "Buy milk").unwrap();
        task.set_status(Status::InProgress);
        store.update_task(&task).unwrap();
        journal
            .queue_op(task.id(), task.summary(), list.id(), OpType::Create)
            .unwrap();

        let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
        let mut progress = SyncProgress::new();
        let cancel = Cancellation::new();
        let report = engine.reconcile(&mut progress, &cancel).await.unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(
            report.status_mappings,
            vec![StatusMapping {
                from: Status::InProgress,
                to: Status::Todo
            }]
        );
        let remote_list = provider
            .list_by_name("Home", deadline_from_now(StdDuration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();
        let remote_tasks = provider
            .tasks(remote_list.id(), deadline_from_now(StdDuration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(remote_tasks[0].status(), Status::Todo);
        // The local copy keeps its real status; only the pushed copy was downgraded.
        assert_eq!(store.get_task(list.id(), task.id()).unwrap().status(), Status::InProgress);
    }

    #[tokio::test]
    async fn offline_mode_short_circuits() {
        let (store, journal, provider) = setup();
        let mut config = SyncEngineConfig::default();
        config.offline_mode = OfflineMode::Offline;
        let engine = SyncEngine::new(&store, &journal, &provider, config);
        let mut progress = SyncProgress::new();
        let cancel = Cancellation::new();
        let report = engine.reconcile(&mut progress, &cancel).await.unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn divergent_edits_are_recorded_as_conflicts_and_resolved() {
        let (store, journal, provider) = setup();
        let list = store.create_list("Home").unwrap();
        let mut task = store.create_task(list.id(), "Buy milk").unwrap();
        journal.set_last_sync(Utc::now() - chrono::Duration::seconds(10)).unwrap();

        task.set_priority(5).unwrap();
        store.update_task(&task).unwrap();

        let mut remote_task = task.clone();
        remote_task.set_summary("Buy oat milk".to_string()).unwrap();
        provider.seed_list(list.clone());
        provider.seed_task(remote_task);

        let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
        let mut progress = SyncProgress::new();
        let cancel = Cancellation::new();
        engine.reconcile(&mut progress, &cancel).await.unwrap();

        // server_wins is the default strategy: local now mirrors remote.
        let stored = store.get_task(list.id(), task.id()).unwrap();
        assert_eq!(stored.summary(), "Buy oat milk");
        assert_eq!(journal.conflict_count().unwrap(), 0);
    }
}
