//! A decorator over [`TaskStore`] that keeps the local store and the remote
//! provider converging without ever blocking a CLI invocation on the
//! network: reads schedule a background pull, writes schedule a background
//! push+pull, and a daemon (if one is running) is preferred over spinning up
//! an in-process worker.
//!
//! All of the decorator's mutable scheduling state lives in one
//! `Mutex`-guarded struct rather than as separate ad hoc fields, so a reader
//! of this file sees every piece of state that governs "should I start a
//! background sync right now" in one place.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use uuid::Uuid;

use crate::cache::{CacheConfig, ListCache};
use crate::daemon::DaemonClient;
use crate::error::Result;
use crate::journal::{OpType, SyncJournal};
use crate::model::list::List;
use crate::model::task::Task;
use crate::provider::RemoteProvider;
use crate::store::TaskStore;
use crate::sync::engine::{SyncEngine, SyncEngineConfig};
use crate::sync::progress::SyncProgress;
use crate::utils::Cancellation;

const PULL_COOLDOWN_FLOOR: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct SyncAwareStoreConfig {
    pub pull_cooldown: Duration,
    pub sync_config: SyncEngineConfig,
    pub cache: CacheConfig,
}

impl Default for SyncAwareStoreConfig {
    fn default() -> Self {
        Self {
            pull_cooldown: Duration::from_secs(30),
            sync_config: SyncEngineConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BackgroundKind {
    PullOnly,
    Full,
}

struct Scheduling {
    pull_in_flight: bool,
    push_in_flight: bool,
    last_background_pull: Option<Instant>,
    tasks: JoinSet<()>,
}

impl Default for Scheduling {
    fn default() -> Self {
        Self {
            pull_in_flight: false,
            push_in_flight: false,
            last_background_pull: None,
            tasks: JoinSet::new(),
        }
    }
}

#[derive(Clone)]
pub struct SyncAwareStore {
    store: TaskStore,
    journal: SyncJournal,
    provider: Arc<dyn RemoteProvider + Send + Sync>,
    daemon_client: DaemonClient,
    pull_cooldown: Duration,
    sync_config: SyncEngineConfig,
    cache: Arc<ListCache>,
    scheduling: Arc<Mutex<Scheduling>>,
}

impl SyncAwareStore {
    pub fn new(
        store: TaskStore,
        journal: SyncJournal,
        provider: Arc<dyn RemoteProvider + Send + Sync>,
        daemon_client: DaemonClient,
        cache_path: PathBuf,
        config: SyncAwareStoreConfig,
    ) -> Self {
        Self {
            store,
            journal,
            provider,
            daemon_client,
            pull_cooldown: config.pull_cooldown.max(PULL_COOLDOWN_FLOOR),
            sync_config: config.sync_config,
            cache: Arc::new(ListCache::new(cache_path, config.cache.ttl)),
            scheduling: Arc::new(Mutex::new(Scheduling::default())),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn cache(&self) -> &ListCache {
        &self.cache
    }

    // ---- reads: forwarded, then a background pull may be scheduled -------

    pub fn list_lists(&self) -> Result<Vec<List>> {
        let lists = self.store.list_lists()?;
        self.maybe_schedule_pull();
        Ok(lists)
    }

    pub fn get_tasks(&self, list_id: Uuid) -> Result<Vec<Task>> {
        let tasks = self.store.get_tasks(list_id)?;
        self.maybe_schedule_pull();
        Ok(tasks)
    }

    // ---- list writes: forwarded, then the stale cache is dropped ---------

    pub fn create_list(&self, name: &str) -> Result<List> {
        let list = self.store.create_list(name)?;
        self.cache.invalidate();
        Ok(list)
    }

    pub fn update_list(&self, list: List) -> Result<List> {
        let list = self.store.update_list(list)?;
        self.cache.invalidate();
        Ok(list)
    }

    pub fn delete_list(&self, id: Uuid) -> Result<()> {
        self.store.delete_list(id)?;
        self.cache.invalidate();
        Ok(())
    }

    pub fn restore_list(&self, id: Uuid) -> Result<()> {
        self.store.restore_list(id)?;
        self.cache.invalidate();
        Ok(())
    }

    pub fn purge_list(&self, id: Uuid) -> Result<()> {
        self.store.purge_list(id)?;
        self.cache.invalidate();
        Ok(())
    }

    // ---- task writes: forwarded, queued, cache dropped, background sync --

    pub fn create_task(&self, list_id: Uuid, summary: &str) -> Result<Task> {
        let task = self.store.create_task(list_id, summary)?;
        self.journal.queue_op(task.id(), task.summary(), list_id, OpType::Create)?;
        self.cache.invalidate();
        self.schedule_full_sync();
        Ok(task)
    }

    pub fn update_task(&self, task: &Task) -> Result<()> {
        self.store.update_task(task)?;
        self.journal
            .queue_op(task.id(), task.summary(), task.list_id(), OpType::Update)?;
        self.cache.invalidate();
        self.schedule_full_sync();
        Ok(())
    }

    pub fn delete_task(&self, list_id: Uuid, task_id: Uuid, task_summary: &str) -> Result<()> {
        self.store.delete_task(list_id, task_id)?;
        self.journal.queue_op(task_id, task_summary, list_id, OpType::Delete)?;
        self.cache.invalidate();
        self.schedule_full_sync();
        Ok(())
    }

    // ---- scheduling --------------------------------------------------------

    fn maybe_schedule_pull(&self) {
        let mut guard = self.scheduling.lock().expect("scheduling lock poisoned");
        if guard.pull_in_flight {
            return;
        }
        if let Some(last) = guard.last_background_pull {
            if last.elapsed() < self.pull_cooldown {
                return;
            }
        }
        guard.pull_in_flight = true;
        guard.last_background_pull = Some(Instant::now());
        let worker = self.clone();
        guard.tasks.spawn(async move {
            worker.run_background(BackgroundKind::PullOnly).await;
        });
    }

    fn schedule_full_sync(&self) {
        let mut guard = self.scheduling.lock().expect("scheduling lock poisoned");
        if guard.push_in_flight {
            return;
        }
        guard.push_in_flight = true;
        let worker = self.clone();
        guard.tasks.spawn(async move {
            worker.run_background(BackgroundKind::Full).await;
        });
    }

    async fn run_background(&self, kind: BackgroundKind) {
        let notified = self.daemon_client.notify().await.is_ok();
        if !notified {
            let mut progress = SyncProgress::new();
            let cancel = Cancellation::new();
            let engine = SyncEngine::new(&self.store, &self.journal, self.provider.as_ref(), self.sync_config);
            let result = match kind {
                BackgroundKind::PullOnly => engine.pull_only(&mut progress, &cancel).await,
                BackgroundKind::Full => engine.reconcile(&mut progress, &cancel).await,
            };
            if let Err(e) = result {
                log::warn!("background sync failed: {e}");
            }
        }
        let mut guard = self.scheduling.lock().expect("scheduling lock poisoned");
        match kind {
            BackgroundKind::PullOnly => guard.pull_in_flight = false,
            BackgroundKind::Full => guard.push_in_flight = false,
        }
    }

    /// Block until every background sync this decorator started has
    /// finished. The CLI calls this once, right before exiting, so
    /// fire-and-forget work doesn't get killed mid-push; ordinary
    /// operations never wait for it.
    pub async fn wait_for_background(&self) {
        let mut tasks = {
            let mut guard = self.scheduling.lock().expect("scheduling lock poisoned");
            std::mem::take(&mut guard.tasks)
        };
        while tasks.join_next().await.is_some() {}
    }
}

#[cfg(all(test, feature = "mock_provider"))]
mod tests {
    use super::*;
    use crate::provider_mock::MockProvider;
    use tempfile::TempDir;

    fn setup() -> (SyncAwareStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open_in_memory("mock").unwrap();
        let journal = SyncJournal::new(store.shared_connection());
        let provider: Arc<dyn RemoteProvider + Send + Sync> = Arc::new(MockProvider::full_capabilities());
        let daemon_client = DaemonClient::new("/nonexistent.pid".into(), "/nonexistent.sock".into());
        let cache_path = dir.path().join("lists.json");
        let aware = SyncAwareStore::new(store, journal, provider, daemon_client, cache_path, SyncAwareStoreConfig::default());
        (aware, dir)
    }

    #[tokio::test]
    async fn write_queues_op_and_eventually_pushes() {
        let (aware, _dir) = setup();
        let list = aware.create_list("Home").unwrap();
        let task = aware.create_task(list.id(), "Buy milk").unwrap();
        assert_eq!(task.summary(), "Buy milk");
        aware.wait_for_background().await;
        assert_eq!(aware.journal.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn repeated_reads_within_cooldown_schedule_one_pull() {
        let (aware, _dir) = setup();
        aware.create_list("Home").unwrap();
        let _ = aware.list_lists().unwrap();
        let _ = aware.list_lists().unwrap();
        {
            let guard = aware.scheduling.lock().unwrap();
            assert!(guard.pull_in_flight || guard.last_background_pull.is_some());
        }
        aware.wait_for_background().await;
    }

    #[tokio::test]
    async fn task_write_invalidates_the_list_cache() {
        let (aware, _dir) = setup();
        let list = aware.create_list("Home").unwrap();
        aware.cache().refresh(aware.store()).unwrap();
        assert!(aware.cache().load(aware.store().provider_id()).is_some());

        aware.create_task(list.id(), "Buy milk").unwrap();
        assert!(aware.cache().load(aware.store().provider_id()).is_none());
        aware.wait_for_background().await;
    }

    #[tokio::test]
    async fn list_write_invalidates_the_list_cache() {
        let (aware, _dir) = setup();
        aware.cache().refresh(aware.store()).unwrap();
        assert!(aware.cache().load(aware.store().provider_id()).is_some());

        aware.create_list("Work").unwrap();
        assert!(aware.cache().load(aware.store().provider_id()).is_none());
    }
}
