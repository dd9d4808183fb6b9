//! Cross-cutting invariants and round-trip properties that span more than
//! one module (store + journal + engine, or store + cache), as opposed to
//! the single-module unit tests living alongside each implementation.
#![cfg(feature = "mock_provider")]

use std::time::Duration;

use tempfile::tempdir;

use task_fridge::cache::ListCache;
use task_fridge::journal::{OpType, SyncJournal};
use task_fridge::provider_mock::MockProvider;
use task_fridge::store::TaskStore;
use task_fridge::sync::{SyncEngine, SyncEngineConfig, SyncProgress};
use task_fridge::utils::Cancellation;

fn in_memory() -> (TaskStore, SyncJournal) {
    let store = TaskStore::open_in_memory("mock").unwrap();
    let journal = SyncJournal::new(store.shared_connection());
    (store, journal)
}

#[tokio::test]
async fn sync_then_sync_again_pushes_nothing_new() {
    let (store, journal) = in_memory();
    let list = store.create_list("Home").unwrap();
    let task = store.create_task(list.id(), "Buy milk").unwrap();
    journal
        .queue_op(task.id(), task.summary(), list.id(), OpType::Create)
        .unwrap();

    let provider = MockProvider::full_capabilities();
    let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
    let mut progress = SyncProgress::new();
    let cancel = Cancellation::new();

    let first = engine.reconcile(&mut progress, &cancel).await.unwrap();
    assert_eq!(first.pushed, 1);

    let second = engine.reconcile(&mut progress, &cancel).await.unwrap();
    assert_eq!(second.pushed, 0);
    assert_eq!(second.pulled_new, 0);
    assert_eq!(second.pulled_updated, 0);
    assert_eq!(journal.conflict_count().unwrap(), 0);
}

#[tokio::test]
async fn requeued_create_is_idempotent_on_the_remote() {
    let (store, journal) = in_memory();
    let list = store.create_list("Home").unwrap();
    let task = store.create_task(list.id(), "Buy milk").unwrap();
    // Enqueue the same create op 3 times, as a retry storm or a racy caller
    // might.
    for _ in 0..3 {
        journal
            .queue_op(task.id(), task.summary(), list.id(), OpType::Create)
            .unwrap();
    }

    let provider = MockProvider::full_capabilities();
    let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
    let mut progress = SyncProgress::new();
    let cancel = Cancellation::new();
    engine.reconcile(&mut progress, &cancel).await.unwrap();

    let deadline = task_fridge::provider::deadline_from_now(Duration::from_secs(5));
    let remote_list = provider.list_by_name("Home", deadline).await.unwrap().unwrap();
    let remote_tasks = provider.tasks(remote_list.id(), deadline).await.unwrap();
    assert_eq!(remote_tasks.len(), 1);
    assert_eq!(journal.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn pending_count_matches_initial_minus_processed() {
    let (store, journal) = in_memory();
    let list = store.create_list("Home").unwrap();
    let mut uids = Vec::new();
    for i in 0..4 {
        let task = store.create_task(list.id(), &format!("task {i}")).unwrap();
        journal
            .queue_op(task.id(), task.summary(), list.id(), OpType::Create)
            .unwrap();
        uids.push(task.id());
    }
    assert_eq!(journal.pending_count().unwrap(), 4);

    let provider = MockProvider::full_capabilities();
    let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
    let mut progress = SyncProgress::new();
    let cancel = Cancellation::new();
    let report = engine.reconcile(&mut progress, &cancel).await.unwrap();

    assert_eq!(report.pushed, 4);
    assert_eq!(journal.pending_count().unwrap(), 4 - 4);
}

#[tokio::test]
async fn clear_ops_with_empty_slice_deletes_nothing() {
    let (store, journal) = in_memory();
    let list = store.create_list("Home").unwrap();
    let task = store.create_task(list.id(), "Buy milk").unwrap();
    journal
        .queue_op(task.id(), task.summary(), list.id(), OpType::Create)
        .unwrap();

    journal.clear_ops(&[]).unwrap();
    assert_eq!(journal.pending_count().unwrap(), 1);
}

#[tokio::test]
async fn list_mutation_invalidates_the_cache() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("lists.json");
    let store = TaskStore::open_in_memory("mock").unwrap();
    store.create_list("Home").unwrap();

    let cache = ListCache::new(cache_path, Duration::from_secs(300));
    cache.refresh(&store).unwrap();
    assert!(cache.load("mock").is_some());

    store.create_list("Work").unwrap();
    cache.invalidate();
    assert!(cache.load("mock").is_none());

    let refreshed = cache.refresh(&store).unwrap();
    assert_eq!(refreshed.len(), 2);
}

#[tokio::test]
async fn sync_aware_store_drops_the_cache_on_every_mutation() {
    use std::sync::Arc;
    use task_fridge::daemon::DaemonClient;
    use task_fridge::provider::RemoteProvider;
    use task_fridge::sync_aware_store::{SyncAwareStore, SyncAwareStoreConfig};

    let dir = tempdir().unwrap();
    let store = TaskStore::open_in_memory("mock").unwrap();
    let journal = SyncJournal::new(store.shared_connection());
    let provider: Arc<dyn RemoteProvider + Send + Sync> = Arc::new(MockProvider::full_capabilities());
    let daemon_client = DaemonClient::new("/nonexistent.pid".into(), "/nonexistent.sock".into());
    let aware = SyncAwareStore::new(
        store,
        journal,
        provider,
        daemon_client,
        dir.path().join("lists.json"),
        SyncAwareStoreConfig::default(),
    );

    let list = aware.create_list("Home").unwrap();
    aware.cache().refresh(aware.store()).unwrap();
    assert!(aware.cache().load(aware.store().provider_id()).is_some());

    // No caller-side invalidate() here: the decorator is responsible for
    // dropping the cache itself on every write it forwards.
    let task = aware.create_task(list.id(), "Buy milk").unwrap();
    assert!(aware.cache().load(aware.store().provider_id()).is_none());

    aware.cache().refresh(aware.store()).unwrap();
    aware.update_task(&task).unwrap();
    assert!(aware.cache().load(aware.store().provider_id()).is_none());

    aware.cache().refresh(aware.store()).unwrap();
    aware.delete_task(task.list_id(), task.id(), task.summary()).unwrap();
    assert!(aware.cache().load(aware.store().provider_id()).is_none());

    aware.wait_for_background().await;
}
