//! End-to-end scenarios exercising the pieces together: a `TaskStore` plus a
//! `SyncJournal` plus a `SyncEngine` against a `MockProvider`, and (for the
//! daemon scenario) a real `Daemon` process talking over its Unix socket.
#![cfg(feature = "mock_provider")]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::tempdir;

use task_fridge::cache::ListCache;
use task_fridge::daemon::{Daemon, DaemonClient, DaemonConfig};
use task_fridge::journal::{OpType, SyncJournal};
use task_fridge::model::{parse_recurrence, Status};
use task_fridge::provider::{deadline_from_now, Capabilities, RemoteProvider};
use task_fridge::provider_mock::MockProvider;
use task_fridge::store::TaskStore;
use task_fridge::sync::{ConflictStrategy, SyncEngine, SyncEngineConfig};
use task_fridge::utils::Cancellation;

fn in_memory() -> (TaskStore, SyncJournal) {
    let store = TaskStore::open_in_memory("mock").unwrap();
    let journal = SyncJournal::new(store.shared_connection());
    (store, journal)
}

// 1. Create, complete recurring, observe rollover.
#[tokio::test]
async fn recurring_task_rolls_over_on_completion() {
    let (store, _journal) = in_memory();
    let list = store.create_list("Daily").unwrap();
    let mut task = store.create_task(list.id(), "Water plants").unwrap();
    let due = Utc::now();
    task.set_due_date(Some(due)).unwrap();
    task.set_recurrence(Some(parse_recurrence("daily").unwrap()), true);
    store.update_task(&task).unwrap();

    let mut task = store.get_task(list.id(), task.id()).unwrap();
    let next = task.complete_and_roll_over().expect("recurring task rolls over");
    store.update_task(&task).unwrap();
    store.put_task(&next).unwrap();

    let done = store.get_task(list.id(), task.id()).unwrap();
    assert_eq!(done.status(), Status::Done);
    assert!(done.completed().is_some());

    let rolled = store.get_task(list.id(), next.id()).unwrap();
    assert_eq!(rolled.status(), Status::Todo);
    assert_eq!(rolled.summary(), "Water plants");
    assert_eq!(rolled.due_date().unwrap(), due + chrono::Duration::days(1));

    let all = store.get_tasks(list.id()).unwrap();
    assert_eq!(all.len(), 2);
}

// 2. Push under capability failure.
#[tokio::test]
async fn push_create_list_skips_cleanly_when_unsupported() {
    let (store, journal) = in_memory();
    let list = store.create_list("NewList").unwrap();
    let task = store.create_task(list.id(), "Buy milk").unwrap();
    journal
        .queue_op(task.id(), task.summary(), list.id(), OpType::Create)
        .unwrap();

    let provider = MockProvider::new(Capabilities::empty());
    let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
    let mut progress = task_fridge::sync::SyncProgress::new();
    let cancel = Cancellation::new();
    let report = engine.reconcile(&mut progress, &cancel).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.push_errors, 0);
    assert_eq!(journal.pending_count().unwrap(), 0);
    let unchanged = store.get_task(list.id(), task.id()).unwrap();
    assert_eq!(unchanged.summary(), "Buy milk");
}

// 3. Conflict with server_wins.
#[tokio::test]
async fn divergent_priority_edit_resolves_server_wins() {
    let (store, journal) = in_memory();
    let list = store.create_list("Home").unwrap();
    let mut task = store.create_task(list.id(), "Pay rent").unwrap();
    let last_sync = Utc::now() - chrono::Duration::minutes(10);
    journal.set_last_sync(last_sync).unwrap();

    task.set_priority(3).unwrap();
    store.update_task(&task).unwrap();

    let mut remote_task = task.clone();
    remote_task.set_priority(7).unwrap();
    let provider = MockProvider::full_capabilities();
    provider.seed_list(list.clone());
    provider.seed_task(remote_task.clone());

    let mut config = SyncEngineConfig::default();
    config.conflict_strategy = ConflictStrategy::ServerWins;
    let engine = SyncEngine::new(&store, &journal, &provider, config);
    let mut progress = task_fridge::sync::SyncProgress::new();
    let cancel = Cancellation::new();
    engine.reconcile(&mut progress, &cancel).await.unwrap();

    let stored = store.get_task(list.id(), task.id()).unwrap();
    assert_eq!(stored.priority(), 7);
    assert_eq!(journal.conflict_count().unwrap(), 0);

    // A subsequent sync pushes nothing more for this task.
    let report = engine.reconcile(&mut progress, &cancel).await.unwrap();
    assert_eq!(report.pushed, 0);
    assert!(journal.last_sync().unwrap().unwrap() >= remote_task.modified());
}

// 4. Provider isolation.
#[tokio::test]
async fn stores_and_caches_are_scoped_per_provider() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tasks.db");
    let cache_path = dir.path().join("lists.json");

    {
        let nextcloud = TaskStore::open(&db_path, "nextcloud").unwrap();
        nextcloud.create_list("Home").unwrap();
        let cache = ListCache::new(cache_path.clone(), Duration::from_secs(300));
        cache.refresh(&nextcloud).unwrap();
    }

    let todoist = TaskStore::open(&db_path, "todoist").unwrap();
    assert!(todoist.list_lists().unwrap().is_empty());
    // Creating "Home" here must not collide with nextcloud's list of the
    // same name, since uniqueness is scoped by provider_id.
    todoist.create_list("Home").unwrap();
    assert_eq!(todoist.list_lists().unwrap().len(), 1);

    let cache = ListCache::new(cache_path, Duration::from_secs(300));
    assert!(cache.load("todoist").is_none());
}

// 5. Queue survives concurrent enqueues.
#[tokio::test]
async fn op_queued_after_snapshot_is_not_dropped_by_clear() {
    let (store, journal) = in_memory();
    let list = store.create_list("Home").unwrap();
    let task_a = store.create_task(list.id(), "Task A").unwrap();
    let op_a = journal
        .queue_op(task_a.id(), task_a.summary(), list.id(), OpType::Create)
        .unwrap();

    // Simulate the engine's push phase: it snapshots pending ops, then only
    // clears the ids it actually processed.
    let snapshot = journal.pending_ops().unwrap();
    assert_eq!(snapshot.len(), 1);

    // An op queued after the snapshot but before the clear must survive.
    let task_b = store.create_task(list.id(), "Task B").unwrap();
    journal
        .queue_op(task_b.id(), task_b.summary(), list.id(), OpType::Create)
        .unwrap();

    journal.clear_ops(&[op_a]).unwrap();
    assert_eq!(journal.pending_count().unwrap(), 1);
    let remaining = journal.pending_ops().unwrap();
    assert_eq!(remaining[0].task_uid, task_b.id());

    // A subsequent sync pushes it.
    let provider = MockProvider::full_capabilities();
    let engine = SyncEngine::new(&store, &journal, &provider, SyncEngineConfig::default());
    let mut progress = task_fridge::sync::SyncProgress::new();
    let cancel = Cancellation::new();
    let report = engine.reconcile(&mut progress, &cancel).await.unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(journal.pending_count().unwrap(), 0);
}

// 6. Daemon coordination.
#[tokio::test]
async fn daemon_coalesces_rapid_notifies() {
    let dir = tempdir().unwrap();
    let pid_path = dir.path().join("daemon.pid");
    let socket_path = dir.path().join("daemon.sock");
    let heartbeat_path = dir.path().join("daemon.heartbeat");

    let store = TaskStore::open_in_memory("mock").unwrap();
    let journal = SyncJournal::new(store.shared_connection());
    let list = store.create_list("Home").unwrap();
    let provider: Arc<dyn RemoteProvider + Send + Sync> = Arc::new(MockProvider::full_capabilities());

    let daemon_config = DaemonConfig {
        interval: Duration::from_secs(3600),
        heartbeat_interval: Duration::from_secs(3600),
        idle_timeout: Duration::ZERO,
    };
    let daemon = Daemon::new(
        store.clone(),
        journal.clone(),
        Arc::clone(&provider),
        SyncEngineConfig::default(),
        daemon_config,
        pid_path.clone(),
        socket_path.clone(),
        heartbeat_path,
    );
    let handle = tokio::spawn(daemon.start());

    let client = DaemonClient::new(pid_path, socket_path);
    for _ in 0..100 {
        if client.is_running().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(client.is_running().await, "daemon did not come up in time");

    for i in 0..10 {
        let task = store.create_task(list.id(), &format!("task {i}")).unwrap();
        journal
            .queue_op(task.id(), task.summary(), list.id(), OpType::Create)
            .unwrap();
        client.notify().await.unwrap();
    }

    for _ in 0..100 {
        if journal.pending_count().unwrap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(journal.pending_count().unwrap(), 0);

    let deadline = deadline_from_now(Duration::from_secs(5));
    let remote_list = provider.list_by_name("Home", deadline).await.unwrap().unwrap();
    let remote_tasks = provider.tasks(remote_list.id(), deadline).await.unwrap();
    assert_eq!(remote_tasks.len(), 10);

    client.stop().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
}
