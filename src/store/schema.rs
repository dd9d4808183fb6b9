//! Schema definition and migrations for the shared database file.
//!
//! `task_lists` and `tasks` are owned by [`crate::store::TaskStore`];
//! `sync_queue`, `sync_metadata`, and `sync_conflicts` are owned by
//! [`crate::journal::SyncJournal`]. Both share one connection pool.

use rusqlite::Connection;

use crate::error::Result;

const CURRENT_VERSION: i32 = 1;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA foreign_keys=ON;

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task_lists (
            id TEXT PRIMARY KEY,
            provider_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            color TEXT NOT NULL DEFAULT '',
            modified TEXT NOT NULL,
            deleted_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_task_lists_provider ON task_lists(provider_id);

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            list_id TEXT NOT NULL REFERENCES task_lists(id) ON DELETE CASCADE,
            summary TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            due_date TEXT,
            start_date TEXT,
            completed TEXT,
            created TEXT NOT NULL,
            modified TEXT NOT NULL,
            parent_id TEXT REFERENCES tasks(id) ON DELETE CASCADE,
            categories TEXT NOT NULL DEFAULT '',
            recurrence TEXT,
            recur_from_due INTEGER NOT NULL DEFAULT 1,
            local_id INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_list ON tasks(list_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);

        CREATE TABLE IF NOT EXISTS local_ids (
            provider_id TEXT NOT NULL,
            task_id TEXT NOT NULL,
            local_id INTEGER NOT NULL,
            PRIMARY KEY (provider_id, task_id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_local_ids_scoped
            ON local_ids(provider_id, local_id);

        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            task_summary TEXT NOT NULL,
            list_id TEXT NOT NULL,
            operation_type TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_queue_task ON sync_queue(task_id);
        CREATE INDEX IF NOT EXISTS idx_sync_queue_op ON sync_queue(operation_type);

        CREATE TABLE IF NOT EXISTS sync_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_uid TEXT NOT NULL,
            task_summary TEXT NOT NULL,
            list_id TEXT NOT NULL,
            local_version TEXT NOT NULL,
            remote_version TEXT NOT NULL,
            local_modified TEXT NOT NULL,
            remote_modified TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_uid ON sync_conflicts(task_uid);
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_status ON sync_conflicts(status);
        ",
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0))
        .unwrap_or(0);

    if version < CURRENT_VERSION {
        // No stepwise migrations yet; this just establishes the baseline
        // version row for future schema changes to build on.
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [CURRENT_VERSION],
        )?;
    }

    Ok(())
}
