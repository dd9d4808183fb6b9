//! The append-only sync queue, sync metadata, and conflict journal.
//!
//! `SyncJournal` owns three tables (`sync_queue`, `sync_metadata`,
//! `sync_conflicts`) in the database shared with [`crate::store::TaskStore`].
//! It never deletes more of the queue than it's told to: there is
//! deliberately no "clear everything" operation, because a reconciliation
//! that clears blindly loses ops enqueued mid-sync.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    fn as_str(self) -> &'static str {
        match self {
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(OpType::Create),
            "update" => Ok(OpType::Update),
            "delete" => Ok(OpType::Delete),
            other => Err(Error::Storage(rusqlite::Error::InvalidColumnType(
                0,
                format!("unknown operation_type {other:?}"),
                rusqlite::types::Type::Text,
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: i64,
    pub task_uid: Uuid,
    pub task_summary: String,
    pub list_id: Uuid,
    pub op_type: OpType,
    pub retry_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStatus {
    Pending,
    Resolved,
}

impl ConflictStatus {
    fn as_str(self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::Resolved => "resolved",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: i64,
    pub task_uid: Uuid,
    pub task_summary: String,
    pub list_id: Uuid,
    pub local_version: serde_json::Value,
    pub remote_version: serde_json::Value,
    pub local_modified: DateTime<Utc>,
    pub remote_modified: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub status: ConflictStatus,
}

#[derive(Clone)]
pub struct SyncJournal {
    conn: Arc<Mutex<Connection>>,
}

impl SyncJournal {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn queue_op(
        &self,
        task_uid: Uuid,
        task_summary: &str,
        list_id: Uuid,
        op_type: OpType,
    ) -> Result<i64> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        conn.execute(
            "INSERT INTO sync_queue (task_id, task_summary, list_id, operation_type, retry_count, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                task_uid.to_string(),
                task_summary,
                list_id.to_string(),
                op_type.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn pending_ops(&self) -> Result<Vec<SyncOperation>> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, task_id, task_summary, list_id, operation_type, retry_count, last_attempt_at, created_at
             FROM sync_queue ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], row_to_operation)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    /// Delete exactly the given ids. Never a blanket clear: ops enqueued
    /// after the caller's snapshot was taken are untouched.
    pub fn clear_ops(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().expect("journal connection poisoned");
        let tx = conn.transaction()?;
        for chunk in &ids.iter().chunks(500) {
            let chunk: Vec<i64> = chunk.copied().collect();
            let placeholders = chunk.iter().map(|_| "?").join(",");
            let sql = format!("DELETE FROM sync_queue WHERE id IN ({placeholders})");
            let params: Vec<&dyn rusqlite::ToSql> =
                chunk.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
            tx.execute(&sql, params.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn record_attempt(&self, id: i64, increment_retry: bool) -> Result<()> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        if increment_retry {
            conn.execute(
                "UPDATE sync_queue SET retry_count = retry_count + 1, last_attempt_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )?;
        } else {
            conn.execute(
                "UPDATE sync_queue SET last_attempt_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )?;
        }
        Ok(())
    }

    pub fn record_conflict(
        &self,
        task_uid: Uuid,
        task_summary: &str,
        list_id: Uuid,
        local_version: &serde_json::Value,
        remote_version: &serde_json::Value,
        local_modified: DateTime<Utc>,
        remote_modified: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        conn.execute(
            "INSERT INTO sync_conflicts
             (task_uid, task_summary, list_id, local_version, remote_version, local_modified, remote_modified, detected_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending')",
            params![
                task_uid.to_string(),
                task_summary,
                list_id.to_string(),
                local_version.to_string(),
                remote_version.to_string(),
                local_modified.to_rfc3339(),
                remote_modified.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn pending_conflicts(&self) -> Result<Vec<SyncConflict>> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, task_uid, task_summary, list_id, local_version, remote_version, local_modified, remote_modified, detected_at, status
             FROM sync_conflicts WHERE status = 'pending' ORDER BY detected_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_conflict)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    pub fn conflict_by_uid(&self, task_uid: Uuid) -> Result<Option<SyncConflict>> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        conn.query_row(
            "SELECT id, task_uid, task_summary, list_id, local_version, remote_version, local_modified, remote_modified, detected_at, status
             FROM sync_conflicts WHERE task_uid = ?1 AND status = 'pending' ORDER BY detected_at DESC LIMIT 1",
            params![task_uid.to_string()],
            row_to_conflict,
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn resolve_conflict(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        conn.execute(
            "UPDATE sync_conflicts SET status = 'resolved' WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn set_last_sync(&self, ts: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        conn.execute(
            "INSERT INTO sync_metadata (key, value) VALUES ('last_sync', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![ts.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM sync_metadata WHERE key = 'last_sync'",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match raw {
            Some(s) => Some(
                DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| Error::Invariant(format!("corrupt last_sync value: {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        })
    }

    pub fn pending_count(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn conflict_count(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("journal connection poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_conflicts WHERE status = 'pending'",
            [],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}

fn row_to_operation(row: &rusqlite::Row) -> rusqlite::Result<SyncOperation> {
    let task_uid: String = row.get(1)?;
    let list_id: String = row.get(3)?;
    let op_type: String = row.get(4)?;
    let last_attempt_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok(SyncOperation {
        id: row.get(0)?,
        task_uid: parse_uuid(&task_uid)?,
        task_summary: row.get(2)?,
        list_id: parse_uuid(&list_id)?,
        op_type: OpType::from_str(&op_type).map_err(|_| {
            rusqlite::Error::InvalidColumnType(4, "operation_type".into(), rusqlite::types::Type::Text)
        })?,
        retry_count: row.get::<_, i64>(5)? as u32,
        last_attempt_at: last_attempt_at.map(|s| parse_ts(&s)).transpose()?,
        created_at: parse_ts(&created_at)?,
    })
}

fn row_to_conflict(row: &rusqlite::Row) -> rusqlite::Result<SyncConflict> {
    let task_uid: String = row.get(1)?;
    let list_id: String = row.get(3)?;
    let local_version: String = row.get(4)?;
    let remote_version: String = row.get(5)?;
    let local_modified: String = row.get(6)?;
    let remote_modified: String = row.get(7)?;
    let detected_at: String = row.get(8)?;
    let status: String = row.get(9)?;
    Ok(SyncConflict {
        id: row.get(0)?,
        task_uid: parse_uuid(&task_uid)?,
        task_summary: row.get(2)?,
        list_id: parse_uuid(&list_id)?,
        local_version: serde_json::from_str(&local_version).unwrap_or(serde_json::Value::Null),
        remote_version: serde_json::from_str(&remote_version).unwrap_or(serde_json::Value::Null),
        local_modified: parse_ts(&local_modified)?,
        remote_modified: parse_ts(&remote_modified)?,
        detected_at: parse_ts(&detected_at)?,
        status: if status == "resolved" {
            ConflictStatus::Resolved
        } else {
            ConflictStatus::Pending
        },
    })
}

fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s)
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "uuid".into(), rusqlite::types::Type::Text))
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "timestamp".into(), rusqlite::types::Type::Text))
}
