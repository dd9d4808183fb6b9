//! The durable local store: lists, tasks, trash, local-id mapping, stats.

pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::list::List;
use crate::model::recurrence::{parse_recurrence, Recurrence};
use crate::model::task::{Status, Task};

/// Default trash retention window before `purge_expired_trash` reclaims a
/// soft-deleted list.
pub fn default_trash_retention() -> Duration {
    Duration::days(30)
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub list_count: usize,
    pub deleted_list_count: usize,
    pub task_count: usize,
    pub pending_ops: usize,
    pub pending_conflicts: usize,
    pub db_size_bytes: u64,
}

/// The local store for one provider scope. Every row it touches carries
/// `provider_id`; a store opened for one provider never sees another's rows,
/// even though they may share the same database file.
#[derive(Clone)]
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
    provider_id: String,
}

impl TaskStore {
    /// Open (creating if needed) the database at `path`, scoped to
    /// `provider_id`. Runs migrations synchronously.
    pub fn open(path: &Path, provider_id: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            provider_id: provider_id.into(),
        })
    }

    /// Open an in-memory database, used by tests and by the mock-provider
    /// examples.
    pub fn open_in_memory(provider_id: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            provider_id: provider_id.into(),
        })
    }

    /// Share the underlying connection with a [`crate::journal::SyncJournal`]
    /// opened against the same database file.
    pub fn shared_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    // ---- Lists -----------------------------------------------------

    pub fn create_list(&self, name: &str) -> Result<List> {
        let list = List::new(self.provider_id.clone(), name.to_string())?;
        let conn = self.conn.lock().expect("store connection poisoned");
        self.ensure_name_available(&conn, &list.name_key(), None)?;
        insert_list(&conn, &list)?;
        Ok(list)
    }

    pub fn update_list(&self, mut list: List) -> Result<List> {
        let conn = self.conn.lock().expect("store connection poisoned");
        self.ensure_name_available(&conn, &list.name_key(), Some(list.id()))?;
        list.set_name(list.name().to_string())?; // re-validates/re-touches consistently
        conn.execute(
            "UPDATE task_lists SET name=?1, description=?2, color=?3, modified=?4
             WHERE id=?5 AND provider_id=?6",
            params![
                list.name(),
                list.description(),
                list.color(),
                list.modified().to_rfc3339(),
                list.id().to_string(),
                self.provider_id,
            ],
        )?;
        Ok(list)
    }

    fn ensure_name_available(
        &self,
        conn: &Connection,
        name_key: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<()> {
        let mut stmt = conn.prepare(
            "SELECT id, name FROM task_lists WHERE provider_id=?1 AND deleted_at IS NULL",
        )?;
        let rows = stmt.query_map(params![self.provider_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            Ok((id, name))
        })?;
        for row in rows {
            let (id, name) = row?;
            if name.to_lowercase() == name_key {
                let id = Uuid::parse_str(&id).unwrap_or_default();
                if Some(id) != exclude_id {
                    return Err(Error::Conflict(format!(
                        "a list named {name:?} already exists"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn delete_list(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE task_lists SET deleted_at=?1, modified=?1 WHERE id=?2 AND provider_id=?3 AND deleted_at IS NULL",
            params![now, id.to_string(), self.provider_id],
        )?;
        if changed == 0 {
            return Err(Error::list_not_found(id));
        }
        Ok(())
    }

    pub fn restore_list(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE task_lists SET deleted_at=NULL, modified=?1 WHERE id=?2 AND provider_id=?3 AND deleted_at IS NOT NULL",
            params![now, id.to_string(), self.provider_id],
        )?;
        if changed == 0 {
            return Err(Error::list_not_found(id));
        }
        Ok(())
    }

    /// Hard-delete a (normally already-trashed) list and cascade its tasks.
    pub fn purge_list(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn.lock().expect("store connection poisoned");
        let tx = conn.transaction()?;
        purge_list_descendants(&tx, id)?;
        let changed = tx.execute(
            "DELETE FROM task_lists WHERE id=?1 AND provider_id=?2",
            params![id.to_string(), self.provider_id],
        )?;
        tx.commit()?;
        if changed == 0 {
            return Err(Error::list_not_found(id));
        }
        Ok(())
    }

    /// Sweep lists whose trash retention has elapsed and purge them.
    pub fn purge_expired_trash(&self, retention: Duration) -> Result<usize> {
        let cutoff = Utc::now() - retention;
        let ids: Vec<Uuid> = {
            let conn = self.conn.lock().expect("store connection poisoned");
            let mut stmt = conn.prepare(
                "SELECT id, deleted_at FROM task_lists WHERE provider_id=?1 AND deleted_at IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![self.provider_id], |row| {
                let id: String = row.get(0)?;
                let deleted_at: String = row.get(1)?;
                Ok((id, deleted_at))
            })?;
            let mut expired = Vec::new();
            for row in rows {
                let (id, deleted_at) = row?;
                let deleted_at = DateTime::parse_from_rfc3339(&deleted_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(Utc::now());
                if deleted_at < cutoff {
                    expired.push(Uuid::parse_str(&id).unwrap_or_default());
                }
            }
            expired
        };
        for id in &ids {
            self.purge_list(*id)?;
        }
        Ok(ids.len())
    }

    pub fn list_lists(&self) -> Result<Vec<List>> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, provider_id, name, description, color, modified, deleted_at
             FROM task_lists WHERE provider_id=?1 AND deleted_at IS NULL ORDER BY name ASC",
        )?;
        let rows = stmt.query_map(params![self.provider_id], row_to_list)?;
        rows.map(|r| r.map_err(Error::from).and_then(|x| x))
            .collect()
    }

    pub fn list_deleted_lists(&self) -> Result<Vec<List>> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, provider_id, name, description, color, modified, deleted_at
             FROM task_lists WHERE provider_id=?1 AND deleted_at IS NOT NULL ORDER BY deleted_at DESC",
        )?;
        let rows = stmt.query_map(params![self.provider_id], row_to_list)?;
        rows.map(|r| r.map_err(Error::from).and_then(|x| x))
            .collect()
    }

    pub fn get_list(&self, id: Uuid) -> Result<List> {
        let conn = self.conn.lock().expect("store connection poisoned");
        conn.query_row(
            "SELECT id, provider_id, name, description, color, modified, deleted_at
             FROM task_lists WHERE id=?1 AND provider_id=?2 AND deleted_at IS NULL",
            params![id.to_string(), self.provider_id],
            row_to_list,
        )
        .optional()?
        .ok_or_else(|| Error::list_not_found(id))?
    }

    pub fn get_list_by_name(&self, name: &str) -> Result<List> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let key = name.trim().to_lowercase();
        let mut stmt = conn.prepare(
            "SELECT id, provider_id, name, description, color, modified, deleted_at
             FROM task_lists WHERE provider_id=?1 AND deleted_at IS NULL",
        )?;
        let mut rows = stmt.query_map(params![self.provider_id], row_to_list)?;
        rows.find_map(|r| match r {
            Ok(Ok(list)) if list.name_key() == key => Some(Ok(list)),
            Ok(Err(e)) => Some(Err(e)),
            Err(e) => Some(Err(Error::from(e))),
            _ => None,
        })
        .unwrap_or_else(|| Err(Error::not_found("list", name)))
    }

    pub fn get_deleted_list_by_name(&self, name: &str) -> Result<List> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let key = name.trim().to_lowercase();
        let mut stmt = conn.prepare(
            "SELECT id, provider_id, name, description, color, modified, deleted_at
             FROM task_lists WHERE provider_id=?1 AND deleted_at IS NOT NULL",
        )?;
        let mut rows = stmt.query_map(params![self.provider_id], row_to_list)?;
        rows.find_map(|r| match r {
            Ok(Ok(list)) if list.name_key() == key => Some(Ok(list)),
            Ok(Err(e)) => Some(Err(e)),
            Err(e) => Some(Err(Error::from(e))),
            _ => None,
        })
        .unwrap_or_else(|| Err(Error::not_found("deleted list", name)))
    }

    // ---- Tasks -------------------------------------------------------

    pub fn create_task(&self, list_id: Uuid, summary: &str) -> Result<Task> {
        let task = Task::new(list_id, summary.to_string())?;
        let conn = self.conn.lock().expect("store connection poisoned");
        self.assert_list_owned(&conn, list_id)?;
        insert_task(&conn, &task)?;
        assign_local_id(&conn, &self.provider_id, task.id())?;
        Ok(task)
    }

    pub fn update_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        self.assert_list_owned(&conn, task.list_id())?;
        if let Some(parent_id) = task.parent_id() {
            assert_no_cycle(&conn, task.id(), parent_id)?;
        }
        let changed = conn.execute(
            "UPDATE tasks SET summary=?1, description=?2, status=?3, priority=?4, due_date=?5,
             start_date=?6, completed=?7, modified=?8, parent_id=?9, categories=?10,
             recurrence=?11, recur_from_due=?12
             WHERE id=?13 AND list_id=?14",
            params![
                task.summary(),
                task.description(),
                status_str(task.status()),
                task.priority() as i64,
                task.due_date().map(|d| d.to_rfc3339()),
                task.start_date().map(|d| d.to_rfc3339()),
                task.completed().map(|d| d.to_rfc3339()),
                task.modified().to_rfc3339(),
                task.parent_id().map(|p| p.to_string()),
                task.categories_joined(),
                task.recurrence().map(|r| r.to_rrule_string()),
                task.recur_from_due(),
                task.id().to_string(),
                task.list_id().to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::task_not_found(task.id()));
        }
        Ok(())
    }

    /// Cascade-delete descendants bottom-up, then the task itself.
    pub fn delete_task(&self, list_id: Uuid, task_id: Uuid) -> Result<()> {
        let mut conn = self.conn.lock().expect("store connection poisoned");
        let tx = conn.transaction()?;
        delete_task_cascade(&tx, list_id, task_id)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_tasks(&self, list_id: Uuid) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("store connection poisoned");
        self.assert_list_owned(&conn, list_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, list_id, summary, description, status, priority, due_date, start_date,
             completed, created, modified, parent_id, categories, recurrence, recur_from_due
             FROM tasks WHERE list_id=?1 ORDER BY created ASC",
        )?;
        let rows = stmt.query_map(params![list_id.to_string()], row_to_task)?;
        rows.map(|r| r.map_err(Error::from).and_then(|x| x))
            .collect()
    }

    pub fn get_task(&self, list_id: Uuid, task_id: Uuid) -> Result<Task> {
        let conn = self.conn.lock().expect("store connection poisoned");
        conn.query_row(
            "SELECT id, list_id, summary, description, status, priority, due_date, start_date,
             completed, created, modified, parent_id, categories, recurrence, recur_from_due
             FROM tasks WHERE id=?1 AND list_id=?2",
            params![task_id.to_string(), list_id.to_string()],
            row_to_task,
        )
        .optional()?
        .ok_or_else(|| Error::task_not_found(task_id))?
    }

    /// Insert or update a task exactly as given (id, timestamps and all),
    /// used by the pull phase to mirror a remote task locally and by
    /// conflict resolution to materialize a `keep_both` duplicate.
    pub fn put_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        self.assert_list_owned(&conn, task.list_id())?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM tasks WHERE id=?1",
                params![task.id().to_string()],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            conn.execute(
                "UPDATE tasks SET list_id=?1, summary=?2, description=?3, status=?4, priority=?5,
                 due_date=?6, start_date=?7, completed=?8, modified=?9, parent_id=?10,
                 categories=?11, recurrence=?12, recur_from_due=?13 WHERE id=?14",
                params![
                    task.list_id().to_string(),
                    task.summary(),
                    task.description(),
                    status_str(task.status()),
                    task.priority() as i64,
                    task.due_date().map(|d| d.to_rfc3339()),
                    task.start_date().map(|d| d.to_rfc3339()),
                    task.completed().map(|d| d.to_rfc3339()),
                    task.modified().to_rfc3339(),
                    task.parent_id().map(|p| p.to_string()),
                    task.categories_joined(),
                    task.recurrence().map(|r| r.to_rrule_string()),
                    task.recur_from_due(),
                    task.id().to_string(),
                ],
            )?;
        } else {
            insert_task(&conn, task)?;
            assign_local_id(&conn, &self.provider_id, task.id())?;
        }
        Ok(())
    }

    /// Insert or update a list exactly as given (id preserved), used by the
    /// pull phase to mirror a remote list locally.
    pub fn put_list(&self, list: &List) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM task_lists WHERE id=?1",
                params![list.id().to_string()],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            conn.execute(
                "UPDATE task_lists SET name=?1, description=?2, color=?3, modified=?4
                 WHERE id=?5 AND provider_id=?6",
                params![
                    list.name(),
                    list.description(),
                    list.color(),
                    list.modified().to_rfc3339(),
                    list.id().to_string(),
                    self.provider_id,
                ],
            )?;
        } else {
            insert_list(&conn, list)?;
        }
        Ok(())
    }

    pub fn task_exists(&self, task_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM tasks WHERE id=?1",
                params![task_id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    pub fn get_task_by_local_id(&self, list_id: Uuid, local_id: i64) -> Result<Task> {
        let task_id = {
            let conn = self.conn.lock().expect("store connection poisoned");
            conn.query_row(
                "SELECT task_id FROM local_ids WHERE provider_id=?1 AND local_id=?2",
                params![self.provider_id, local_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        };
        match task_id {
            Some(id) => {
                let id = Uuid::parse_str(&id)
                    .map_err(|_| Error::Invariant("corrupt local_id mapping".into()))?;
                self.get_task(list_id, id)
            }
            None => Err(Error::not_found("local_id", local_id.to_string())),
        }
    }

    pub fn get_task_local_id(&self, task_id: Uuid) -> Result<i64> {
        let conn = self.conn.lock().expect("store connection poisoned");
        conn.query_row(
            "SELECT local_id FROM local_ids WHERE provider_id=?1 AND task_id=?2",
            params![self.provider_id, task_id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::task_not_found(task_id))
    }

    // ---- Maintenance ---------------------------------------------------

    pub fn stats(&self) -> Result<Stats> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let list_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM task_lists WHERE provider_id=?1 AND deleted_at IS NULL",
            params![self.provider_id],
            |r| r.get(0),
        )?;
        let deleted_list_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM task_lists WHERE provider_id=?1 AND deleted_at IS NOT NULL",
            params![self.provider_id],
            |r| r.get(0),
        )?;
        let task_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks t JOIN task_lists l ON t.list_id = l.id WHERE l.provider_id=?1",
            params![self.provider_id],
            |r| r.get(0),
        )?;
        let pending_ops: i64 =
            conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |r| r.get(0))?;
        let pending_conflicts: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_conflicts WHERE status='pending'",
            [],
            |r| r.get(0),
        )?;
        let db_size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0);
        Ok(Stats {
            list_count: list_count as usize,
            deleted_list_count: deleted_list_count as usize,
            task_count: task_count as usize,
            pending_ops: pending_ops as usize,
            pending_conflicts: pending_conflicts as usize,
            db_size_bytes: db_size_bytes as u64,
        })
    }

    pub fn vacuum(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    // ---- internals -------------------------------------------------

    fn assert_list_owned(&self, conn: &Connection, list_id: Uuid) -> Result<()> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM task_lists WHERE id=?1 AND provider_id=?2",
                params![list_id.to_string(), self.provider_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::list_not_found(list_id));
        }
        Ok(())
    }
}

fn assign_local_id(conn: &Connection, provider_id: &str, task_id: Uuid) -> Result<i64> {
    let next: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(local_id), 0) + 1 FROM local_ids WHERE provider_id=?1",
            params![provider_id],
            |r| r.get(0),
        )
        .unwrap_or(1);
    conn.execute(
        "INSERT INTO local_ids (provider_id, task_id, local_id) VALUES (?1, ?2, ?3)",
        params![provider_id, task_id.to_string(), next],
    )?;
    Ok(next)
}

fn assert_no_cycle(conn: &Connection, task_id: Uuid, parent_id: Uuid) -> Result<()> {
    if task_id == parent_id {
        return Err(Error::Invariant("a task cannot be its own parent".into()));
    }
    let mut current = parent_id;
    let mut depth = 0;
    loop {
        if current == task_id {
            return Err(Error::Invariant("parent_id would create a cycle".into()));
        }
        let next: Option<String> = conn
            .query_row(
                "SELECT parent_id FROM tasks WHERE id=?1",
                params![current.to_string()],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        match next {
            Some(s) => current = Uuid::parse_str(&s).unwrap_or(task_id),
            None => return Ok(()),
        }
        depth += 1;
        if depth > 10_000 {
            return Err(Error::Invariant("parent chain too deep".into()));
        }
    }
}

fn delete_task_cascade(conn: &Connection, list_id: Uuid, task_id: Uuid) -> Result<()> {
    let children: Vec<Uuid> = {
        let mut stmt =
            conn.prepare("SELECT id FROM tasks WHERE parent_id=?1 AND list_id=?2")?;
        let rows = stmt.query_map(params![task_id.to_string(), list_id.to_string()], |r| {
            r.get::<_, String>(0)
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter_map(|s| Uuid::parse_str(&s).ok())
            .collect()
    };
    for child in children {
        delete_task_cascade(conn, list_id, child)?;
    }
    let changed = conn.execute(
        "DELETE FROM tasks WHERE id=?1 AND list_id=?2",
        params![task_id.to_string(), list_id.to_string()],
    )?;
    if changed == 0 {
        return Err(Error::task_not_found(task_id));
    }
    Ok(())
}

fn purge_list_descendants(conn: &Connection, list_id: Uuid) -> Result<()> {
    conn.execute(
        "DELETE FROM local_ids WHERE task_id IN (SELECT id FROM tasks WHERE list_id=?1)",
        params![list_id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM tasks WHERE list_id=?1",
        params![list_id.to_string()],
    )?;
    Ok(())
}

fn insert_list(conn: &Connection, list: &List) -> Result<()> {
    conn.execute(
        "INSERT INTO task_lists (id, provider_id, name, description, color, modified, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
        params![
            list.id().to_string(),
            list.provider_id(),
            list.name(),
            list.description(),
            list.color(),
            list.modified().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, list_id, summary, description, status, priority, due_date,
         start_date, completed, created, modified, parent_id, categories, recurrence, recur_from_due)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            task.id().to_string(),
            task.list_id().to_string(),
            task.summary(),
            task.description(),
            status_str(task.status()),
            task.priority() as i64,
            task.due_date().map(|d| d.to_rfc3339()),
            task.start_date().map(|d| d.to_rfc3339()),
            task.completed().map(|d| d.to_rfc3339()),
            task.created().to_rfc3339(),
            task.modified().to_rfc3339(),
            task.parent_id().map(|p| p.to_string()),
            task.categories_joined(),
            task.recurrence().map(|r| r.to_rrule_string()),
            task.recur_from_due(),
        ],
    )?;
    Ok(())
}

fn status_str(status: Status) -> &'static str {
    match status {
        Status::Todo => "TODO",
        Status::InProgress => "IN_PROGRESS",
        Status::Done => "DONE",
        Status::Cancelled => "CANCELLED",
    }
}

fn status_from_str(s: &str) -> Status {
    match s {
        "IN_PROGRESS" => Status::InProgress,
        "DONE" => Status::Done,
        "CANCELLED" => Status::Cancelled,
        _ => Status::Todo,
    }
}

fn row_to_list(row: &rusqlite::Row) -> rusqlite::Result<Result<List>> {
    let id: String = row.get(0)?;
    let provider_id: String = row.get(1)?;
    let name: String = row.get(2)?;
    let description: String = row.get(3)?;
    let color: String = row.get(4)?;
    let modified: String = row.get(5)?;
    let deleted_at: Option<String> = row.get(6)?;
    Ok((|| -> Result<List> {
        let id = Uuid::parse_str(&id).map_err(|_| Error::Invariant("corrupt list id".into()))?;
        let modified = DateTime::parse_from_rfc3339(&modified)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|_| Error::Invariant("corrupt modified timestamp".into()))?;
        let deleted_at = deleted_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|_| Error::Invariant("corrupt deleted_at timestamp".into()))
            })
            .transpose()?;
        List::from_parts(id, provider_id, name, description, color, modified, deleted_at)
    })())
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Result<Task>> {
    let id: String = row.get(0)?;
    let list_id: String = row.get(1)?;
    let summary: String = row.get(2)?;
    let description: String = row.get(3)?;
    let status: String = row.get(4)?;
    let priority: i64 = row.get(5)?;
    let due_date: Option<String> = row.get(6)?;
    let start_date: Option<String> = row.get(7)?;
    let completed: Option<String> = row.get(8)?;
    let created: String = row.get(9)?;
    let modified: String = row.get(10)?;
    let parent_id: Option<String> = row.get(11)?;
    let categories: String = row.get(12)?;
    let recurrence: Option<String> = row.get(13)?;
    let recur_from_due: bool = row.get(14)?;

    Ok((|| -> Result<Task> {
        let parse_ts = |s: &str| -> Result<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|_| Error::Invariant("corrupt timestamp".into()))
        };
        let id = Uuid::parse_str(&id).map_err(|_| Error::Invariant("corrupt task id".into()))?;
        let list_id =
            Uuid::parse_str(&list_id).map_err(|_| Error::Invariant("corrupt list_id".into()))?;
        let parent_id = parent_id
            .map(|s| Uuid::parse_str(&s).map_err(|_| Error::Invariant("corrupt parent_id".into())))
            .transpose()?;
        let categories: Vec<String> = categories
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        let recurrence: Option<Recurrence> = recurrence
            .map(|s| rrule_to_recurrence(&s))
            .transpose()?;

        Task::from_parts(
            id,
            list_id,
            summary,
            description,
            status_from_str(&status),
            priority as u8,
            due_date.map(|s| parse_ts(&s)).transpose()?,
            start_date.map(|s| parse_ts(&s)).transpose()?,
            completed.map(|s| parse_ts(&s)).transpose()?,
            parse_ts(&created)?,
            parse_ts(&modified)?,
            parent_id,
            categories,
            recurrence,
            recur_from_due,
        )
    })())
}

/// Parse a previously-rendered `FREQ=...;INTERVAL=...;BYDAY=...` string back
/// into a [`Recurrence`]. This is the inverse of [`Recurrence::to_rrule_string`],
/// not the human-string parser.
fn rrule_to_recurrence(rrule: &str) -> Result<Recurrence> {
    use crate::model::recurrence::Freq;
    let mut freq = None;
    let mut interval = 1u32;
    let mut byday = Vec::new();
    for part in rrule.split(';') {
        let mut kv = part.splitn(2, '=');
        let (key, value) = (kv.next().unwrap_or(""), kv.next().unwrap_or(""));
        match key {
            "FREQ" => {
                freq = Some(match value {
                    "DAILY" => Freq::Daily,
                    "WEEKLY" => Freq::Weekly,
                    "MONTHLY" => Freq::Monthly,
                    "YEARLY" => Freq::Yearly,
                    other => {
                        return Err(Error::Invariant(format!("unknown RRULE FREQ: {other}")))
                    }
                })
            }
            "INTERVAL" => {
                interval = value
                    .parse()
                    .map_err(|_| Error::Invariant(format!("bad RRULE INTERVAL: {value}")))?
            }
            "BYDAY" => {
                for code in value.split(',') {
                    byday.push(match code {
                        "MO" => chrono::Weekday::Mon,
                        "TU" => chrono::Weekday::Tue,
                        "WE" => chrono::Weekday::Wed,
                        "TH" => chrono::Weekday::Thu,
                        "FR" => chrono::Weekday::Fri,
                        "SA" => chrono::Weekday::Sat,
                        "SU" => chrono::Weekday::Sun,
                        other => {
                            return Err(Error::Invariant(format!(
                                "unknown RRULE BYDAY code: {other}"
                            )))
                        }
                    });
                }
            }
            _ => {}
        }
    }
    let freq = freq.ok_or_else(|| Error::Invariant("RRULE missing FREQ".into()))?;
    Ok(Recurrence::new(freq, interval).with_byday(byday))
}
