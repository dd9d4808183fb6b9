//! The `RemoteProvider` contract. Concrete backends (CalDAV, Todoist, a
//! plain local mirror, ...) are external collaborators; this crate only
//! defines what [`crate::sync::engine::SyncEngine`] requires of them.

use async_trait::async_trait;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::list::List;
use crate::model::task::Task;

bitflags! {
    /// What a backend can do. The engine consults these before attempting an
    /// operation instead of trying it and classifying the failure after the
    /// fact: list creation and in-progress status in particular have
    /// well-known providers that lack them outright.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const LIST_CREATION       = 0b0001;
        const IN_PROGRESS_STATUS  = 0b0010;
        const SUBTASKS            = 0b0100;
        const RECURRENCE          = 0b1000;
    }
}

/// A deadline passed to every provider operation; the provider is expected
/// to give up (returning `Error::Transport`) once it elapses rather than
/// hang indefinitely.
pub type Deadline = DateTime<Utc>;

/// A remote task backend: CalDAV, Todoist, or any other service that owns
/// lists and tasks outside this process.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn supports_list_creation(&self) -> bool {
        self.capabilities().contains(Capabilities::LIST_CREATION)
    }
    fn supports_in_progress_status(&self) -> bool {
        self.capabilities().contains(Capabilities::IN_PROGRESS_STATUS)
    }
    fn supports_subtasks(&self) -> bool {
        self.capabilities().contains(Capabilities::SUBTASKS)
    }
    fn supports_recurrence(&self) -> bool {
        self.capabilities().contains(Capabilities::RECURRENCE)
    }

    async fn lists(&self, deadline: Deadline) -> Result<Vec<List>>;

    async fn list_by_name(&self, name: &str, deadline: Deadline) -> Result<Option<List>>;

    /// May fail with `Error::Capability` if the backend can't create lists;
    /// the engine treats that as "skip, don't fail the sync".
    async fn create_list(&self, name: &str, deadline: Deadline) -> Result<List>;

    async fn tasks(&self, list_id: Uuid, deadline: Deadline) -> Result<Vec<Task>>;

    async fn task(&self, list_id: Uuid, task_id: Uuid, deadline: Deadline) -> Result<Option<Task>>;

    async fn create_task(&self, list_id: Uuid, task: &Task, deadline: Deadline) -> Result<Task>;

    async fn update_task(&self, task: &Task, deadline: Deadline) -> Result<Task>;

    async fn delete_task(&self, list_id: Uuid, task_id: Uuid, deadline: Deadline) -> Result<()>;

    /// Release any held connections/sessions. Called once when the engine is
    /// done with this provider for the current reconciliation.
    async fn close(&self) -> Result<()>;
}

pub fn deadline_from_now(timeout: std::time::Duration) -> Deadline {
    Utc::now()
        + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::seconds(5))
}
