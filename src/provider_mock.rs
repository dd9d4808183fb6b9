//! An in-memory [`RemoteProvider`] used by the sync engine's own test suite
//! in place of a real network backend. Gated behind `mock_provider` so it
//! never ships in a release build.
#![cfg(feature = "mock_provider")]

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::list::List;
use crate::model::task::Task;
use crate::provider::{Capabilities, Deadline, RemoteProvider};

/// Per-operation success/failure countdown, mirroring the "allow n
/// successes then fail n times" behaviour used elsewhere in this corpus to
/// drive deterministic Transport/Capability-failure tests.
#[derive(Default, Clone, Copy, Debug)]
pub struct Behaviour {
    pub successes_remaining: u32,
    pub failures_remaining: u32,
}

impl Behaviour {
    pub fn fail_times(n: u32) -> Self {
        Self {
            successes_remaining: 0,
            failures_remaining: n,
        }
    }

    fn decrement(&mut self, op: &str) -> Result<()> {
        if self.successes_remaining > 0 {
            self.successes_remaining -= 1;
            Ok(())
        } else if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            Err(Error::Transport(format!("mock provider forced failure: {op}")))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct MockState {
    lists: Vec<List>,
    tasks: Vec<Task>,
    create_task_behaviour: Behaviour,
    update_task_behaviour: Behaviour,
    delete_task_behaviour: Behaviour,
}

pub struct MockProvider {
    capabilities: Capabilities,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn full_capabilities() -> Self {
        Self::new(
            Capabilities::LIST_CREATION
                | Capabilities::IN_PROGRESS_STATUS
                | Capabilities::SUBTASKS
                | Capabilities::RECURRENCE,
        )
    }

    pub fn set_create_task_behaviour(&self, behaviour: Behaviour) {
        self.state.lock().unwrap().create_task_behaviour = behaviour;
    }
    pub fn set_update_task_behaviour(&self, behaviour: Behaviour) {
        self.state.lock().unwrap().update_task_behaviour = behaviour;
    }
    pub fn set_delete_task_behaviour(&self, behaviour: Behaviour) {
        self.state.lock().unwrap().delete_task_behaviour = behaviour;
    }

    /// Seed the remote with a list directly (bypassing `create_list`), as
    /// integration tests commonly need a pre-existing remote list to pull.
    pub fn seed_list(&self, list: List) {
        self.state.lock().unwrap().lists.push(list);
    }

    pub fn seed_task(&self, task: Task) {
        self.state.lock().unwrap().tasks.push(task);
    }
}

#[async_trait]
impl RemoteProvider for MockProvider {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn lists(&self, _deadline: Deadline) -> Result<Vec<List>> {
        Ok(self.state.lock().unwrap().lists.clone())
    }

    async fn list_by_name(&self, name: &str, _deadline: Deadline) -> Result<Option<List>> {
        let key = name.trim().to_lowercase();
        Ok(self
            .state
            .lock()
            .unwrap()
            .lists
            .iter()
            .find(|l| l.name_key() == key)
            .cloned())
    }

    async fn create_list(&self, name: &str, _deadline: Deadline) -> Result<List> {
        if !self.supports_list_creation() {
            return Err(Error::Capability("list creation not supported".into()));
        }
        let list = List::new("mock".to_string(), name.to_string())?;
        self.state.lock().unwrap().lists.push(list.clone());
        Ok(list)
    }

    async fn tasks(&self, list_id: Uuid, _deadline: Deadline) -> Result<Vec<Task>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tasks
            .iter()
            .filter(|t| t.list_id() == list_id)
            .cloned()
            .collect())
    }

    async fn task(&self, list_id: Uuid, task_id: Uuid, _deadline: Deadline) -> Result<Option<Task>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tasks
            .iter()
            .find(|t| t.list_id() == list_id && t.id() == task_id)
            .cloned())
    }

    async fn create_task(&self, _list_id: Uuid, task: &Task, _deadline: Deadline) -> Result<Task> {
        let mut state = self.state.lock().unwrap();
        state.create_task_behaviour.decrement("create_task")?;
        if let Some(existing) = state.tasks.iter().find(|t| t.id() == task.id()) {
            return Ok(existing.clone());
        }
        state.tasks.push(task.clone());
        Ok(task.clone())
    }

    async fn update_task(&self, task: &Task, _deadline: Deadline) -> Result<Task> {
        let mut state = self.state.lock().unwrap();
        state.update_task_behaviour.decrement("update_task")?;
        match state.tasks.iter_mut().find(|t| t.id() == task.id()) {
            Some(slot) => {
                *slot = task.clone();
                Ok(slot.clone())
            }
            None => Err(Error::task_not_found(task.id())),
        }
    }

    async fn delete_task(&self, list_id: Uuid, task_id: Uuid, _deadline: Deadline) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.delete_task_behaviour.decrement("delete_task")?;
        let before = state.tasks.len();
        state
            .tasks
            .retain(|t| !(t.list_id() == list_id && t.id() == task_id));
        let _ = before;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_fetch() {
        let provider = MockProvider::full_capabilities();
        let list = provider.create_list("Home", crate::provider::deadline_from_now(std::time::Duration::from_secs(5))).await.unwrap();
        let task = Task::new(list.id(), "Buy milk".into()).unwrap();
        let deadline = crate::provider::deadline_from_now(std::time::Duration::from_secs(5));
        provider.create_task(list.id(), &task, deadline).await.unwrap();
        let fetched = provider.tasks(list.id(), deadline).await.unwrap();
        assert_eq!(fetched.len(), 1);
    }

    #[tokio::test]
    async fn behaviour_forces_transport_failure() {
        let provider = MockProvider::full_capabilities();
        provider.set_create_task_behaviour(Behaviour::fail_times(1));
        let list = provider
            .create_list("Home", crate::provider::deadline_from_now(std::time::Duration::from_secs(5)))
            .await
            .unwrap();
        let task = Task::new(list.id(), "x".into()).unwrap();
        let deadline = crate::provider::deadline_from_now(std::time::Duration::from_secs(5));
        let err = provider.create_task(list.id(), &task, deadline).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
        // Second attempt succeeds: failures_remaining was exhausted.
        provider.create_task(list.id(), &task, deadline).await.unwrap();
    }
}
