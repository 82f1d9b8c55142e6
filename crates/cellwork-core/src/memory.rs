//! In-memory reference implementation of [`TaskStore`].
//!
//! Enforces the same compare-and-set transition rules a production
//! store does, which is what makes it useful: tests walk tasks through
//! their real lifecycle instead of hand-assembling records, and races
//! between the processor and the reaper resolve here the way they do
//! against the real store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::{StoreError, TaskStore};
use crate::task::{Task, TaskState};

/// A mutex-guarded map of task records with compare-and-set mutation
/// rules.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<BTreeMap<String, Task>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with the given records, bypassing
    /// lifecycle transitions. Useful for states a walker cannot reach,
    /// such as a claimed-but-unconfirmed task.
    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let tasks = tasks
            .into_iter()
            .map(|task| (task.task_guid.clone(), task))
            .collect();
        Self {
            tasks: Mutex::new(tasks),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Task>>, StoreError> {
        self.tasks
            .lock()
            .map_err(|e| StoreError::Transport(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn task_by_guid(&self, guid: &str) -> Result<Task, StoreError> {
        let tasks = self.lock()?;
        tasks.get(guid).cloned().ok_or(StoreError::NotFound)
    }

    async fn tasks_by_cell_id(&self, cell_id: &str) -> Result<Vec<Task>, StoreError> {
        let tasks = self.lock()?;
        Ok(tasks
            .values()
            .filter(|task| task.cell_id == cell_id)
            .cloned()
            .collect())
    }

    async fn desire_task(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.lock()?;
        if tasks.contains_key(&task.task_guid) {
            return Err(StoreError::conflict("task already exists"));
        }
        let record = Task {
            cell_id: String::new(),
            state: TaskState::Pending,
            ..task
        };
        tasks.insert(record.task_guid.clone(), record);
        Ok(())
    }

    async fn start_task(&self, guid: &str, cell_id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.lock()?;
        let task = tasks.get_mut(guid).ok_or(StoreError::NotFound)?;

        match task.state {
            TaskState::Pending => {
                task.state = TaskState::Running;
                task.cell_id = cell_id.to_string();
                Ok(true)
            }
            TaskState::Claimed | TaskState::Running if task.cell_id == cell_id => Ok(false),
            state => Err(StoreError::conflict(format!(
                "cannot start task in state {state} owned by {:?}",
                task.cell_id
            ))),
        }
    }

    async fn complete_task(
        &self,
        guid: &str,
        cell_id: &str,
        failed: bool,
        failure_reason: &str,
        result: &str,
    ) -> Result<(), StoreError> {
        let mut tasks = self.lock()?;
        let task = tasks.get_mut(guid).ok_or(StoreError::NotFound)?;

        if task.state.is_terminal() {
            return Err(StoreError::conflict(format!(
                "cannot complete task in state {}",
                task.state
            )));
        }
        if !task.cell_id.is_empty() && task.cell_id != cell_id {
            return Err(StoreError::conflict(format!(
                "task owned by {:?}, not {cell_id:?}",
                task.cell_id
            )));
        }

        task.state = TaskState::Completed;
        task.failed = failed;
        task.failure_reason = failure_reason.to_string();
        task.result = result.to_string();
        Ok(())
    }

    async fn resolving_task(&self, guid: &str) -> Result<(), StoreError> {
        let mut tasks = self.lock()?;
        let task = tasks.get_mut(guid).ok_or(StoreError::NotFound)?;

        if task.state != TaskState::Completed {
            return Err(StoreError::conflict(format!(
                "cannot resolve task in state {}",
                task.state
            )));
        }
        task.state = TaskState::Resolving;
        Ok(())
    }
}
