//! Reaper behavior: containerless tasks are failed, everything else
//! is left alone, and no single failure stops the sweep.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use cellwork_core::config::ReconcilerConfig;
use cellwork_core::container::{Container, ContainerState};
use cellwork_core::memory::InMemoryTaskStore;
use cellwork_core::store::{StoreError, TaskStore};
use cellwork_core::task::{Task, TaskState};
use cellwork_reconciler::reaper::{TaskReaper, CONTAINERLESS_TASK_REASON};
use cellwork_reconciler::testing::ScriptedExecutor;

const LOCAL_CELL: &str = "cell-a";

fn config() -> ReconcilerConfig {
    ReconcilerConfig::new(LOCAL_CELL).expect("config should be valid")
}

fn task_on_cell(guid: &str, cell_id: &str, state: TaskState) -> Task {
    let mut task = Task::new(guid, "/tmp/task-result");
    task.cell_id = cell_id.to_string();
    task.state = state;
    task
}

#[tokio::test]
async fn containerless_running_task_is_failed() {
    let store = Arc::new(InMemoryTaskStore::new());
    store.desire_task(Task::new("g6", "/tmp/result")).await.unwrap();
    store.start_task("g6", LOCAL_CELL).await.unwrap();
    let executor = Arc::new(ScriptedExecutor::new());

    let reaper = TaskReaper::new(config(), store.clone(), executor);
    reaper.reap().await;

    let task = store.task_by_guid("g6").await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert!(task.failed);
    assert_eq!(task.failure_reason, CONTAINERLESS_TASK_REASON);
    assert!(task.result.is_empty());
}

#[tokio::test]
async fn containerless_claimed_task_is_failed_too() {
    // The store may surface a claim before it is confirmed running; a
    // claimed task with no container is just as abandoned.
    let store = Arc::new(InMemoryTaskStore::with_tasks([task_on_cell(
        "g1",
        LOCAL_CELL,
        TaskState::Claimed,
    )]));
    let executor = Arc::new(ScriptedExecutor::new());

    let reaper = TaskReaper::new(config(), store.clone(), executor);
    reaper.reap().await;

    let task = store.task_by_guid("g1").await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert!(task.failed);
    assert_eq!(task.failure_reason, CONTAINERLESS_TASK_REASON);
}

#[tokio::test]
async fn a_live_container_leaves_the_task_alone() {
    let store = Arc::new(InMemoryTaskStore::new());
    store.desire_task(Task::new("g1", "/tmp/result")).await.unwrap();
    store.start_task("g1", LOCAL_CELL).await.unwrap();

    let executor = Arc::new(ScriptedExecutor::new());
    executor.insert_container(Container::new("g1", ContainerState::Running));

    let reaper = TaskReaper::new(config(), store.clone(), executor.clone());
    reaper.reap().await;

    let task = store.task_by_guid("g1").await.unwrap();
    assert_eq!(task.state, TaskState::Running);
    assert!(!task.failed);
    assert_eq!(executor.lookup_calls(), vec!["g1"]);
}

#[tokio::test]
async fn terminal_tasks_are_not_looked_up() {
    let store = Arc::new(InMemoryTaskStore::with_tasks([
        task_on_cell("g1", LOCAL_CELL, TaskState::Completed),
        task_on_cell("g2", LOCAL_CELL, TaskState::Resolving),
    ]));
    let executor = Arc::new(ScriptedExecutor::new());

    let reaper = TaskReaper::new(config(), store.clone(), executor.clone());
    reaper.reap().await;

    assert!(executor.lookup_calls().is_empty());
    let task = store.task_by_guid("g1").await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert!(!task.failed);
}

#[tokio::test]
async fn other_cells_tasks_are_not_visible() {
    let store = Arc::new(InMemoryTaskStore::with_tasks([task_on_cell(
        "g1",
        "cell-w",
        TaskState::Running,
    )]));
    let executor = Arc::new(ScriptedExecutor::new());

    let reaper = TaskReaper::new(config(), store.clone(), executor.clone());
    reaper.reap().await;

    assert!(executor.lookup_calls().is_empty());
    let task = store.task_by_guid("g1").await.unwrap();
    assert_eq!(task.state, TaskState::Running);
}

#[tokio::test]
async fn an_executor_outage_leaves_the_task_for_the_next_tick() {
    let store = Arc::new(InMemoryTaskStore::new());
    store.desire_task(Task::new("g1", "/tmp/result")).await.unwrap();
    store.start_task("g1", LOCAL_CELL).await.unwrap();

    let executor = Arc::new(ScriptedExecutor::new());
    executor.fail_lookups("executor down");

    let reaper = TaskReaper::new(config(), store.clone(), executor);
    reaper.reap().await;

    let task = store.task_by_guid("g1").await.unwrap();
    assert_eq!(task.state, TaskState::Running);
    assert!(!task.failed);
}

/// A store whose listing always fails; everything else is unreachable
/// in these tests.
struct ListingFailsStore;

#[async_trait]
impl TaskStore for ListingFailsStore {
    async fn task_by_guid(&self, _guid: &str) -> Result<Task, StoreError> {
        Err(StoreError::NotFound)
    }

    async fn tasks_by_cell_id(&self, _cell_id: &str) -> Result<Vec<Task>, StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }

    async fn desire_task(&self, _task: Task) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }

    async fn start_task(&self, _guid: &str, _cell_id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }

    async fn complete_task(
        &self,
        _guid: &str,
        _cell_id: &str,
        _failed: bool,
        _failure_reason: &str,
        _result: &str,
    ) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }

    async fn resolving_task(&self, _guid: &str) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }
}

#[tokio::test]
async fn a_listing_failure_ends_the_tick_quietly() {
    let executor = Arc::new(ScriptedExecutor::new());
    let reaper = TaskReaper::new(config(), Arc::new(ListingFailsStore), executor.clone());

    reaper.reap().await;

    assert!(executor.lookup_calls().is_empty());
}

#[tokio::test]
async fn a_refused_completion_is_anothers_win() {
    // Between our listing and our write, the processor settled the
    // task; the store refuses and the reaper moves on.
    struct StaleListingStore {
        inner: InMemoryTaskStore,
    }

    #[async_trait]
    impl TaskStore for StaleListingStore {
        async fn task_by_guid(&self, guid: &str) -> Result<Task, StoreError> {
            self.inner.task_by_guid(guid).await
        }

        async fn tasks_by_cell_id(&self, cell_id: &str) -> Result<Vec<Task>, StoreError> {
            // Report the task as it looked before the race.
            let mut tasks = self.inner.tasks_by_cell_id(cell_id).await?;
            for task in &mut tasks {
                task.state = TaskState::Running;
                task.failed = false;
            }
            Ok(tasks)
        }

        async fn desire_task(&self, task: Task) -> Result<(), StoreError> {
            self.inner.desire_task(task).await
        }

        async fn start_task(&self, guid: &str, cell_id: &str) -> Result<bool, StoreError> {
            self.inner.start_task(guid, cell_id).await
        }

        async fn complete_task(
            &self,
            guid: &str,
            cell_id: &str,
            failed: bool,
            failure_reason: &str,
            result: &str,
        ) -> Result<(), StoreError> {
            self.inner
                .complete_task(guid, cell_id, failed, failure_reason, result)
                .await
        }

        async fn resolving_task(&self, guid: &str) -> Result<(), StoreError> {
            self.inner.resolving_task(guid).await
        }
    }

    let store = Arc::new(StaleListingStore {
        inner: InMemoryTaskStore::with_tasks([{
            let mut task = task_on_cell("g1", LOCAL_CELL, TaskState::Completed);
            task.failed = true;
            task.failure_reason = "exit status 1".to_string();
            task
        }]),
    });
    let executor = Arc::new(ScriptedExecutor::new());

    let reaper = TaskReaper::new(config(), store.clone(), executor);
    reaper.reap().await;

    // The earlier completion stands.
    let task = store.inner.task_by_guid("g1").await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.failure_reason, "exit status 1");
}

#[tokio::test(start_paused = true)]
async fn the_loop_reaps_on_ticks_and_exits_on_shutdown() {
    let store = Arc::new(InMemoryTaskStore::new());
    store.desire_task(Task::new("g1", "/tmp/result")).await.unwrap();
    store.start_task("g1", LOCAL_CELL).await.unwrap();
    let executor = Arc::new(ScriptedExecutor::new());

    let config = config()
        .with_poll_interval(Duration::from_secs(1))
        .expect("interval should be valid");
    let reaper = TaskReaper::new(config, store.clone(), executor);
    let shutdown = reaper.shutdown_handle();

    let worker = tokio::spawn(reaper.run());

    // The first tick fires as soon as the loop starts.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let task = store.task_by_guid("g1").await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.failure_reason, CONTAINERLESS_TASK_REASON);

    shutdown.shutdown();
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("reaper should exit on shutdown")
        .expect("reaper task should not panic");
}
