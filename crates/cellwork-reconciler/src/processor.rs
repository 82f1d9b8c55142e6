//! The task processor: one decision per observed (container, task)
//! pair.
//!
//! The state space is the cross product of two independent state
//! machines mutated concurrently by third parties, so the decision is
//! computed by a pure function over the whole table and then executed.
//! Three rules shape every row:
//!
//! - Owner check first. A task held by another cell is never written;
//!   the only legal local action is discarding the local container.
//! - Deletion is the default on ambiguity. The store is the source of
//!   truth; a container without a live, locally-owned task is garbage.
//! - Claim before run. The store transitions to running first, and a
//!   refused run is converted into a failed completion rather than a
//!   store rollback.
//!
//! Every row is idempotent: executed twice on identical state it
//! produces the same final state, at worst issuing a redundant
//! container delete.

use std::sync::Arc;

use tracing::{debug, info, warn};

use cellwork_core::config::ReconcilerConfig;
use cellwork_core::container::{Container, ContainerState};
use cellwork_core::store::{StoreError, TaskStore};
use cellwork_core::task::{Task, TaskState};

use crate::delegate::ContainerDelegate;

/// Failure reason recorded when the executor refuses to run a claimed
/// container.
pub const RUN_FAILED_REASON: &str = "failed to run container";

/// Failure reason recorded when a successful container's result file
/// cannot be read.
pub const RESULT_FETCH_FAILED_REASON: &str = "failed to fetch result";

/// Failure reason recorded when a container completed for a task that
/// was never started.
pub const INVALID_TRANSITION_REASON: &str = "invalid state transition";

/// The action selected for one (container, task) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Both sides are where they should be; leave them alone.
    Noop,
    /// The container is garbage; remove it.
    DeleteContainer,
    /// Claim the pending task, then ask the executor to run the
    /// container.
    ClaimAndRun,
    /// Claim the pending task without a run call; the container is
    /// already past the point where running it makes sense.
    ClaimWithoutRun,
    /// The container finished but its task was never started. Fail the
    /// task and remove the container.
    FailInvalidAndDelete,
    /// The container finished for a task this cell is running; record
    /// the completion and remove the container.
    SettleCompleted,
}

/// A table row's verdict: the action, plus whether the pair indicates
/// a broken state machine somewhere.
///
/// Anomalous rows take the same (safe) action as routine ones; the
/// flag only raises the log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The action to execute.
    pub outcome: Outcome,
    /// Whether this pair should not occur in a healthy system.
    pub anomalous: bool,
}

impl Decision {
    const fn routine(outcome: Outcome) -> Self {
        Self {
            outcome,
            anomalous: false,
        }
    }

    const fn anomalous(outcome: Outcome) -> Self {
        Self {
            outcome,
            anomalous: true,
        }
    }
}

/// Selects the action for one observed pair. Pure: no I/O, no
/// ordering effects, so the whole table is enumerable in tests.
#[must_use]
pub fn decide(
    container_state: ContainerState,
    task: Option<&Task>,
    local_cell_id: &str,
) -> Decision {
    let Some(task) = task else {
        // The record is gone (resolved downstream, or an operator
        // removed it); whatever the container is doing, it is orphaned.
        return Decision::routine(Outcome::DeleteContainer);
    };

    let foreign_owner = !task.cell_id.is_empty() && task.cell_id != local_cell_id;

    match (container_state, task.state) {
        // A reservation whose task nobody has claimed yet: ours to
        // claim and run.
        (ContainerState::Reserved, TaskState::Pending) => Decision::routine(Outcome::ClaimAndRun),

        // Past reservation the task must already have been started;
        // converge by claiming it now.
        (ContainerState::Initializing, TaskState::Pending) => {
            Decision::anomalous(Outcome::ClaimAndRun)
        }
        (ContainerState::Created | ContainerState::Running, TaskState::Pending) => {
            Decision::anomalous(Outcome::ClaimWithoutRun)
        }
        (ContainerState::Completed, TaskState::Pending) => {
            Decision::anomalous(Outcome::FailInvalidAndDelete)
        }

        (_, TaskState::Claimed | TaskState::Running) if foreign_owner => {
            // Another cell holds the task. A lingering reservation is
            // normal after a lost placement race; a container any
            // further along means two cells ran the same task.
            if container_state == ContainerState::Reserved {
                Decision::routine(Outcome::DeleteContainer)
            } else {
                Decision::anomalous(Outcome::DeleteContainer)
            }
        }

        (ContainerState::Completed, TaskState::Claimed | TaskState::Running) => {
            Decision::routine(Outcome::SettleCompleted)
        }

        // The task is running here and the container has not finished:
        // the normal case for the whole life of a healthy task.
        (_, TaskState::Claimed | TaskState::Running) => Decision::routine(Outcome::Noop),

        (_, TaskState::Completed | TaskState::Resolving) => {
            // The task no longer needs a container. Locally-owned
            // leftovers are routine (a completed task whose delete
            // never landed); foreign-owned ones past reservation are
            // not.
            if foreign_owner && container_state != ContainerState::Reserved {
                Decision::anomalous(Outcome::DeleteContainer)
            } else {
                Decision::routine(Outcome::DeleteContainer)
            }
        }
    }
}

/// Reconciles one container against its store task.
///
/// Invoked once per observed container by an external harvester, which
/// serializes calls per guid. Errors never escape a `process` call;
/// anything unrecoverable is logged and left for the next pass.
pub struct TaskProcessor {
    store: Arc<dyn TaskStore>,
    delegate: ContainerDelegate,
    config: ReconcilerConfig,
}

impl TaskProcessor {
    /// Creates a processor for the configured cell.
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        delegate: ContainerDelegate,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            delegate,
            config,
        }
    }

    /// Drives one observed container and its task toward a consistent
    /// state.
    pub async fn process(&self, container: &Container) {
        let guid = &container.guid;

        // Containers carrying another workload kind belong to a
        // sibling reconciler.
        if let Some(lifecycle) = container.lifecycle() {
            if lifecycle != self.config.lifecycle_tag_value {
                debug!(
                    container_guid = %guid,
                    lifecycle = %lifecycle,
                    "container carries a foreign lifecycle; skipping"
                );
                return;
            }
        }

        let task = match self.store.task_by_guid(guid).await {
            Ok(task) => Some(task),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                warn!(
                    container_guid = %guid,
                    error = %e,
                    "failed to load task; leaving container for the next pass"
                );
                return;
            }
        };

        let decision = decide(container.state, task.as_ref(), &self.config.cell_id);
        if decision.anomalous {
            warn!(
                container_guid = %guid,
                container_state = %container.state,
                task_state = ?task.as_ref().map(|t| t.state),
                task_cell_id = ?task.as_ref().map(|t| t.cell_id.as_str()),
                outcome = ?decision.outcome,
                "observed a container/task pair that should not occur; converging anyway"
            );
        } else {
            debug!(
                container_guid = %guid,
                container_state = %container.state,
                task_state = ?task.as_ref().map(|t| t.state),
                outcome = ?decision.outcome,
                "processing container"
            );
        }

        match decision.outcome {
            Outcome::Noop => {}
            Outcome::DeleteContainer => {
                self.delegate.delete_container(guid).await;
            }
            Outcome::ClaimAndRun => self.claim(guid, true).await,
            Outcome::ClaimWithoutRun => self.claim(guid, false).await,
            Outcome::FailInvalidAndDelete => {
                self.complete_and_delete(guid, true, INVALID_TRANSITION_REASON, "")
                    .await;
            }
            Outcome::SettleCompleted => self.settle_completed(container).await,
        }
    }

    /// Claims a pending task for this cell and, when asked, runs its
    /// container.
    async fn claim(&self, guid: &str, run_after_claim: bool) {
        match self.store.start_task(guid, &self.config.cell_id).await {
            Ok(true) => {
                if run_after_claim && !self.delegate.run_container(guid).await {
                    self.complete_task(guid, true, RUN_FAILED_REASON, "").await;
                }
            }
            Ok(false) => {
                // An earlier pass already started it here; nothing
                // changed and nothing more to do.
                debug!(container_guid = %guid, "task already started on this cell");
            }
            Err(e) if e.is_conflict() || e == StoreError::NotFound => {
                // The claim went to someone else (or the record is
                // gone); the reservation is garbage.
                info!(container_guid = %guid, error = %e, "lost the claim; deleting container");
                self.delegate.delete_container(guid).await;
            }
            Err(e) => {
                warn!(
                    container_guid = %guid,
                    error = %e,
                    "claim failed; leaving container for the next pass"
                );
            }
        }
    }

    /// Settles a completed container for a task this cell is running.
    async fn settle_completed(&self, container: &Container) {
        let guid = &container.guid;
        let run_result = &container.run_result;

        if run_result.failed {
            self.complete_and_delete(guid, true, &run_result.failure_reason, "")
                .await;
            return;
        }

        let fetched = match container.tag(&self.config.result_file_tag_key) {
            Some(path) => self.delegate.fetch_container_result_file(guid, path).await,
            None => {
                warn!(container_guid = %guid, "completed container has no result-file tag");
                self.complete_and_delete(guid, true, RESULT_FETCH_FAILED_REASON, "")
                    .await;
                return;
            }
        };

        match fetched {
            Ok(result) => self.complete_and_delete(guid, false, "", &result).await,
            Err(e) => {
                warn!(container_guid = %guid, error = %e, "failed to fetch task result");
                self.complete_and_delete(guid, true, RESULT_FETCH_FAILED_REASON, "")
                    .await;
            }
        }
    }

    /// Records a completion, then removes the container once the store
    /// record is settled.
    async fn complete_and_delete(&self, guid: &str, failed: bool, reason: &str, result: &str) {
        if self.complete_task(guid, failed, reason, result).await {
            self.delegate.delete_container(guid).await;
        }
    }

    /// Records a completion in the store. Returns whether the record
    /// is settled: this write landed, or another actor got there
    /// first. On transport failure the record is not settled and the
    /// container must survive for the next pass.
    async fn complete_task(&self, guid: &str, failed: bool, reason: &str, result: &str) -> bool {
        match self
            .store
            .complete_task(guid, &self.config.cell_id, failed, reason, result)
            .await
        {
            Ok(()) => true,
            Err(e) if e.is_conflict() || e == StoreError::NotFound => {
                debug!(
                    container_guid = %guid,
                    error = %e,
                    "completion refused; another actor already settled the task"
                );
                true
            }
            Err(e) => {
                warn!(container_guid = %guid, error = %e, "failed to complete task");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: &str = "cell-a";
    const OTHER: &str = "cell-w";

    const ALL_CONTAINER_STATES: [ContainerState; 5] = [
        ContainerState::Reserved,
        ContainerState::Initializing,
        ContainerState::Created,
        ContainerState::Running,
        ContainerState::Completed,
    ];

    fn task(cell_id: &str, state: TaskState) -> Task {
        let mut task = Task::new("guid-1", "/out/result");
        task.cell_id = cell_id.to_string();
        task.state = state;
        task
    }

    #[test]
    fn missing_task_always_deletes() {
        for state in ALL_CONTAINER_STATES {
            assert_eq!(
                decide(state, None, LOCAL).outcome,
                Outcome::DeleteContainer,
                "container {state}"
            );
        }
    }

    #[test]
    fn foreign_owner_never_gets_past_deletion() {
        for container_state in ALL_CONTAINER_STATES {
            for task_state in [
                TaskState::Claimed,
                TaskState::Running,
                TaskState::Completed,
                TaskState::Resolving,
            ] {
                let task = task(OTHER, task_state);
                assert_eq!(
                    decide(container_state, Some(&task), LOCAL).outcome,
                    Outcome::DeleteContainer,
                    "container {container_state}, task {task_state}"
                );
            }
        }
    }

    #[test]
    fn terminal_tasks_always_delete() {
        for container_state in ALL_CONTAINER_STATES {
            for task_state in [TaskState::Completed, TaskState::Resolving] {
                let task = task(LOCAL, task_state);
                assert_eq!(
                    decide(container_state, Some(&task), LOCAL).outcome,
                    Outcome::DeleteContainer,
                    "container {container_state}, task {task_state}"
                );
            }
        }
    }

    #[test]
    fn pending_rows_claim_by_container_progress() {
        let pending = task("", TaskState::Pending);
        assert_eq!(
            decide(ContainerState::Reserved, Some(&pending), LOCAL),
            Decision::routine(Outcome::ClaimAndRun)
        );
        assert_eq!(
            decide(ContainerState::Initializing, Some(&pending), LOCAL),
            Decision::anomalous(Outcome::ClaimAndRun)
        );
        assert_eq!(
            decide(ContainerState::Created, Some(&pending), LOCAL).outcome,
            Outcome::ClaimWithoutRun
        );
        assert_eq!(
            decide(ContainerState::Running, Some(&pending), LOCAL).outcome,
            Outcome::ClaimWithoutRun
        );
        assert_eq!(
            decide(ContainerState::Completed, Some(&pending), LOCAL).outcome,
            Outcome::FailInvalidAndDelete
        );
    }

    #[test]
    fn local_running_task_is_left_alone_until_completion() {
        for container_state in [
            ContainerState::Reserved,
            ContainerState::Initializing,
            ContainerState::Created,
            ContainerState::Running,
        ] {
            for task_state in [TaskState::Claimed, TaskState::Running] {
                let task = task(LOCAL, task_state);
                assert_eq!(
                    decide(container_state, Some(&task), LOCAL).outcome,
                    Outcome::Noop,
                    "container {container_state}, task {task_state}"
                );
            }
        }

        let task = task(LOCAL, TaskState::Running);
        assert_eq!(
            decide(ContainerState::Completed, Some(&task), LOCAL),
            Decision::routine(Outcome::SettleCompleted)
        );
    }

    #[test]
    fn decisions_are_stable() {
        // The same observation always yields the same decision.
        let task = task(LOCAL, TaskState::Running);
        let first = decide(ContainerState::Completed, Some(&task), LOCAL);
        let second = decide(ContainerState::Completed, Some(&task), LOCAL);
        assert_eq!(first, second);
    }
}
