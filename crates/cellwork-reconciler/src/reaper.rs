//! The task reaper: the safety net for containers that vanished.
//!
//! The processor only sees containers the executor still reports. A
//! container can disappear without a trace (executor eviction, process
//! restart mid-task), leaving its task claimed by this cell forever.
//! The reaper closes that gap: on every tick it lists this cell's
//! tasks and fails any whose container no longer exists.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use cellwork_core::config::ReconcilerConfig;
use cellwork_core::executor::{ExecutorClient, ExecutorError};
use cellwork_core::store::{StoreError, TaskStore};
use cellwork_core::task::Task;

/// Failure reason recorded for a task whose container vanished.
pub const CONTAINERLESS_TASK_REASON: &str = "task container no longer exists";

/// Upper bound on one completion write, so a single slow store call
/// cannot freeze the loop.
const STORE_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle for requesting reaper shutdown from another task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Asks the reaper to exit at the next tick boundary. Safe to call
    /// more than once.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Periodic sweeper completing tasks abandoned by their containers.
pub struct TaskReaper {
    config: ReconcilerConfig,
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn ExecutorClient>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskReaper {
    /// Creates a reaper for the configured cell.
    #[must_use]
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn ExecutorClient>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            store,
            executor,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Returns a handle for requesting shutdown.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Runs the reap loop until shutdown is requested.
    ///
    /// Shutdown is observed between iterations only: a tick that has
    /// started runs to completion, so no store write is abandoned
    /// mid-flight.
    #[allow(clippy::cast_possible_truncation)] // poll_interval is bounded well below u64::MAX ms
    pub async fn run(mut self) {
        info!(
            cell_id = %self.config.cell_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "task reaper starting"
        );

        let mut ticks = tokio::time::interval(self.config.poll_interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    self.reap().await;
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!(cell_id = %self.config.cell_id, "task reaper shutting down");
    }

    /// One sweep: fail every claimed task whose container is gone.
    ///
    /// Public so a harness can drive single ticks directly.
    pub async fn reap(&self) {
        let tasks = match self.store.tasks_by_cell_id(&self.config.cell_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(
                    cell_id = %self.config.cell_id,
                    error = %e,
                    "failed to list this cell's tasks; retrying next tick"
                );
                return;
            }
        };

        for task in tasks {
            // Terminal tasks no longer need a container; the processor
            // handles their leftovers.
            if !task.state.expects_container() {
                continue;
            }

            match self.executor.get_container(&task.task_guid).await {
                Ok(_) => {
                    // The container exists; whatever needs doing is the
                    // processor's call.
                }
                Err(ExecutorError::ContainerNotFound) => {
                    self.fail_containerless_task(&task).await;
                }
                Err(e) => {
                    warn!(
                        task_guid = %task.task_guid,
                        error = %e,
                        "could not determine container existence; retrying next tick"
                    );
                }
            }
        }
    }

    async fn fail_containerless_task(&self, task: &Task) {
        info!(
            task_guid = %task.task_guid,
            task_state = %task.state,
            "task container no longer exists; failing task"
        );

        let write = self.store.complete_task(
            &task.task_guid,
            &self.config.cell_id,
            true,
            CONTAINERLESS_TASK_REASON,
            "",
        );

        match tokio::time::timeout(STORE_WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_conflict() || e == StoreError::NotFound => {
                debug!(
                    task_guid = %task.task_guid,
                    error = %e,
                    "completion refused; another actor already settled the task"
                );
            }
            Ok(Err(e)) => {
                warn!(task_guid = %task.task_guid, error = %e, "failed to fail containerless task");
            }
            Err(_) => {
                warn!(
                    task_guid = %task.task_guid,
                    timeout_secs = STORE_WRITE_TIMEOUT.as_secs(),
                    "store write timed out; retrying next tick"
                );
            }
        }
    }
}
