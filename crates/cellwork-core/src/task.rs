//! Task records as the shared job store owns them.
//!
//! A task is created by an external submitter, claimed by exactly one
//! cell, completed by that cell's reconciler, and finally resolved and
//! deleted by a downstream consumer. The store is the source of truth
//! for every field here; cells only mutate task records through the
//! compare-and-set operations on [`crate::store::TaskStore`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle states of a task.
///
/// `Pending → Running → Completed → Resolving` is the only forward
/// path. `Claimed` is an intermediate the store may surface between a
/// successful claim and its confirmation; a cell treats it exactly
/// like `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitted but not yet claimed by any cell.
    Pending,
    /// Claimed by a cell, claim not yet confirmed.
    Claimed,
    /// Claimed by a cell and expected to have a container there.
    Running,
    /// Finished (successfully or not); no container needed anymore.
    Completed,
    /// Picked up by a downstream consumer for resolution.
    Resolving,
}

impl TaskState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Resolving => "resolving",
        }
    }

    /// Whether the task has finished from the cell's perspective.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Resolving)
    }

    /// Whether a cell holds the task and a container is expected to
    /// exist for it.
    #[must_use]
    pub const fn expects_container(&self) -> bool {
        matches!(self, Self::Claimed | Self::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task record.
///
/// `cell_id` is empty while the task is pending; once claimed it names
/// the owning cell and is retained through `Completed` and
/// `Resolving`. On completion exactly one of `failure_reason` (with
/// `failed = true`) or `result` (with `failed = false`) is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Globally unique identifier; equal to the guid of the container
    /// that runs the task.
    pub task_guid: String,

    /// The owning cell, or empty while pending.
    #[serde(default)]
    pub cell_id: String,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Whether the task failed. Meaningful once `Completed`.
    #[serde(default)]
    pub failed: bool,

    /// Why the task failed; empty on success.
    #[serde(default)]
    pub failure_reason: String,

    /// Output captured from the container on success; empty on failure.
    #[serde(default)]
    pub result: String,

    /// Path inside the container from which `result` is read.
    #[serde(default)]
    pub result_file: String,
}

impl Task {
    /// Creates a new pending, unclaimed task.
    #[must_use]
    pub fn new(task_guid: impl Into<String>, result_file: impl Into<String>) -> Self {
        Self {
            task_guid: task_guid.into(),
            cell_id: String::new(),
            state: TaskState::Pending,
            failed: false,
            failure_reason: String::new(),
            result: String::new(),
            result_file: result_file.into(),
        }
    }

    /// Whether this task is owned by the given cell.
    ///
    /// A pending task (empty `cell_id`) is owned by nobody.
    #[must_use]
    pub fn is_owned_by(&self, cell_id: &str) -> bool {
        !self.cell_id.is_empty() && self.cell_id == cell_id
    }
}
