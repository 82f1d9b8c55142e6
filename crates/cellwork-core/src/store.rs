//! Capability seam over the shared job store.
//!
//! Only the operations the reconciliation core actually needs are
//! exposed here; the full store surface stays out of the core. All
//! mutations are compare-and-set: the store refuses a write whose
//! expected prior state does not hold, and callers treat that refusal
//! as another actor having already resolved the case.

use async_trait::async_trait;
use thiserror::Error;

use crate::task::Task;

/// Errors surfaced by the task store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No task record exists for the requested guid.
    #[error("task not found")]
    NotFound,

    /// The store refused the write because the record was not in the
    /// expected prior state (wrong state, wrong owner, or already
    /// present).
    #[error("compare-and-set refused: {reason}")]
    Conflict {
        /// What the store observed instead of the expected state.
        reason: String,
    },

    /// The store could not be reached or answered abnormally. The
    /// operation may be retried on a later pass.
    #[error("store transport failure: {0}")]
    Transport(String),
}

impl StoreError {
    /// A conflict with the given reason.
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Whether this error is a compare-and-set refusal.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// The narrow capability set the reconciliation core needs from the
/// shared job store.
///
/// Implementations are shared across the processor and the reaper and
/// must be safe under concurrent calls; the store's own consistency
/// mechanism serializes the actual mutations.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Loads one task record.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no record exists for `guid`,
    /// distinct from transport failure.
    async fn task_by_guid(&self, guid: &str) -> Result<Task, StoreError>;

    /// Lists every task currently claimed by `cell_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] when the listing fails.
    async fn tasks_by_cell_id(&self, cell_id: &str) -> Result<Vec<Task>, StoreError>;

    /// Creates a new pending task record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a record with the same
    /// guid already exists.
    async fn desire_task(&self, task: Task) -> Result<(), StoreError>;

    /// Atomically claims a pending task for `cell_id`, transitioning
    /// it to running.
    ///
    /// Returns `Ok(true)` when this call performed the transition and
    /// `Ok(false)` when the task is already running on `cell_id` (a
    /// repeat claim; nothing changed).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the task is held by
    /// another cell or is not in a claimable state.
    async fn start_task(&self, guid: &str, cell_id: &str) -> Result<bool, StoreError>;

    /// Completes a task on behalf of `cell_id`.
    ///
    /// On failure completions `failure_reason` is recorded and
    /// `result` is empty; on success completions the reverse.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `cell_id` does not match
    /// the current owner or the task is already terminal.
    async fn complete_task(
        &self,
        guid: &str,
        cell_id: &str,
        failed: bool,
        failure_reason: &str,
        result: &str,
    ) -> Result<(), StoreError>;

    /// Marks a completed task as being resolved downstream.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the task is not
    /// completed.
    async fn resolving_task(&self, guid: &str) -> Result<(), StoreError>;
}
