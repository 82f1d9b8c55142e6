//! Capability seam over the cell-local container executor.
//!
//! The executor owns every container on this cell. The reconciliation
//! core reads container state through [`ExecutorClient::get_container`]
//! and mutates containers only through the run/stop/delete calls; a
//! missing container is reported as a value, never a panic.

use async_trait::async_trait;
use thiserror::Error;

use crate::container::Container;

/// Upper bound on the size of a fetched result file.
///
/// Task results are small text artifacts; refusing anything larger
/// keeps a misbehaving workload from pushing arbitrary payloads into
/// the store.
pub const MAX_RESULT_FILE_SIZE: usize = 10 * 1024;

/// Errors surfaced by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// No container exists for the requested guid. Callers branch on
    /// this variant structurally; it is part of the contract, not a
    /// transport failure.
    #[error("container not found")]
    ContainerNotFound,

    /// The executor refused the operation in the container's current
    /// state.
    #[error("container in invalid state: {state}")]
    InvalidState {
        /// The state the executor reported.
        state: String,
    },

    /// The result file was missing, unreadable, or larger than
    /// [`MAX_RESULT_FILE_SIZE`].
    #[error("result file unavailable: {0}")]
    ResultFileUnavailable(String),

    /// The executor could not be reached or answered abnormally.
    #[error("executor transport failure: {0}")]
    Transport(String),
}

impl ExecutorError {
    /// Whether this error means the container does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ContainerNotFound)
    }
}

/// The capability set the reconciliation core needs from the executor.
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    /// Looks up one container.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::ContainerNotFound`] when no container exists
    /// for `guid`, distinct from transport failure.
    async fn get_container(&self, guid: &str) -> Result<Container, ExecutorError>;

    /// Begins running a reserved or initialized container.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidState`] when the container is
    /// not in a runnable state.
    async fn run_container(&self, guid: &str) -> Result<(), ExecutorError>;

    /// Requests graceful termination of a running container.
    ///
    /// # Errors
    ///
    /// Returns an error when the container cannot be stopped.
    async fn stop_container(&self, guid: &str) -> Result<(), ExecutorError>;

    /// Removes a container and its resources. Idempotent: deleting a
    /// container that is already gone is not a failure the caller
    /// needs to act on.
    ///
    /// # Errors
    ///
    /// Returns an error when the executor could not perform the
    /// removal.
    async fn delete_container(&self, guid: &str) -> Result<(), ExecutorError>;

    /// Reads a small text file from inside the container, bounded by
    /// [`MAX_RESULT_FILE_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ResultFileUnavailable`] when the file
    /// is missing, unreadable, or too large.
    async fn fetch_container_result_file(
        &self,
        guid: &str,
        path: &str,
    ) -> Result<String, ExecutorError>;
}
