//! Thin adapter between the task processor and the executor.
//!
//! The processor thinks in terms of "did the mutation take"; the
//! executor answers with typed errors. The delegate collapses run,
//! stop, and delete failures to a boolean after logging them, because
//! the processor's response to any refusal is the same: record the
//! consequence and move on. Result-file fetches keep their error so
//! the caller can report why the result was lost.

use std::sync::Arc;

use tracing::warn;

use cellwork_core::executor::{ExecutorClient, ExecutorError, MAX_RESULT_FILE_SIZE};

/// Adapter over the executor, shared by every `process` call.
#[derive(Clone)]
pub struct ContainerDelegate {
    executor: Arc<dyn ExecutorClient>,
}

impl ContainerDelegate {
    /// Wraps an executor client.
    #[must_use]
    pub fn new(executor: Arc<dyn ExecutorClient>) -> Self {
        Self { executor }
    }

    /// Tells the executor to begin running the container. Returns
    /// `false` on refusal or transport failure.
    pub async fn run_container(&self, guid: &str) -> bool {
        match self.executor.run_container(guid).await {
            Ok(()) => true,
            Err(e) => {
                warn!(container_guid = %guid, error = %e, "failed to run container");
                false
            }
        }
    }

    /// Requests graceful termination. Returns `false` on refusal or
    /// transport failure.
    pub async fn stop_container(&self, guid: &str) -> bool {
        match self.executor.stop_container(guid).await {
            Ok(()) => true,
            Err(e) => {
                warn!(container_guid = %guid, error = %e, "failed to stop container");
                false
            }
        }
    }

    /// Removes the container. The return value is advisory; a repeat
    /// delete of an already-gone container reports `false` and that is
    /// fine.
    pub async fn delete_container(&self, guid: &str) -> bool {
        match self.executor.delete_container(guid).await {
            Ok(()) => true,
            Err(e) => {
                warn!(container_guid = %guid, error = %e, "failed to delete container");
                false
            }
        }
    }

    /// Reads the task's result file from inside the container,
    /// refusing anything larger than
    /// [`MAX_RESULT_FILE_SIZE`] even if the executor served it.
    ///
    /// # Errors
    ///
    /// Propagates the executor's error so the caller can record why
    /// the result could not be captured.
    pub async fn fetch_container_result_file(
        &self,
        guid: &str,
        path: &str,
    ) -> Result<String, ExecutorError> {
        let text = self.executor.fetch_container_result_file(guid, path).await?;
        if text.len() > MAX_RESULT_FILE_SIZE {
            return Err(ExecutorError::ResultFileUnavailable(format!(
                "result file too large: {} > {MAX_RESULT_FILE_SIZE} bytes",
                text.len()
            )));
        }
        Ok(text)
    }
}
