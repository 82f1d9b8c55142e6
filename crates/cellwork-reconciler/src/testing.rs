//! Scripted test doubles for the executor seam.
//!
//! [`ScriptedExecutor`] serves containers from an in-process map,
//! records every call, and can be told to refuse runs, fail result
//! fetches, or fail lookups. Panicking on a poisoned lock is fine
//! here: this module exists for tests, where a poisoned lock is
//! already a failed test.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use cellwork_core::container::Container;
use cellwork_core::executor::{ExecutorClient, ExecutorError};

/// A programmable, call-recording [`ExecutorClient`].
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    containers: Mutex<BTreeMap<String, Container>>,
    run_refusal: Mutex<Option<String>>,
    lookup_failure: Mutex<Option<ExecutorError>>,
    result_file: Mutex<Option<Result<String, ExecutorError>>>,
    lookup_calls: Mutex<Vec<String>>,
    run_calls: Mutex<Vec<String>>,
    stop_calls: Mutex<Vec<String>>,
    delete_calls: Mutex<Vec<String>>,
    fetch_calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    /// Creates an executor with no containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a container.
    pub fn insert_container(&self, container: Container) {
        self.containers
            .lock()
            .expect("lock poisoned")
            .insert(container.guid.clone(), container);
    }

    /// Makes subsequent run calls fail as refused in `state`.
    pub fn refuse_runs(&self, state: impl Into<String>) {
        *self.run_refusal.lock().expect("lock poisoned") = Some(state.into());
    }

    /// Makes subsequent lookups fail with a transport error.
    pub fn fail_lookups(&self, message: impl Into<String>) {
        *self.lookup_failure.lock().expect("lock poisoned") =
            Some(ExecutorError::Transport(message.into()));
    }

    /// Scripts the content served for result-file fetches.
    pub fn set_result_file(&self, content: impl Into<String>) {
        *self.result_file.lock().expect("lock poisoned") = Some(Ok(content.into()));
    }

    /// Makes subsequent result-file fetches fail.
    pub fn fail_result_file(&self, message: impl Into<String>) {
        *self.result_file.lock().expect("lock poisoned") =
            Some(Err(ExecutorError::ResultFileUnavailable(message.into())));
    }

    /// Guids passed to `get_container`, in call order.
    #[must_use]
    pub fn lookup_calls(&self) -> Vec<String> {
        self.lookup_calls.lock().expect("lock poisoned").clone()
    }

    /// Guids passed to `run_container`, in call order.
    #[must_use]
    pub fn run_calls(&self) -> Vec<String> {
        self.run_calls.lock().expect("lock poisoned").clone()
    }

    /// Guids passed to `stop_container`, in call order.
    #[must_use]
    pub fn stop_calls(&self) -> Vec<String> {
        self.stop_calls.lock().expect("lock poisoned").clone()
    }

    /// Guids passed to `delete_container`, in call order.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().expect("lock poisoned").clone()
    }

    /// `(guid, path)` pairs passed to `fetch_container_result_file`,
    /// in call order.
    #[must_use]
    pub fn fetch_calls(&self) -> Vec<(String, String)> {
        self.fetch_calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ExecutorClient for ScriptedExecutor {
    async fn get_container(&self, guid: &str) -> Result<Container, ExecutorError> {
        self.lookup_calls
            .lock()
            .expect("lock poisoned")
            .push(guid.to_string());
        if let Some(failure) = self.lookup_failure.lock().expect("lock poisoned").clone() {
            return Err(failure);
        }
        self.containers
            .lock()
            .expect("lock poisoned")
            .get(guid)
            .cloned()
            .ok_or(ExecutorError::ContainerNotFound)
    }

    async fn run_container(&self, guid: &str) -> Result<(), ExecutorError> {
        self.run_calls
            .lock()
            .expect("lock poisoned")
            .push(guid.to_string());
        if let Some(state) = self.run_refusal.lock().expect("lock poisoned").clone() {
            return Err(ExecutorError::InvalidState { state });
        }
        if self
            .containers
            .lock()
            .expect("lock poisoned")
            .contains_key(guid)
        {
            Ok(())
        } else {
            Err(ExecutorError::ContainerNotFound)
        }
    }

    async fn stop_container(&self, guid: &str) -> Result<(), ExecutorError> {
        self.stop_calls
            .lock()
            .expect("lock poisoned")
            .push(guid.to_string());
        if self
            .containers
            .lock()
            .expect("lock poisoned")
            .contains_key(guid)
        {
            Ok(())
        } else {
            Err(ExecutorError::ContainerNotFound)
        }
    }

    async fn delete_container(&self, guid: &str) -> Result<(), ExecutorError> {
        self.delete_calls
            .lock()
            .expect("lock poisoned")
            .push(guid.to_string());
        if self
            .containers
            .lock()
            .expect("lock poisoned")
            .remove(guid)
            .is_some()
        {
            Ok(())
        } else {
            Err(ExecutorError::ContainerNotFound)
        }
    }

    async fn fetch_container_result_file(
        &self,
        guid: &str,
        path: &str,
    ) -> Result<String, ExecutorError> {
        self.fetch_calls
            .lock()
            .expect("lock poisoned")
            .push((guid.to_string(), path.to_string()));
        self.result_file
            .lock()
            .expect("lock poisoned")
            .clone()
            .unwrap_or_else(|| {
                Err(ExecutorError::ResultFileUnavailable(
                    "no scripted result file".to_string(),
                ))
            })
    }
}
