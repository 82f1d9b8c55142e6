//! Containers as the cell-local executor reports them.
//!
//! A task-bearing container shares its guid with the task it runs.
//! Container states are linear, but an observer never assumes it sees
//! every transition; the reconciler must be correct for any
//! (container state, task state) pair it happens to observe.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag key distinguishing what kind of workload a container carries.
pub const LIFECYCLE_TAG: &str = "lifecycle";

/// Lifecycle tag value for task containers.
pub const TASK_LIFECYCLE: &str = "task";

/// Tag key under which the result-file path is recorded.
pub const RESULT_FILE_TAG: &str = "result-file";

/// Lifecycle states of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// Resources set aside; nothing has been started.
    Reserved,
    /// The executor is preparing the container.
    Initializing,
    /// Created but the workload has not begun running.
    Created,
    /// The workload is running.
    Running,
    /// The workload finished; `run_result` describes how.
    Completed,
}

impl ContainerState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Initializing => "initializing",
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a completed container's workload ended.
///
/// The zero value is a successful run, so a completed container that
/// never reported a result reads as successful and settles through the
/// result fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether the workload failed.
    #[serde(default)]
    pub failed: bool,
    /// Why the workload failed; empty on success.
    #[serde(default)]
    pub failure_reason: String,
}

impl RunResult {
    /// A failed run with the given reason.
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            failed: true,
            failure_reason: reason.into(),
        }
    }
}

/// A container record as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Equal to `task_guid` for task-bearing containers.
    pub guid: String,

    /// Current lifecycle state.
    pub state: ContainerState,

    /// Meaningful once `state` is [`ContainerState::Completed`].
    #[serde(default)]
    pub run_result: RunResult,

    /// Key/value metadata attached at reservation time.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Container {
    /// Creates a container in the given state with no tags.
    #[must_use]
    pub fn new(guid: impl Into<String>, state: ContainerState) -> Self {
        Self {
            guid: guid.into(),
            state,
            run_result: RunResult::default(),
            tags: BTreeMap::new(),
        }
    }

    /// Adds a tag, builder style.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the run result, builder style.
    #[must_use]
    pub fn with_run_result(mut self, run_result: RunResult) -> Self {
        self.run_result = run_result;
        self
    }

    /// Returns the tag value under `key`, if any.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns the lifecycle tag value, if any.
    #[must_use]
    pub fn lifecycle(&self) -> Option<&str> {
        self.tag(LIFECYCLE_TAG)
    }

    /// Whether this container carries a task workload.
    #[must_use]
    pub fn has_task_lifecycle(&self) -> bool {
        self.lifecycle() == Some(TASK_LIFECYCLE)
    }

    /// Returns the result-file path recorded under the default tag key.
    #[must_use]
    pub fn result_file(&self) -> Option<&str> {
        self.tag(RESULT_FILE_TAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_accessors() {
        let container = Container::new("guid-1", ContainerState::Reserved)
            .with_tag(LIFECYCLE_TAG, TASK_LIFECYCLE)
            .with_tag(RESULT_FILE_TAG, "/out/result.json");

        assert!(container.has_task_lifecycle());
        assert_eq!(container.result_file(), Some("/out/result.json"));
        assert_eq!(container.tag("missing"), None);
    }

    #[test]
    fn lifecycle_mismatch() {
        let container =
            Container::new("guid-1", ContainerState::Running).with_tag(LIFECYCLE_TAG, "lrp");
        assert!(!container.has_task_lifecycle());

        let untagged = Container::new("guid-2", ContainerState::Running);
        assert!(!untagged.has_task_lifecycle());
        assert_eq!(untagged.lifecycle(), None);
    }

    #[test]
    fn default_run_result_is_success() {
        let container = Container::new("guid-1", ContainerState::Completed);
        assert!(!container.run_result.failed);
        assert!(container.run_result.failure_reason.is_empty());

        let failed = container.with_run_result(RunResult::failure("out of memory"));
        assert!(failed.run_result.failed);
        assert_eq!(failed.run_result.failure_reason, "out of memory");
    }
}
