//! Reconciler configuration.

use std::time::Duration;

use thiserror::Error;

use crate::container::{RESULT_FILE_TAG, TASK_LIFECYCLE};

/// Default reaper tick period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum reaper tick period, to keep a misconfigured cell from
/// hammering the store.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum reaper tick period, to keep abandoned tasks from lingering
/// unbounded.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// Errors from configuration construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required string field is empty.
    #[error("{field} cannot be empty")]
    EmptyField {
        /// Name of the empty field.
        field: &'static str,
    },

    /// The poll interval is outside the allowed range.
    #[error("poll_interval out of range: {actual:?} not within [{min:?}, {max:?}]")]
    PollIntervalOutOfRange {
        /// The rejected interval.
        actual: Duration,
        /// Lower bound.
        min: Duration,
        /// Upper bound.
        max: Duration,
    },
}

/// Configuration shared by the task processor and the task reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// This cell's identity, as assigned by the placement layer. Task
    /// ownership checks compare against this value.
    pub cell_id: String,

    /// Reaper tick period.
    pub poll_interval: Duration,

    /// Lifecycle tag value identifying task containers; containers
    /// tagged otherwise belong to a sibling reconciler and are left
    /// alone.
    pub lifecycle_tag_value: String,

    /// Tag key under which a container records its result-file path.
    pub result_file_tag_key: String,
}

impl ReconcilerConfig {
    /// Creates a configuration for the given cell with defaults for
    /// everything else.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyField`] when `cell_id` is empty.
    pub fn new(cell_id: impl Into<String>) -> Result<Self, ConfigError> {
        let cell_id = cell_id.into();
        if cell_id.is_empty() {
            return Err(ConfigError::EmptyField { field: "cell_id" });
        }

        Ok(Self {
            cell_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
            lifecycle_tag_value: TASK_LIFECYCLE.to_string(),
            result_file_tag_key: RESULT_FILE_TAG.to_string(),
        })
    }

    /// Sets the reaper tick period.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PollIntervalOutOfRange`] when `interval`
    /// is outside `[MIN_POLL_INTERVAL, MAX_POLL_INTERVAL]`.
    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        if interval < MIN_POLL_INTERVAL || interval > MAX_POLL_INTERVAL {
            return Err(ConfigError::PollIntervalOutOfRange {
                actual: interval,
                min: MIN_POLL_INTERVAL,
                max: MAX_POLL_INTERVAL,
            });
        }
        self.poll_interval = interval;
        Ok(self)
    }

    /// Sets the lifecycle tag value identifying task containers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyField`] when `value` is empty.
    pub fn with_lifecycle_tag_value(mut self, value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "lifecycle_tag_value",
            });
        }
        self.lifecycle_tag_value = value;
        Ok(self)
    }

    /// Sets the tag key under which the result-file path lives.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyField`] when `key` is empty.
    pub fn with_result_file_tag_key(mut self, key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "result_file_tag_key",
            });
        }
        self.result_file_tag_key = key;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReconcilerConfig::new("cell-a").expect("config should be valid");
        assert_eq!(config.cell_id, "cell-a");
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.lifecycle_tag_value, TASK_LIFECYCLE);
        assert_eq!(config.result_file_tag_key, RESULT_FILE_TAG);
    }

    #[test]
    fn empty_cell_id_rejected() {
        assert_eq!(
            ReconcilerConfig::new(""),
            Err(ConfigError::EmptyField { field: "cell_id" })
        );
    }

    #[test]
    fn poll_interval_bounds() {
        let config = ReconcilerConfig::new("cell-a").unwrap();
        assert!(config
            .clone()
            .with_poll_interval(Duration::from_millis(100))
            .is_err());
        assert!(config
            .clone()
            .with_poll_interval(Duration::from_secs(7200))
            .is_err());

        let config = config.with_poll_interval(Duration::from_secs(5)).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn empty_tag_fields_rejected() {
        let config = ReconcilerConfig::new("cell-a").unwrap();
        assert!(config.clone().with_lifecycle_tag_value("").is_err());
        assert!(config.with_result_file_tag_key("").is_err());
    }
}
