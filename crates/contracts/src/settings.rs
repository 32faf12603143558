//! RedundancySettings - Config Loader output
//!
//! File representation of a [`RedundancyConfig`] with string resources and
//! millisecond timings. Callback-valued parameters cannot be expressed in a file.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::{
    FailurePolicy, LoopDelay, LoopLimit, RedundancyConfig, RotateDelay, DEFAULT_LIMIT,
    DEFAULT_ROTATE, DEFAULT_TIMEOUT,
};

/// Upper bound for any configured delay (one hour)
pub const MAX_DELAY_MS: u64 = 3_600_000;

/// Redundancy settings as stored in a configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RedundancySettings {
    /// Resources to rotate (e.g. `host:port` endpoints)
    #[validate(length(min = 1, message = "at least one resource is required"))]
    pub resources: Vec<String>,

    /// Start index
    #[serde(default)]
    pub index: usize,

    /// Delay before a new loop, 0 stops after the first loop
    #[serde(default = "default_timeout_ms")]
    #[validate(range(max = 3_600_000, message = "timeout_ms must not exceed one hour"))]
    pub timeout_ms: u64,

    /// Delay before the next resource, 0 stops after the first attempt
    #[serde(default = "default_rotate_ms")]
    #[validate(range(max = 3_600_000, message = "rotate_ms must not exceed one hour"))]
    pub rotate_ms: u64,

    /// Maximum number of loops, 0 for no limit
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Randomize start index
    #[serde(default)]
    pub random: bool,

    /// Accept data arriving after the dispatch timed out
    #[serde(default)]
    pub data_after_timeout: bool,

    /// Reaction to explicit attempt failures
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_rotate_ms() -> u64 {
    DEFAULT_ROTATE.as_millis() as u64
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl RedundancySettings {
    /// Settings with default timing for the given resources
    pub fn new(resources: Vec<String>) -> Self {
        Self {
            resources,
            index: 0,
            timeout_ms: default_timeout_ms(),
            rotate_ms: default_rotate_ms(),
            limit: default_limit(),
            random: false,
            data_after_timeout: false,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Build the runtime configuration
    pub fn into_config(self) -> RedundancyConfig<String> {
        RedundancyConfig {
            resources: self.resources,
            index: self.index,
            timeout: LoopDelay::Fixed(Duration::from_millis(self.timeout_ms)),
            rotate: RotateDelay::Fixed(Duration::from_millis(self.rotate_ms)),
            limit: LoopLimit::Fixed(self.limit),
            random: self.random,
            data_after_timeout: self.data_after_timeout,
            failure_policy: self.failure_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_deserialize_with_defaults() {
        let settings: RedundancySettings =
            serde_json::from_str(r#"{"resources": ["a:1", "b:2"]}"#).unwrap();
        assert_eq!(settings, RedundancySettings::new(vec!["a:1".into(), "b:2".into()]));
        assert_eq!(settings.timeout_ms, 2000);
        assert_eq!(settings.rotate_ms, 750);
        assert_eq!(settings.limit, 2);
    }

    #[test]
    fn test_validate_rejects_empty_resources() {
        let settings = RedundancySettings::new(Vec::new());
        let err = settings.validate().unwrap_err();
        assert!(err.field_errors().contains_key("resources"));
    }

    #[test]
    fn test_validate_rejects_huge_delay() {
        let mut settings = RedundancySettings::new(vec!["a".into()]);
        settings.rotate_ms = MAX_DELAY_MS + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_into_config() {
        let mut settings = RedundancySettings::new(vec!["a".into(), "b".into()]);
        settings.index = 1;
        settings.rotate_ms = 25;
        settings.failure_policy = FailurePolicy::FailFast;

        let config = settings.into_config();
        let now = Instant::now();
        assert_eq!(config.index, 1);
        assert_eq!(config.rotate.resolve(0, 0, 0, now), Duration::from_millis(25));
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
    }
}
