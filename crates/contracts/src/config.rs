//! RedundancyConfig - shared by every dispatch created from it
//!
//! Ordered resource list plus the rotation/loop timing rules.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{LoopDelay, LoopLimit, RotateDelay};

/// Default delay before a new loop starts
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default delay before the next resource is queried
pub const DEFAULT_ROTATE: Duration = Duration::from_millis(750);

/// Default loop limit
pub const DEFAULT_LIMIT: u32 = 2;

/// What an explicit attempt failure does to the dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Ignore the failure and keep rotating through resources
    #[default]
    FailOver,
    /// End the whole dispatch with the attempt's error
    FailFast,
}

/// Dispatch configuration
#[derive(Debug, Clone)]
pub struct RedundancyConfig<R> {
    /// Resources to rotate
    pub resources: Vec<R>,

    /// Start index, clamped into range by each dispatch
    pub index: usize,

    /// Delay before a new loop starts
    pub timeout: LoopDelay,

    /// Delay before the next resource within a loop
    pub rotate: RotateDelay,

    /// Maximum number of loops, 0 for no limit
    pub limit: LoopLimit,

    /// Randomize start index (disables start index memoization)
    pub random: bool,

    /// Accept data from attempts that answer after the dispatch timed out
    pub data_after_timeout: bool,

    /// Reaction to explicit attempt failures
    pub failure_policy: FailurePolicy,
}

impl<R> RedundancyConfig<R> {
    /// Create configuration with default timing for the given resources
    pub fn new(resources: Vec<R>) -> Self {
        Self {
            resources,
            index: 0,
            timeout: LoopDelay::Fixed(DEFAULT_TIMEOUT),
            rotate: RotateDelay::Fixed(DEFAULT_ROTATE),
            limit: LoopLimit::Fixed(DEFAULT_LIMIT),
            random: false,
            data_after_timeout: false,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<LoopDelay>) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn with_rotate(mut self, rotate: impl Into<RotateDelay>) -> Self {
        self.rotate = rotate.into();
        self
    }

    pub fn with_limit(mut self, limit: impl Into<LoopLimit>) -> Self {
        self.limit = limit.into();
        self
    }

    pub fn with_random(mut self, random: bool) -> Self {
        self.random = random;
        self
    }

    pub fn with_data_after_timeout(mut self, enabled: bool) -> Self {
        self.data_after_timeout = enabled;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Highest valid resource index, `None` when there are no resources
    pub fn max_index(&self) -> Option<usize> {
        self.resources.len().checked_sub(1)
    }

    /// Merge a partial configuration into this one
    pub fn apply(&mut self, patch: ConfigPatch<R>) {
        let ConfigPatch {
            resources,
            index,
            timeout,
            rotate,
            limit,
            random,
            data_after_timeout,
            failure_policy,
        } = patch;

        if let Some(resources) = resources {
            self.resources = resources;
        }
        if let Some(index) = index {
            self.index = index;
        }
        if let Some(timeout) = timeout {
            self.timeout = timeout;
        }
        if let Some(rotate) = rotate {
            self.rotate = rotate;
        }
        if let Some(limit) = limit {
            self.limit = limit;
        }
        if let Some(random) = random {
            self.random = random;
        }
        if let Some(enabled) = data_after_timeout {
            self.data_after_timeout = enabled;
        }
        if let Some(policy) = failure_policy {
            self.failure_policy = policy;
        }
    }
}

impl<R> Default for RedundancyConfig<R> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Partial configuration, `None` fields are left untouched
#[derive(Debug, Clone)]
pub struct ConfigPatch<R> {
    pub resources: Option<Vec<R>>,
    pub index: Option<usize>,
    pub timeout: Option<LoopDelay>,
    pub rotate: Option<RotateDelay>,
    pub limit: Option<LoopLimit>,
    pub random: Option<bool>,
    pub data_after_timeout: Option<bool>,
    pub failure_policy: Option<FailurePolicy>,
}

impl<R> Default for ConfigPatch<R> {
    fn default() -> Self {
        Self {
            resources: None,
            index: None,
            timeout: None,
            rotate: None,
            limit: None,
            random: None,
            data_after_timeout: None,
            failure_policy: None,
        }
    }
}
