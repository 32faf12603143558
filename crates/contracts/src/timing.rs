//! Delay and limit parameters
//!
//! Each parameter is either a fixed value or a callback evaluated at every
//! scheduling decision. A resolved delay of zero stops the dispatch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// `(loop_number, start_index, start_time) -> delay`
pub type LoopDelayFn = dyn Fn(u32, usize, Instant) -> Duration + Send + Sync;

/// `(queries_sent, loop_number, next_index, start_time) -> delay`
pub type RotateDelayFn = dyn Fn(usize, u32, usize, Instant) -> Duration + Send + Sync;

/// `(loop_number, start_time) -> limit`
pub type LoopLimitFn = dyn Fn(u32, Instant) -> u32 + Send + Sync;

/// Delay before a new loop over all resources starts
#[derive(Clone)]
pub enum LoopDelay {
    Fixed(Duration),
    Computed(Arc<LoopDelayFn>),
}

impl LoopDelay {
    /// Wrap a callback
    pub fn computed(f: impl Fn(u32, usize, Instant) -> Duration + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// Resolve the delay before loop `loop_number` (1 for the first repeat)
    pub fn resolve(&self, loop_number: u32, start_index: usize, start_time: Instant) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Computed(f) => f(loop_number, start_index, start_time),
        }
    }
}

impl From<Duration> for LoopDelay {
    fn from(delay: Duration) -> Self {
        Self::Fixed(delay)
    }
}

impl fmt::Debug for LoopDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Delay before the next resource within the same loop is queried
#[derive(Clone)]
pub enum RotateDelay {
    Fixed(Duration),
    Computed(Arc<RotateDelayFn>),
}

impl RotateDelay {
    /// Wrap a callback
    pub fn computed(
        f: impl Fn(usize, u32, usize, Instant) -> Duration + Send + Sync + 'static,
    ) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// Resolve the rotation delay
    ///
    /// `queries_sent` counts attempts issued since the current loop started.
    pub fn resolve(
        &self,
        queries_sent: usize,
        loop_number: u32,
        next_index: usize,
        start_time: Instant,
    ) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Computed(f) => f(queries_sent, loop_number, next_index, start_time),
        }
    }
}

impl From<Duration> for RotateDelay {
    fn from(delay: Duration) -> Self {
        Self::Fixed(delay)
    }
}

impl fmt::Debug for RotateDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Maximum number of loops, 0 for no limit
#[derive(Clone)]
pub enum LoopLimit {
    Fixed(u32),
    Computed(Arc<LoopLimitFn>),
}

impl LoopLimit {
    /// No limit
    pub const UNBOUNDED: Self = Self::Fixed(0);

    /// Wrap a callback
    pub fn computed(f: impl Fn(u32, Instant) -> u32 + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// Resolve the limit when loop `loop_number` is about to start
    pub fn resolve(&self, loop_number: u32, start_time: Instant) -> u32 {
        match self {
            Self::Fixed(limit) => *limit,
            Self::Computed(f) => f(loop_number, start_time),
        }
    }

    /// True when a loop numbered `loop_number` must not start
    pub fn is_reached(limit: u32, loop_number: u32) -> bool {
        limit > 0 && limit <= loop_number
    }
}

impl From<u32> for LoopLimit {
    fn from(limit: u32) -> Self {
        Self::Fixed(limit)
    }
}

impl fmt::Debug for LoopLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(limit) => f.debug_tuple("Fixed").field(limit).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}
