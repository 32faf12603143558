//! Dispatch and attempt status

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;

/// Dispatch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Attempts are still being issued or awaited
    Pending,
    /// An attempt (or the caller) completed the dispatch
    Completed,
    /// Loop limit reached, a delay resolved to zero, or fail-fast error
    Failed,
    /// Cancelled by the caller
    Aborted,
}

impl DispatchStatus {
    pub fn is_pending(self) -> bool {
        self == Self::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    /// Finished with data, without data, or with an error
    Completed,
    /// Superseded, evicted, or cancelled with the dispatch
    Aborted,
}

/// Point-in-time view of a dispatch
#[derive(Debug, Clone)]
pub struct DispatchSnapshot<P> {
    pub status: DispatchStatus,
    /// Loops started after the first one
    pub loop_number: u32,
    /// Attempts issued so far
    pub attempt: u64,
    pub start_index: usize,
    /// Index of the most recent attempt
    pub index: usize,
    pub max_index: usize,
    pub start_time: Instant,
    pub payload: Arc<P>,
    pub queries_sent: u64,
    pub queries_pending: usize,
}
