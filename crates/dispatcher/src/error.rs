//! Dispatcher error types

use thiserror::Error;

/// Errors surfaced synchronously to registry callers
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Registry created without resources
    #[error("registry requires at least one resource")]
    EmptyResources,

    /// Configuration error (from contract)
    #[error("config error: {0}")]
    Contract(#[from] contracts::ContractError),
}

/// Failure reported by a resource callback for a single attempt
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AttemptError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AttemptError {
    /// Create an attempt error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an attempt error wrapping its cause
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

impl From<String> for AttemptError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for AttemptError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Why a dispatch ended without data
///
/// Delivered to completion subscribers, never returned as `Err` from a call.
#[derive(Debug, Error)]
pub enum DispatchFailure {
    /// Nothing to query
    #[error("no resources to query")]
    NoResources,

    /// Loop limit reached and no attempt answered in time
    #[error("loop limit reached after {loops} loop(s)")]
    LimitReached { loops: u32 },

    /// A delay callback resolved to zero
    #[error("dispatch halted by zero delay")]
    Halted,

    /// Explicit attempt failure under the fail-fast policy
    #[error("attempt failed: {0}")]
    Attempt(#[from] AttemptError),

    /// Cancelled by the caller
    #[error("dispatch cancelled")]
    Cancelled,
}

impl DispatchFailure {
    /// Timeout-type failures, eligible for late data
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LimitReached { .. } | Self::Halted)
    }
}
