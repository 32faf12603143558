//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded
    #[error("Failed to load configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// Resource without port and no default port given
    #[error("Resource '{resource}' has no port; add one or pass --port")]
    MissingPort { resource: String },

    /// Probe ended without reporting an outcome
    #[error("Probe #{probe} ended without an outcome")]
    ProbeLost { probe: u32 },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn missing_port(resource: impl Into<String>) -> Self {
        Self::MissingPort {
            resource: resource.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
