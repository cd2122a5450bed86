//! CLI error types

use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Bridge rejected an operation
    #[error("Bridge error: {0}")]
    Bridge(#[from] claimbridge_core::BridgeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A ticket did not finish in time
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// A waiter was dropped before its ticket finished
    #[error("No event delivered for {0}")]
    NoEvent(String),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
