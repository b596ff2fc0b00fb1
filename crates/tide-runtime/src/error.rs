//! Runtime error types.

use tide_engine::{ConfigError, ExecError, StackError};

/// Errors that can occur while configuring or driving executions.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Execution aborted
    #[error("Runtime error: {0}")]
    Exec(#[from] ExecError),

    /// A direct call hit its pause limit; the executor is still paused
    #[error("Call still paused after {pauses} pauses")]
    Paused {
        /// Number of pauses observed before giving up
        pauses: usize,
    },
}

impl From<StackError> for RuntimeError {
    fn from(e: StackError) -> Self {
        RuntimeError::Exec(e.into())
    }
}
