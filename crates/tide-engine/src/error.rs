//! Error types for the engine
//!
//! Failures fall into three categories:
//! - capacity errors from the register stack,
//! - protocol violations (programming errors in an embedder or a library function),
//! - script errors raised by running code or host functions.
//!
//! Only the suspension signal crosses frame boundaries as part of normal
//! operation. Every error here is fatal to the current top-level call.

/// Register stack capacity errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    /// A register stack must hold at least one slot
    #[error("Invalid register stack capacity: {0}")]
    InvalidCapacity(usize),

    /// A cursor position outside `[0, capacity]`
    #[error("Register stack top {requested} out of range (capacity={capacity})")]
    OutOfRange {
        /// The requested top
        requested: usize,
        /// Capacity of the stack
        capacity: usize,
    },

    /// Not enough free slots above the current top
    #[error("Not enough space in register stack: pushing {requested} values, {available} slots free")]
    InsufficientSpace {
        /// Number of values being pushed
        requested: usize,
        /// Number of free slots
        available: usize,
    },
}

/// Violations of the suspend/resume protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A top-level call is already pending on this execution context
    #[error("Pushing a call in paused state")]
    AlreadyPaused,

    /// The driver tried to resume a function that declined resumability
    #[error("Function '{function}' is not suspendable")]
    NotSuspendable {
        /// Name of the offending function
        function: String,
    },

    /// Suspension or drain requested with no pending call
    #[error("No pending call to resume")]
    NoPendingCall,

    /// A function was handed back a saved state it did not produce
    #[error("Saved state does not belong to function '{function}'")]
    StateMismatch {
        /// Name of the function being resumed
        function: String,
    },
}

/// Script-level runtime error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    /// Create a script error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error for a bad argument passed to a library function.
    ///
    /// `index` is 1-based.
    pub fn bad_argument(index: usize, function: &str, detail: impl AsRef<str>) -> Self {
        Self::new(format!(
            "bad argument #{} to '{}' ({})",
            index,
            function,
            detail.as_ref()
        ))
    }

    /// The error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Any error that aborts a top-level call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    /// Register stack capacity error
    #[error(transparent)]
    Stack(#[from] StackError),

    /// Protocol violation
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Script error
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Result alias used throughout the engine
pub type ExecResult<T> = Result<T, ExecError>;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed into a configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration parsed but holds an unusable value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
