//! Runtime configuration
//!
//! ```toml
//! max_pauses = 100
//!
//! [engine]
//! stack_capacity = 4096
//!
//! [engine.preemption]
//! budget = 500
//! ```

use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tide_engine::{ConfigError, EngineConfig};

/// Default number of pauses a direct call absorbs before reporting `Paused`
pub const DEFAULT_MAX_PAUSES: usize = 10_000;

/// Configuration of a [`crate::Runtime`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Settings for every execution context the runtime creates
    pub engine: EngineConfig,
    /// Pause limit of the direct call executor
    pub max_pauses: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            max_pauses: DEFAULT_MAX_PAUSES,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&source)?)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()
    }
}
