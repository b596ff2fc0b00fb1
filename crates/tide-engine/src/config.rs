//! Engine configuration
//!
//! Loaded from TOML. Every field is optional; omitted fields fall back to
//! the values in [`crate::defaults`].
//!
//! ```toml
//! stack_capacity = 4096
//!
//! [preemption]
//! budget = 500
//! low_water_mark = 0
//!
//! [preemption.costs]
//! call = 10
//! ```

use crate::defaults::DEFAULT_STACK_CAPACITY;
use crate::error::ConfigError;
use crate::preempt::PreemptionConfig;
use serde::{Deserialize, Serialize};

/// Configuration of one execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Register stack capacity in slots
    pub stack_capacity: usize,
    /// Preemption policy
    pub preemption: PreemptionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            preemption: PreemptionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration with a specific stack capacity
    pub fn with_capacity(stack_capacity: usize) -> Self {
        Self {
            stack_capacity,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_capacity == 0 {
            return Err(ConfigError::Invalid(
                "stack_capacity must be at least 1".to_string(),
            ));
        }
        if self.preemption.budget == Some(0) {
            return Err(ConfigError::Invalid(
                "preemption budget must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
