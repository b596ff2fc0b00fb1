//! Tide Runtime
//!
//! Binds the Tide engine with the standard library and provides the two
//! ways an embedder drives executions:
//! - [`DirectCallExecutor`]: synchronous calls that absorb pauses
//! - [`Scheduler`]: round-robin interleaving of many executions on one thread

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod runtime;
pub mod scheduler;

pub use config::{RuntimeConfig, DEFAULT_MAX_PAUSES};
pub use error::RuntimeError;
pub use runtime::{DirectCallExecutor, Runtime};
pub use scheduler::{Completion, Scheduler, TaskId, TaskState};
