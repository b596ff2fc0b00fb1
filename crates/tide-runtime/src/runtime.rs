//! Runtime: configuration plus a library environment
//!
//! The runtime hands out executors configured from its [`RuntimeConfig`]
//! and resolves library functions from its environment table.

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::scheduler::Scheduler;
use tide_engine::{Drain, Executor, FunctionRef, TableRef, Value};
use tide_stdlib::IoLib;
use tracing::debug;

/// Engine configuration bound to an environment populated by the standard library
pub struct Runtime {
    config: RuntimeConfig,
    env: TableRef,
}

impl Runtime {
    /// Runtime whose `io` library uses the process's standard streams
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::with_io(config, &IoLib::new())
    }

    /// Runtime with a caller-provided `io` library
    pub fn with_io(config: RuntimeConfig, io: &IoLib) -> Result<Self, RuntimeError> {
        config.validate()?;
        let env = tide_engine::Table::new_ref();
        tide_stdlib::install_with_io(&env, io);
        debug!(
            stack_capacity = config.engine.stack_capacity,
            budget = ?config.engine.preemption.budget,
            "runtime created"
        );
        Ok(Self { config, env })
    }

    /// The configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The environment table
    pub fn env(&self) -> &TableRef {
        &self.env
    }

    /// Resolve a dotted name such as `string.gsub` in the environment
    pub fn lookup(&self, path: &str) -> Value {
        let mut current = Value::Table(self.env.clone());
        for part in path.split('.') {
            let table = match &current {
                Value::Table(t) => t.clone(),
                _ => return Value::Nil,
            };
            let next = table.borrow().get_str(part);
            current = next;
        }
        current
    }

    /// Resolve a dotted name to a function
    pub fn function(&self, path: &str) -> Option<FunctionRef> {
        match self.lookup(path) {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// A fresh executor with its own register stack
    pub fn executor(&self) -> Result<Executor, RuntimeError> {
        Ok(Executor::new(&self.config.engine)?)
    }

    /// Synchronous call mode with the configured pause limit
    pub fn direct(&self) -> DirectCallExecutor {
        DirectCallExecutor::new(self.config.max_pauses)
    }

    /// An empty scheduler whose tasks use this runtime's engine configuration
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.config.engine.clone())
    }

    /// Run `function(args)` to completion on a fresh executor
    pub fn call(&self, function: FunctionRef, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
        let mut exec = self.executor()?;
        self.direct().call(&mut exec, function, args)
    }
}

/// Drives a call to completion from the caller's point of view.
///
/// Every pause is absorbed by draining again. A call that keeps pausing
/// past `max_pauses` is reported as [`RuntimeError::Paused`] and left
/// paused on its executor, so it can be continued with [`Self::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectCallExecutor {
    max_pauses: usize,
}

impl DirectCallExecutor {
    /// Create an executor wrapper with a pause limit
    pub fn new(max_pauses: usize) -> Self {
        Self { max_pauses }
    }

    /// The pause limit
    pub fn max_pauses(&self) -> usize {
        self.max_pauses
    }

    /// Push `function(args)` and drain until it finishes
    pub fn call(
        &self,
        exec: &mut Executor,
        function: FunctionRef,
        args: &[Value],
    ) -> Result<Vec<Value>, RuntimeError> {
        exec.push_call(function, args)?;
        self.resume(exec)
    }

    /// Keep draining a paused executor until its call finishes
    pub fn resume(&self, exec: &mut Executor) -> Result<Vec<Value>, RuntimeError> {
        let mut pauses = 0;
        loop {
            match exec.drain()? {
                Drain::Finished => return Ok(exec.take_results()),
                Drain::Paused => {
                    pauses += 1;
                    if pauses > self.max_pauses {
                        debug!(pauses, "direct call exceeded its pause limit");
                        return Err(RuntimeError::Paused { pauses });
                    }
                }
            }
        }
    }
}
