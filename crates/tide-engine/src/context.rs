//! Execution context
//!
//! Everything a running call chain shares: the register stack and the
//! preemption budget. One context backs exactly one executor and is never
//! shared between executors.

use crate::config::EngineConfig;
use crate::continuation::{Raise, SuspendReason, Unresolved};
use crate::error::{ProtocolError, StackError};
use crate::preempt::Budget;
use crate::register_stack::RegisterStack;

/// State shared by every frame of one execution
#[derive(Debug)]
pub struct ExecutionContext {
    /// The register stack all windows point into
    pub stack: RegisterStack,
    budget: Budget,
    draining: bool,
}

impl ExecutionContext {
    /// Create a context with a fresh register stack
    pub fn new(config: &EngineConfig) -> Result<Self, StackError> {
        Ok(Self {
            stack: RegisterStack::new(config.stack_capacity)?,
            budget: Budget::new(&config.preemption),
            draining: false,
        })
    }

    /// Mark the start of a drain and refill the budget
    pub(crate) fn begin_drain(&mut self) {
        self.budget.refill();
        self.draining = true;
    }

    pub(crate) fn end_drain(&mut self) {
        self.draining = false;
    }

    /// Check if a drain is in progress
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Raise a suspension signal.
    ///
    /// Outside of a drain there is no call stack to capture the signal
    /// into, so this produces `ProtocolError::NoPendingCall` instead.
    pub fn suspend(&self, reason: SuspendReason) -> Raise {
        if !self.draining {
            return Raise::Error(ProtocolError::NoPendingCall.into());
        }
        Raise::Suspend(Unresolved::new(reason))
    }

    /// Voluntary pause
    pub fn pause(&self) -> Raise {
        self.suspend(SuspendReason::Yield)
    }

    /// Suspension because a host operation would block
    pub fn block(&self) -> Raise {
        self.suspend(SuspendReason::Blocked)
    }

    /// Debit the preemption budget
    #[inline]
    pub fn charge(&mut self, cost: u32) {
        self.budget.charge(cost);
    }

    /// Accounting check: suspend with `Preempted` once the budget is spent
    pub fn tick(&mut self) -> Result<(), Raise> {
        if !self.budget.is_exhausted() {
            return Ok(());
        }
        self.budget.record_preemption();
        tracing::trace!(remaining = self.budget.remaining(), "preemption budget exhausted");
        Err(self.suspend(SuspendReason::Preempted))
    }

    /// The preemption budget
    pub fn budget(&self) -> &Budget {
        &self.budget
    }
}
