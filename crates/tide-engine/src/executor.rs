//! Execution driver
//!
//! Owns an execution context and its call stack and drains the call stack
//! one frame at a time. A suspension signal that reaches the driver is
//! spliced back onto the call stack and `drain` returns `Drain::Paused`;
//! an empty call stack means `Drain::Finished`.
//!
//! ```text
//!            push_call                 drain: signal
//!   Idle ─────────────────▶ Paused ◀───────────────┐
//!     ▲                        │                    │
//!     │ error                  │ drain              │
//!     └────────────────────────┼──────── (running) ─┘
//!                              ▼
//!                          Finished ── push_call ──▶ Paused
//! ```
//!
//! Draining repeatedly (cooperative scheduling) and draining in a loop
//! until finished (synchronous execution) are the same operation; they only
//! differ in how often control returns to the caller.

use crate::call_stack::CallStack;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::continuation::{SuspendReason, SuspendedFrame, Unwind};
use crate::error::{ExecError, ProtocolError, StackError};
use crate::function::{CallFrame, FunctionRef};
use crate::register_stack::Window;
use crate::value::Value;

/// Observable executor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Nothing pushed yet, or the last call failed
    Idle,
    /// A call is pending
    Paused,
    /// The last call ran to completion; its results are available
    Finished,
}

/// Outcome of one drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Control returned with work still pending
    Paused,
    /// The call stack emptied
    Finished,
}

/// Drives one top-level call at a time through suspensions
#[derive(Debug)]
pub struct Executor {
    ctx: ExecutionContext,
    call_stack: CallStack,
    state: ExecState,
    last_reason: Option<SuspendReason>,
}

impl Executor {
    /// Create an executor with its own register stack
    pub fn new(config: &EngineConfig) -> Result<Self, StackError> {
        Ok(Self {
            ctx: ExecutionContext::new(config)?,
            call_stack: CallStack::new(),
            state: ExecState::Idle,
            last_reason: None,
        })
    }

    /// Install a top-level call.
    ///
    /// Fails with `ProtocolError::AlreadyPaused` while another call is
    /// pending. Results of a previous finished call are discarded.
    pub fn push_call(&mut self, function: FunctionRef, args: &[Value]) -> Result<(), ExecError> {
        if !self.call_stack.is_empty() {
            return Err(ProtocolError::AlreadyPaused.into());
        }
        let base = self.ctx.stack.root();
        base.push_all(&mut self.ctx.stack, args)?;
        self.call_stack
            .push(SuspendedFrame::entry(CallFrame::new(function, base)));
        self.state = ExecState::Paused;
        self.last_reason = None;
        Ok(())
    }

    /// Resume pending frames until the call suspends or finishes.
    ///
    /// Any error is fatal to the top-level call: the call stack is
    /// discarded, the register stack truncated, and the executor goes back
    /// to `Idle`.
    pub fn drain(&mut self) -> Result<Drain, ExecError> {
        if self.call_stack.is_empty() {
            return Err(ProtocolError::NoPendingCall.into());
        }
        self.ctx.begin_drain();
        let outcome = self.run();
        self.ctx.end_drain();

        match outcome {
            Ok(Drain::Paused) => Ok(Drain::Paused),
            Ok(Drain::Finished) => {
                self.state = ExecState::Finished;
                tracing::debug!(results = self.results().len(), "drain finished");
                Ok(Drain::Finished)
            }
            Err(e) => {
                tracing::warn!(error = %e, "top-level call aborted");
                self.abort();
                Err(e)
            }
        }
    }

    fn run(&mut self) -> Result<Drain, ExecError> {
        while let Some(pending) = self.call_stack.pop() {
            let (frame, state) = pending.into_parts();
            tracing::trace!(
                function = frame.function.name(),
                base = frame.base.offset(),
                started = state.is_some(),
                "resuming frame"
            );
            let result = match state {
                None => frame.function.invoke(&mut self.ctx, &frame),
                Some(state) => {
                    if !frame.function.is_resumable() {
                        return Err(ProtocolError::NotSuspendable {
                            function: frame.function.name().to_string(),
                        }
                        .into());
                    }
                    frame.function.resume(&mut self.ctx, &frame, state)
                }
            };

            match result {
                Ok(()) => {}
                Err(Unwind::Suspend(signal)) => {
                    let captured = signal.depth();
                    let (reason, frames) = signal.into_frames();
                    self.call_stack.splice(frames);
                    self.last_reason = Some(reason);
                    tracing::debug!(
                        ?reason,
                        captured,
                        depth = self.call_stack.len(),
                        "drain paused"
                    );
                    return Ok(Drain::Paused);
                }
                Err(Unwind::Error(e)) => return Err(e),
            }
        }
        Ok(Drain::Finished)
    }

    fn abort(&mut self) {
        self.call_stack.clear();
        self.ctx.stack.root();
        self.state = ExecState::Idle;
    }

    /// Check if a call is pending
    pub fn is_paused(&self) -> bool {
        !self.call_stack.is_empty()
    }

    /// Current state
    pub fn state(&self) -> ExecState {
        self.state
    }

    /// Results of the last finished call.
    ///
    /// Empty unless the executor is `Finished`.
    pub fn results(&self) -> &[Value] {
        match self.state {
            ExecState::Finished => Window::at(0).values(&self.ctx.stack),
            _ => &[],
        }
    }

    /// Move the results out, releasing the register stack
    pub fn take_results(&mut self) -> Vec<Value> {
        let results = self.results().to_vec();
        if self.state == ExecState::Finished {
            self.ctx.stack.root();
            self.state = ExecState::Idle;
        }
        results
    }

    /// Pending frames in resumption order
    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// Why the last drain paused
    pub fn last_suspend_reason(&self) -> Option<SuspendReason> {
        self.last_reason
    }

    /// The execution context
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// The execution context, mutably
    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }
}
