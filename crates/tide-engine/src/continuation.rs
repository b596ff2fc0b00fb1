//! Continuation protocol: capturing and replaying suspended call chains
//!
//! Suspension is an ordinary return value, not a host-stack unwind. A
//! suspension point produces an [`Unresolved`] signal that knows nothing
//! about the call chain above it. Every enclosing frame that receives it
//! must attach its own resumption state, turning it into a [`Resolved`]
//! signal, before returning it further out. Dispatch then hands the
//! resolved signal to the next caller as unresolved again, so the chain
//! grows by exactly one [`SuspendedFrame`] per call level crossed.
//!
//! ```text
//!   leaf        raises   Unresolved { frames: [] }
//!   C.invoke    returns  Resolved   { frames: [C] }
//!   dispatch    →        Unresolved { frames: [C] }
//!   B.invoke    returns  Resolved   { frames: [C, B] }
//!   dispatch    →        Unresolved { frames: [C, B] }
//!   A.invoke    returns  Resolved   { frames: [C, B, A] }   → driver
//! ```
//!
//! Frames are recorded innermost first; the driver resumes them in that order.

use crate::error::{ExecError, ProtocolError, ScriptError, StackError};
use crate::function::CallFrame;
use std::any::Any;
use std::fmt;

/// Opaque resumption token produced by a suspending function
pub type SavedState = Box<dyn Any>;

/// Why execution was suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// The preemption budget ran out at an accounting check
    Preempted,
    /// A function yielded voluntarily
    Yield,
    /// A host operation would block
    Blocked,
}

/// One captured frame of a suspended call chain
pub struct SuspendedFrame {
    frame: CallFrame,
    state: Option<SavedState>,
}

impl SuspendedFrame {
    /// A frame that has not started yet (`invoke` rather than `resume`)
    pub(crate) fn entry(frame: CallFrame) -> Self {
        Self { frame, state: None }
    }

    /// The captured call frame
    pub fn frame(&self) -> &CallFrame {
        &self.frame
    }

    /// Typed view of the saved state
    pub fn state<S: Any>(&self) -> Option<&S> {
        self.state.as_ref()?.downcast_ref::<S>()
    }

    pub(crate) fn into_parts(self) -> (CallFrame, Option<SavedState>) {
        (self.frame, self.state)
    }
}

impl fmt::Debug for SuspendedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendedFrame")
            .field("function", &self.frame.function.name())
            .field("base", &self.frame.base.offset())
            .field("started", &self.state.is_some())
            .finish()
    }
}

/// Suspension signal as seen by a call site: nobody has claimed it yet
#[must_use = "an unresolved signal must be resolved by the enclosing frame"]
#[derive(Debug)]
pub struct Unresolved {
    reason: SuspendReason,
    frames: Vec<SuspendedFrame>,
}

impl Unresolved {
    pub(crate) fn new(reason: SuspendReason) -> Self {
        Self {
            reason,
            frames: Vec::new(),
        }
    }

    /// Why execution is being suspended
    pub fn reason(&self) -> SuspendReason {
        self.reason
    }

    /// Attach the enclosing frame and the state it needs to continue
    pub fn resolve<S: Any>(mut self, frame: &CallFrame, state: S) -> Resolved {
        self.frames.push(SuspendedFrame {
            frame: frame.clone(),
            state: Some(Box::new(state)),
        });
        Resolved {
            reason: self.reason,
            frames: self.frames,
        }
    }
}

/// Suspension signal after the current frame has attached itself
#[must_use = "a resolved signal must be returned to the caller"]
#[derive(Debug)]
pub struct Resolved {
    reason: SuspendReason,
    frames: Vec<SuspendedFrame>,
}

impl Resolved {
    /// Why execution is being suspended
    pub fn reason(&self) -> SuspendReason {
        self.reason
    }

    /// Number of frames captured so far
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Hand the signal to the next enclosing call site
    pub(crate) fn unresolve(self) -> Unresolved {
        Unresolved {
            reason: self.reason,
            frames: self.frames,
        }
    }

    /// The captured frames, innermost first
    pub fn frames(&self) -> impl Iterator<Item = &SuspendedFrame> {
        self.frames.iter()
    }

    pub(crate) fn into_frames(self) -> (SuspendReason, std::vec::IntoIter<SuspendedFrame>) {
        (self.reason, self.frames.into_iter())
    }
}

/// What a call site receives when a call does not complete normally
#[derive(Debug)]
pub enum Raise {
    /// The callee suspended; the caller must resolve
    Suspend(Unresolved),
    /// The callee failed
    Error(ExecError),
}

impl Raise {
    /// Resolve a suspension with the caller's frame and state; errors pass through
    pub fn resolve<S: Any>(self, frame: &CallFrame, state: S) -> Unwind {
        match self {
            Raise::Suspend(signal) => Unwind::Suspend(signal.resolve(frame, state)),
            Raise::Error(e) => Unwind::Error(e),
        }
    }
}

/// What a function returns when it does not complete normally
#[derive(Debug)]
pub enum Unwind {
    /// The function suspended after capturing itself
    Suspend(Resolved),
    /// The function failed
    Error(ExecError),
}

impl From<Unwind> for Raise {
    fn from(unwind: Unwind) -> Self {
        match unwind {
            Unwind::Suspend(signal) => Raise::Suspend(signal.unresolve()),
            Unwind::Error(e) => Raise::Error(e),
        }
    }
}

impl From<Resolved> for Unwind {
    fn from(signal: Resolved) -> Self {
        Unwind::Suspend(signal)
    }
}

macro_rules! error_into_control {
    ($($err:ty),*) => {$(
        impl From<$err> for Unwind {
            fn from(e: $err) -> Self {
                Unwind::Error(e.into())
            }
        }

        impl From<$err> for Raise {
            fn from(e: $err) -> Self {
                Raise::Error(e.into())
            }
        }
    )*};
}

error_into_control!(ExecError, StackError, ProtocolError, ScriptError);

/// Result of `Function::invoke` / `Function::resume`
pub type CallResult = Result<(), Unwind>;

/// Result of a dispatch primitive
pub type DispatchResult = Result<(), Raise>;

/// Recover the concrete saved state a function stored when it suspended
pub fn restore<S: Any>(state: SavedState, frame: &CallFrame) -> Result<S, ProtocolError> {
    state
        .downcast::<S>()
        .map(|s| *s)
        .map_err(|_| ProtocolError::StateMismatch {
            function: frame.function.name().to_string(),
        })
}
