//! Callable functions and the calling convention
//!
//! Every callable, script-compiled or host-implemented, implements
//! [`Function`]. A call hands the callee a [`CallFrame`]: the function
//! itself plus a [`Window`] whose `[0, top)` holds the arguments. On normal
//! completion the callee leaves its results in the same window, `[0, top)`,
//! which is the return buffer the caller reads from.
//!
//! A function that can be suspended mid-call returns `Unwind::Suspend`
//! after resolving the signal with its own state, and later receives that
//! state back through [`Function::resume`]. On resumption any result of the
//! child call that caused the suspension is read from the register stack,
//! never from a return value.

use crate::context::ExecutionContext;
use crate::continuation::{CallResult, SavedState};
use crate::error::{ExecError, ProtocolError};
use crate::register_stack::Window;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a callable
pub type FunctionRef = Rc<dyn Function>;

/// Contract for everything that can be called
pub trait Function: fmt::Debug {
    /// Name used in diagnostics and error messages
    fn name(&self) -> &str;

    /// Run from the start with the arguments in `frame.base`
    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult;

    /// Continue from a state this function produced when it suspended
    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState)
        -> CallResult;

    /// Whether `resume` is supported.
    ///
    /// The driver refuses to resume a frame whose function returns `false`
    /// and fails with `ProtocolError::NotSuspendable` instead.
    fn is_resumable(&self) -> bool {
        true
    }
}

/// A function paired with the register window it runs in
#[derive(Clone, Debug)]
pub struct CallFrame {
    /// The function being run
    pub function: FunctionRef,
    /// Argument window on entry, result window on return
    pub base: Window,
}

impl CallFrame {
    /// Create a call frame
    pub fn new(function: FunctionRef, base: Window) -> Self {
        Self { function, base }
    }
}

type NativeFn = dyn Fn(&mut ExecutionContext, Vec<Value>) -> Result<Vec<Value>, ExecError>;

/// Host function that runs to completion and never suspends
///
/// Arguments are copied out of the window, the closure runs, and its results
/// replace the window contents.
pub struct NativeFunction {
    name: &'static str,
    body: Box<NativeFn>,
}

impl NativeFunction {
    /// Wrap a closure as a non-resumable function
    pub fn new<F>(name: &'static str, body: F) -> FunctionRef
    where
        F: Fn(&mut ExecutionContext, Vec<Value>) -> Result<Vec<Value>, ExecError> + 'static,
    {
        Rc::new(Self {
            name,
            body: Box::new(body),
        })
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl Function for NativeFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let args = frame.base.values(&ctx.stack).to_vec();
        let results = (self.body)(ctx, args)?;
        frame.base.ret(&mut ctx.stack, &results)?;
        Ok(())
    }

    fn resume(&self, _ctx: &mut ExecutionContext, frame: &CallFrame, _state: SavedState) -> CallResult {
        Err(ProtocolError::NotSuspendable {
            function: frame.function.name().to_string(),
        }
        .into())
    }

    fn is_resumable(&self) -> bool {
        false
    }
}
