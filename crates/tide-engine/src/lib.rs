//! Tide Engine
//!
//! Execution core for scripts that can be suspended at any call depth
//! without help from the host call stack:
//! - Register stack with zero-copy call windows
//! - Continuation protocol (unresolved / resolved suspension signals)
//! - Call stack and execution driver (`push_call` / `drain`)
//! - Cost-accounted cooperative preemption
//! - Dispatch primitives for host functions that call back into scripts
//! - Register-based script functions and the accounting insertion pass

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod call_stack;
pub mod config;
pub mod context;
pub mod continuation;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod function;
pub mod preempt;
pub mod register_stack;
pub mod script;
pub mod value;

pub use call_stack::CallStack;
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use continuation::{
    restore, CallResult, DispatchResult, Raise, Resolved, SavedState, SuspendReason,
    SuspendedFrame, Unresolved, Unwind,
};
pub use error::{ConfigError, ExecError, ExecResult, ProtocolError, ScriptError, StackError};
pub use executor::{Drain, ExecState, Executor};
pub use function::{CallFrame, Function, FunctionRef, NativeFunction};
pub use preempt::{Budget, CostTable, OpCategory, PreemptionConfig};
pub use register_stack::{RegisterStack, Window};
pub use script::{instrument, Instr, Proto, ScriptFunction, ScriptState};
pub use value::{Table, TableKey, TableRef, Userdata, UserdataRef, Value};
