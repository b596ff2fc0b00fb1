//! Shared helpers for engine integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use tide_engine::script::{ArithOp, Instr};
use tide_engine::{
    dispatch, restore, CallFrame, CallResult, Drain, EngineConfig, ExecutionContext, Executor,
    Function, FunctionRef, NativeFunction, Proto, SavedState, ScriptFunction, Value,
};

/// Host function that pauses once and then returns its arguments
#[derive(Debug)]
pub struct Yield;

impl Function for Yield {
    fn name(&self) -> &str {
        "yield"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        Err(ctx.pause().resolve(frame, ()))
    }

    fn resume(&self, _ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        restore::<()>(state, frame)?;
        Ok(())
    }
}

/// Host function that calls its first argument with the rest.
///
/// The callee runs in this function's own window, so resuming is a pure
/// pass-through.
#[derive(Debug)]
pub struct Apply;

impl Function for Apply {
    fn name(&self) -> &str {
        "apply"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let mut args = frame.base.values(&ctx.stack).to_vec();
        let callee = if args.is_empty() {
            Value::Nil
        } else {
            args.remove(0)
        };
        frame.base.ret(&mut ctx.stack, &args)?;
        match dispatch::call_value(ctx, &callee, frame.base) {
            Ok(()) => Ok(()),
            Err(raise) => Err(raise.resolve(frame, ())),
        }
    }

    fn resume(&self, _ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        restore::<()>(state, frame)?;
        Ok(())
    }
}

pub fn yield_fn() -> FunctionRef {
    Rc::new(Yield)
}

pub fn apply_fn() -> FunctionRef {
    Rc::new(Apply)
}

/// Returns its arguments unchanged, never suspends
pub fn identity_fn() -> FunctionRef {
    NativeFunction::new("identity", |_, args| Ok(args))
}

pub fn script(
    name: &str,
    params: u16,
    max_regs: u16,
    constants: Vec<Value>,
    code: Vec<Instr>,
) -> FunctionRef {
    ScriptFunction::new(Proto::new(name, params, max_regs, constants, code).unwrap())
}

/// `function(x) return next(x) + k end`
pub fn add_after(name: &str, next: FunctionRef, k: i64) -> FunctionRef {
    script(
        name,
        1,
        3,
        vec![Value::Function(next), Value::Int(k)],
        vec![
            Instr::LoadConst { dst: 1, index: 0 },
            Instr::Move { dst: 2, src: 0 },
            Instr::Call {
                base: 1,
                nargs: 1,
                nresults: 1,
            },
            Instr::LoadConst { dst: 2, index: 1 },
            Instr::Arith {
                op: ArithOp::Add,
                dst: 1,
                lhs: 1,
                rhs: 2,
            },
            Instr::Return { first: 1, count: 1 },
        ],
    )
}

/// Chain of `depth` script functions ending in `leaf`; level k adds k
pub fn chain(depth: usize, leaf: FunctionRef) -> FunctionRef {
    let mut f = leaf;
    for k in 1..=depth {
        f = add_after(&format!("level{}", k), f, k as i64);
    }
    f
}

/// Shared append-only log for ordering assertions
pub type Log = Rc<RefCell<Vec<String>>>;

/// `mark(s)` appends `s` to the log
pub fn mark_fn(log: &Log) -> FunctionRef {
    let log = log.clone();
    NativeFunction::new("mark", move |_, args| {
        let text = args.first().map(|v| v.to_string()).unwrap_or_default();
        log.borrow_mut().push(text);
        Ok(vec![])
    })
}

/// `function() mark(before); inner(); mark(after) end`
pub fn marked(name: &str, mark: &FunctionRef, inner: FunctionRef, before: &str, after: &str) -> FunctionRef {
    script(
        name,
        0,
        2,
        vec![
            Value::Function(mark.clone()),
            Value::str(before),
            Value::Function(inner),
            Value::str(after),
        ],
        vec![
            Instr::LoadConst { dst: 0, index: 0 },
            Instr::LoadConst { dst: 1, index: 1 },
            Instr::Call {
                base: 0,
                nargs: 1,
                nresults: 0,
            },
            Instr::LoadConst { dst: 0, index: 2 },
            Instr::Call {
                base: 0,
                nargs: 0,
                nresults: 0,
            },
            Instr::LoadConst { dst: 0, index: 0 },
            Instr::LoadConst { dst: 1, index: 3 },
            Instr::Call {
                base: 0,
                nargs: 1,
                nresults: 0,
            },
            Instr::Return { first: 0, count: 0 },
        ],
    )
}

pub fn executor(config: &EngineConfig) -> Executor {
    Executor::new(config).unwrap()
}

/// Drain to completion, returning the number of drains and the results
pub fn run_to_end(exec: &mut Executor) -> (usize, Vec<Value>) {
    let mut drains = 0;
    loop {
        drains += 1;
        if exec.drain().unwrap() == Drain::Finished {
            return (drains, exec.take_results());
        }
        assert!(drains < 100_000, "execution does not finish");
    }
}
