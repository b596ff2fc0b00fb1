//! Shared helpers for library integration tests

#![allow(dead_code)]

use tide_engine::script::Instr;
use tide_engine::{
    Drain, EngineConfig, Executor, FunctionRef, PreemptionConfig, Proto, ScriptFunction,
    SuspendReason, TableRef, Value,
};

pub fn config() -> EngineConfig {
    EngineConfig {
        stack_capacity: 512,
        preemption: PreemptionConfig::disabled(),
    }
}

pub fn executor() -> Executor {
    Executor::new(&config()).unwrap()
}

/// `env[lib][name]` as a function
pub fn lib_fn(env: &TableRef, lib: &str, name: &str) -> FunctionRef {
    let table = match env.borrow().get_str(lib) {
        Value::Table(t) => t,
        other => panic!("{} is not a table: {:?}", lib, other),
    };
    let f = table.borrow().get_str(name);
    match f {
        Value::Function(f) => f,
        other => panic!("{}.{} is not a function: {:?}", lib, name, other),
    }
}

/// `env[name]` as a function
pub fn global_fn(env: &TableRef, name: &str) -> FunctionRef {
    match env.borrow().get_str(name) {
        Value::Function(f) => f,
        other => panic!("{} is not a function: {:?}", name, other),
    }
}

/// Outcome of running one top-level call to completion
#[derive(Debug)]
pub struct Outcome {
    pub pauses: Vec<SuspendReason>,
    pub results: Vec<Value>,
}

/// Push `f(args)` on `exec` and drain until it finishes
pub fn run_on(exec: &mut Executor, f: &FunctionRef, args: &[Value]) -> Result<Outcome, tide_engine::ExecError> {
    exec.push_call(f.clone(), args)?;
    let mut pauses = Vec::new();
    loop {
        match exec.drain()? {
            Drain::Finished => {
                return Ok(Outcome {
                    pauses,
                    results: exec.take_results(),
                })
            }
            Drain::Paused => {
                pauses.push(exec.last_suspend_reason().unwrap());
                assert!(pauses.len() < 10_000, "call does not finish");
            }
        }
    }
}

pub fn run(f: &FunctionRef, args: &[Value]) -> Result<Outcome, tide_engine::ExecError> {
    run_on(&mut executor(), f, args)
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

/// `function(x) return "<" .. pause(x) .. ">" end`
pub fn bracket_after_pause(pause: FunctionRef) -> FunctionRef {
    script(
        "bracket",
        1,
        3,
        vec![Value::Function(pause), Value::str("<"), Value::str(">")],
        vec![
            Instr::LoadConst { dst: 1, index: 0 },
            Instr::Move { dst: 2, src: 0 },
            Instr::Call {
                base: 1,
                nargs: 1,
                nresults: 1,
            },
            Instr::LoadConst { dst: 2, index: 1 },
            Instr::Concat {
                dst: 2,
                lhs: 2,
                rhs: 1,
            },
            Instr::LoadConst { dst: 1, index: 2 },
            Instr::Concat {
                dst: 2,
                lhs: 2,
                rhs: 1,
            },
            Instr::Return { first: 2, count: 1 },
        ],
    )
}

/// `function(a, b) return pause(b) end`, for handlers that get (target, key)
pub fn pause_second(pause: FunctionRef) -> FunctionRef {
    script(
        "pause_second",
        2,
        4,
        vec![Value::Function(pause)],
        vec![
            Instr::LoadConst { dst: 2, index: 0 },
            Instr::Move { dst: 3, src: 1 },
            Instr::Call {
                base: 2,
                nargs: 1,
                nresults: 1,
            },
            Instr::Return { first: 2, count: 1 },
        ],
    )
}

/// `function(v) return pause(text) end`
pub fn pause_with(pause: FunctionRef, text: &str) -> FunctionRef {
    script(
        "pause_with",
        1,
        3,
        vec![Value::Function(pause), Value::str(text)],
        vec![
            Instr::LoadConst { dst: 1, index: 0 },
            Instr::LoadConst { dst: 2, index: 1 },
            Instr::Call {
                base: 1,
                nargs: 1,
                nresults: 1,
            },
            Instr::Return { first: 1, count: 1 },
        ],
    )
}
