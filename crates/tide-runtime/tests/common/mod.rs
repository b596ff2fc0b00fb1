//! Shared helpers for runtime integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use tide_engine::script::{ArithOp, CompareOp, Instr};
use tide_engine::{
    instrument, CostTable, EngineConfig, FunctionRef, NativeFunction, PreemptionConfig, Proto,
    ScriptFunction, Value,
};

pub fn script(
    name: &str,
    params: u16,
    max_regs: u16,
    constants: Vec<Value>,
    code: Vec<Instr>,
) -> FunctionRef {
    ScriptFunction::new(Proto::new(name, params, max_regs, constants, code).unwrap())
}

pub fn engine_config(budget: Option<u64>) -> EngineConfig {
    EngineConfig {
        stack_capacity: 256,
        preemption: PreemptionConfig {
            budget,
            ..PreemptionConfig::default()
        },
    }
}

/// `function(n) local i = 0; while i < n do i = i + 1 end; return i end`,
/// with accounting instructions
pub fn counting_loop(costs: &CostTable) -> FunctionRef {
    let proto = Proto::new(
        "count",
        1,
        4,
        vec![Value::Int(0), Value::Int(1)],
        vec![
            Instr::LoadConst { dst: 1, index: 0 },
            Instr::LoadConst { dst: 2, index: 1 },
            Instr::Compare {
                op: CompareOp::Lt,
                dst: 3,
                lhs: 1,
                rhs: 0,
            },
            Instr::JumpIfNot { cond: 3, target: 6 },
            Instr::Arith {
                op: ArithOp::Add,
                dst: 1,
                lhs: 1,
                rhs: 2,
            },
            Instr::Jump { target: 2 },
            Instr::Return { first: 1, count: 1 },
        ],
    )
    .unwrap();
    let proto = proto.with_code(instrument(proto.code(), costs)).unwrap();
    ScriptFunction::new(proto)
}

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn mark_fn(log: &Log) -> FunctionRef {
    let log = log.clone();
    NativeFunction::new("mark", move |_, args| {
        let text = args.first().map(|v| v.to_string()).unwrap_or_default();
        log.borrow_mut().push(text);
        Ok(vec![])
    })
}

/// `function() mark(first); pause(); mark(second) end`
pub fn mark_pause_mark(
    name: &str,
    mark: &FunctionRef,
    pause: &FunctionRef,
    first: &str,
    second: &str,
) -> FunctionRef {
    script(
        name,
        0,
        2,
        vec![
            Value::Function(mark.clone()),
            Value::str(first),
            Value::Function(pause.clone()),
            Value::str(second),
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
