//! Cost-accounted preemption

mod common;

use common::*;
use tide_engine::script::{ArithOp, CompareOp, Instr};
use tide_engine::{
    instrument, CostTable, Drain, EngineConfig, FunctionRef, PreemptionConfig, Proto,
    ScriptFunction, ScriptState, SuspendReason, Value,
};

/// `function(n) local i = 0; while i < n do i = i + 1 end; return i end`
fn counting_loop(costs: &CostTable) -> (FunctionRef, Vec<Instr>) {
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
    let code = proto.code().to_vec();
    (ScriptFunction::new(proto), code)
}

fn config(budget: Option<u64>, low_water_mark: i64) -> EngineConfig {
    EngineConfig {
        stack_capacity: 64,
        preemption: PreemptionConfig {
            budget,
            low_water_mark,
            costs: CostTable::default(),
        },
    }
}

/// Run `f(n)` to completion, recording the pc of every pause
fn trace(config: &EngineConfig, f: &FunctionRef, n: i64) -> (Vec<usize>, Vec<Value>) {
    let mut exec = executor(config);
    exec.push_call(f.clone(), &[Value::Int(n)]).unwrap();
    let mut pauses = Vec::new();
    loop {
        match exec.drain().unwrap() {
            Drain::Finished => return (pauses, exec.take_results()),
            Drain::Paused => {
                assert_eq!(exec.last_suspend_reason(), Some(SuspendReason::Preempted));
                let head = exec.call_stack().iter().next().unwrap();
                pauses.push(head.state::<ScriptState>().unwrap().pc());
                assert!(pauses.len() < 10_000);
            }
        }
    }
}

#[test]
fn test_preemption_points_are_repeatable() {
    let config = config(Some(20), 0);
    let (f, code) = counting_loop(&config.preemption.costs);

    let (first_pauses, first_results) = trace(&config, &f, 50);
    let (second_pauses, second_results) = trace(&config, &f, 50);

    assert!(first_pauses.len() > 1);
    assert_eq!(first_pauses, second_pauses);
    assert_eq!(first_results, vec![Value::Int(50)]);
    assert_eq!(first_results, second_results);

    // every pause resumes right after an accounting check
    for pc in first_pauses {
        assert_eq!(code[pc - 1], Instr::Tick);
    }
}

#[test]
fn test_disabled_preemption_runs_in_one_drain() {
    let config = config(None, 0);
    let (f, _) = counting_loop(&config.preemption.costs);
    let (pauses, results) = trace(&config, &f, 500);
    assert!(pauses.is_empty());
    assert_eq!(results, vec![Value::Int(500)]);
}

#[test]
fn test_smaller_budget_means_more_drains() {
    let costs = CostTable::default();
    let (f, _) = counting_loop(&costs);
    let (tight, _) = trace(&config(Some(10), 0), &f, 100);
    let (loose, _) = trace(&config(Some(100), 0), &f, 100);
    let (raised_mark, _) = trace(&config(Some(100), 50), &f, 100);
    assert!(tight.len() > loose.len());
    assert!(raised_mark.len() >= loose.len());
}

#[test]
fn test_run_length_is_bounded_by_budget() {
    let config = config(Some(25), 0);
    let (f, _) = counting_loop(&config.preemption.costs);
    let mut exec = executor(&config);
    exec.push_call(f, &[Value::Int(1000)]).unwrap();
    assert_eq!(exec.drain().unwrap(), Drain::Paused);
    let remaining = exec.context().budget().remaining();
    // one block past the mark at most; every block here costs 2 or less
    assert!(remaining <= 0);
    assert!(remaining > -2);
}

#[test]
fn test_preemption_inside_nested_call() {
    let config = config(Some(15), 0);
    let (count, _) = counting_loop(&config.preemption.costs);
    let outer = add_after("outer", count, 1000);

    let mut exec = executor(&config);
    exec.push_call(outer.clone(), &[Value::Int(30)]).unwrap();
    assert_eq!(exec.drain().unwrap(), Drain::Paused);
    let names: Vec<&str> = exec
        .call_stack()
        .iter()
        .map(|f| f.frame().function.name())
        .collect();
    assert_eq!(names, ["count", "outer"]);

    let (_, results) = run_to_end(&mut exec);
    assert_eq!(results, vec![Value::Int(1030)]);
    assert!(exec.context().budget().preemptions() > 1);
}
