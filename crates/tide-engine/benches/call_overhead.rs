use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::rc::Rc;
use tide_engine::script::{ArithOp, Instr};
use tide_engine::{
    restore, CallFrame, CallResult, Drain, EngineConfig, ExecutionContext, Executor, Function,
    FunctionRef, NativeFunction, PreemptionConfig, Proto, SavedState, ScriptFunction, Value,
};

#[derive(Debug)]
struct Yield;

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

fn chain(depth: usize, leaf: FunctionRef) -> FunctionRef {
    let mut f = leaf;
    for k in 0..depth {
        let proto = Proto::new(
            format!("level{}", k),
            1,
            3,
            vec![Value::Function(f), Value::Int(1)],
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
        .unwrap();
        f = ScriptFunction::new(proto);
    }
    f
}

fn run(exec: &mut Executor, f: &FunctionRef) -> Vec<Value> {
    exec.push_call(f.clone(), &[Value::Int(0)]).unwrap();
    while exec.drain().unwrap() == Drain::Paused {}
    exec.take_results()
}

fn bench_calls(c: &mut Criterion) {
    let config = EngineConfig {
        stack_capacity: 4096,
        preemption: PreemptionConfig::disabled(),
    };
    let mut group = c.benchmark_group("call_overhead");

    for depth in [1usize, 8, 64] {
        let direct = chain(depth, NativeFunction::new("identity", |_, args| Ok(args)));
        let suspending = chain(depth, Rc::new(Yield));
        let mut exec = Executor::new(&config).unwrap();

        group.bench_with_input(BenchmarkId::new("window_calls", depth), &direct, |b, f| {
            b.iter(|| run(&mut exec, black_box(f)))
        });
        group.bench_with_input(BenchmarkId::new("suspend_resume", depth), &suspending, |b, f| {
            b.iter(|| run(&mut exec, black_box(f)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_calls);
criterion_main!(benches);
