//! Basic functions: `pause`, `tostring`, `type`, `error`

use crate::args::Args;
use std::rc::Rc;
use tide_engine::{
    dispatch, restore, CallFrame, CallResult, ExecError, ExecutionContext, Function, FunctionRef,
    NativeFunction, SavedState, ScriptError, TableRef, Value, Window,
};

/// `pause(...)`: suspend voluntarily, then return the arguments unchanged
#[derive(Debug, Default)]
pub struct Pause;

impl Function for Pause {
    fn name(&self) -> &str {
        "pause"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let args = frame.base.values(&ctx.stack).to_vec();
        Err(ctx.pause().resolve(frame, args))
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let args: Vec<Value> = restore(state, frame)?;
        frame.base.ret(&mut ctx.stack, &args)?;
        Ok(())
    }
}

/// `tostring(v)`, honouring `__tostring`
#[derive(Debug, Default)]
pub struct Tostring;

impl Tostring {
    fn check_result(ctx: &mut ExecutionContext, window: Window) -> CallResult {
        match window.arg(&ctx.stack, 0).to_str_coerced() {
            Some(s) => {
                window.ret(&mut ctx.stack, &[Value::Str(s)])?;
                Ok(())
            }
            None => Err(ScriptError::new("'__tostring' must return a string").into()),
        }
    }
}

impl Function for Tostring {
    fn name(&self) -> &str {
        "tostring"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let mut args = Args::from_frame("tostring", ctx, frame);
        let value = args.next_any()?;
        if let Err(raise) = dispatch::tostring(ctx, &value, frame.base) {
            return Err(raise.resolve(frame, ()));
        }
        Self::check_result(ctx, frame.base)
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        restore::<()>(state, frame)?;
        Self::check_result(ctx, frame.base)
    }
}

fn type_name(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, ExecError> {
    let mut args = Args::new("type", args);
    let value = args.next_any()?;
    Ok(vec![Value::str(value.type_name())])
}

fn error(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, ExecError> {
    let mut args = Args::new("error", args);
    let message = match args.next_opt() {
        Value::Nil => "nil".to_string(),
        other => other
            .to_str_coerced()
            .map(|s| s.to_string())
            .unwrap_or_else(|| dispatch::default_tostring(&other)),
    };
    Err(ScriptError::new(message).into())
}

/// Install the basic functions into `env`
pub fn install(env: &TableRef) {
    let mut env = env.borrow_mut();
    env.set_str("pause", Rc::new(Pause) as FunctionRef);
    env.set_str("tostring", Rc::new(Tostring) as FunctionRef);
    env.set_str("type", NativeFunction::new("type", type_name));
    env.set_str("error", NativeFunction::new("error", error));
}
