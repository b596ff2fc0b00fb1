//! Dispatch primitives
//!
//! The calls compiled code and host functions use to reach other functions.
//! All of them leave their result in the window they were given (`[0, top)`
//! for calls, `window[0]` for lookups), and all of them may return
//! `Raise::Suspend`, which the caller must resolve with its own state.

use crate::context::ExecutionContext;
use crate::continuation::{DispatchResult, Raise};
use crate::error::ScriptError;
use crate::function::{CallFrame, FunctionRef};
use crate::register_stack::Window;
use crate::value::Value;

/// Upper bound on `__index` chains before the lookup is considered a loop
const MAX_INDEX_CHAIN: usize = 100;

/// Look up a metamethod by event name
pub fn metamethod(value: &Value, event: &str) -> Option<Value> {
    let metatable = value.metatable()?;
    let handler = metatable.borrow().get_str(event);
    (!handler.is_nil()).then_some(handler)
}

/// Call `function` with the arguments in `window[0..top)`.
///
/// A suspension of the callee arrives here as a resolved signal carrying
/// the callee's frame; it is handed to the caller unresolved.
pub fn call(ctx: &mut ExecutionContext, function: &FunctionRef, window: Window) -> DispatchResult {
    let frame = CallFrame::new(function.clone(), window);
    function.invoke(ctx, &frame).map_err(Raise::from)
}

/// Call any value, falling back to its `__call` metamethod
pub fn call_value(ctx: &mut ExecutionContext, callee: &Value, window: Window) -> DispatchResult {
    if let Value::Function(function) = callee {
        return call(ctx, function, window);
    }
    match metamethod(callee, "__call") {
        Some(Value::Function(handler)) => {
            let args = window.values(&ctx.stack).to_vec();
            window.set_top(&mut ctx.stack, 0)?;
            window.push(&mut ctx.stack, callee.clone())?;
            window.push_all(&mut ctx.stack, &args)?;
            call(ctx, &handler, window)
        }
        _ => Err(ScriptError::new(format!(
            "attempt to call a {} value",
            callee.type_name()
        ))
        .into()),
    }
}

/// `target[key]` with `__index` fallback; the result lands in `window[0]`
pub fn index(
    ctx: &mut ExecutionContext,
    target: &Value,
    key: &Value,
    window: Window,
) -> DispatchResult {
    let mut current = target.clone();
    for _ in 0..MAX_INDEX_CHAIN {
        if let Value::Table(table) = &current {
            let raw = table.borrow().get(key);
            if !raw.is_nil() {
                window.ret(&mut ctx.stack, &[raw])?;
                return Ok(());
            }
        }
        match metamethod(&current, "__index") {
            None if matches!(current, Value::Table(_)) => {
                window.ret(&mut ctx.stack, &[Value::Nil])?;
                return Ok(());
            }
            None => {
                return Err(ScriptError::new(format!(
                    "attempt to index a {} value",
                    current.type_name()
                ))
                .into())
            }
            Some(Value::Function(handler)) => {
                window.ret(&mut ctx.stack, &[current, key.clone()])?;
                return call(ctx, &handler, window);
            }
            Some(next) => current = next,
        }
    }
    Err(ScriptError::new("'__index' chain too long; possible loop").into())
}

/// String conversion with `__tostring`; the result lands in `window[0]`.
///
/// The metamethod's result is left as-is; checking that it is a string is
/// up to the caller.
pub fn tostring(ctx: &mut ExecutionContext, value: &Value, window: Window) -> DispatchResult {
    if let Some(handler) = metamethod(value, "__tostring") {
        window.ret(&mut ctx.stack, &[value.clone()])?;
        return call_value(ctx, &handler, window);
    }
    window.ret(&mut ctx.stack, &[Value::from(default_tostring(value))])?;
    Ok(())
}

/// Rendering used when a value has no `__tostring`.
///
/// A string `__name` in the metatable replaces the type name.
pub fn default_tostring(value: &Value) -> String {
    if let Some(Value::Str(name)) = metamethod(value, "__name") {
        return format!("{}: {:#x}", name, value.identity());
    }
    value.to_string()
}
