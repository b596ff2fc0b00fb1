//! Script function interpreter

use super::{ArithOp, CompareOp, Instr, Proto, Reg};
use crate::context::ExecutionContext;
use crate::continuation::{restore, CallResult, SavedState};
use crate::dispatch;
use crate::error::{ExecError, ScriptError};
use crate::function::{CallFrame, Function, FunctionRef};
use crate::register_stack::{RegisterStack, Window};
use crate::value::Value;
use std::cmp::Ordering;
use std::rc::Rc;

/// Operation in flight when a script function suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// `Call` at `base`; results go to `R(base..base+nresults)`
    Call { base: Reg, nresults: u16 },
    /// `GetField`; the value goes to `R(dst)`
    Index { dst: Reg },
}

/// Resumption state of a suspended script function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptState {
    pc: usize,
    pending: Option<Pending>,
}

impl ScriptState {
    /// Index of the instruction execution continues at
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Check if a call or lookup result is waiting to be collected
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// A prototype made callable
#[derive(Debug)]
pub struct ScriptFunction {
    proto: Rc<Proto>,
}

impl ScriptFunction {
    /// Wrap a prototype as a function value
    pub fn new(proto: Proto) -> FunctionRef {
        Rc::new(Self {
            proto: Rc::new(proto),
        })
    }

    /// The prototype
    pub fn proto(&self) -> &Proto {
        &self.proto
    }

    fn frame_size(&self) -> usize {
        usize::from(self.proto.max_regs)
    }

    /// Scratch window above the register file, used for lookups
    fn scratch(&self, base: Window) -> Window {
        base.from(self.frame_size())
    }

    /// Copy a finished call's results into `R(a..a+nresults)`, padding with nil
    fn finish_call(
        &self,
        stack: &mut RegisterStack,
        base: Window,
        a: Reg,
        nresults: u16,
    ) -> Result<(), ExecError> {
        let a = usize::from(a);
        let callee = base.from(a + 1);
        let produced = callee.top(stack);
        for i in 0..usize::from(nresults) {
            let value = if i < produced {
                callee.take(stack, i)
            } else {
                Value::Nil
            };
            base.set(stack, a + i, value);
        }
        for i in usize::from(nresults)..produced {
            callee.take(stack, i);
        }
        base.set_top(stack, self.frame_size())?;
        Ok(())
    }

    fn finish_index(&self, stack: &mut RegisterStack, base: Window, dst: Reg) -> Result<(), ExecError> {
        let value = self.scratch(base).arg(stack, 0);
        base.set(stack, usize::from(dst), value);
        base.set_top(stack, self.frame_size())?;
        Ok(())
    }

    fn run(&self, ctx: &mut ExecutionContext, frame: &CallFrame, mut pc: usize) -> CallResult {
        let base = frame.base;
        let proto = &*self.proto;
        let reg = |r: Reg| usize::from(r);

        while let Some(instr) = proto.code.get(pc) {
            pc += 1;
            match *instr {
                Instr::LoadConst { dst, index } => {
                    let value = proto.constants[index as usize].clone();
                    base.set(&mut ctx.stack, reg(dst), value);
                }
                Instr::LoadNil { dst } => base.set(&mut ctx.stack, reg(dst), Value::Nil),
                Instr::Move { dst, src } => {
                    let value = base.get(&ctx.stack, reg(src)).clone();
                    base.set(&mut ctx.stack, reg(dst), value);
                }
                Instr::Arith { op, dst, lhs, rhs } => {
                    let value = arith(op, base.get(&ctx.stack, reg(lhs)), base.get(&ctx.stack, reg(rhs)))?;
                    base.set(&mut ctx.stack, reg(dst), value);
                }
                Instr::Compare { op, dst, lhs, rhs } => {
                    let result = compare(op, base.get(&ctx.stack, reg(lhs)), base.get(&ctx.stack, reg(rhs)))?;
                    base.set(&mut ctx.stack, reg(dst), Value::Bool(result));
                }
                Instr::Concat { dst, lhs, rhs } => {
                    let value = concat(base.get(&ctx.stack, reg(lhs)), base.get(&ctx.stack, reg(rhs)))?;
                    base.set(&mut ctx.stack, reg(dst), value);
                }
                Instr::Jump { target } => pc = target as usize,
                Instr::JumpIfNot { cond, target } => {
                    if !base.get(&ctx.stack, reg(cond)).is_truthy() {
                        pc = target as usize;
                    }
                }
                Instr::GetField { dst, table, key } => {
                    let target = base.get(&ctx.stack, reg(table)).clone();
                    let key = proto.constants[key as usize].clone();
                    let scratch = self.scratch(base);
                    if let Err(raise) = dispatch::index(ctx, &target, &key, scratch) {
                        let state = ScriptState {
                            pc,
                            pending: Some(Pending::Index { dst }),
                        };
                        return Err(raise.resolve(frame, state));
                    }
                    self.finish_index(&mut ctx.stack, base, dst)?;
                }
                Instr::Call {
                    base: a,
                    nargs,
                    nresults,
                } => {
                    let callee = base.get(&ctx.stack, reg(a)).clone();
                    let window = base.from(reg(a) + 1);
                    window.set_top(&mut ctx.stack, usize::from(nargs))?;
                    if let Err(raise) = dispatch::call_value(ctx, &callee, window) {
                        let state = ScriptState {
                            pc,
                            pending: Some(Pending::Call { base: a, nresults }),
                        };
                        return Err(raise.resolve(frame, state));
                    }
                    self.finish_call(&mut ctx.stack, base, a, nresults)?;
                }
                Instr::Return { first, count } => {
                    let first = reg(first);
                    let count = usize::from(count);
                    if first != 0 {
                        for i in 0..count {
                            let value = base.take(&mut ctx.stack, first + i);
                            base.set(&mut ctx.stack, i, value);
                        }
                    }
                    base.set_top(&mut ctx.stack, count)?;
                    return Ok(());
                }
                Instr::Charge { cost } => ctx.charge(cost),
                Instr::Tick => {
                    if let Err(raise) = ctx.tick() {
                        return Err(raise.resolve(frame, ScriptState { pc, pending: None }));
                    }
                }
            }
        }

        base.set_top(&mut ctx.stack, 0)?;
        Ok(())
    }
}

impl Function for ScriptFunction {
    fn name(&self) -> &str {
        &self.proto.name
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let base = frame.base;
        let params = usize::from(self.proto.params);
        if base.top(&ctx.stack) > params {
            base.set_top(&mut ctx.stack, params)?;
        }
        base.set_top(&mut ctx.stack, self.frame_size())?;
        self.run(ctx, frame, 0)
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let state: ScriptState = restore(state, frame)?;
        match state.pending {
            Some(Pending::Call { base: a, nresults }) => {
                self.finish_call(&mut ctx.stack, frame.base, a, nresults)?
            }
            Some(Pending::Index { dst }) => self.finish_index(&mut ctx.stack, frame.base, dst)?,
            None => frame.base.set_top(&mut ctx.stack, self.frame_size())?,
        }
        self.run(ctx, frame, state.pc)
    }
}

fn arith_error(lhs: &Value, rhs: &Value) -> ScriptError {
    let culprit = if lhs.as_float().is_none() { lhs } else { rhs };
    ScriptError::new(format!(
        "attempt to perform arithmetic on a {} value",
        culprit.type_name()
    ))
}

fn arith(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, ScriptError> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let (a, b) = (*a, *b);
        return match op {
            ArithOp::Add => Ok(Value::Int(a.wrapping_add(b))),
            ArithOp::Sub => Ok(Value::Int(a.wrapping_sub(b))),
            ArithOp::Mul => Ok(Value::Int(a.wrapping_mul(b))),
            ArithOp::Div => Ok(Value::Float(a as f64 / b as f64)),
            ArithOp::Mod if b == 0 => Err(ScriptError::new("attempt to perform 'n%0'")),
            ArithOp::Mod => Ok(Value::Int(a.wrapping_rem(b).wrapping_add(b).wrapping_rem(b))),
        };
    }
    let (a, b) = match (lhs.as_float(), rhs.as_float()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(arith_error(lhs, rhs)),
    };
    Ok(Value::Float(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => a - (a / b).floor() * b,
    }))
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, ScriptError> {
    if op == CompareOp::Eq {
        return Ok(lhs == rhs);
    }
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            match (lhs.as_float(), rhs.as_float()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            }
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => {
            let message = if lhs.type_name() == rhs.type_name() {
                format!("attempt to compare two {} values", lhs.type_name())
            } else {
                format!(
                    "attempt to compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                )
            };
            return Err(ScriptError::new(message));
        }
    };
    // NaN compares false both ways
    Ok(match (op, ordering) {
        (_, None) => false,
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
    })
}

fn concat(lhs: &Value, rhs: &Value) -> Result<Value, ScriptError> {
    match (lhs.to_str_coerced(), rhs.to_str_coerced()) {
        (Some(a), Some(b)) => {
            let mut out = String::with_capacity(a.len() + b.len());
            out.push_str(&a);
            out.push_str(&b);
            Ok(Value::from(out))
        }
        (None, _) => Err(concat_error(lhs)),
        (_, None) => Err(concat_error(rhs)),
    }
}

fn concat_error(culprit: &Value) -> ScriptError {
    ScriptError::new(format!(
        "attempt to concatenate a {} value",
        culprit.type_name()
    ))
}
