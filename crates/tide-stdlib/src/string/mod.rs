//! String library
//!
//! `gsub` and `format` can call back into scripts and are resumable; the
//! rest run to completion. Patterns use `regex` syntax throughout.

mod format;
mod gsub;

pub use format::{Format, FormatState};
pub use gsub::{Gsub, GsubState};

use crate::args::Args;
use regex::{Captures, Regex};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tide_engine::{
    CallFrame, CallResult, ExecutionContext, Function, FunctionRef, NativeFunction, ProtocolError,
    SavedState, ScriptError, Table, TableRef, Value,
};

/// Largest string `rep` will build
const MAX_STRING_LEN: usize = 1 << 31;

/// Compile a pattern, reporting syntax errors as script errors
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, ScriptError> {
    Regex::new(pattern).map_err(|e| ScriptError::new(format!("malformed pattern ({})", e)))
}

/// Values a match produces: the capture groups, or the whole match when
/// the pattern has none. Groups that did not take part are nil.
pub(crate) fn match_values(caps: &Captures<'_>) -> Vec<Value> {
    if caps.len() == 1 {
        return vec![caps.get(0).map(|m| Value::str(m.as_str())).unwrap_or_default()];
    }
    (1..caps.len())
        .map(|i| caps.get(i).map(|m| Value::str(m.as_str())).unwrap_or_default())
        .collect()
}

/// Translate a 1-based, possibly negative, string index into a byte offset
fn start_offset(index: i64, len: usize) -> usize {
    let len = len as i64;
    let index = if index > 0 {
        index
    } else if index == 0 || -index > len {
        1
    } else {
        len + index + 1
    };
    (index - 1).min(len) as usize
}

/// Inclusive end index, clamped to the string
fn end_offset(index: i64, len: usize) -> usize {
    let len = len as i64;
    let index = if index > len {
        len
    } else if index >= 0 {
        index
    } else if -index > len {
        0
    } else {
        len + index + 1
    };
    index as usize
}

fn bytes_to_value(bytes: &[u8]) -> Value {
    Value::from(String::from_utf8_lossy(bytes).into_owned())
}

fn len(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("len", args);
    let s = args.next_string()?;
    Ok(vec![Value::Int(s.len() as i64)])
}

fn lower(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("lower", args);
    let s = args.next_string()?;
    Ok(vec![Value::from(s.to_lowercase())])
}

fn upper(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("upper", args);
    let s = args.next_string()?;
    Ok(vec![Value::from(s.to_uppercase())])
}

fn reverse(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("reverse", args);
    let s = args.next_string()?;
    Ok(vec![Value::from(s.chars().rev().collect::<String>())])
}

fn rep(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("rep", args);
    let s = args.next_string()?;
    let n = args.next_int()?;
    let sep = args.opt_string()?.unwrap_or_else(|| Rc::from(""));
    if n <= 0 {
        return Ok(vec![Value::str("")]);
    }
    let n = n as usize;
    let total = s
        .len()
        .checked_add(sep.len())
        .and_then(|piece| piece.checked_mul(n))
        .filter(|total| *total < MAX_STRING_LEN)
        .ok_or_else(|| ScriptError::new("resulting string too large"))?;
    let mut out = String::with_capacity(total);
    for i in 0..n {
        if i > 0 {
            out.push_str(&sep);
        }
        out.push_str(&s);
    }
    Ok(vec![Value::from(out)])
}

fn sub(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("sub", args);
    let s = args.next_string()?;
    let i = args.opt_int(1)?;
    let j = args.opt_int(-1)?;
    let start = start_offset(i, s.len());
    let end = end_offset(j, s.len());
    if start >= end {
        return Ok(vec![Value::str("")]);
    }
    Ok(vec![bytes_to_value(&s.as_bytes()[start..end])])
}

fn find(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("find", args);
    let s = args.next_string()?;
    let pattern = args.next_string()?;
    let init = args.opt_int(1)?;
    let plain = args.next_opt().is_truthy();

    if init > s.len() as i64 + 1 {
        return Ok(vec![Value::Nil]);
    }
    let from = start_offset(init, s.len());
    if !s.is_char_boundary(from) {
        return Ok(vec![Value::Nil]);
    }

    if plain {
        return Ok(match s[from..].find(&*pattern) {
            Some(offset) => {
                let start = from + offset;
                vec![
                    Value::Int(start as i64 + 1),
                    Value::Int((start + pattern.len()) as i64),
                ]
            }
            None => vec![Value::Nil],
        });
    }

    let regex = compile_pattern(&pattern)?;
    let Some(caps) = regex.captures_at(&s, from) else {
        return Ok(vec![Value::Nil]);
    };
    let Some(whole) = caps.get(0) else {
        return Ok(vec![Value::Nil]);
    };
    let mut results = vec![
        Value::Int(whole.start() as i64 + 1),
        Value::Int(whole.end() as i64),
    ];
    if caps.len() > 1 {
        results.extend(match_values(&caps));
    }
    Ok(results)
}

/// `string.match`: the captures of the first match at or after `init`
fn first_match(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("match", args);
    let s = args.next_string()?;
    let pattern = compile_pattern(&args.next_string()?)?;
    let init = args.opt_int(1)?;
    if init > s.len() as i64 + 1 {
        return Ok(vec![Value::Nil]);
    }
    let from = start_offset(init, s.len());
    if !s.is_char_boundary(from) {
        return Ok(vec![Value::Nil]);
    }
    Ok(match pattern.captures_at(&s, from) {
        Some(caps) => match_values(&caps),
        None => vec![Value::Nil],
    })
}

/// `string.byte`: byte values of `s[i..=j]`
fn byte(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("byte", args);
    let s = args.next_string()?;
    let i = args.opt_int(1)?;
    let j = args.opt_int(i)?;
    let start = start_offset(i, s.len());
    let end = end_offset(j, s.len());
    if start >= end {
        return Ok(Vec::new());
    }
    Ok(s.as_bytes()[start..end]
        .iter()
        .map(|&b| Value::Int(i64::from(b)))
        .collect())
}

/// `string.char`: a string from byte values
fn chr(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("char", args);
    let mut bytes = Vec::new();
    while args.has_next() {
        let code = args.next_int()?;
        let b = u8::try_from(code).map_err(|_| args.bad_argument("value out of range"))?;
        bytes.push(b);
    }
    Ok(vec![bytes_to_value(&bytes)])
}

/// Iterator returned by `string.gmatch`.
///
/// Each call produces the next match, or nil once the subject is exhausted.
/// It never calls back into scripts, so it does not support resumption.
pub struct GmatchIter {
    subject: Rc<str>,
    pattern: Regex,
    pos: Cell<usize>,
    last_match: Cell<Option<usize>>,
}

impl GmatchIter {
    fn next_match(&self) -> Vec<Value> {
        while self.pos.get() <= self.subject.len() {
            let pos = self.pos.get();
            let Some(caps) = self.pattern.captures_at(&self.subject, pos) else {
                break;
            };
            let Some(whole) = caps.get(0) else {
                break;
            };
            if whole.start() == whole.end() && self.last_match.get() == Some(whole.end()) {
                match self.subject[pos..].chars().next() {
                    Some(c) => {
                        self.pos.set(pos + c.len_utf8());
                        continue;
                    }
                    None => break,
                }
            }
            self.pos.set(whole.end());
            self.last_match.set(Some(whole.end()));
            return match_values(&caps);
        }
        self.pos.set(self.subject.len() + 1);
        vec![Value::Nil]
    }
}

impl fmt::Debug for GmatchIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmatchIter")
            .field("pattern", &self.pattern.as_str())
            .field("pos", &self.pos.get())
            .finish()
    }
}

impl Function for GmatchIter {
    fn name(&self) -> &str {
        "gmatch_iterator"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let results = self.next_match();
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

fn gmatch(_: &mut ExecutionContext, args: Vec<Value>) -> Result<Vec<Value>, tide_engine::ExecError> {
    let mut args = Args::new("gmatch", args);
    let subject = args.next_string()?;
    let pattern = compile_pattern(&args.next_string()?)?;
    let iter: FunctionRef = Rc::new(GmatchIter {
        subject,
        pattern,
        pos: Cell::new(0),
        last_match: Cell::new(None),
    });
    Ok(vec![Value::Function(iter)])
}

/// Build the `string` table
pub fn library() -> TableRef {
    let lib = Table::new_ref();
    {
        let mut t = lib.borrow_mut();
        t.set_str("format", Rc::new(Format) as FunctionRef);
        t.set_str("gsub", Rc::new(Gsub) as FunctionRef);
        t.set_str("byte", NativeFunction::new("byte", byte));
        t.set_str("char", NativeFunction::new("char", chr));
        t.set_str("find", NativeFunction::new("find", find));
        t.set_str("gmatch", NativeFunction::new("gmatch", gmatch));
        t.set_str("len", NativeFunction::new("len", len));
        t.set_str("lower", NativeFunction::new("lower", lower));
        t.set_str("match", NativeFunction::new("match", first_match));
        t.set_str("rep", NativeFunction::new("rep", rep));
        t.set_str("reverse", NativeFunction::new("reverse", reverse));
        t.set_str("sub", NativeFunction::new("sub", sub));
        t.set_str("upper", NativeFunction::new("upper", upper));
    }
    lib
}

/// Install the `string` table into `env`
pub fn install(env: &TableRef) {
    env.borrow_mut().set_str("string", library());
}
