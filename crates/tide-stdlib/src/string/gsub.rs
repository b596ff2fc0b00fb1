//! `string.gsub`
//!
//! Table and function replacements call back into the script, so gsub can
//! be suspended between any two matches. Everything needed to carry on
//! (input position, match count, output so far) lives in [`GsubState`].

use super::{compile_pattern, match_values};
use crate::args::Args;
use regex::Regex;
use std::rc::Rc;
use tide_engine::{
    dispatch, restore, CallFrame, CallResult, ExecutionContext, Function, SavedState, ScriptError,
    Value, Window,
};

const NAME: &str = "gsub";

/// `string.gsub(s, pattern, repl [, n])`
#[derive(Debug, Default)]
pub struct Gsub;

/// Where a suspended substitution stopped
#[derive(Debug)]
pub struct GsubState {
    subject: Rc<str>,
    pattern: Regex,
    repl: Value,
    limit: i64,
    count: i64,
    pos: usize,
    last_match: Option<usize>,
    out: String,
    full_match: String,
}

impl GsubState {
    /// Number of substitutions made so far
    pub fn count(&self) -> i64 {
        self.count
    }

    /// Input offset the next match search starts at
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Output accumulated so far
    pub fn output(&self) -> &str {
        &self.out
    }

    /// Append the callback result found in `window[0]`
    fn collect(&mut self, ctx: &ExecutionContext, window: Window) -> Result<(), ScriptError> {
        let value = window.arg(&ctx.stack, 0);
        if let Some(s) = value.to_str_coerced() {
            self.out.push_str(&s);
        } else if !value.is_truthy() {
            self.out.push_str(&self.full_match);
        } else {
            return Err(ScriptError::new(format!(
                "invalid replacement value (a {})",
                value.type_name()
            )));
        }
        Ok(())
    }
}

impl Gsub {
    fn run(&self, ctx: &mut ExecutionContext, frame: &CallFrame, mut st: GsubState) -> CallResult {
        let subject = st.subject.clone();
        let pattern = st.pattern.clone();

        while st.count < st.limit {
            let Some(caps) = pattern.captures_at(&subject, st.pos) else {
                break;
            };
            let Some(whole) = caps.get(0) else {
                break;
            };

            // An empty match right where the previous one ended is skipped
            if whole.start() == whole.end() && st.last_match == Some(whole.end()) {
                match subject[st.pos..].chars().next() {
                    Some(c) => {
                        st.out.push(c);
                        st.pos += c.len_utf8();
                        continue;
                    }
                    None => break,
                }
            }

            st.count += 1;
            st.out.push_str(&subject[st.pos..whole.start()]);
            st.pos = whole.end();
            st.last_match = Some(whole.end());

            let captures = match_values(&caps);
            let repl = st.repl.clone();
            match repl {
                Value::Str(template) => {
                    expand(&template, whole.as_str(), &captures, &mut st.out);
                }
                callback => {
                    st.full_match = whole.as_str().to_string();
                    let result = if let Value::Table(_) = callback {
                        dispatch::index(ctx, &callback, &captures[0], frame.base)
                    } else {
                        frame.base.ret(&mut ctx.stack, &captures)?;
                        dispatch::call_value(ctx, &callback, frame.base)
                    };
                    match result {
                        Ok(()) => st.collect(ctx, frame.base)?,
                        Err(raise) => return Err(raise.resolve(frame, st)),
                    }
                }
            }
        }

        if st.pos < subject.len() {
            st.out.push_str(&subject[st.pos..]);
        }
        frame
            .base
            .ret(&mut ctx.stack, &[Value::from(st.out), Value::Int(st.count)])?;
        Ok(())
    }
}

/// Expand `%0`-`%9` and `%%` in a replacement string.
///
/// A capture index with no matching capture stands for the digit itself.
fn expand(template: &str, full_match: &str, captures: &[Value], out: &mut String) {
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push_str(full_match),
            Some(d @ '1'..='9') => {
                let index = d as usize - '1' as usize;
                match captures.get(index) {
                    Some(capture) => {
                        if let Some(s) = capture.to_str_coerced() {
                            out.push_str(&s);
                        }
                    }
                    None => out.push(d),
                }
            }
            Some(other) => out.push(other),
            None => out.push('%'),
        }
    }
}

impl Function for Gsub {
    fn name(&self) -> &str {
        NAME
    }

    fn invoke(&self, ctx: &mut ExecutionContext, frame: &CallFrame) -> CallResult {
        let mut args = Args::from_frame(NAME, ctx, frame);
        let subject = args.next_string()?;
        let pattern = compile_pattern(&args.next_string()?)?;
        let repl = match args.next_opt() {
            Value::Table(t) => Value::Table(t),
            Value::Function(f) => Value::Function(f),
            other => match other.to_str_coerced() {
                Some(s) => Value::Str(s),
                None => return Err(args.bad_argument_at(3, "string/function/table expected").into()),
            },
        };
        let limit = args.opt_int(i64::MAX)?;

        let state = GsubState {
            subject,
            pattern,
            repl,
            limit,
            count: 0,
            pos: 0,
            last_match: None,
            out: String::new(),
            full_match: String::new(),
        };
        self.run(ctx, frame, state)
    }

    fn resume(&self, ctx: &mut ExecutionContext, frame: &CallFrame, state: SavedState) -> CallResult {
        let mut state: GsubState = restore(state, frame)?;
        state.collect(ctx, frame.base)?;
        self.run(ctx, frame, state)
    }
}
