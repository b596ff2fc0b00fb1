//! Argument reading for library functions
//!
//! Library functions copy their arguments out of the call window before
//! doing anything else; the window is then free to be reused as the
//! callee window of any call they make.

use std::rc::Rc;
use tide_engine::{CallFrame, ExecutionContext, ScriptError, Value};

/// Cursor over a copied argument list
#[derive(Debug, Clone)]
pub struct Args {
    function: &'static str,
    values: Vec<Value>,
    pos: usize,
}

impl Args {
    /// Wrap arguments already copied out of a window
    pub fn new(function: &'static str, values: Vec<Value>) -> Self {
        Self {
            function,
            values,
            pos: 0,
        }
    }

    /// Copy the arguments out of `frame.base`
    pub fn from_frame(function: &'static str, ctx: &ExecutionContext, frame: &CallFrame) -> Self {
        Self::new(function, frame.base.values(&ctx.stack).to_vec())
    }

    /// Check if another argument is available
    pub fn has_next(&self) -> bool {
        self.pos < self.values.len()
    }

    /// 1-based index of the argument `next_*` would read
    pub fn position(&self) -> usize {
        self.pos + 1
    }

    /// Error for the argument at 1-based `index`
    pub fn bad_argument_at(&self, index: usize, detail: impl AsRef<str>) -> ScriptError {
        ScriptError::bad_argument(index, self.function, detail)
    }

    /// Error for the argument most recently read
    pub fn bad_argument(&self, detail: impl AsRef<str>) -> ScriptError {
        self.bad_argument_at(self.pos.max(1), detail)
    }

    fn type_error(&self, index: usize, expected: &str) -> ScriptError {
        let got = match self.values.get(index - 1) {
            Some(v) => v.type_name(),
            None => "no value",
        };
        self.bad_argument_at(index, format!("{} expected, got {}", expected, got))
    }

    /// Next argument of any type; missing arguments are an error
    pub fn next_any(&mut self) -> Result<Value, ScriptError> {
        let index = self.position();
        match self.values.get(self.pos) {
            Some(v) => {
                self.pos += 1;
                Ok(v.clone())
            }
            None => Err(self.bad_argument_at(index, "value expected")),
        }
    }

    /// Next argument, `Nil` when missing
    pub fn next_opt(&mut self) -> Value {
        let value = self.values.get(self.pos).cloned().unwrap_or_default();
        self.pos += 1;
        value
    }

    /// Next argument as a string; numbers are converted
    pub fn next_string(&mut self) -> Result<Rc<str>, ScriptError> {
        let index = self.position();
        let value = self.next_opt();
        value
            .to_str_coerced()
            .ok_or_else(|| self.type_error(index, "string"))
    }

    /// Next argument as an integer
    pub fn next_int(&mut self) -> Result<i64, ScriptError> {
        let index = self.position();
        let value = self.next_opt();
        match value.as_int() {
            Some(i) => Ok(i),
            None if value.as_float().is_some() => {
                Err(self.bad_argument_at(index, "number has no integer representation"))
            }
            None => Err(self.type_error(index, "number")),
        }
    }

    /// Next argument as a float
    pub fn next_float(&mut self) -> Result<f64, ScriptError> {
        let index = self.position();
        let value = self.next_opt();
        value.as_float().ok_or_else(|| self.type_error(index, "number"))
    }

    /// Next argument as an integer, `default` when missing or nil
    pub fn opt_int(&mut self, default: i64) -> Result<i64, ScriptError> {
        match self.values.get(self.pos) {
            None | Some(Value::Nil) => {
                self.pos += 1;
                Ok(default)
            }
            Some(_) => self.next_int(),
        }
    }

    /// Next argument as a string, `None` when missing or nil
    pub fn opt_string(&mut self) -> Result<Option<Rc<str>>, ScriptError> {
        match self.values.get(self.pos) {
            None | Some(Value::Nil) => {
                self.pos += 1;
                Ok(None)
            }
            Some(_) => self.next_string().map(Some),
        }
    }
}
