//! Value representation
//!
//! `Value` is what lives in register stack slots. `Nil` doubles as the
//! empty marker written into slots that fall above the stack top.

use crate::error::ScriptError;
use crate::function::FunctionRef;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a table
pub type TableRef = Rc<RefCell<Table>>;

/// Shared handle to a userdata object
pub type UserdataRef = Rc<Userdata>;

/// A script value
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value, also the cleared-slot marker
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Immutable shared string
    Str(Rc<str>),
    /// Table
    Table(TableRef),
    /// Callable function
    Function(FunctionRef),
    /// Opaque host object
    Userdata(UserdataRef),
}

impl Value {
    /// Create a string value
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Create a fresh empty table value
    pub fn new_table() -> Self {
        Value::Table(Table::new_ref())
    }

    /// Check for nil
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `nil` and `false` are falsy
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Name of the value's type as seen by scripts
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) => "userdata",
        }
    }

    /// Integer view: integers, and floats with an exact integer value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => float_to_int(*f),
            Value::Str(s) => parse_number(s).and_then(|v| v.as_int()),
            _ => None,
        }
    }

    /// Float view of any number (or numeric string)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => parse_number(s).and_then(|v| v.as_float()),
            _ => None,
        }
    }

    /// Borrow the string contents, without coercion
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// String coercion: strings as-is, numbers rendered, anything else `None`
    pub fn to_str_coerced(&self) -> Option<Rc<str>> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(Rc::from(i.to_string())),
            Value::Float(f) => Some(Rc::from(format_float(*f))),
            _ => None,
        }
    }

    /// Metatable attached to this value, if any
    pub fn metatable(&self) -> Option<TableRef> {
        match self {
            Value::Table(t) => t.borrow().metatable(),
            Value::Userdata(u) => u.metatable().cloned(),
            _ => None,
        }
    }

    pub(crate) fn identity(&self) -> usize {
        match self {
            Value::Table(t) => Rc::as_ptr(t) as *const () as usize,
            Value::Function(f) => Rc::as_ptr(f) as *const () as usize,
            Value::Userdata(u) => Rc::as_ptr(u) as *const () as usize,
            _ => 0,
        }
    }
}

/// Exact integer value of `f`; `None` if it has a fraction or lies outside `i64`
fn float_to_int(f: f64) -> Option<i64> {
    // 2^63 is representable as f64 but not as i64
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then(|| f as i64)
}

/// Parse a numeric string the way scripts coerce strings to numbers
pub fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Int(i));
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok().map(Value::Int);
    }
    s.parse::<f64>().ok().map(Value::Float)
}

/// Render a float like the script language does (`2.0`, `0.5`, `inf`)
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                float_to_int(*b) == Some(*a)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(_), Value::Table(_))
            | (Value::Function(_), Value::Function(_))
            | (Value::Userdata(_), Value::Userdata(_)) => self.identity() == other.identity(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Table(_) | Value::Function(_) | Value::Userdata(_) => {
                write!(f, "{}: {:#x}", self.type_name(), self.identity())
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Function(func) => write!(f, "function: {}", func.name()),
            other => write!(f, "{}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Value::Function(f)
    }
}

impl From<UserdataRef> for Value {
    fn from(u: UserdataRef) -> Self {
        Value::Userdata(u)
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Hashable table key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    /// Boolean key
    Bool(bool),
    /// Integer key (also integral floats)
    Int(i64),
    /// Non-integral float key, by bit pattern
    Float(u64),
    /// String key
    Str(Rc<str>),
}

impl TableKey {
    /// Convert a value to a key. `Ok(None)` for nil.
    pub fn from_value(value: &Value) -> Result<Option<TableKey>, ScriptError> {
        match value {
            Value::Nil => Ok(None),
            Value::Bool(b) => Ok(Some(TableKey::Bool(*b))),
            Value::Int(i) => Ok(Some(TableKey::Int(*i))),
            Value::Float(f) if f.is_nan() => Err(ScriptError::new("table index is NaN")),
            Value::Float(f) => Ok(Some(match Value::Float(*f).as_int() {
                Some(i) => TableKey::Int(i),
                None => TableKey::Float(f.to_bits()),
            })),
            Value::Str(s) => Ok(Some(TableKey::Str(s.clone()))),
            other => Err(ScriptError::new(format!(
                "unsupported table key (a {} value)",
                other.type_name()
            ))),
        }
    }
}

/// Key/value table with an optional metatable
#[derive(Default)]
pub struct Table {
    entries: FxHashMap<TableKey, Value>,
    metatable: Option<TableRef>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty shared table
    pub fn new_ref() -> TableRef {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Raw lookup (no metamethods)
    pub fn get(&self, key: &Value) -> Value {
        match TableKey::from_value(key) {
            Ok(Some(k)) => self.entries.get(&k).cloned().unwrap_or_default(),
            _ => Value::Nil,
        }
    }

    /// Raw lookup by string key
    pub fn get_str(&self, key: &str) -> Value {
        self.entries
            .get(&TableKey::Str(Rc::from(key)))
            .cloned()
            .unwrap_or_default()
    }

    /// Raw assignment. Assigning nil removes the entry.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), ScriptError> {
        let key = TableKey::from_value(&key)?.ok_or_else(|| ScriptError::new("table index is nil"))?;
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
        Ok(())
    }

    /// Raw assignment by string key
    pub fn set_str(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let key = TableKey::Str(Rc::from(key));
        if value.is_nil() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The metatable, if any
    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    /// Replace the metatable
    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }
}

// ============================================================================
// Userdata
// ============================================================================

/// Opaque host object exposed to scripts
pub struct Userdata {
    data: RefCell<Box<dyn Any>>,
    metatable: Option<TableRef>,
}

impl Userdata {
    /// Wrap a host object
    pub fn new<T: Any>(data: T, metatable: Option<TableRef>) -> UserdataRef {
        Rc::new(Self {
            data: RefCell::new(Box::new(data)),
            metatable,
        })
    }

    /// The metatable, if any
    pub fn metatable(&self) -> Option<&TableRef> {
        self.metatable.as_ref()
    }

    /// Check the concrete type of the wrapped object
    pub fn is<T: Any>(&self) -> bool {
        self.data.borrow().is::<T>()
    }

    /// Run `f` against the wrapped object if it has type `T`
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let data = self.data.borrow();
        data.downcast_ref::<T>().map(f)
    }

    /// Run `f` against the wrapped object mutably if it has type `T`
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut data = self.data.borrow_mut();
        data.downcast_mut::<T>().map(f)
    }
}

impl fmt::Debug for Userdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Userdata")
            .field("has_metatable", &self.metatable.is_some())
            .finish()
    }
}
