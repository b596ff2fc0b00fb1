//! Register stack shared by every frame of an execution context
//!
//! A single fixed-capacity array of values plus a cursor (`top`). Call
//! frames do not own register storage: each frame gets a `Window`, an
//! offset into this array, and addresses its registers relative to it.
//! Calling a function is therefore a cursor adjustment, not an allocation.
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────────────────────────────────┐  ← capacity
//! │ (cleared, Nil)                         │
//! ├────────────────────────────────────────┤  ← top
//! │ callee window: args / results          │
//! ├────────────────────────────────────────┤  ← callee offset
//! │ caller registers r0..rN                │
//! └────────────────────────────────────────┘  ← caller offset (0 for the entry call)
//! ```
//!
//! Every slot at or above `top` holds `Value::Nil`: lowering the cursor
//! clears the dropped slots before it moves.

use crate::error::StackError;
use crate::value::Value;

/// Fixed-capacity value array with a cursor
#[derive(Debug)]
pub struct RegisterStack {
    slots: Box<[Value]>,
    top: usize,
}

impl RegisterStack {
    /// Create a register stack holding `capacity` slots
    pub fn new(capacity: usize) -> Result<Self, StackError> {
        if capacity == 0 {
            return Err(StackError::InvalidCapacity(capacity));
        }
        Ok(Self {
            slots: vec![Value::Nil; capacity].into_boxed_slice(),
            top: 0,
        })
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Current cursor
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    /// Check if nothing is on the stack
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    /// Move the cursor. Lowering it clears every slot in `[to, top)`.
    pub fn set_top(&mut self, to: usize) -> Result<(), StackError> {
        if to > self.slots.len() {
            return Err(StackError::OutOfRange {
                requested: to,
                capacity: self.slots.len(),
            });
        }
        if to < self.top {
            for slot in &mut self.slots[to..self.top] {
                *slot = Value::Nil;
            }
        }
        self.top = to;
        Ok(())
    }

    /// Append `values` at the cursor, atomically
    pub fn push(&mut self, values: &[Value]) -> Result<(), StackError> {
        let available = self.slots.len() - self.top;
        if values.len() > available {
            return Err(StackError::InsufficientSpace {
                requested: values.len(),
                available,
            });
        }
        self.slots[self.top..self.top + values.len()].clone_from_slice(values);
        self.top += values.len();
        Ok(())
    }

    /// Read slot `index`.
    ///
    /// Bounds are the caller's responsibility; an index beyond capacity panics.
    #[inline]
    pub fn get(&self, index: usize) -> &Value {
        &self.slots[index]
    }

    /// Write slot `index`.
    ///
    /// Bounds are the caller's responsibility; an index beyond capacity panics.
    #[inline]
    pub fn set(&mut self, index: usize, value: Value) {
        self.slots[index] = value;
    }

    /// Move the value out of slot `index`, leaving `Nil`
    #[inline]
    pub fn take(&mut self, index: usize) -> Value {
        std::mem::take(&mut self.slots[index])
    }

    /// Slots `[from, to)`
    #[inline]
    pub fn slice(&self, from: usize, to: usize) -> &[Value] {
        &self.slots[from..to]
    }

    /// Truncate the stack to `base` and return a window anchored there.
    ///
    /// This is how a caller reserves register space for a callee.
    pub fn window(&mut self, base: usize) -> Result<Window, StackError> {
        self.set_top(base)?;
        Ok(Window { offset: base })
    }

    /// Truncate the whole stack and return the window at offset 0
    pub fn root(&mut self) -> Window {
        for slot in &mut self.slots[..self.top] {
            *slot = Value::Nil;
        }
        self.top = 0;
        Window { offset: 0 }
    }
}

/// Relative view into the register stack, used as a frame's register file
///
/// A window is only an offset; all accessors take the stack explicitly.
/// Nothing prevents two windows from aliasing. By convention a callee only
/// addresses indices at or above its own offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    offset: usize,
}

impl Window {
    /// Re-anchor a window at an absolute offset without touching the stack.
    ///
    /// Used when resuming a frame whose registers are still in place.
    #[inline]
    pub fn at(offset: usize) -> Self {
        Self { offset }
    }

    /// Absolute offset into the register stack
    #[inline]
    pub fn offset(self) -> usize {
        self.offset
    }

    /// A window shifted `extra` slots further in, sharing the same stack
    #[inline]
    pub fn from(self, extra: usize) -> Window {
        Window {
            offset: self.offset + extra,
        }
    }

    /// Slots addressable through this window (`capacity - offset`)
    #[inline]
    pub fn size(self, stack: &RegisterStack) -> usize {
        stack.capacity().saturating_sub(self.offset)
    }

    /// Local top; zero when the stack top lies below this window
    #[inline]
    pub fn top(self, stack: &RegisterStack) -> usize {
        stack.top().saturating_sub(self.offset)
    }

    /// Move the cursor to `offset + n`, clearing when shrinking
    #[inline]
    pub fn set_top(self, stack: &mut RegisterStack, n: usize) -> Result<(), StackError> {
        stack.set_top(self.offset + n)
    }

    /// Read local register `i`
    #[inline]
    pub fn get(self, stack: &RegisterStack, i: usize) -> &Value {
        stack.get(self.offset + i)
    }

    /// Write local register `i`
    #[inline]
    pub fn set(self, stack: &mut RegisterStack, i: usize, value: Value) {
        stack.set(self.offset + i, value)
    }

    /// Move local register `i` out, leaving `Nil`
    #[inline]
    pub fn take(self, stack: &mut RegisterStack, i: usize) -> Value {
        stack.take(self.offset + i)
    }

    /// Local register `i` if it lies below the local top, else `Nil`
    pub fn arg(self, stack: &RegisterStack, i: usize) -> Value {
        if i < self.top(stack) {
            self.get(stack, i).clone()
        } else {
            Value::Nil
        }
    }

    /// Append one value at the local top
    pub fn push(self, stack: &mut RegisterStack, value: Value) -> Result<(), StackError> {
        let top = self.top(stack);
        if top >= self.size(stack) {
            return Err(StackError::InsufficientSpace {
                requested: 1,
                available: 0,
            });
        }
        self.set(stack, top, value);
        stack.set_top(self.offset + top + 1)
    }

    /// Append several values at the local top, atomically
    pub fn push_all(self, stack: &mut RegisterStack, values: &[Value]) -> Result<(), StackError> {
        if stack.top() < self.offset {
            stack.set_top(self.offset)?;
        }
        stack.push(values)
    }

    /// The values in `[0, top)`: arguments on entry, results on return
    pub fn values(self, stack: &RegisterStack) -> &[Value] {
        let top = self.top(stack);
        stack.slice(self.offset, self.offset + top)
    }

    /// Replace the window contents with `values` (the frame's results)
    pub fn ret(self, stack: &mut RegisterStack, values: &[Value]) -> Result<(), StackError> {
        self.set_top(stack, 0)?;
        stack.push(values)
    }

    /// Take the results a callee left in `callee` as this frame's results.
    ///
    /// `callee` must lie at or above this window.
    pub fn return_from(self, stack: &mut RegisterStack, callee: Window) -> Result<(), StackError> {
        debug_assert!(callee.offset >= self.offset);
        let count = callee.top(stack);
        if callee.offset != self.offset {
            for i in 0..count {
                let value = callee.take(stack, i);
                self.set(stack, i, value);
            }
        }
        self.set_top(stack, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&i| Value::Int(i)).collect()
    }

    #[test]
    fn test_invalid_capacity() {
        assert_eq!(
            RegisterStack::new(0).unwrap_err(),
            StackError::InvalidCapacity(0)
        );
    }

    #[test]
    fn test_push_shrink_push_scenario() {
        let mut stack = RegisterStack::new(10).unwrap();

        stack.push(&ints(&[1, 2, 3])).unwrap();
        assert_eq!(stack.top(), 3);

        stack.set_top(1).unwrap();
        assert_eq!(stack.top(), 1);
        assert!(stack.get(1).is_nil());
        assert!(stack.get(2).is_nil());
        assert_eq!(stack.get(0), &Value::Int(1));

        // Space check uses the new top
        stack.push(&ints(&[4, 5, 6, 7, 8])).unwrap();
        assert_eq!(stack.top(), 6);

        let err = stack.push(&ints(&[0; 10])).unwrap_err();
        assert_eq!(
            err,
            StackError::InsufficientSpace {
                requested: 10,
                available: 4
            }
        );
        // Failed push leaves the stack untouched
        assert_eq!(stack.top(), 6);
    }

    #[test]
    fn test_set_top_out_of_range() {
        let mut stack = RegisterStack::new(4).unwrap();
        assert!(stack.set_top(4).is_ok());
        assert_eq!(
            stack.set_top(5).unwrap_err(),
            StackError::OutOfRange {
                requested: 5,
                capacity: 4
            }
        );
    }

    #[test]
    fn test_clearing_on_shrink_for_every_cut() {
        for cut in 0..8 {
            let mut stack = RegisterStack::new(8).unwrap();
            stack.push(&ints(&[10, 11, 12, 13, 14, 15, 16, 17])).unwrap();
            stack.set_top(cut).unwrap();
            for i in cut..8 {
                assert!(stack.get(i).is_nil(), "slot {} survived cut {}", i, cut);
            }
            for i in 0..cut {
                assert_eq!(stack.get(i), &Value::Int(10 + i as i64));
            }
        }
    }

    #[test]
    fn test_window_aliasing() {
        let capacity = 16;
        for offset in 0..capacity {
            let mut stack = RegisterStack::new(capacity).unwrap();
            let w = stack.window(offset).unwrap();
            assert_eq!(w.size(&stack), capacity - offset);
            for i in 0..(capacity - offset) {
                w.set(&mut stack, i, Value::Int(i as i64));
                assert_eq!(stack.get(offset + i), &Value::Int(i as i64));
                stack.set(offset + i, Value::Int(-(i as i64)));
                assert_eq!(w.get(&stack, i), &Value::Int(-(i as i64)));
            }
        }
    }

    #[test]
    fn test_window_truncates_stack() {
        let mut stack = RegisterStack::new(8).unwrap();
        stack.push(&ints(&[1, 2, 3, 4, 5])).unwrap();
        let w = stack.window(2).unwrap();
        assert_eq!(stack.top(), 2);
        assert_eq!(w.top(&stack), 0);
        assert!(stack.get(2).is_nil());
        assert!(stack.get(4).is_nil());
    }

    #[test]
    fn test_nested_window_from() {
        let mut stack = RegisterStack::new(8).unwrap();
        let outer = stack.window(1).unwrap();
        let inner = outer.from(3);
        assert_eq!(inner.offset(), 4);
        assert_eq!(inner.size(&stack), 4);

        inner.push(&mut stack, Value::Int(9)).unwrap();
        assert_eq!(stack.top(), 5);
        assert_eq!(outer.top(&stack), 4);
        assert_eq!(outer.get(&stack, 3), &Value::Int(9));
    }

    #[test]
    fn test_window_top_never_negative() {
        let mut stack = RegisterStack::new(8).unwrap();
        let w = stack.root().from(5);
        assert_eq!(w.top(&stack), 0);
        assert!(w.values(&stack).is_empty());
    }

    #[test]
    fn test_window_push_full() {
        let mut stack = RegisterStack::new(3).unwrap();
        let w = stack.window(1).unwrap();
        w.push(&mut stack, Value::Int(1)).unwrap();
        w.push(&mut stack, Value::Int(2)).unwrap();
        assert!(w.push(&mut stack, Value::Int(3)).is_err());
        assert_eq!(w.values(&stack), &ints(&[1, 2])[..]);
    }

    #[test]
    fn test_return_from_moves_results_down() {
        let mut stack = RegisterStack::new(10).unwrap();
        let caller = stack.root();
        caller.push_all(&mut stack, &ints(&[7, 7, 7])).unwrap();
        let callee = caller.from(3);
        callee.push_all(&mut stack, &ints(&[1, 2])).unwrap();

        caller.return_from(&mut stack, callee).unwrap();
        assert_eq!(caller.values(&stack), &ints(&[1, 2])[..]);
        assert!(stack.get(3).is_nil());
        assert!(stack.get(4).is_nil());
    }

    #[test]
    fn test_ret_replaces_contents() {
        let mut stack = RegisterStack::new(6).unwrap();
        let w = stack.window(2).unwrap();
        w.push_all(&mut stack, &ints(&[1, 2, 3])).unwrap();
        w.ret(&mut stack, &[Value::str("done")]).unwrap();
        assert_eq!(w.values(&stack), &[Value::str("done")][..]);
        assert_eq!(stack.top(), 3);
    }
}
