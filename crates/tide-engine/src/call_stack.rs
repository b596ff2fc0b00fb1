//! Pending work of a paused execution
//!
//! A LIFO of captured frames. The last element is the next frame to resume.

use crate::continuation::SuspendedFrame;

/// Frames waiting to be resumed
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<SuspendedFrame>,
}

impl CallStack {
    /// Create an empty call stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame to run next
    pub fn push(&mut self, frame: SuspendedFrame) {
        self.frames.push(frame);
    }

    /// Take the next frame to resume
    pub fn pop(&mut self) -> Option<SuspendedFrame> {
        self.frames.pop()
    }

    /// Prepend a captured chain, given innermost first.
    ///
    /// The innermost frame ends up on top, so it is resumed first and its
    /// callers follow in order.
    pub fn splice<I>(&mut self, frames: I)
    where
        I: IntoIterator<Item = SuspendedFrame>,
        I::IntoIter: DoubleEndedIterator,
    {
        self.frames.extend(frames.into_iter().rev());
    }

    /// Frames in resumption order
    pub fn iter(&self) -> impl Iterator<Item = &SuspendedFrame> {
        self.frames.iter().rev()
    }

    /// Number of pending frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drop every pending frame
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
