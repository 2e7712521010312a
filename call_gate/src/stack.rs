// Copyright 2026 the Call Gate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounded call-stack guard.
//!
//! One guard per interpreter instance, never shared across instances or
//! threads. Re-entrant guest→host→guest chains push multiple frames on the
//! same guard in strict call order; the bound exists to fail fast before
//! native call-stack exhaustion would crash the process.
//!
//! A pop at depth zero indicates a push/pop pairing bug in the dispatcher
//! and is fatal (it panics), not a recoverable error.

use alloc::vec::Vec;
use core::fmt;

use crate::registry::FuncId;

/// Default frame capacity, matching the interpreter's call-depth limit.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// One active call frame. Function identity only; richer diagnostics hang
/// off the registry via the id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Registered function id for this frame.
    pub func: FuncId,
}

/// A bounded stack of active call frames.
#[derive(Clone, Debug)]
pub struct CallStack {
    frames: Vec<Frame>,
    max_depth: usize,
}

impl CallStack {
    /// Creates an empty guard with the given depth bound.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::with_capacity(max_depth),
            max_depth,
        }
    }

    /// Current depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Configured depth bound.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Active frames, oldest first.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Pushes a frame, failing at the depth bound with state unchanged.
    pub fn push(&mut self, frame: Frame) -> Result<(), DepthExceeded> {
        if self.frames.len() >= self.max_depth {
            return Err(DepthExceeded {
                depth: self.frames.len(),
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pops the most recent frame.
    ///
    /// # Panics
    ///
    /// Panics at depth zero. Every pop must pair with a prior successful
    /// push; an empty stack here means the dispatcher's pairing is broken,
    /// and continuing would leak depth into unrelated calls.
    pub fn pop(&mut self) -> Frame {
        match self.frames.pop() {
            Some(f) => f,
            None => panic!("call stack pop at depth zero (unbalanced push/pop)"),
        }
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

/// Error for a push rejected at the configured depth bound.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DepthExceeded {
    /// Depth at the time of the rejected push (equals the bound).
    pub depth: usize,
}

impl fmt::Display for DepthExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call depth bound reached at depth {}", self.depth)
    }
}

impl core::error::Error for DepthExceeded {}
