// Copyright 2026 the Call Gate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks for dispatch.
//!
//! Tracing is optional and `no_std` friendly. The dispatcher only emits
//! events requested by a [`TraceMask`]; enter/exit pairs are balanced on
//! every exit path, including traps.
//!
//! To enable tracing, pass a [`TraceMask`] and [`TraceSink`] to
//! [`Gate::dispatch_traced`].

#[cfg(doc)]
use crate::dispatch::Gate;

use crate::dispatch::CallError;
use crate::registry::FuncId;

/// A set of trace events requested by a [`TraceSink`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceMask(u32);

impl core::ops::BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for TraceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl TraceMask {
    /// No tracing.
    pub const NONE: Self = Self(0);
    /// Trace dispatched call frames.
    ///
    /// Enables:
    /// - [`TraceSink::frame_enter`]
    /// - [`TraceSink::frame_exit`]
    pub const FRAME: Self = Self(1 << 0);

    /// Returns `true` if this mask includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// Dispatch outcome for tracing.
#[derive(Copy, Clone, Debug)]
pub enum TraceOutcome<'a> {
    /// The call completed.
    Ok,
    /// The call failed.
    Fault(&'a CallError),
}

/// A trace sink that can receive dispatch events.
pub trait TraceSink {
    /// Returns the set of events the sink wants.
    fn mask(&self) -> TraceMask {
        TraceMask::NONE
    }

    /// Called after a frame is pushed for a dispatched call.
    ///
    /// Called only if `mask()` includes [`TraceMask::FRAME`].
    ///
    /// - `func`: registered function id
    /// - `name`: registered function name (diagnostics only)
    /// - `depth`: stack depth after entering the frame
    fn frame_enter(&mut self, _func: FuncId, _name: &str, _depth: usize) {}

    /// Called before the frame is popped, on every exit path.
    ///
    /// Called only if `mask()` includes [`TraceMask::FRAME`].
    ///
    /// - `func`: registered function id
    /// - `name`: registered function name (diagnostics only)
    /// - `depth`: stack depth before exiting the frame
    /// - `outcome`: whether the call completed or faulted
    fn frame_exit(&mut self, _func: FuncId, _name: &str, _depth: usize, _outcome: TraceOutcome<'_>) {
    }
}
