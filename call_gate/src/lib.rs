// Copyright 2026 the Call Gate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `call_gate`: the guest/host call boundary for an embedded bytecode VM.
//!
//! Guest bytecode and the embedding host call each other across a trust
//! boundary: guest code only ever names its own linear memory by offset,
//! and the host must never execute a call that corrupts its memory or
//! recurses without bound. This crate is that boundary — signature-driven
//! dispatch ([`dispatch::Gate`]), guest-pointer validation
//! ([`memory::validate`]), and a bounded call-stack guard
//! ([`stack::CallStack`]) that spans guest↔host re-entrancy.
//!
//! The interpreter's instruction loop, the platform layer, and the
//! build-time thunk generator are external collaborators; the gate consumes
//! a registration table and raw native function pointers, and exposes a
//! single dispatch entry point.
//!
//! ## Example
//!
//! ```
//! use call_gate::dispatch::{Gate, HostCtx, HostFault, Limits, NativeVal, ret_i32, slot_i32};
//! use call_gate::memory::LinearMemory;
//! use call_gate::registry::{FuncId, Registry, TableEntry};
//!
//! fn square(
//!     _ctx: &mut HostCtx<'_, '_>,
//!     args: &[NativeVal],
//! ) -> Result<Option<NativeVal>, HostFault> {
//!     match args {
//!         [NativeVal::I32(v)] => Ok(Some(NativeVal::I32(v * v))),
//!         _ => Err(HostFault::Failed),
//!     }
//! }
//!
//! let registry = Registry::load_table([TableEntry::new("square", "i:i", square)])?;
//! let mut gate = Gate::new(registry, LinearMemory::new(64 * 1024), Limits::default());
//!
//! let out = gate.dispatch(FuncId(0), &[slot_i32(7)]).unwrap();
//! assert_eq!(out.map(ret_i32), Some(49));
//! # Ok::<(), call_gate::registry::RegistryError>(())
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod dispatch;
pub mod memory;
pub mod registry;
pub mod sig;
pub mod stack;
pub mod trace;
