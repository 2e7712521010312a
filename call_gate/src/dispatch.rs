// Copyright 2026 the Call Gate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Thunk dispatcher: the boundary-crossing adapter between the guest's raw
//! slot calling convention and typed native entry points.
//!
//! The interpreter loop calls [`Gate::dispatch`] with a function id and a
//! buffer of raw 64-bit argument slots. The dispatcher looks up the
//! registered signature, pushes a frame on the call-stack guard, decodes
//! each argument per its tag (validating guest pointers against the
//! *current* memory extent), invokes the native entry point, pops the frame
//! on every exit path, and repacks the declared return value.
//!
//! Native functions receive a [`HostCtx`] through which they can re-enter
//! the dispatcher ([`HostCtx::call`]), access validated regions freshly
//! ([`HostCtx::region`]), and grow guest memory mid-call.
//!
//! ## Slot encoding
//!
//! Arguments and results travel as 64-bit slots. 64-bit values occupy the
//! whole slot; 32-bit values (including f32 bit patterns and guest-pointer
//! offsets) travel zero-extended in the low half, and a slot with any high
//! bit set for a 32-bit tag is rejected as malformed — the dispatcher never
//! narrows or widens implicitly.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::memory::{GuestPtr, LinearMemory, PtrError, ResolvedPtr};
use crate::registry::{FuncId, FunctionEntry, RegionLen, Registry};
use crate::sig::TypeTag;
use crate::stack::{CallStack, DEFAULT_MAX_DEPTH, Frame};
use crate::trace::{TraceMask, TraceOutcome, TraceSink};

/// Dispatch limits for one interpreter instance.
#[derive(Clone, Debug)]
pub struct Limits {
    /// Maximum call depth (frames), counting guest→host→guest re-entrancy.
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A fully resolved native-representation argument or return value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NativeVal {
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Validated guest region; `None` is a nullable pointer passed as null.
    ///
    /// As a return value the descriptor is taken at face value (the offset
    /// goes back to the guest, which revalidates on its own next use).
    Ptr(Option<ResolvedPtr>),
}

impl NativeVal {
    /// Returns the corresponding type tag.
    #[must_use]
    pub fn tag(self) -> TypeTag {
        match self {
            Self::I32(_) => TypeTag::I32,
            Self::I64(_) => TypeTag::I64,
            Self::F32(_) => TypeTag::F32,
            Self::F64(_) => TypeTag::F64,
            Self::Ptr(_) => TypeTag::GuestPtr,
        }
    }
}

/// A native entry point.
///
/// The signature table and the function pointer come from the build-time
/// generation step; the dispatcher guarantees `args` matches the registered
/// signature (pointer arguments already validated) before this runs.
pub type NativeFn =
    fn(&mut HostCtx<'_, '_>, &[NativeVal]) -> Result<Option<NativeVal>, HostFault>;

/// A failure raised by a native function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostFault {
    /// The native function failed without further detail.
    Failed,
    /// A numeric failure code for the guest's trap reporting.
    Code(u32),
    /// A human-readable failure message.
    Message(String),
    /// A failure from deeper in the call chain ([`HostCtx::call`]),
    /// propagated through this native frame unchanged.
    ///
    /// The dispatcher unwraps this while unwinding, so e.g. a stack
    /// overflow three re-entries down still surfaces as
    /// [`CallError::StackOverflow`] at the outermost caller.
    Nested(Box<CallError>),
}

impl From<CallError> for HostFault {
    fn from(e: CallError) -> Self {
        Self::Nested(Box::new(e))
    }
}

impl fmt::Display for HostFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => write!(f, "native function failed"),
            Self::Code(c) => write!(f, "native function failed (code {c})"),
            Self::Message(m) => write!(f, "native function failed: {m}"),
            Self::Nested(e) => write!(f, "nested call failed: {e}"),
        }
    }
}

impl core::error::Error for HostFault {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Nested(e) => Some(&**e),
            _ => None,
        }
    }
}

/// Call-time errors.
///
/// Every kind aborts only the in-flight call: the dispatcher unwinds through
/// each pushed frame (every pop still executes) and leaves registry, guard,
/// and memory usable for subsequent, unrelated calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallError {
    /// No function registered under this id.
    UnknownFunction(FuncId),
    /// The call-depth bound was reached; no native call was attempted.
    StackOverflow {
        /// Depth at the rejected push (equals the bound).
        depth: usize,
    },
    /// Argument buffer length does not match the registered parameter count.
    ArityMismatch {
        /// Registered parameter count.
        expected: u32,
        /// Slots provided.
        actual: u32,
    },
    /// A 32-bit tag's slot had high bits set.
    MalformedArgument {
        /// Offending parameter index.
        index: usize,
    },
    /// A guest-pointer argument failed validation (null-when-required,
    /// out-of-bounds, or overflowing offset+length).
    InvalidPointer {
        /// Offending parameter index.
        index: usize,
        /// Underlying validation failure.
        cause: PtrError,
    },
    /// The native function returned the wrong number of values.
    ReturnArityMismatch {
        /// Declared return count (0 or 1).
        expected: u32,
        /// Returned count.
        actual: u32,
    },
    /// The native function returned a value of the wrong kind.
    ReturnTypeMismatch {
        /// Declared return tag.
        expected: TypeTag,
        /// Returned value's tag.
        actual: TypeTag,
    },
    /// The native function itself failed.
    Host(HostFault),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFunction(id) => write!(f, "unknown function {id}"),
            Self::StackOverflow { depth } => {
                write!(f, "call stack overflow at depth {depth}")
            }
            Self::ArityMismatch { expected, actual } => {
                write!(f, "arity mismatch (expected {expected} args, got {actual})")
            }
            Self::MalformedArgument { index } => {
                write!(f, "malformed argument {index} (high bits set on 32-bit slot)")
            }
            Self::InvalidPointer { index, cause } => {
                write!(f, "invalid pointer argument {index}: {cause}")
            }
            Self::ReturnArityMismatch { expected, actual } => {
                write!(
                    f,
                    "return arity mismatch (expected {expected} values, got {actual})"
                )
            }
            Self::ReturnTypeMismatch { expected, actual } => {
                write!(f, "return type mismatch (expected {expected}, got {actual})")
            }
            Self::Host(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for CallError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::InvalidPointer { cause, .. } => Some(cause),
            Self::Host(e) => Some(e),
            _ => None,
        }
    }
}

/// Packs an `i32` into a raw argument slot.
#[must_use]
pub fn slot_i32(v: i32) -> u64 {
    u64::from(v as u32)
}

/// Packs an `i64` into a raw argument slot.
#[must_use]
pub fn slot_i64(v: i64) -> u64 {
    v as u64
}

/// Packs an `f32` bit pattern into a raw argument slot.
#[must_use]
pub fn slot_f32(v: f32) -> u64 {
    u64::from(v.to_bits())
}

/// Packs an `f64` bit pattern into a raw argument slot.
#[must_use]
pub fn slot_f64(v: f64) -> u64 {
    v.to_bits()
}

/// Packs a guest pointer into a raw argument slot.
#[must_use]
pub fn slot_ptr(p: GuestPtr) -> u64 {
    u64::from(p.0)
}

/// Unpacks an `i32` result slot.
#[must_use]
pub fn ret_i32(slot: u64) -> i32 {
    slot as u32 as i32
}

/// Unpacks an `i64` result slot.
#[must_use]
pub fn ret_i64(slot: u64) -> i64 {
    slot as i64
}

/// Unpacks an `f32` result slot.
#[must_use]
pub fn ret_f32(slot: u64) -> f32 {
    f32::from_bits(slot as u32)
}

/// Unpacks an `f64` result slot.
#[must_use]
pub fn ret_f64(slot: u64) -> f64 {
    f64::from_bits(slot)
}

/// Unpacks a guest-pointer result slot.
#[must_use]
pub fn ret_ptr(slot: u64) -> GuestPtr {
    GuestPtr(slot as u32)
}

/// The per-instance call gate: registry, linear memory, and call-stack
/// guard.
///
/// One `Gate` per interpreter instance; instances running on separate
/// threads each own their gate outright, so no cross-instance
/// synchronization exists. Dispatch is synchronous and runs to completion.
pub struct Gate {
    registry: Registry,
    mem: LinearMemory,
    stack: CallStack,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("functions", &self.registry.len())
            .field("mem_len", &self.mem.len())
            .field("depth", &self.stack.depth())
            .finish_non_exhaustive()
    }
}

impl Gate {
    /// Creates a gate over a loaded registry and guest memory.
    #[must_use]
    pub fn new(registry: Registry, mem: LinearMemory, limits: Limits) -> Self {
        Self {
            registry,
            mem,
            stack: CallStack::new(limits.max_call_depth),
        }
    }

    /// Dispatches the registered function `id` with raw argument slots.
    ///
    /// This is the call entry point exposed to the interpreter loop. Returns
    /// the packed result slot for value-returning signatures, `None` for
    /// void.
    pub fn dispatch(&mut self, id: FuncId, args: &[u64]) -> Result<Option<u64>, CallError> {
        self.dispatch_traced(id, args, TraceMask::NONE, None)
    }

    /// [`Gate::dispatch`] with tracing.
    ///
    /// Tracing is controlled by `mask`; pass `None` for `trace` to disable.
    pub fn dispatch_traced(
        &mut self,
        id: FuncId,
        args: &[u64],
        mask: TraceMask,
        mut trace: Option<&mut dyn TraceSink>,
    ) -> Result<Option<u64>, CallError> {
        dispatch_inner(
            &self.registry,
            &mut self.mem,
            &mut self.stack,
            mask,
            &mut trace,
            id,
            args,
        )
    }

    /// The loaded registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Guest memory.
    #[must_use]
    pub fn memory(&self) -> &LinearMemory {
        &self.mem
    }

    /// Guest memory, mutably (e.g. to seed test fixtures or grow).
    pub fn memory_mut(&mut self) -> &mut LinearMemory {
        &mut self.mem
    }

    /// The call-stack guard (diagnostics: depth, active frames).
    #[must_use]
    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    /// Swaps in a new guest memory, returning the old one.
    ///
    /// Models the memory manager replacing the extent wholesale (a grow that
    /// relocates the base); translations made before the swap are invalid.
    pub fn replace_memory(&mut self, mem: LinearMemory) -> LinearMemory {
        core::mem::replace(&mut self.mem, mem)
    }
}

/// Context handed to native functions for the duration of one call.
///
/// Everything here is a fresh borrow per call: regions are translated
/// against the current extent on every access, never cached.
pub struct HostCtx<'a, 't> {
    registry: &'a Registry,
    mem: &'a mut LinearMemory,
    stack: &'a mut CallStack,
    mask: TraceMask,
    trace: &'a mut Option<&'t mut dyn TraceSink>,
}

impl<'a, 't> HostCtx<'a, 't> {
    /// Re-enters the dispatcher from native code.
    ///
    /// A guest→host→guest→host chain pushes further frames on the same
    /// guard; the depth bound applies across the whole chain.
    pub fn call(&mut self, id: FuncId, args: &[u64]) -> Result<Option<u64>, CallError> {
        dispatch_inner(
            self.registry,
            self.mem,
            self.stack,
            self.mask,
            self.trace,
            id,
            args,
        )
    }

    /// Translates a validated region descriptor against the current extent.
    pub fn region(&self, p: ResolvedPtr) -> Result<&[u8], PtrError> {
        self.mem.region(p)
    }

    /// Mutable variant of [`HostCtx::region`].
    pub fn region_mut(&mut self, p: ResolvedPtr) -> Result<&mut [u8], PtrError> {
        self.mem.region_mut(p)
    }

    /// Guest memory.
    #[must_use]
    pub fn memory(&self) -> &LinearMemory {
        self.mem
    }

    /// Guest memory, mutably. Growth here invalidates any host address
    /// obtained earlier in the call; go back through [`HostCtx::region`].
    pub fn memory_mut(&mut self) -> &mut LinearMemory {
        self.mem
    }

    /// Current call depth, including this call's frame.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }
}

fn dispatch_inner(
    registry: &Registry,
    mem: &mut LinearMemory,
    stack: &mut CallStack,
    mask: TraceMask,
    trace: &mut Option<&mut dyn TraceSink>,
    id: FuncId,
    args: &[u64],
) -> Result<Option<u64>, CallError> {
    let entry = registry.lookup(id).ok_or(CallError::UnknownFunction(id))?;

    stack
        .push(Frame { func: id })
        .map_err(|e| CallError::StackOverflow { depth: e.depth })?;

    if mask.contains(TraceMask::FRAME)
        && let Some(t) = trace.as_mut()
    {
        let t: &mut dyn TraceSink = &mut **t;
        t.frame_enter(id, entry.name(), stack.depth());
    }

    // The frame is pushed; from here every path must reach the pop below.
    let result = run_call(entry, registry, mem, stack, mask, trace, args);

    if mask.contains(TraceMask::FRAME)
        && let Some(t) = trace.as_mut()
    {
        let outcome = match &result {
            Ok(_) => TraceOutcome::Ok,
            Err(e) => TraceOutcome::Fault(e),
        };
        let t: &mut dyn TraceSink = &mut **t;
        t.frame_exit(id, entry.name(), stack.depth(), outcome);
    }

    stack.pop();
    result
}

fn run_call(
    entry: &FunctionEntry,
    registry: &Registry,
    mem: &mut LinearMemory,
    stack: &mut CallStack,
    mask: TraceMask,
    trace: &mut Option<&mut dyn TraceSink>,
    args: &[u64],
) -> Result<Option<u64>, CallError> {
    let params = entry.sig().params();
    if args.len() != params.len() {
        return Err(CallError::ArityMismatch {
            expected: u32::try_from(params.len()).unwrap_or(u32::MAX),
            actual: u32::try_from(args.len()).unwrap_or(u32::MAX),
        });
    }

    let mut natives: Vec<NativeVal> = Vec::with_capacity(params.len());
    for (ix, (&tag, &raw)) in params.iter().zip(args).enumerate() {
        natives.push(decode_arg(entry, ix, tag, raw, args, mem)?);
    }

    let mut ctx = HostCtx {
        registry,
        mem,
        stack,
        mask,
        trace,
    };
    let ret = (entry.native())(&mut ctx, &natives).map_err(|e| match e {
        // A failure from a nested re-entrant call keeps its kind while
        // unwinding through intermediate native frames.
        HostFault::Nested(inner) => *inner,
        other => CallError::Host(other),
    })?;

    pack_return(entry.sig().ret(), ret)
}

fn decode_arg(
    entry: &FunctionEntry,
    ix: usize,
    tag: TypeTag,
    raw: u64,
    args: &[u64],
    mem: &LinearMemory,
) -> Result<NativeVal, CallError> {
    let narrow = || {
        if raw >> 32 == 0 {
            Ok(raw as u32)
        } else {
            Err(CallError::MalformedArgument { index: ix })
        }
    };
    match tag {
        TypeTag::I32 => Ok(NativeVal::I32(narrow()? as i32)),
        TypeTag::I64 => Ok(NativeVal::I64(raw as i64)),
        TypeTag::F32 => Ok(NativeVal::F32(f32::from_bits(narrow()?))),
        TypeTag::F64 => Ok(NativeVal::F64(f64::from_bits(raw))),
        TypeTag::GuestPtr => {
            let ptr = GuestPtr(narrow()?);
            let policy = entry.ptr_policy(ix);
            if ptr.is_null() {
                if policy.nullable {
                    return Ok(NativeVal::Ptr(None));
                }
                // Surfaced before translation for a clearer diagnostic than
                // a generic bounds failure.
                return Err(CallError::InvalidPointer {
                    index: ix,
                    cause: PtrError::NullRequired,
                });
            }
            let len = match policy.len {
                RegionLen::Bytes(n) => n,
                // Registration checked the index targets an i32 parameter;
                // arity was checked above, so the slot exists.
                RegionLen::Arg(j) => args[j] as u32,
            };
            let resolved = mem
                .validate(ptr, len, policy.allow_empty)
                .map_err(|cause| CallError::InvalidPointer { index: ix, cause })?;
            Ok(NativeVal::Ptr(Some(resolved)))
        }
    }
}

fn pack_return(
    declared: Option<TypeTag>,
    got: Option<NativeVal>,
) -> Result<Option<u64>, CallError> {
    match (declared, got) {
        (None, None) => Ok(None),
        (Some(tag), Some(v)) => {
            if v.tag() != tag {
                return Err(CallError::ReturnTypeMismatch {
                    expected: tag,
                    actual: v.tag(),
                });
            }
            Ok(Some(encode_ret(v)))
        }
        (None, Some(_)) => Err(CallError::ReturnArityMismatch {
            expected: 0,
            actual: 1,
        }),
        (Some(_), None) => Err(CallError::ReturnArityMismatch {
            expected: 1,
            actual: 0,
        }),
    }
}

fn encode_ret(v: NativeVal) -> u64 {
    match v {
        NativeVal::I32(x) => u64::from(x as u32),
        NativeVal::I64(x) => x as u64,
        NativeVal::F32(x) => u64::from(x.to_bits()),
        NativeVal::F64(x) => x.to_bits(),
        NativeVal::Ptr(Some(r)) => u64::from(r.offset),
        NativeVal::Ptr(None) => 0,
    }
}
