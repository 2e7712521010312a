// Copyright 2026 the Call Gate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Signature registry: stable function ids mapped to signatures and native
//! entry points.
//!
//! Registration happens once at module load and is append-only; no entry is
//! mutated or removed while calls may be in flight. Names are metadata for
//! diagnostics only — duplicate names with differing signatures are
//! permitted (overloading by signature identity), and only the [`FuncId`]
//! is used by the dispatcher. Exact `(name, signature)` duplicates are
//! rejected at load time.

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::dispatch::NativeFn;
use crate::sig::{SigError, Signature, TypeTag};

/// A stable registered-function id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// Byte-length rule for a guest-pointer parameter's region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionLen {
    /// Fixed byte length known at registration time.
    Bytes(u32),
    /// Length in bytes read from the `i32` parameter at this index
    /// (the classic pointer+size calling shape).
    Arg(usize),
}

/// Validation policy for one guest-pointer parameter.
///
/// The wire format carries only the 32-bit offset, so the required region
/// length and nullability are declared here at registration time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PtrPolicy {
    /// How many bytes the region must cover.
    pub len: RegionLen,
    /// Whether the null sentinel (offset 0) is accepted for this parameter.
    pub nullable: bool,
    /// Whether a zero-length region is accepted.
    pub allow_empty: bool,
}

impl Default for PtrPolicy {
    fn default() -> Self {
        Self {
            len: RegionLen::Bytes(1),
            nullable: false,
            allow_empty: false,
        }
    }
}

/// A function registration: name, signature, native entry point, and
/// per-pointer-parameter policies.
#[derive(Clone, Debug)]
pub struct Registration {
    name: String,
    sig: Signature,
    native: NativeFn,
    policies: Vec<(usize, PtrPolicy)>,
}

impl Registration {
    /// Builds a registration with default policies for every pointer
    /// parameter (required, non-empty, one byte).
    pub fn new(name: impl Into<String>, sig: Signature, native: NativeFn) -> Self {
        Self {
            name: name.into(),
            sig,
            native,
            policies: Vec::new(),
        }
    }

    /// Declares the policy for the guest-pointer parameter at `param`.
    #[must_use]
    pub fn ptr_policy(mut self, param: usize, policy: PtrPolicy) -> Self {
        self.policies.push((param, policy));
        self
    }
}

/// One row of the external registration table consumed at module load;
/// produced by the build-time generation step.
#[derive(Clone, Debug)]
pub struct TableEntry {
    /// Human-readable name (diagnostics only).
    pub name: String,
    /// Signature code in the wire alphabet.
    pub code: String,
    /// Native entry point.
    pub native: NativeFn,
}

impl TableEntry {
    /// Builds a table row.
    pub fn new(name: impl Into<String>, code: impl Into<String>, native: NativeFn) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            native,
        }
    }
}

/// A registered function: signature, native entry point, diagnostics name,
/// and resolved pointer policies (aligned with the parameter list).
#[derive(Clone, Debug)]
pub struct FunctionEntry {
    name: String,
    sig: Signature,
    native: NativeFn,
    policies: Box<[Option<PtrPolicy>]>,
}

impl FunctionEntry {
    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registered signature.
    #[must_use]
    pub fn sig(&self) -> &Signature {
        &self.sig
    }

    /// The native entry point.
    #[must_use]
    pub fn native(&self) -> NativeFn {
        self.native
    }

    /// Policy for the pointer parameter at `ix`.
    ///
    /// Registration resolves a policy for every pointer parameter, so this
    /// only falls back to the default for non-pointer indices.
    #[must_use]
    pub fn ptr_policy(&self, ix: usize) -> PtrPolicy {
        self.policies
            .get(ix)
            .copied()
            .flatten()
            .unwrap_or_default()
    }
}

/// The per-module-instance registry of callable functions.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entries: Vec<FunctionEntry>,
    seen: BTreeSet<(String, String)>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function, returning its stable id.
    ///
    /// Ids are assigned in registration order and never change for the
    /// lifetime of the loaded module.
    pub fn register(&mut self, reg: Registration) -> Result<FuncId, RegistryError> {
        let Registration {
            name,
            sig,
            native,
            policies,
        } = reg;

        let code = sig.code();
        let key = (name.clone(), code.clone());
        if self.seen.contains(&key) {
            return Err(RegistryError::DuplicateSignature { name, code });
        }

        let params = sig.params();
        let mut resolved: Vec<Option<PtrPolicy>> = params
            .iter()
            .map(|t| match t {
                TypeTag::GuestPtr => Some(PtrPolicy::default()),
                _ => None,
            })
            .collect();

        for (ix, policy) in policies {
            if params.get(ix) != Some(&TypeTag::GuestPtr) {
                return Err(RegistryError::PolicyTargetNotPointer { name, index: ix });
            }
            if let RegionLen::Arg(length_arg) = policy.len {
                match params.get(length_arg) {
                    None => {
                        return Err(RegistryError::LengthArgOutOfRange {
                            name,
                            index: ix,
                            length_arg,
                        });
                    }
                    Some(TypeTag::I32) => {}
                    Some(_) => {
                        return Err(RegistryError::LengthArgNotI32 {
                            name,
                            index: ix,
                            length_arg,
                        });
                    }
                }
            }
            resolved[ix] = Some(policy);
        }

        let id = FuncId(u32::try_from(self.entries.len()).unwrap_or(u32::MAX));
        self.entries.push(FunctionEntry {
            name,
            sig,
            native,
            policies: resolved.into_boxed_slice(),
        });
        self.seen.insert(key);
        Ok(id)
    }

    /// Builds a registry from an external registration table.
    ///
    /// An unrecognized signature code anywhere in the table is fatal to the
    /// load; nothing is registered partially in that case for the caller to
    /// observe, since the whole registry is discarded with the error.
    pub fn load_table(
        entries: impl IntoIterator<Item = TableEntry>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for TableEntry { name, code, native } in entries {
            let sig = match Signature::parse(&code) {
                Ok(sig) => sig,
                Err(source) => return Err(RegistryError::InvalidCode { name, source }),
            };
            registry.register(Registration::new(name, sig, native))?;
        }
        Ok(registry)
    }

    /// Looks up a registered function.
    #[must_use]
    pub fn lookup(&self, id: FuncId) -> Option<&FunctionEntry> {
        self.entries.get(id.0 as usize)
    }

    /// Number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(id, entry)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (FuncId, &FunctionEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(ix, e)| (FuncId(u32::try_from(ix).unwrap_or(u32::MAX)), e))
    }
}

/// Errors when registering functions; all are fatal to module load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// The exact `(name, signature)` pair was already registered.
    DuplicateSignature {
        /// Function name.
        name: String,
        /// Canonical signature code.
        code: String,
    },
    /// A table row carried a signature code outside the alphabet.
    InvalidCode {
        /// Function name.
        name: String,
        /// Underlying parse error.
        source: SigError,
    },
    /// A pointer policy was declared for a non-pointer parameter.
    PolicyTargetNotPointer {
        /// Function name.
        name: String,
        /// Offending parameter index.
        index: usize,
    },
    /// A `RegionLen::Arg` policy referenced a parameter that does not exist.
    LengthArgOutOfRange {
        /// Function name.
        name: String,
        /// Pointer parameter index carrying the policy.
        index: usize,
        /// Referenced length-argument index.
        length_arg: usize,
    },
    /// A `RegionLen::Arg` policy referenced a parameter that is not `i32`.
    LengthArgNotI32 {
        /// Function name.
        name: String,
        /// Pointer parameter index carrying the policy.
        index: usize,
        /// Referenced length-argument index.
        length_arg: usize,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSignature { name, code } => {
                write!(f, "duplicate signature '{code}' for '{name}'")
            }
            Self::InvalidCode { name, source } => {
                write!(f, "invalid signature code for '{name}': {source}")
            }
            Self::PolicyTargetNotPointer { name, index } => {
                write!(
                    f,
                    "'{name}': pointer policy on non-pointer parameter {index}"
                )
            }
            Self::LengthArgOutOfRange {
                name,
                index,
                length_arg,
            } => write!(
                f,
                "'{name}': pointer parameter {index} takes its length from missing parameter {length_arg}"
            ),
            Self::LengthArgNotI32 {
                name,
                index,
                length_arg,
            } => write!(
                f,
                "'{name}': pointer parameter {index} takes its length from non-i32 parameter {length_arg}"
            ),
        }
    }
}

impl core::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::InvalidCode { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{HostCtx, HostFault, NativeVal};

    fn nop(_ctx: &mut HostCtx<'_, '_>, _args: &[NativeVal]) -> Result<Option<NativeVal>, HostFault> {
        Ok(None)
    }

    fn sig(code: &str) -> Signature {
        Signature::parse(code).unwrap()
    }

    #[test]
    fn register_then_lookup() {
        let mut r = Registry::new();
        let id = r.register(Registration::new("poke", sig("i"), nop)).unwrap();
        assert_eq!(id, FuncId(0));
        let entry = r.lookup(id).unwrap();
        assert_eq!(entry.name(), "poke");
        assert_eq!(entry.sig().code(), "i");
    }

    #[test]
    fn unknown_id_lookup_fails() {
        let r = Registry::new();
        assert!(r.lookup(FuncId(3)).is_none());
    }

    #[test]
    fn ids_are_stable_registration_order() {
        let mut r = Registry::new();
        let a = r.register(Registration::new("a", sig(""), nop)).unwrap();
        let b = r.register(Registration::new("b", sig(""), nop)).unwrap();
        assert_eq!((a, b), (FuncId(0), FuncId(1)));
    }

    #[test]
    fn overloads_by_signature_are_allowed() {
        let mut r = Registry::new();
        r.register(Registration::new("read", sig("pi:i"), nop))
            .unwrap();
        r.register(Registration::new("read", sig("pl:i"), nop))
            .unwrap();
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn exact_duplicates_are_rejected() {
        let mut r = Registry::new();
        r.register(Registration::new("read", sig("pi:i"), nop))
            .unwrap();
        let err = r
            .register(Registration::new("read", sig("pi:i"), nop))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateSignature {
                name: "read".into(),
                code: "pi:i".into()
            }
        );
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn policy_on_scalar_parameter_is_rejected() {
        let mut r = Registry::new();
        let err = r
            .register(
                Registration::new("bad", sig("ii"), nop).ptr_policy(0, PtrPolicy::default()),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::PolicyTargetNotPointer {
                name: "bad".into(),
                index: 0
            }
        );
    }

    #[test]
    fn length_arg_must_be_existing_i32() {
        let mut r = Registry::new();
        let arg_len = |j| PtrPolicy {
            len: RegionLen::Arg(j),
            ..PtrPolicy::default()
        };
        let err = r
            .register(Registration::new("bad", sig("p"), nop).ptr_policy(0, arg_len(5)))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::LengthArgOutOfRange {
                name: "bad".into(),
                index: 0,
                length_arg: 5
            }
        );
        let err = r
            .register(Registration::new("bad", sig("pl"), nop).ptr_policy(0, arg_len(1)))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::LengthArgNotI32 {
                name: "bad".into(),
                index: 0,
                length_arg: 1
            }
        );
    }

    #[test]
    fn pointer_params_get_default_policy() {
        let mut r = Registry::new();
        let id = r.register(Registration::new("w", sig("ip"), nop)).unwrap();
        let entry = r.lookup(id).unwrap();
        assert_eq!(entry.ptr_policy(1), PtrPolicy::default());
    }

    #[test]
    fn load_table_accepts_valid_rows() {
        let r = Registry::load_table([
            TableEntry::new("square", "i:i", nop),
            TableEntry::new("fill", "pii", nop),
        ])
        .unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.lookup(FuncId(1)).unwrap().name(), "fill");
    }

    #[test]
    fn load_table_rejects_unknown_code_at_load_time() {
        let err = Registry::load_table([TableEntry::new("odd", "ix:i", nop)]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidCode {
                name: "odd".into(),
                source: SigError::UnknownSymbol {
                    symbol: 'x',
                    pos: 1
                }
            }
        );
    }
}
