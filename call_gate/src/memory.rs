// Copyright 2026 the Call Gate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Guest linear memory and the guest-pointer validator.
//!
//! Guest code names memory only by 32-bit offsets. Every host-side
//! dereference goes through [`validate`] against the *current* extent.
//! Growth may relocate the base address, so a translation is never valid
//! past the native call it was made for; [`LinearMemory::region`] re-slices
//! on every access instead of handing out long-lived host addresses.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// A guest-relative pointer: a 32-bit offset into linear memory.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestPtr(pub u32);

impl GuestPtr {
    /// The reserved null sentinel (offset 0).
    pub const NULL: Self = Self(0);

    /// Returns `true` for the null sentinel.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GuestPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g+0x{:08x}", self.0)
    }
}

/// A bounds-checked region descriptor produced by validation.
///
/// A descriptor is only as fresh as the extent it was validated against.
/// Access the bytes through [`LinearMemory::region`] (or the dispatch
/// context's accessors), which translate against the current extent.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedPtr {
    /// Guest offset of the region start.
    pub offset: u32,
    /// Region length in bytes.
    pub len: u32,
}

impl ResolvedPtr {
    /// Builds a descriptor without validation.
    ///
    /// Used by native functions to hand an offset back to the guest; the
    /// guest is responsible for validating it on its own next use.
    #[must_use]
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// The guest pointer for the region start.
    #[must_use]
    pub const fn ptr(self) -> GuestPtr {
        GuestPtr(self.offset)
    }
}

/// Pointer validation errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PtrError {
    /// Offset 0 for a pointer the signature requires to be non-null.
    NullRequired,
    /// Zero-length region where the parameter's policy rejects empty regions.
    EmptyRegion,
    /// `offset + len` overflowed 32 bits.
    LengthOverflow {
        /// Guest offset.
        offset: u32,
        /// Requested length in bytes.
        len: u32,
    },
    /// The region extends past the current extent.
    OutOfBounds {
        /// Guest offset.
        offset: u32,
        /// Requested length in bytes.
        len: u32,
        /// Extent length at validation time.
        mem_len: usize,
    },
}

impl fmt::Display for PtrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullRequired => write!(f, "required guest pointer was null"),
            Self::EmptyRegion => write!(f, "zero-length region not permitted"),
            Self::LengthOverflow { offset, len } => {
                write!(f, "offset 0x{offset:08x} + len {len} overflows 32 bits")
            }
            Self::OutOfBounds {
                offset,
                len,
                mem_len,
            } => write!(
                f,
                "region 0x{offset:08x}..+{len} out of bounds (extent {mem_len} bytes)"
            ),
        }
    }
}

impl core::error::Error for PtrError {}

/// Validates `offset .. offset + len` against an extent of `mem_len` bytes.
///
/// Fails on zero-length regions (unless `allow_empty`), on 32-bit overflow
/// of `offset + len`, and on any byte falling outside the extent. On success
/// the region's host address is `base + offset`, valid only until the extent
/// can next change.
pub fn validate(
    mem_len: usize,
    ptr: GuestPtr,
    len: u32,
    allow_empty: bool,
) -> Result<ResolvedPtr, PtrError> {
    if len == 0 && !allow_empty {
        return Err(PtrError::EmptyRegion);
    }
    let offset = ptr.0;
    let end = offset
        .checked_add(len)
        .ok_or(PtrError::LengthOverflow { offset, len })?;
    if end as usize > mem_len {
        return Err(PtrError::OutOfBounds {
            offset,
            len,
            mem_len,
        });
    }
    Ok(ResolvedPtr { offset, len })
}

/// The guest's contiguous, resizable byte-addressable memory.
///
/// Owned by one interpreter instance. Growth zero-fills and may relocate the
/// base address, which is why nothing in this crate caches a translated
/// address across a call boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinearMemory {
    bytes: Vec<u8>,
}

impl LinearMemory {
    /// Creates a zero-filled memory of `len` bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    /// Wraps existing bytes as guest memory.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Current extent length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-length extent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current base host address. Diagnostics only; stale after any growth.
    #[must_use]
    pub fn base_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    /// Whole extent as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Whole extent as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Extends the extent by `extra` zero bytes. May relocate the base.
    pub fn grow_by(&mut self, extra: usize) {
        let new_len = self.bytes.len() + extra;
        self.bytes.resize(new_len, 0);
    }

    /// Validates a guest pointer against the current extent.
    pub fn validate(
        &self,
        ptr: GuestPtr,
        len: u32,
        allow_empty: bool,
    ) -> Result<ResolvedPtr, PtrError> {
        validate(self.bytes.len(), ptr, len, allow_empty)
    }

    /// Translates a region descriptor into a slice of the current extent.
    ///
    /// Re-checks bounds on every call: a descriptor validated before a grow
    /// is still usable (growth never shrinks the extent), but the host
    /// address it maps to may have changed.
    pub fn region(&self, p: ResolvedPtr) -> Result<&[u8], PtrError> {
        let end = p
            .offset
            .checked_add(p.len)
            .ok_or(PtrError::LengthOverflow {
                offset: p.offset,
                len: p.len,
            })?;
        self.bytes
            .get(p.offset as usize..end as usize)
            .ok_or(PtrError::OutOfBounds {
                offset: p.offset,
                len: p.len,
                mem_len: self.bytes.len(),
            })
    }

    /// Mutable variant of [`LinearMemory::region`].
    pub fn region_mut(&mut self, p: ResolvedPtr) -> Result<&mut [u8], PtrError> {
        let mem_len = self.bytes.len();
        let end = p
            .offset
            .checked_add(p.len)
            .ok_or(PtrError::LengthOverflow {
                offset: p.offset,
                len: p.len,
            })?;
        self.bytes
            .get_mut(p.offset as usize..end as usize)
            .ok_or(PtrError::OutOfBounds {
                offset: p.offset,
                len: p.len,
                mem_len,
            })
    }
}
