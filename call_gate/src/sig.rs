// Copyright 2026 the Call Gate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type tags and call signatures for the guest/host boundary.
//!
//! A [`Signature`] is the ordered list of parameter tags plus an optional
//! return tag (absent = void). Signatures cross tooling boundaries as a
//! compact textual code; the alphabet is validated exhaustively when a code
//! is parsed, so a malformed generated table fails at module load, never at
//! call time.
//!
//! ## Signature codes
//!
//! One symbol per parameter, in declared order, then an optional `:` followed
//! by exactly one symbol for the return tag:
//!
//! | symbol | tag |
//! |--------|-----|
//! | `i` | [`TypeTag::I32`] |
//! | `l` | [`TypeTag::I64`] |
//! | `f` | [`TypeTag::F32`] |
//! | `d` | [`TypeTag::F64`] |
//! | `p` | [`TypeTag::GuestPtr`] |
//!
//! `"ii:i"` is `(i32, i32) -> i32`, `"pl"` is `(ptr, i64) -> void`, `":d"`
//! is `() -> f64`, and `""` is `() -> void`.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A primitive boundary type tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    /// 32-bit integer, exchanged as a raw two's-complement bit pattern.
    I32,
    /// 64-bit integer, exchanged as a raw two's-complement bit pattern.
    I64,
    /// 32-bit float, exchanged as an IEEE-754 bit pattern.
    F32,
    /// 64-bit float, exchanged as an IEEE-754 bit pattern.
    F64,
    /// A guest pointer: a 32-bit guest-relative offset into linear memory.
    ///
    /// The host never receives a guest pointer as a host address without
    /// going through validation first.
    GuestPtr,
}

impl TypeTag {
    /// Returns the wire symbol for this tag.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::I32 => 'i',
            Self::I64 => 'l',
            Self::F32 => 'f',
            Self::F64 => 'd',
            Self::GuestPtr => 'p',
        }
    }

    /// Parses a wire symbol, returning `None` for anything outside the
    /// alphabet.
    #[must_use]
    pub const fn from_symbol(c: char) -> Option<Self> {
        match c {
            'i' => Some(Self::I32),
            'l' => Some(Self::I64),
            'f' => Some(Self::F32),
            'd' => Some(Self::F64),
            'p' => Some(Self::GuestPtr),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::GuestPtr => "guest-ptr",
        };
        write!(f, "{name}")
    }
}

/// An immutable call signature: parameter tags in declared order plus an
/// optional return tag.
///
/// Identical signatures may be shared across many registered functions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    params: Box<[TypeTag]>,
    ret: Option<TypeTag>,
}

impl Signature {
    /// Builds a signature from parts.
    #[must_use]
    pub fn new(params: &[TypeTag], ret: Option<TypeTag>) -> Self {
        Self {
            params: Box::from(params),
            ret,
        }
    }

    /// Parses a signature code (see the module docs for the alphabet).
    ///
    /// Any byte outside the alphabet is an error; callers treat this as
    /// fatal to module load.
    pub fn parse(code: &str) -> Result<Self, SigError> {
        let mut params = Vec::new();
        let mut chars = code.char_indices();
        let mut ret = None;
        while let Some((pos, c)) = chars.next() {
            if c == ':' {
                let Some((ret_pos, r)) = chars.next() else {
                    return Err(SigError::MissingReturnTag { pos });
                };
                let tag = TypeTag::from_symbol(r).ok_or(SigError::UnknownSymbol {
                    symbol: r,
                    pos: ret_pos,
                })?;
                if let Some((extra_pos, _)) = chars.next() {
                    return Err(SigError::TrailingInput { pos: extra_pos });
                }
                ret = Some(tag);
                break;
            }
            let tag =
                TypeTag::from_symbol(c).ok_or(SigError::UnknownSymbol { symbol: c, pos })?;
            params.push(tag);
        }
        Ok(Self {
            params: params.into_boxed_slice(),
            ret,
        })
    }

    /// Parameter tags in declared order.
    #[must_use]
    pub fn params(&self) -> &[TypeTag] {
        &self.params
    }

    /// Return tag, or `None` for void.
    #[must_use]
    pub fn ret(&self) -> Option<TypeTag> {
        self.ret
    }

    /// Re-encodes this signature as its canonical code.
    #[must_use]
    pub fn code(&self) -> String {
        let mut out = String::with_capacity(self.params.len() + 2);
        for t in &self.params {
            out.push(t.symbol());
        }
        if let Some(r) = self.ret {
            out.push(':');
            out.push(r.symbol());
        }
        out
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (ix, t) in self.params.iter().enumerate() {
            if ix > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, ")")?;
        match self.ret {
            Some(r) => write!(f, " -> {r}"),
            None => Ok(()),
        }
    }
}

/// Errors when parsing a signature code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SigError {
    /// A byte outside the signature alphabet.
    UnknownSymbol {
        /// The offending character.
        symbol: char,
        /// Byte position within the code.
        pos: usize,
    },
    /// A `:` return marker with no tag after it.
    MissingReturnTag {
        /// Byte position of the marker.
        pos: usize,
    },
    /// Input after the single return tag.
    TrailingInput {
        /// Byte position of the first extra character.
        pos: usize,
    },
}

impl fmt::Display for SigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSymbol { symbol, pos } => {
                write!(f, "unknown signature symbol '{symbol}' at position {pos}")
            }
            Self::MissingReturnTag { pos } => {
                write!(f, "return marker at position {pos} has no return tag")
            }
            Self::TrailingInput { pos } => {
                write!(f, "trailing input after return tag at position {pos}")
            }
        }
    }
}

impl core::error::Error for SigError {}
