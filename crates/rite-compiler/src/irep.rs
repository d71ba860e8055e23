//! Compiled units.
//!
//! An [`Irep`] is the output of generating one scope: its instruction
//! sequence, literal pool, symbol table, catch handlers, local names, child
//! units and optional debug info. A whole program is a tree of ireps owned
//! by the root.

use rite_core::Sym;

use crate::bytecode::{DecodedInsn, Instructions};
use crate::debug::DebugInfo;

/// Catch handler kind as stored in the binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CatchKind {
    Rescue = 0,
    Ensure = 1,
}

impl CatchKind {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(CatchKind::Rescue),
            1 => Some(CatchKind::Ensure),
            _ => None,
        }
    }
}

/// Protected instruction range `[begin, end)` and the handler address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchHandler {
    pub kind: CatchKind,
    pub begin: u32,
    pub end: u32,
    pub target: u32,
}

impl CatchHandler {
    /// Serialized size: kind byte plus three 32-bit addresses.
    pub const ENCODED_SIZE: usize = 13;
}

/// Integer literal outside the 64-bit range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigIntBlob {
    pub base: u8,
    pub negative: bool,
    /// ASCII digits, at most 255 of them.
    pub digits: Box<[u8]>,
}

impl BigIntBlob {
    /// `[len, signed base, digits..]` as stored in the binary format.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.digits.len() + 2);
        out.push(self.digits.len() as u8);
        let base = if self.negative {
            (-(self.base as i8)) as u8
        } else {
            self.base
        };
        out.push(base);
        out.extend_from_slice(&self.digits);
        out
    }

    /// Inverse of [`Self::to_blob`]; `None` when the length byte lies.
    pub fn from_blob(blob: &[u8]) -> Option<Self> {
        let (&len, rest) = blob.split_first()?;
        let (&base, digits) = rest.split_first()?;
        if digits.len() != len as usize {
            return None;
        }
        let signed = base as i8;
        Some(Self {
            base: signed.unsigned_abs(),
            negative: signed < 0,
            digits: digits.into(),
        })
    }
}

/// A literal pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolValue {
    Str(Box<[u8]>),
    Int32(i32),
    Int64(i64),
    Float(f64),
    BigInt(BigIntBlob),
}

impl PoolValue {
    pub const TT_STR: u8 = 0;
    pub const TT_INT32: u8 = 1;
    pub const TT_INT64: u8 = 3;
    pub const TT_FLOAT: u8 = 5;
    pub const TT_BIGINT: u8 = 7;

    /// Integer entry of the narrowest width holding `n`.
    pub fn int(n: i64) -> Self {
        match i32::try_from(n) {
            Ok(small) => PoolValue::Int32(small),
            Err(_) => PoolValue::Int64(n),
        }
    }

    /// Type tag written to the binary format.
    pub fn tag(&self) -> u8 {
        match self {
            PoolValue::Str(_) => Self::TT_STR,
            PoolValue::Int32(_) => Self::TT_INT32,
            PoolValue::Int64(_) => Self::TT_INT64,
            PoolValue::Float(_) => Self::TT_FLOAT,
            PoolValue::BigInt(_) => Self::TT_BIGINT,
        }
    }

    /// Integer value of an `Int32`/`Int64` entry.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            PoolValue::Int32(n) => Some(n.into()),
            PoolValue::Int64(n) => Some(n),
            _ => None,
        }
    }
}

/// A compiled unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Irep {
    /// Locals including the `self` slot.
    pub nlocals: u16,
    /// Registers the unit needs, at least `nlocals`.
    pub nregs: u16,
    pub iseq: Vec<u8>,
    pub catch_handlers: Vec<CatchHandler>,
    pub pool: Vec<PoolValue>,
    pub syms: Vec<Sym>,
    pub children: Vec<Irep>,
    /// Names of locals `1..nlocals`; `Sym::NULL` for anonymous slots.
    pub lv: Option<Vec<Sym>>,
    pub debug_info: Option<DebugInfo>,
}

impl Irep {
    /// Decoded instruction stream.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions::new(&self.iseq)
    }

    /// Decoded instructions collected into a vector.
    pub fn decode_all(&self) -> Vec<DecodedInsn> {
        self.instructions().collect()
    }

    /// Number of units in this tree, this one included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Irep::count).sum::<usize>()
    }

    /// Visit every unit in pre-order (self, then children in index order).
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Irep)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Drop local variable names from this unit and all descendants.
    pub fn remove_lv(&mut self) {
        self.lv = None;
        for child in &mut self.children {
            child.remove_lv();
        }
    }

    /// Whether any unit of the tree carries local variable names.
    pub fn has_lv(&self) -> bool {
        self.lv.as_ref().is_some_and(|lv| !lv.is_empty())
            || self.children.iter().any(Irep::has_lv)
    }

    /// Whether every unit of the tree carries debug info.
    pub fn has_debug_info(&self) -> bool {
        self.debug_info.is_some() && self.children.iter().all(Irep::has_debug_info)
    }
}
