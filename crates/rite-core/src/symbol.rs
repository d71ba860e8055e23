//! Name interning.
//!
//! Every identifier the generator emits (method names, variables, constants,
//! filenames) is referred to by a small integer [`Sym`]. One [`SymbolTable`]
//! is owned by each compile context and handed to the generator and the
//! serializer by reference.

use rustc_hash::FxHashMap;
use std::fmt;

/// An interned name.
///
/// `Sym::NULL` (id 0) is the anonymous name: it is what the empty string
/// interns to and what unnamed local slots carry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Sym(u32);

impl Sym {
    /// The anonymous symbol.
    pub const NULL: Sym = Sym(0);

    /// Raw id.
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bidirectional map between name bytes and [`Sym`] ids.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Names indexed by `id - 1`.
    names: Vec<Box<[u8]>>,
    /// Deduplication index.
    index: FxHashMap<Box<[u8]>, Sym>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the existing id when already present.
    pub fn intern(&mut self, name: impl AsRef<[u8]>) -> Sym {
        let name = name.as_ref();
        if name.is_empty() {
            return Sym::NULL;
        }
        if let Some(&sym) = self.index.get(name) {
            return sym;
        }

        let sym = Sym(self.names.len() as u32 + 1);
        let boxed: Box<[u8]> = name.into();
        self.names.push(boxed.clone());
        self.index.insert(boxed, sym);
        sym
    }

    /// Look up a name without interning it.
    pub fn lookup(&self, name: impl AsRef<[u8]>) -> Option<Sym> {
        let name = name.as_ref();
        if name.is_empty() {
            return Some(Sym::NULL);
        }
        self.index.get(name).copied()
    }

    /// The bytes of an interned name. `Sym::NULL` yields an empty slice.
    pub fn name(&self, sym: Sym) -> Option<&[u8]> {
        if sym.is_null() {
            return Some(&[]);
        }
        self.names.get(sym.0 as usize - 1).map(|n| &n[..])
    }

    /// Lossy UTF-8 rendering of a name, for logs and messages.
    pub fn display(&self, sym: Sym) -> String {
        match self.name(sym) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => sym.to_string(),
        }
    }

    /// Number of interned (non-null) names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_deduplicates() {
        let mut table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern(b"foo");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn ids_start_after_null() {
        let mut table = SymbolTable::new();
        let a = table.intern("a");
        assert_eq!(a.id(), 1);
        assert!(!a.is_null());
    }

    #[test]
    fn empty_name_is_null() {
        let mut table = SymbolTable::new();
        assert_eq!(table.intern(""), Sym::NULL);
        assert_eq!(table.name(Sym::NULL), Some(&b""[..]));
        assert!(table.is_empty());
    }

    #[test]
    fn name_round_trip() {
        let mut table = SymbolTable::new();
        let sym = table.intern("each_with_index");
        assert_eq!(table.name(sym), Some(&b"each_with_index"[..]));
        assert_eq!(table.display(sym), "each_with_index");
        assert_eq!(table.lookup("each_with_index"), Some(sym));
        assert_eq!(table.lookup("missing"), None);
    }

    #[test]
    fn unknown_sym_has_no_name() {
        let table = SymbolTable::new();
        assert_eq!(table.name(Sym(7)), None);
        assert_eq!(table.display(Sym(7)), "#7");
    }
}
