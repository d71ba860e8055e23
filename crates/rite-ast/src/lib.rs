//! Syntax tree consumed by the rite code generator.
//!
//! The tree is produced by an external parser and is read-only to the
//! generator. Nodes are allocated in a [`bumpalo::Bump`] arena and refer to
//! their children by `&'ast` references, so a whole program is freed at once
//! when the arena is dropped.
//!
//! - [`Node`] / [`NodeKind`]: expression and statement nodes
//! - [`Body`] / [`Params`]: scope bodies for programs, methods, blocks and
//!   class bodies
//! - [`AstBuilder`]: helper for constructing trees in tests and tools
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use rite_ast::{AstBuilder, NodeKind};
//! use rite_core::SymbolTable;
//!
//! let arena = Bump::new();
//! let mut symbols = SymbolTable::new();
//! let a = symbols.intern("a");
//! let plus = symbols.intern("+");
//!
//! let b = AstBuilder::new(&arena);
//! // a = 1; a + 2
//! let program = b.program(
//!     &[a],
//!     &[
//!         b.assign_local(a, b.int(1)),
//!         b.call(Some(b.local(a)), plus, &[b.int(2)]),
//!     ],
//! );
//! assert!(matches!(program.kind, NodeKind::Program(_)));
//! ```

mod builder;
mod node;

pub use builder::AstBuilder;
pub use node::{
    BeginBlock, BigIntLit, Body, Call, CaseExpr, ClassDef, ConstScope, HashElement, ModuleDef,
    Node, NodeKind, OptionalParam, Params, RescueClause, SourcePos, SuperCall, Target, When,
};
