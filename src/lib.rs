//! Bytecode generator and RITE module serializer for the rite register VM.
//!
//! This crate ties the workspace together behind a [`CompileContext`]: it
//! takes a syntax tree built by an external parser, generates the compiled
//! unit tree and serializes it into a RITE binary, a C array holding one,
//! or C struct initializers.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use rite::prelude::*;
//!
//! let arena = Bump::new();
//! let mut ctx = CompileContext::new();
//! let puts = ctx.symbols_mut().intern("puts");
//!
//! let b = AstBuilder::new(&arena);
//! let program = b.program(&[], &[b.fcall(puts, &[b.str("hello")])]);
//!
//! let irep = ctx.generate(&program).unwrap();
//! let bin = ctx.dump(&irep, DumpFlags::empty()).unwrap();
//! assert_eq!(&bin[..4], b"RITE");
//! ```
//!
//! # Crates
//!
//! - [`rite_core`]: symbols, flags, diagnostics and errors
//! - [`rite_ast`]: the syntax tree consumed by the generator
//! - [`rite_compiler`]: code generation, peephole optimizer, unit types
//! - [`rite_dump`]: binary writer and loader

mod context;

pub use context::CompileContext;

pub use rite_ast as ast;
pub use rite_compiler as compiler;
pub use rite_core as core;
pub use rite_dump as dump;

pub mod prelude {
    pub use crate::context::CompileContext;
    pub use rite_ast::{AstBuilder, Node, NodeKind};
    pub use rite_compiler::{Irep, OpCode, PoolValue};
    pub use rite_core::{
        CodegenError, CompileError, CompileFlags, Diagnostic, DiagnosticCode, Diagnostics,
        DumpError, Location, Sym, SymbolTable,
    };
    pub use rite_dump::{DumpFlags, DumpOptions};
}
