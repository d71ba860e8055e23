//! Core types shared by the rite compiler crates.
//!
//! - [`SymbolTable`] / [`Sym`]: the name interner injected into every
//!   compile context
//! - [`CodegenError`], [`DumpError`], [`CompileError`]: the error hierarchy
//! - [`Diagnostics`]: parser and generator messages with source locations
//! - [`CompileFlags`]: per-context compilation options

mod diagnostics;
mod error;
mod flags;
mod location;
mod symbol;

pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
pub use error::{CodegenError, CompileError, DumpError};
pub use flags::CompileFlags;
pub use location::Location;
pub use symbol::{Sym, SymbolTable};
