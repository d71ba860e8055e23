//! Rite bytecode generator
//!
//! Turns a syntax tree into a tree of compiled units ([`Irep`]s) for the
//! rite register VM.
//!
//! ## Architecture
//!
//! - **Generation**: [`Generator`] walks the tree once, writing each scope
//!   (program, method, block, class body) into its own [`scope::Scope`]
//! - **Look-back rewriting**: every instruction helper in [`peephole`] may
//!   rewrite the instructions just emitted instead of appending, which does
//!   register retargeting and integer constant folding without a separate
//!   pass
//!
//! ## Modules
//!
//! - [`bytecode`]: opcodes, operand formats and the instruction decoder
//! - [`codegen`]: the generator proper
//! - [`debug`]: per-unit line tables
//! - [`emit`]: instruction encoder with jump patching and loop records
//! - [`fold`]: integer folding with the VM's arithmetic semantics
//! - [`irep`]: the compiled unit and its pool and handler types
//! - [`peephole`]: instruction selection with look-back rewriting
//! - [`pool`]: deduplicating literal pool
//! - [`scope`]: register stack and tables of one unit being generated

pub mod bytecode;
pub mod codegen;
pub mod debug;
pub mod emit;
pub mod fold;
pub mod irep;
pub mod peephole;
pub mod pool;
pub mod scope;

pub use bytecode::{DecodedInsn, OpCode};
pub use codegen::Generator;
pub use debug::{DebugFile, DebugInfo};
pub use irep::{BigIntBlob, CatchHandler, CatchKind, Irep, PoolValue};
pub use scope::ScopeKind;

// Re-export the error type from core for convenience
pub use rite_core::CodegenError;
