//! RITE 03.00 binary modules
//!
//! Serializes a compiled [`Irep`](rite_compiler::Irep) tree into the binary
//! module format read by the rite VM, and loads such a module back.
//!
//! ## Layout
//!
//! ```text
//! header   "RITE" "03" "00" total-size compiler-name compiler-version
//! "IREP"   one record per unit, in pre-order
//! "DBG\0"  filename table and per-unit line maps (optional)
//! "LVAR"   local variable name table and per-unit slot names (optional)
//! "END\0"
//! ```
//!
//! Entry points:
//!
//! - [`dump_irep`]: serialize into a new buffer
//! - [`dump_irep_binary`]: serialize to an [`std::io::Write`] sink
//! - [`dump_irep_cfunc`]: serialize as a C array definition
//! - [`dump_irep_cstruct`]: write the tree as C struct initializers
//! - [`load_irep`]: parse a buffer back into a tree

use bitflags::bitflags;

mod cdump;
mod cstruct;
pub mod format;
mod reader;
mod writer;

pub use cdump::{dump_irep_binary, dump_irep_cfunc};
pub use cstruct::dump_irep_cstruct;
pub use reader::load_irep;
pub use writer::dump_irep;

pub use rite_core::DumpError;

bitflags! {
    /// Serializer options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DumpFlags: u8 {
        /// Write the `DBG` section when every unit has debug info, and
        /// debug structs in C struct output.
        const DEBUG_INFO = 1 << 0;
        /// Give C output internal linkage.
        const STATIC = 1 << 1;
    }
}

/// Flags plus the compiler identification written into the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOptions {
    pub flags: DumpFlags,
    pub compiler_name: [u8; 4],
    pub compiler_version: [u8; 4],
}

impl DumpOptions {
    pub const DEFAULT_COMPILER_NAME: [u8; 4] = *b"HSMK";
    pub const DEFAULT_COMPILER_VERSION: [u8; 4] = *b"0000";

    pub fn new(flags: DumpFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    pub fn with_compiler(mut self, name: [u8; 4], version: [u8; 4]) -> Self {
        self.compiler_name = name;
        self.compiler_version = version;
        self
    }
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            flags: DumpFlags::empty(),
            compiler_name: Self::DEFAULT_COMPILER_NAME,
            compiler_version: Self::DEFAULT_COMPILER_VERSION,
        }
    }
}
