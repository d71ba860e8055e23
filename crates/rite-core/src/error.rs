//! Error types for code generation and serialization.
//!
//! ## Error Hierarchy
//!
//! ```text
//! CompileError (top-level wrapper)
//! ├── ParseFailed  - upstream parse errors; generation was skipped
//! ├── Generation   - CodegenError plus the source location being compiled
//! └── Dump         - DumpError from the binary writer or loader
//! ```
//!
//! [`CodegenError`] values are limit errors: they depend only on the size
//! and shape of the input and abort the unit being compiled. [`DumpError`]
//! separates argument validation, malformed input and I/O faults so callers
//! can tell them apart.

use std::io;
use thiserror::Error;

use crate::{Location, Sym};

// ============================================================================
// Generation Errors
// ============================================================================

/// Fatal errors raised while generating bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// AST nesting exceeded the recursion ceiling.
    #[error("too complex expression")]
    TooComplex,

    /// Register stack would exceed the addressable range.
    #[error("register stack overflow ({sp} + {n})")]
    RegisterOverflow { sp: usize, n: usize },

    /// More registers released than allocated.
    #[error("stack pointer underflow")]
    StackUnderflow,

    /// A scope declared more locals than a record can describe.
    #[error("too many local variables ({count})")]
    TooManyLocals { count: usize },

    /// A parameter group is larger than the argument spec can encode.
    #[error("too many formal arguments")]
    TooManyParameters,

    /// Symbol table of one unit is full.
    #[error("too many symbols")]
    TooManySymbols,

    /// Literal pool of one unit is full.
    #[error("too many literals")]
    TooManyLiterals,

    /// Child unit table is full.
    #[error("too many nested blocks/methods")]
    TooManyChildren,

    /// Catch handler table is full.
    #[error("too many catch handlers")]
    TooManyHandlers,

    /// Jump distance does not fit the signed 16-bit offset field.
    #[error("too big jump offset ({offset})")]
    JumpOutOfRange { offset: i64 },

    /// Instruction buffer outgrew the 32-bit address space.
    #[error("too big code block")]
    CodeTooLarge,

    /// Integer literal cannot be represented even as a big-integer blob.
    #[error("integer too big")]
    IntegerTooBig,

    /// An operand needs an extension prefix while prefixes are disabled.
    #[error("need OP_EXTs instruction (currently OP_EXTs are prohibited)")]
    ExtendedOperand,

    /// A local variable reference names no slot in any enclosing scope.
    #[error("undefined local variable {0}")]
    UnknownLocal(Sym),
}

// ============================================================================
// Serializer Errors
// ============================================================================

/// Errors from the binary module writer and loader.
#[derive(Debug, Error)]
pub enum DumpError {
    /// Rejected before any output was produced.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The unit tree (or a record being loaded) is malformed.
    #[error("invalid irep: {0}")]
    InvalidIrep(String),

    /// Magic or version bytes did not match.
    #[error("invalid file header")]
    InvalidFileHeader,

    /// Input ended before a complete value could be read.
    #[error("unexpected end of data at offset {offset}")]
    ReadFault { offset: usize },

    /// The output sink failed.
    #[error("write fault: {0}")]
    WriteFault(#[from] io::Error),
}

impl DumpError {
    /// Numeric status used by the RITE tool family (0 is success).
    pub fn status(&self) -> i32 {
        match self {
            DumpError::WriteFault(_) => -2,
            DumpError::ReadFault { .. } => -3,
            DumpError::InvalidFileHeader => -4,
            DumpError::InvalidIrep(_) => -5,
            DumpError::InvalidArgument(_) => -6,
        }
    }
}

// ============================================================================
// Top-level Error
// ============================================================================

/// Result of a failed compilation through a compile context.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The parser reported errors, so no code was generated.
    #[error("{count} syntax error(s); code generation skipped")]
    ParseFailed { count: usize },

    /// Code generation aborted.
    #[error("generator error at {location}: {error}")]
    Generation {
        error: CodegenError,
        location: Location,
    },

    /// Serialization failed.
    #[error(transparent)]
    Dump(#[from] DumpError),
}

impl CompileError {
    /// The generation error, if this is one.
    pub fn codegen_error(&self) -> Option<&CodegenError> {
        match self {
            CompileError::Generation { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codegen_messages() {
        assert_eq!(CodegenError::TooComplex.to_string(), "too complex expression");
        assert_eq!(
            CodegenError::JumpOutOfRange { offset: 40000 }.to_string(),
            "too big jump offset (40000)"
        );
    }

    #[test]
    fn dump_status_codes_are_distinct() {
        let write = DumpError::from(io::Error::other("disk full"));
        assert_eq!(write.status(), -2);
        assert_eq!(DumpError::InvalidArgument("empty name").status(), -6);
        assert_ne!(write.status(), DumpError::InvalidIrep(String::new()).status());
    }

    #[test]
    fn generation_error_carries_location() {
        let err = CompileError::Generation {
            error: CodegenError::StackUnderflow,
            location: Location::new(2, 7),
        };
        assert_eq!(err.to_string(), "generator error at 2:7: stack pointer underflow");
        assert_eq!(err.codegen_error(), Some(&CodegenError::StackUnderflow));
    }
}
