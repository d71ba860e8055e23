//! Bytecode definitions: opcodes, operand formats and decoding.

mod insn;
mod opcode;

pub use insn::{DecodedInsn, Instructions, decode, opcodes};
pub use opcode::{Ext, OpCode, OperandFormat};
