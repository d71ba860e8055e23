//! Layout constants of the RITE 03.00 binary format.
//!
//! All multi-byte integers are big-endian except float pool entries, which
//! are IEEE 754 little-endian.

pub const BINARY_IDENT: &[u8; 4] = b"RITE";
pub const MAJOR_VERSION: &[u8; 2] = b"03";
pub const MINOR_VERSION: &[u8; 2] = b"00";
/// ident, major, minor, total size, compiler name, compiler version
pub const BINARY_HEADER_SIZE: usize = 4 + 2 + 2 + 4 + 4 + 4;

pub const SECTION_IREP: &[u8; 4] = b"IREP";
pub const SECTION_DEBUG: &[u8; 4] = b"DBG\0";
pub const SECTION_LV: &[u8; 4] = b"LVAR";
pub const BINARY_EOF: &[u8; 4] = b"END\0";

/// Instruction set version stored in the IREP section header.
pub const VM_VERSION: &[u8; 4] = b"0300";

/// ident and size
pub const SECTION_HEADER_SIZE: usize = 4 + 4;
/// ident, size and VM version
pub const IREP_SECTION_HEADER_SIZE: usize = SECTION_HEADER_SIZE + 4;
pub const FOOTER_SIZE: usize = SECTION_HEADER_SIZE;

/// record size, nlocals, nregs, rlen
pub const RECORD_HEADER_SIZE: usize = 4 + 2 + 2 + 2;

/// Symbol length marking a null symbol in the symbol block.
pub const NULL_SYM_LEN: u16 = 0xFFFF;
/// Local variable index marking an anonymous slot.
pub const LV_NULL_MARK: u16 = 0xFFFF;
