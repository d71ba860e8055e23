//! Instruction decoding.

use std::fmt;

use super::opcode::{Ext, OpCode, OperandFormat};

/// One decoded instruction.
///
/// `a` is up to 24 bits (the `W` operand of `ENTER`), `b` up to 16 bits.
/// For `BSS` the second 16-bit operand is in `c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInsn {
    pub op: OpCode,
    pub a: u32,
    pub b: u16,
    pub c: u16,
    /// Offset of the first byte, extension prefix included.
    pub addr: u32,
    /// Encoded length, extension prefix included.
    pub len: u32,
}

impl DecodedInsn {
    /// Offset just past this instruction.
    #[inline]
    pub fn end(&self) -> u32 {
        self.addr + self.len
    }

    /// Signed jump displacement for `S`/`BS` jumps, relative to [`Self::end`].
    pub fn jump_offset(&self) -> Option<i16> {
        match self.op {
            OpCode::Jmp | OpCode::JmpUw => Some(self.a as u16 as i16),
            OpCode::JmpIf | OpCode::JmpNot | OpCode::JmpNil => Some(self.b as i16),
            _ => None,
        }
    }

    /// Absolute target of a relative jump.
    pub fn jump_target(&self) -> Option<u32> {
        let off = self.jump_offset()?;
        Some((self.end() as i64 + off as i64) as u32)
    }
}

impl fmt::Display for DecodedInsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04} {}", self.addr, self.op.name())?;
        match self.op.format() {
            OperandFormat::Z => Ok(()),
            OperandFormat::B => write!(f, "\tR{}", self.a),
            OperandFormat::BB => write!(f, "\tR{}\t{}", self.a, self.b),
            OperandFormat::BBB => write!(f, "\tR{}\t{}\t{}", self.a, self.b, self.c),
            OperandFormat::BS => match self.jump_target() {
                Some(target) => write!(f, "\tR{}\t{:03}", self.a, target),
                None => write!(f, "\tR{}\t{}", self.a, self.b as i16),
            },
            OperandFormat::BSS => write!(f, "\tR{}\t{}\t{}", self.a, self.b, self.c),
            OperandFormat::S => match self.jump_target() {
                Some(target) => write!(f, "\t{:03}", target),
                None => write!(f, "\t{}", self.a),
            },
            OperandFormat::W => write!(f, "\t{:#08x}", self.a),
        }
    }
}

struct Reader<'a> {
    code: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn u8(&mut self) -> Option<u8> {
        let b = *self.code.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn u16(&mut self) -> Option<u16> {
        Some(u16::from(self.u8()?) << 8 | u16::from(self.u8()?))
    }

    fn u24(&mut self) -> Option<u32> {
        Some(u32::from(self.u8()?) << 16 | u32::from(self.u16()?))
    }

    fn operand(&mut self, wide: bool) -> Option<u16> {
        if wide { self.u16() } else { self.u8().map(u16::from) }
    }
}

/// Decode the instruction starting at `pc`, following one extension prefix.
///
/// Returns `None` for an unknown opcode or a truncated instruction.
pub fn decode(code: &[u8], pc: usize) -> Option<DecodedInsn> {
    let mut r = Reader { code, pos: pc };
    let mut op = OpCode::from_u8(r.u8()?)?;
    let ext = match op {
        OpCode::Ext1 => Ext::Ext1,
        OpCode::Ext2 => Ext::Ext2,
        OpCode::Ext3 => Ext::Ext3,
        _ => Ext::None,
    };
    if ext != Ext::None {
        op = OpCode::from_u8(r.u8()?)?;
    }

    let (mut a, mut b, mut c) = (0u32, 0u16, 0u16);
    match op.format() {
        OperandFormat::Z => {}
        OperandFormat::B => {
            a = r.operand(ext.first_wide())?.into();
        }
        OperandFormat::BB => {
            a = r.operand(ext.first_wide())?.into();
            b = r.operand(ext.second_wide())?;
        }
        OperandFormat::BBB => {
            a = r.operand(ext.first_wide())?.into();
            b = r.operand(ext.second_wide())?;
            c = r.u8()?.into();
        }
        OperandFormat::BS => {
            a = r.operand(ext.first_wide())?.into();
            b = r.u16()?;
        }
        OperandFormat::BSS => {
            a = r.operand(ext.first_wide())?.into();
            b = r.u16()?;
            c = r.u16()?;
        }
        OperandFormat::S => {
            a = r.u16()?.into();
        }
        OperandFormat::W => {
            a = r.u24()?;
        }
    }

    Some(DecodedInsn {
        op,
        a,
        b,
        c,
        addr: pc as u32,
        len: (r.pos - pc) as u32,
    })
}

/// Iterator over the instructions of an instruction sequence.
///
/// Stops at the first byte that does not decode.
pub struct Instructions<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, pc: 0 }
    }
}

impl Iterator for Instructions<'_> {
    type Item = DecodedInsn;

    fn next(&mut self) -> Option<DecodedInsn> {
        if self.pc >= self.code.len() {
            return None;
        }
        let insn = decode(self.code, self.pc)?;
        self.pc = insn.end() as usize;
        Some(insn)
    }
}

/// Opcodes of an instruction sequence, in order.
pub fn opcodes(code: &[u8]) -> Vec<OpCode> {
    Instructions::new(code).map(|i| i.op).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_bb() {
        let code = [OpCode::Move as u8, 3, 1];
        let insn = decode(&code, 0).unwrap();
        assert_eq!(insn.op, OpCode::Move);
        assert_eq!((insn.a, insn.b), (3, 1));
        assert_eq!(insn.len, 3);
    }

    #[test]
    fn decode_ext1_widens_first_operand() {
        let code = [OpCode::Ext1 as u8, OpCode::Move as u8, 0x01, 0x00, 7];
        let insn = decode(&code, 0).unwrap();
        assert_eq!(insn.op, OpCode::Move);
        assert_eq!((insn.a, insn.b), (256, 7));
        assert_eq!(insn.len, 5);
    }

    #[test]
    fn decode_ext2_widens_second_operand() {
        let code = [OpCode::Ext2 as u8, OpCode::LoadL as u8, 2, 0x01, 0x2c];
        let insn = decode(&code, 0).unwrap();
        assert_eq!((insn.a, insn.b), (2, 300));
    }

    #[test]
    fn decode_bss_and_w() {
        let code = [
            OpCode::LoadI32 as u8,
            1,
            0x00,
            0x01,
            0x86,
            0xa0,
            OpCode::Enter as u8,
            0x04,
            0x00,
            0x00,
        ];
        let first = decode(&code, 0).unwrap();
        assert_eq!(first.op, OpCode::LoadI32);
        assert_eq!((first.b as u32) << 16 | first.c as u32, 100_000);
        let second = decode(&code, first.end() as usize).unwrap();
        assert_eq!(second.op, OpCode::Enter);
        assert_eq!(second.a, 0x040000);
    }

    #[test]
    fn jump_target_is_relative_to_next_insn() {
        // JMP -3 at 0 jumps back to itself
        let code = [OpCode::Jmp as u8, 0xff, 0xfd];
        let insn = decode(&code, 0).unwrap();
        assert_eq!(insn.jump_offset(), Some(-3));
        assert_eq!(insn.jump_target(), Some(0));
    }

    #[test]
    fn truncated_and_unknown_bytes() {
        assert_eq!(decode(&[OpCode::Move as u8, 1], 0), None);
        assert_eq!(decode(&[0xee], 0), None);
        assert_eq!(decode(&[], 0), None);
    }

    #[test]
    fn iterate_sequence() {
        let code = [
            OpCode::LoadI1 as u8,
            1,
            OpCode::Return as u8,
            1,
            OpCode::Stop as u8,
        ];
        assert_eq!(
            opcodes(&code),
            vec![OpCode::LoadI1, OpCode::Return, OpCode::Stop]
        );
    }

    #[test]
    fn display_includes_operands() {
        let code = [OpCode::Move as u8, 2, 1];
        assert_eq!(decode(&code, 0).unwrap().to_string(), "0000 MOVE\tR2\t1");
    }
}
