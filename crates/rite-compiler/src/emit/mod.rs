//! Instruction emitter.
//!
//! Appends encoded instructions to a growing buffer and keeps what the
//! peephole optimizer needs to look back: the start address of every
//! instruction, the start of the most recent one and the most recent label.
//! When a source filename is known, every emitted byte also records the
//! current source line.

pub mod jumps;

use rite_core::CodegenError;

use crate::bytecode::{DecodedInsn, Ext, OpCode, decode};

pub use jumps::{JumpList, LoopInfo, LoopKind, LoopStack};

type Result<T> = std::result::Result<T, CodegenError>;

#[derive(Debug)]
pub struct Emitter {
    code: Vec<u8>,
    /// Source line of every byte in `code`.
    lines: Option<Vec<u16>>,
    /// Start address of every live instruction, ascending.
    starts: Vec<u32>,
    last_pc: u32,
    last_label: u32,
    line: u16,
    optimize: bool,
    allow_ext: bool,
}

impl Emitter {
    pub fn new(track_lines: bool, optimize: bool, allow_ext: bool) -> Self {
        Self {
            code: Vec::with_capacity(1024),
            lines: track_lines.then(|| Vec::with_capacity(1024)),
            starts: Vec::with_capacity(256),
            last_pc: 0,
            last_label: 0,
            line: 0,
            optimize,
            allow_ext,
        }
    }

    #[inline]
    pub fn pc(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn lines(&self) -> Option<&[u16]> {
        self.lines.as_deref()
    }

    pub fn tracks_lines(&self) -> bool {
        self.lines.is_some()
    }

    /// Line recorded for subsequently emitted bytes; 0 keeps the previous one.
    pub fn set_line(&mut self, line: u16) {
        self.line = line;
    }

    pub fn line(&self) -> u16 {
        self.line
    }

    pub fn optimize(&self) -> bool {
        self.optimize
    }

    // ------------------------------------------------------------------
    // Raw output
    // ------------------------------------------------------------------

    fn byte(&mut self, b: u8) -> Result<()> {
        if self.code.len() >= u32::MAX as usize {
            return Err(CodegenError::CodeTooLarge);
        }
        if let Some(lines) = &mut self.lines {
            let line = match lines.last() {
                Some(&prev) if self.line == 0 => prev,
                _ => self.line,
            };
            lines.push(line);
        }
        self.code.push(b);
        Ok(())
    }

    fn short(&mut self, v: u16) -> Result<()> {
        self.byte((v >> 8) as u8)?;
        self.byte(v as u8)
    }

    fn operand(&mut self, v: u16, wide: bool) -> Result<()> {
        if wide { self.short(v) } else { self.byte(v as u8) }
    }

    fn begin(&mut self) {
        let pc = self.pc();
        self.last_pc = pc;
        self.starts.push(pc);
    }

    /// Start an instruction, writing the extension prefix its operands need.
    fn start(&mut self, op: OpCode, a_wide: bool, b_wide: bool) -> Result<()> {
        self.begin();
        let ext = Ext::for_operands(a_wide, b_wide);
        if let Some(prefix) = ext.opcode() {
            if !self.allow_ext {
                return Err(CodegenError::ExtendedOperand);
            }
            self.byte(prefix.into())?;
        }
        self.byte(op.into())
    }

    // ------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------

    pub fn op0(&mut self, op: OpCode) -> Result<()> {
        self.start(op, false, false)
    }

    pub fn op1(&mut self, op: OpCode, a: u16) -> Result<()> {
        let wide = a > 0xff;
        self.start(op, wide, false)?;
        self.operand(a, wide)
    }

    pub fn op2(&mut self, op: OpCode, a: u16, b: u16) -> Result<()> {
        let (aw, bw) = (a > 0xff, b > 0xff);
        self.start(op, aw, bw)?;
        self.operand(a, aw)?;
        self.operand(b, bw)
    }

    pub fn op3(&mut self, op: OpCode, a: u16, b: u16, c: u8) -> Result<()> {
        self.op2(op, a, b)?;
        self.byte(c)
    }

    /// `BS` format: only `a` can be widened.
    pub fn op2s(&mut self, op: OpCode, a: u16, b: u16) -> Result<()> {
        self.op1(op, a)?;
        self.short(b)
    }

    /// `BSS` format: the 32-bit `b` is split into two 16-bit halves.
    pub fn op2ss(&mut self, op: OpCode, a: u16, b: u32) -> Result<()> {
        self.op1(op, a)?;
        self.short((b >> 16) as u16)?;
        self.short(b as u16)
    }

    /// `W` format: one 24-bit operand.
    pub fn opw(&mut self, op: OpCode, a: u32) -> Result<()> {
        self.start(op, false, false)?;
        self.byte((a >> 16) as u8)?;
        self.byte((a >> 8) as u8)?;
        self.byte(a as u8)
    }

    // ------------------------------------------------------------------
    // Jumps and labels
    // ------------------------------------------------------------------

    /// Mark the current address as a jump target.
    pub fn label(&mut self) -> u32 {
        let pc = self.pc();
        self.last_label = pc;
        pc
    }

    fn jump_field(&mut self, target: Option<u32>) -> Result<u32> {
        let pos = self.pc();
        match target {
            Some(target) => {
                let offset = target as i64 - (pos as i64 + 2);
                let off =
                    i16::try_from(offset).map_err(|_| CodegenError::JumpOutOfRange { offset })?;
                self.short(off as u16)?;
            }
            None => self.short(0xffff)?,
        }
        Ok(pos)
    }

    /// Emit an `S`-format jump. With no target the offset is left pending
    /// and must be resolved with [`Emitter::patch_jump`].
    ///
    /// Returns the address of the offset field.
    pub fn jump(&mut self, op: OpCode, target: Option<u32>) -> Result<u32> {
        self.start(op, false, false)?;
        self.jump_field(target)
    }

    /// Emit a `BS`-format conditional jump on register `reg`.
    pub fn jump_reg(&mut self, op: OpCode, reg: u16, target: Option<u32>) -> Result<u32> {
        let wide = reg > 0xff;
        self.start(op, wide, false)?;
        self.operand(reg, wide)?;
        self.jump_field(target)
    }

    /// Point the pending jump whose offset field is at `pos` at the current
    /// address, which becomes a label.
    pub fn patch_jump(&mut self, pos: u32) -> Result<()> {
        let target = self.pc();
        let offset = target as i64 - (pos as i64 + 2);
        if offset > i16::MAX as i64 {
            return Err(CodegenError::JumpOutOfRange { offset });
        }
        self.last_label = target;
        let off = (offset as i16) as u16;
        let at = pos as usize;
        self.code[at] = (off >> 8) as u8;
        self.code[at + 1] = off as u8;
        Ok(())
    }

    /// Resolve every jump of `list` to the current address.
    pub fn patch_all(&mut self, list: JumpList) -> Result<()> {
        for pos in list {
            self.patch_jump(pos)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Look-back for the peephole optimizer
    // ------------------------------------------------------------------

    /// Whether the last instruction may be inspected and rewritten.
    ///
    /// Not when optimization is off, at the very start, right after a label
    /// (the instruction may be a jump target) or right after a rewind.
    pub fn can_peephole(&self) -> bool {
        let pc = self.pc();
        self.optimize && pc != 0 && pc != self.last_label && pc != self.last_pc
    }

    pub fn last_label(&self) -> u32 {
        self.last_label
    }

    /// The most recently emitted instruction.
    pub fn last_insn(&self) -> Option<DecodedInsn> {
        let &start = self.starts.last()?;
        decode(&self.code, start as usize)
    }

    /// The instruction immediately before `insn`.
    pub fn prev_insn(&self, insn: &DecodedInsn) -> Option<DecodedInsn> {
        let idx = self.starts.partition_point(|&s| s < insn.addr);
        let start = *self.starts.get(idx.checked_sub(1)?)?;
        decode(&self.code, start as usize)
    }

    /// Remove the last instruction.
    pub fn rewind(&mut self) {
        if let Some(&start) = self.starts.last() {
            self.truncate(start);
        }
    }

    /// Remove every instruction starting at or after `addr`.
    ///
    /// The peephole stays disabled until the next instruction is emitted.
    pub fn truncate(&mut self, addr: u32) {
        self.code.truncate(addr as usize);
        if let Some(lines) = &mut self.lines {
            lines.truncate(addr as usize);
        }
        let keep = self.starts.partition_point(|&s| s < addr);
        self.starts.truncate(keep);
        self.last_pc = self.pc();
    }

    /// Finished instruction bytes and their line table.
    pub fn into_parts(self) -> (Vec<u8>, Option<Vec<u16>>) {
        let mut code = self.code;
        code.shrink_to_fit();
        (code, self.lines)
    }
}
