//! Instruction selection with look-back rewriting.
//!
//! These helpers emit one logical operation each, but first look at the
//! instruction(s) just emitted and, when it is safe, rewrite them instead:
//! dropping redundant moves, retargeting loads, folding integer literals and
//! collapsing conditional jumps on known values. Rewriting is skipped
//! whenever [`Emitter::can_peephole`](crate::emit::Emitter::can_peephole)
//! says the previous instruction may not be touched, and never removes a
//! store to a declared local.

use rite_core::CodegenError;

use crate::bytecode::{DecodedInsn, OpCode};
use crate::fold::{FoldOp, fold_binary, int_operand};
use crate::scope::Scope;

type Result<T> = std::result::Result<T, CodegenError>;

/// Largest immediate of `ADDI`/`SUBI`.
const ADDI_MAX: i64 = 0xff;

/// Unary operators that fold on integer literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryFold {
    Plus,
    Minus,
    BitNot,
}

impl Scope {
    // ------------------------------------------------------------------
    // Look-back helpers
    // ------------------------------------------------------------------

    /// Last instruction, if it loads an integer literal into `reg`.
    fn last_int_load(&self, reg: u16) -> Option<(DecodedInsn, i64)> {
        let insn = self.code.last_insn()?;
        if insn.a != u32::from(reg) {
            return None;
        }
        let n = int_operand(&insn, &self.pool)?;
        Some((insn, n))
    }

    /// Instruction before `insn`, if `insn` is not a jump target and the
    /// previous one loads an integer literal into `reg`.
    fn int_load_before(&self, insn: &DecodedInsn, reg: u16) -> Option<(DecodedInsn, i64)> {
        if insn.addr == self.code.last_label() {
            return None;
        }
        let prev = self.code.prev_insn(insn)?;
        if prev.a != u32::from(reg) {
            return None;
        }
        let n = int_operand(&prev, &self.pool)?;
        Some((prev, n))
    }

    /// Whether `reg` is a temporary rather than `self` or a declared local.
    #[inline]
    fn is_temp(&self, reg: u32) -> bool {
        reg >= u32::from(self.nlocals())
    }

    // ------------------------------------------------------------------
    // Loads and moves
    // ------------------------------------------------------------------

    /// Load integer `n` into `dst` with the shortest encoding.
    pub fn gen_int(&mut self, dst: u16, n: i64) -> Result<()> {
        match n {
            -1 => self.code.op1(OpCode::LoadIMinus1, dst),
            -0xff..=-2 => self.code.op2(OpCode::LoadINeg, dst, (-n) as u16),
            0..=7 => {
                let op = OpCode::load_small_int(n as u8).unwrap_or(OpCode::LoadI);
                self.code.op1(op, dst)
            }
            8..=0xff => self.code.op2(OpCode::LoadI, dst, n as u16),
            _ => match i16::try_from(n) {
                Ok(small) => self.code.op2s(OpCode::LoadI16, dst, small as u16),
                Err(_) => {
                    let idx = self.pool.add_int(n)?;
                    self.code.op2(OpCode::LoadL, dst, idx)
                }
            },
        }
    }

    /// `R[dst] = R[src]`, retargeting the previous instruction when it only
    /// produced `src` for this move.
    pub fn gen_move(&mut self, dst: u16, src: u16, nopeep: bool) -> Result<()> {
        if nopeep || !self.code.can_peephole() {
            return self.code.op2(OpCode::Move, dst, src);
        }
        if dst == src {
            return Ok(());
        }
        let Some(data) = self.code.last_insn() else {
            return self.code.op2(OpCode::Move, dst, src);
        };
        let produces_src = data.a == u32::from(src) && self.is_temp(data.a);

        match data.op {
            OpCode::Move => {
                if data.b == dst && data.a == u32::from(src) {
                    // second half of a swap
                    return Ok(());
                }
            }
            OpCode::LoadNil
            | OpCode::LoadSelf
            | OpCode::LoadT
            | OpCode::LoadF
            | OpCode::LoadIMinus1
            | OpCode::LoadI0
            | OpCode::LoadI1
            | OpCode::LoadI2
            | OpCode::LoadI3
            | OpCode::LoadI4
            | OpCode::LoadI5
            | OpCode::LoadI6
            | OpCode::LoadI7
                if produces_src =>
            {
                self.code.rewind();
                return self.code.op1(data.op, dst);
            }
            OpCode::Hash | OpCode::Array if produces_src && data.b == 0 => {
                self.code.rewind();
                return self.code.op2(data.op, dst, data.b);
            }
            OpCode::LoadI
            | OpCode::LoadINeg
            | OpCode::LoadL
            | OpCode::LoadSym
            | OpCode::GetGv
            | OpCode::GetSv
            | OpCode::GetIv
            | OpCode::GetCv
            | OpCode::GetConst
            | OpCode::String
            | OpCode::Lambda
            | OpCode::Block
            | OpCode::Method
                if produces_src =>
            {
                self.code.rewind();
                return self.code.op2(data.op, dst, data.b);
            }
            OpCode::LoadI16 | OpCode::BlkPush if produces_src => {
                self.code.rewind();
                return self.code.op2s(data.op, dst, data.b);
            }
            OpCode::LoadI32 if produces_src => {
                self.code.rewind();
                let value = (data.b as u32) << 16 | data.c as u32;
                return self.code.op2ss(data.op, dst, value);
            }
            OpCode::GetUpvar if produces_src => {
                self.code.rewind();
                return self.code.op3(data.op, dst, data.b, data.c as u8);
            }
            OpCode::AddI | OpCode::SubI
                if produces_src && data.addr != self.code.last_label() =>
            {
                if self.move_of_immediate_op(&data, dst)? {
                    return Ok(());
                }
            }
            _ => {}
        }
        self.code.op2(OpCode::Move, dst, src)
    }

    /// `MOVE t, dst; ADDI t, n; MOVE dst, t` becomes `ADDI dst, n`, or a
    /// plain literal load when `dst` itself was just loaded with a literal.
    fn move_of_immediate_op(&mut self, data: &DecodedInsn, dst: u16) -> Result<bool> {
        let Some(copy) = self.code.prev_insn(data) else {
            return Ok(false);
        };
        if copy.op != OpCode::Move || copy.a != data.a || copy.b != dst {
            return Ok(false);
        }
        let fold_op = if data.op == OpCode::AddI {
            FoldOp::Add
        } else {
            FoldOp::Sub
        };
        let folded = self
            .int_load_before(&copy, dst)
            .and_then(|(load, n)| Some((load, fold_binary(fold_op, n, i64::from(data.b))?)));

        match folded {
            Some((load, n)) => {
                self.code.truncate(load.addr);
                self.gen_int(dst, n)?;
            }
            None => {
                self.code.truncate(copy.addr);
                self.code.op2(data.op, dst, data.b)?;
            }
        }
        Ok(true)
    }

    /// Store `R[dst]` with a `SET*` instruction, storing straight from the
    /// source of a preceding temporary move when the value is discarded.
    pub fn gen_setxv(&mut self, op: OpCode, dst: u16, sym_idx: u16, val: bool) -> Result<()> {
        let mut dst = dst;
        if !val && self.code.can_peephole() {
            if let Some(data) = self.code.last_insn() {
                if data.op == OpCode::Move && data.a == u32::from(dst) {
                    dst = data.b;
                    self.code.rewind();
                }
            }
        }
        self.code.op2(op, dst, sym_idx)
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    /// `ADD`/`SUB` on `R[dst]` and `R[dst+1]`.
    pub fn gen_addsub(&mut self, op: OpCode, dst: u16) -> Result<()> {
        if !self.code.can_peephole() {
            return self.code.op1(op, dst);
        }
        let Some((arg, n)) = self.last_int_load(dst + 1) else {
            return self.code.op1(op, dst);
        };
        let fold_op = if op == OpCode::Add {
            FoldOp::Add
        } else {
            FoldOp::Sub
        };

        if let Some((recv, n0)) = self.int_load_before(&arg, dst) {
            return match fold_binary(fold_op, n0, n) {
                Some(result) => {
                    self.code.truncate(recv.addr);
                    self.gen_int(dst, result)
                }
                None => self.code.op1(op, dst),
            };
        }

        if !(-ADDI_MAX..=ADDI_MAX).contains(&n) {
            return self.code.op1(op, dst);
        }
        self.code.rewind();
        if n == 0 {
            return Ok(());
        }
        let (imm_op, imm) = match (op == OpCode::Add, n > 0) {
            (true, true) => (OpCode::AddI, n),
            (true, false) => (OpCode::SubI, -n),
            (false, true) => (OpCode::SubI, n),
            (false, false) => (OpCode::AddI, -n),
        };
        self.code.op2(imm_op, dst, imm as u16)
    }

    /// `MUL`/`DIV` on `R[dst]` and `R[dst+1]`, folded when both are literals.
    pub fn gen_muldiv(&mut self, op: OpCode, dst: u16) -> Result<()> {
        let fold_op = if op == OpCode::Mul {
            FoldOp::Mul
        } else {
            FoldOp::Div
        };
        if self.fold_literals(fold_op, dst)? {
            return Ok(());
        }
        self.code.op1(op, dst)
    }

    /// Fold `R[dst] op R[dst+1]` when both were just loaded from literals.
    ///
    /// Returns `false`, emitting nothing, when folding is not possible.
    pub fn fold_literals(&mut self, op: FoldOp, dst: u16) -> Result<bool> {
        if !self.code.can_peephole() {
            return Ok(false);
        }
        let Some((arg, n)) = self.last_int_load(dst + 1) else {
            return Ok(false);
        };
        let Some((recv, n0)) = self.int_load_before(&arg, dst) else {
            return Ok(false);
        };
        let Some(result) = fold_binary(op, n0, n) else {
            return Ok(false);
        };
        self.code.truncate(recv.addr);
        self.gen_int(dst, result)?;
        Ok(true)
    }

    /// Fold a unary operator applied to an integer literal in `R[dst]`.
    pub fn fold_unary(&mut self, op: UnaryFold, dst: u16) -> Result<bool> {
        if !self.code.can_peephole() {
            return Ok(false);
        }
        let Some((load, n)) = self.last_int_load(dst) else {
            return Ok(false);
        };
        let result = match op {
            UnaryFold::Plus => n,
            UnaryFold::Minus => match n.checked_neg() {
                Some(neg) => neg,
                None => return Ok(false),
            },
            UnaryFold::BitNot => !n,
        };
        self.code.truncate(load.addr);
        self.gen_int(dst, result)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Control transfer
    // ------------------------------------------------------------------

    /// `RETURN`-family instruction on `src`.
    ///
    /// Returns the source of a preceding move directly, and emits nothing
    /// right after another `RETURN`.
    pub fn gen_return(&mut self, op: OpCode, src: u16) -> Result<()> {
        if !self.code.can_peephole() {
            return self.code.op1(op, src);
        }
        match self.code.last_insn() {
            Some(data) if data.op == OpCode::Move && data.a == u32::from(src) => {
                self.code.rewind();
                self.code.op1(op, data.b)
            }
            Some(data) if data.op == OpCode::Return => Ok(()),
            _ => self.code.op1(op, src),
        }
    }

    /// Conditional jump (`JMPIF`, `JMPNOT`, `JMPNIL`) on `reg` with a
    /// pending target.
    ///
    /// When `reg` was just loaded with a constant, the test is resolved now:
    /// the result is either an unconditional `JMP` or no jump at all
    /// (`None`). When `val` is set the tested value is still needed, so the
    /// load is kept.
    pub fn cond_jump(&mut self, op: OpCode, reg: u16, val: bool) -> Result<Option<u32>> {
        let mut reg = reg;
        if !val && self.code.can_peephole() {
            if let Some(data) = self.code.last_insn() {
                let loads_reg = data.a == u32::from(reg) && self.is_temp(data.a);
                match data.op {
                    OpCode::Move if loads_reg => {
                        self.code.rewind();
                        reg = data.b;
                    }
                    OpCode::LoadNil | OpCode::LoadF if loads_reg => {
                        self.code.truncate(data.addr);
                        let taken = op == OpCode::JmpNot
                            || (op == OpCode::JmpNil && data.op == OpCode::LoadNil);
                        return if taken {
                            self.code.jump(OpCode::Jmp, None).map(Some)
                        } else {
                            Ok(None)
                        };
                    }
                    OpCode::LoadT
                    | OpCode::LoadI
                    | OpCode::LoadINeg
                    | OpCode::LoadIMinus1
                    | OpCode::LoadI0
                    | OpCode::LoadI1
                    | OpCode::LoadI2
                    | OpCode::LoadI3
                    | OpCode::LoadI4
                    | OpCode::LoadI5
                    | OpCode::LoadI6
                    | OpCode::LoadI7
                        if loads_reg =>
                    {
                        self.code.truncate(data.addr);
                        return if op == OpCode::JmpIf {
                            self.code.jump(OpCode::Jmp, None).map(Some)
                        } else {
                            Ok(None)
                        };
                    }
                    _ => {}
                }
            }
        }
        self.code.jump_reg(op, reg, None).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{decode, opcodes};
    use crate::scope::{ScopeKind, ScopeOptions};
    use rite_core::{Sym, SymbolTable};

    fn scope_with(locals: usize, optimize: bool) -> Scope {
        let mut table = SymbolTable::new();
        let names: Vec<Sym> = (0..locals)
            .map(|i| table.intern(format!("v{i}")))
            .collect();
        Scope::new(
            ScopeKind::Top,
            &names,
            Sym::NULL,
            0,
            ScopeOptions {
                optimize,
                allow_ext: true,
            },
        )
        .unwrap()
    }

    fn ops(s: &Scope) -> Vec<OpCode> {
        opcodes(s.code.code())
    }

    #[test]
    fn int_encodings() {
        let mut s = scope_with(0, true);
        for n in [-1, -200, 5, 200, 1000, -1000, 1_000_000, 1 << 40] {
            s.gen_int(1, n).unwrap();
        }
        assert_eq!(
            ops(&s),
            vec![
                OpCode::LoadIMinus1,
                OpCode::LoadINeg,
                OpCode::LoadI5,
                OpCode::LoadI,
                OpCode::LoadI16,
                OpCode::LoadI16,
                OpCode::LoadL,
                OpCode::LoadL,
            ]
        );
        assert_eq!(s.pool.len(), 2);
    }

    #[test]
    fn self_move_is_dropped() {
        let mut s = scope_with(0, true);
        s.code.op1(OpCode::LoadSelf, 1).unwrap();
        s.gen_move(2, 2, false).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadSelf]);
    }

    #[test]
    fn load_is_retargeted() {
        let mut s = scope_with(1, true);
        s.code.op1(OpCode::LoadNil, 2).unwrap();
        s.gen_move(1, 2, false).unwrap();
        let insn = decode(s.code.code(), 0).unwrap();
        assert_eq!((insn.op, insn.a), (OpCode::LoadNil, 1));
        assert_eq!(s.code.code().len(), 2);
    }

    #[test]
    fn move_from_local_is_kept() {
        let mut s = scope_with(2, true);
        // R1 is a declared local; its load must survive
        s.code.op1(OpCode::LoadNil, 1).unwrap();
        s.gen_move(2, 1, false).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadNil, OpCode::Move]);
    }

    #[test]
    fn swap_half_is_dropped() {
        let mut s = scope_with(2, true);
        s.code.op2(OpCode::Move, 3, 1).unwrap();
        s.gen_move(1, 3, false).unwrap();
        assert_eq!(ops(&s), vec![OpCode::Move]);
    }

    #[test]
    fn nopeep_forces_move() {
        let mut s = scope_with(0, true);
        s.code.op1(OpCode::LoadNil, 2).unwrap();
        s.gen_move(1, 2, true).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadNil, OpCode::Move]);
    }

    #[test]
    fn increment_of_local_becomes_addi() {
        // x = x + 1 with x in R1
        let mut s = scope_with(1, true);
        s.code.op2(OpCode::Move, 2, 1).unwrap();
        s.code.op2(OpCode::AddI, 2, 1).unwrap();
        s.gen_move(1, 2, false).unwrap();
        let insns: Vec<_> = crate::bytecode::Instructions::new(s.code.code()).collect();
        assert_eq!(insns.len(), 1);
        assert_eq!((insns[0].op, insns[0].a, insns[0].b), (OpCode::AddI, 1, 1));
    }

    #[test]
    fn add_literal_becomes_addi() {
        let mut s = scope_with(1, true);
        s.code.op2(OpCode::Move, 2, 1).unwrap();
        s.gen_int(3, 1).unwrap();
        s.gen_addsub(OpCode::Add, 2).unwrap();
        assert_eq!(ops(&s), vec![OpCode::Move, OpCode::AddI]);
    }

    #[test]
    fn add_negative_literal_becomes_subi() {
        let mut s = scope_with(1, true);
        s.code.op2(OpCode::Move, 2, 1).unwrap();
        s.gen_int(3, -5).unwrap();
        s.gen_addsub(OpCode::Add, 2).unwrap();
        let last = s.code.last_insn().unwrap();
        assert_eq!((last.op, last.b), (OpCode::SubI, 5));
    }

    #[test]
    fn add_zero_emits_nothing() {
        let mut s = scope_with(1, true);
        s.code.op2(OpCode::Move, 2, 1).unwrap();
        s.gen_int(3, 0).unwrap();
        s.gen_addsub(OpCode::Sub, 2).unwrap();
        assert_eq!(ops(&s), vec![OpCode::Move]);
    }

    #[test]
    fn large_immediate_uses_add() {
        let mut s = scope_with(1, true);
        s.code.op2(OpCode::Move, 2, 1).unwrap();
        s.gen_int(3, 256).unwrap();
        s.gen_addsub(OpCode::Add, 2).unwrap();
        assert_eq!(ops(&s), vec![OpCode::Move, OpCode::LoadI16, OpCode::Add]);
    }

    #[test]
    fn two_literals_fold() {
        let mut s = scope_with(0, true);
        s.gen_int(1, 2).unwrap();
        s.gen_int(2, 3).unwrap();
        s.gen_addsub(OpCode::Add, 1).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadI5]);

        let mut s = scope_with(0, true);
        s.gen_int(1, 6).unwrap();
        s.gen_int(2, 7).unwrap();
        s.gen_muldiv(OpCode::Mul, 1).unwrap();
        let insn = s.code.last_insn().unwrap();
        assert_eq!((insn.op, insn.b), (OpCode::LoadI, 42));
    }

    #[test]
    fn overflowing_fold_keeps_instruction() {
        let mut s = scope_with(0, true);
        s.gen_int(1, i64::MAX).unwrap();
        s.gen_int(2, 2).unwrap();
        s.gen_muldiv(OpCode::Mul, 1).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadL, OpCode::LoadI2, OpCode::Mul]);
    }

    #[test]
    fn division_by_zero_is_left_to_runtime() {
        let mut s = scope_with(0, true);
        s.gen_int(1, 1).unwrap();
        s.gen_int(2, 0).unwrap();
        s.gen_muldiv(OpCode::Div, 1).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadI1, OpCode::LoadI0, OpCode::Div]);
    }

    #[test]
    fn no_fold_across_label() {
        let mut s = scope_with(0, true);
        s.gen_int(1, 2).unwrap();
        s.code.label();
        s.gen_int(2, 3).unwrap();
        s.gen_muldiv(OpCode::Mul, 1).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadI2, OpCode::LoadI3, OpCode::Mul]);
    }

    #[test]
    fn optimization_off_emits_plain() {
        let mut s = scope_with(0, false);
        s.gen_int(1, 2).unwrap();
        s.gen_int(2, 3).unwrap();
        s.gen_addsub(OpCode::Add, 1).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadI2, OpCode::LoadI3, OpCode::Add]);
    }

    #[test]
    fn unary_minus_folds() {
        let mut s = scope_with(0, true);
        s.gen_int(1, 5).unwrap();
        assert!(s.fold_unary(UnaryFold::Minus, 1).unwrap());
        let insn = s.code.last_insn().unwrap();
        assert_eq!((insn.op, insn.b), (OpCode::LoadINeg, 5));
        assert!(s.fold_unary(UnaryFold::BitNot, 1).unwrap());
        assert_eq!(s.code.last_insn().unwrap().op, OpCode::LoadI4);
    }

    #[test]
    fn return_of_move_returns_source() {
        let mut s = scope_with(1, true);
        s.code.op2(OpCode::Move, 2, 1).unwrap();
        s.gen_return(OpCode::Return, 2).unwrap();
        let insn = s.code.last_insn().unwrap();
        assert_eq!((insn.op, insn.a), (OpCode::Return, 1));
        assert_eq!(ops(&s).len(), 1);
        s.gen_return(OpCode::Return, 1).unwrap();
        assert_eq!(ops(&s).len(), 1);
    }

    #[test]
    fn jump_on_constant() {
        let mut s = scope_with(0, true);
        s.code.op1(OpCode::LoadT, 1).unwrap();
        assert_eq!(s.cond_jump(OpCode::JmpNot, 1, false).unwrap(), None);
        assert!(ops(&s).is_empty());

        let mut s = scope_with(0, true);
        s.code.op1(OpCode::LoadNil, 1).unwrap();
        assert!(s.cond_jump(OpCode::JmpNot, 1, false).unwrap().is_some());
        assert_eq!(ops(&s), vec![OpCode::Jmp]);

        let mut s = scope_with(0, true);
        s.code.op1(OpCode::LoadF, 1).unwrap();
        assert_eq!(s.cond_jump(OpCode::JmpNil, 1, false).unwrap(), None);
    }

    #[test]
    fn jump_tests_move_source() {
        let mut s = scope_with(1, true);
        s.code.op2(OpCode::Move, 2, 1).unwrap();
        s.cond_jump(OpCode::JmpIf, 2, false).unwrap();
        let insn = s.code.last_insn().unwrap();
        assert_eq!((insn.op, insn.a), (OpCode::JmpIf, 1));
    }

    #[test]
    fn jump_with_value_keeps_load() {
        let mut s = scope_with(0, true);
        s.code.op1(OpCode::LoadT, 1).unwrap();
        s.cond_jump(OpCode::JmpNot, 1, true).unwrap();
        assert_eq!(ops(&s), vec![OpCode::LoadT, OpCode::JmpNot]);
    }

    #[test]
    fn discarded_store_skips_temp() {
        let mut s = scope_with(1, true);
        s.code.op2(OpCode::Move, 2, 1).unwrap();
        s.gen_setxv(OpCode::SetGv, 2, 0, false).unwrap();
        let insn = s.code.last_insn().unwrap();
        assert_eq!((insn.op, insn.a), (OpCode::SetGv, 1));
        assert_eq!(ops(&s).len(), 1);
    }
}
