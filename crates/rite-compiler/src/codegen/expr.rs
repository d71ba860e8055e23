//! Literals, variables and assignment.

use rite_ast::{BigIntLit, ConstScope, HashElement, Node, NodeKind, Target};
use rite_core::Sym;

use super::{GEN_LIT_ARY_MAX, GEN_VAL_STACK_MAX, Generator, Result};
use crate::bytecode::OpCode;
use crate::irep::BigIntBlob;
use crate::scope::Scope;

impl Generator {
    // ------------------------------------------------------------------
    // Literals
    // ------------------------------------------------------------------

    pub(super) fn gen_integer(&mut self, s: &mut Scope, n: i64, val: bool) -> Result<()> {
        if val {
            let sp = s.sp();
            s.gen_int(sp, n)?;
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_bigint(&mut self, s: &mut Scope, lit: &BigIntLit<'_>, val: bool) -> Result<()> {
        if val {
            let idx = s.pool.add_bigint(BigIntBlob {
                base: lit.base,
                negative: lit.negative,
                digits: lit.digits.into(),
            })?;
            let sp = s.sp();
            s.code.op2(OpCode::LoadL, sp, idx)?;
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_float(&mut self, s: &mut Scope, f: f64, val: bool) -> Result<()> {
        if val {
            let idx = s.pool.add_float(f)?;
            let sp = s.sp();
            s.code.op2(OpCode::LoadL, sp, idx)?;
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_str(&mut self, s: &mut Scope, bytes: &[u8], val: bool) -> Result<()> {
        if val {
            let idx = s.pool.add_str(bytes)?;
            let sp = s.sp();
            s.code.op2(OpCode::String, sp, idx)?;
            s.push()?;
        }
        Ok(())
    }

    /// `"a#{b}c"`: the parts are concatenated left to right onto a string
    /// accumulator.
    pub(super) fn gen_interpolated(
        &mut self,
        s: &mut Scope,
        parts: &[Node<'_>],
        val: bool,
    ) -> Result<()> {
        if !val {
            for part in parts {
                if !matches!(part.kind, NodeKind::Str(_)) {
                    self.codegen(s, part, false)?;
                }
            }
            return Ok(());
        }
        let rest = match parts.split_first() {
            Some((first, rest)) if matches!(first.kind, NodeKind::Str(_)) => {
                self.codegen(s, first, true)?;
                rest
            }
            _ => {
                self.gen_str(s, b"", true)?;
                parts
            }
        };
        for part in rest {
            self.codegen(s, part, true)?;
            s.pop_n(2)?;
            let sp = s.sp();
            s.code.op1(OpCode::StrCat, sp)?;
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_symbol(&mut self, s: &mut Scope, sym: Sym, val: bool) -> Result<()> {
        if val {
            let idx = s.sym(sym)?;
            let sp = s.sp();
            s.code.op2(OpCode::LoadSym, sp, idx)?;
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_array(&mut self, s: &mut Scope, elems: &[Node<'_>], val: bool) -> Result<()> {
        let n = self.gen_values(s, elems, val, 0)?;
        if val {
            if let Some(n) = n {
                s.pop_n(n)?;
                let sp = s.sp();
                s.code.op2(OpCode::Array, sp, n as u16)?;
            }
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_hash_literal(
        &mut self,
        s: &mut Scope,
        elems: &[HashElement<'_>],
        val: bool,
    ) -> Result<()> {
        let pairs = self.gen_hash(s, elems, val, GEN_LIT_ARY_MAX)?;
        if val {
            if let Some(pairs) = pairs {
                s.pop_n(pairs * 2)?;
                let sp = s.sp();
                s.code.op2(OpCode::Hash, sp, pairs as u16)?;
                s.push()?;
            }
        }
        Ok(())
    }

    pub(super) fn gen_range(
        &mut self,
        s: &mut Scope,
        low: Option<&Node<'_>>,
        high: Option<&Node<'_>>,
        exclusive: bool,
        val: bool,
    ) -> Result<()> {
        self.codegen_opt(s, low, val)?;
        self.codegen_opt(s, high, val)?;
        if val {
            s.pop_n(2)?;
            let sp = s.sp();
            let op = if exclusive {
                OpCode::RangeExc
            } else {
                OpCode::RangeInc
            };
            s.code.op1(op, sp)?;
            s.push()?;
        }
        Ok(())
    }

    /// A splat outside an argument or element list is its operand.
    pub(super) fn gen_splat(&mut self, s: &mut Scope, value: &Node<'_>, val: bool) -> Result<()> {
        self.codegen(s, value, val)
    }

    /// Values of an argument or element list, left on the stack.
    ///
    /// Returns the number of values pushed, or `None` when they were
    /// collected into one array (splats, more than `limit` values, or a
    /// deep stack). In that case the array is at the stack pointer and has
    /// not been pushed. A `limit` of 0 means the literal limit.
    pub(super) fn gen_values(
        &mut self,
        s: &mut Scope,
        elems: &[Node<'_>],
        val: bool,
        limit: usize,
    ) -> Result<Option<usize>> {
        if !val {
            for elem in elems {
                self.codegen(s, elem, false)?;
            }
            return Ok(Some(elems.len()));
        }

        let mut limit = if limit == 0 { GEN_LIT_ARY_MAX } else { limit };
        let slimit = if s.sp() >= GEN_VAL_STACK_MAX {
            i16::MAX as u16
        } else {
            GEN_VAL_STACK_MAX
        };
        let mut n = 0usize;
        let mut first = true;

        for elem in elems {
            let splat = match elem.kind {
                NodeKind::Splat(inner) => Some(inner),
                _ => None,
            };
            if splat.is_some() || s.sp() >= slimit {
                // flush the values gathered so far into the array
                s.pop_n(n)?;
                if first {
                    let sp = s.sp();
                    if n == 0 {
                        s.code.op1(OpCode::LoadNil, sp)?;
                    } else {
                        s.code.op2(OpCode::Array, sp, n as u16)?;
                    }
                    s.push()?;
                    first = false;
                    limit = GEN_LIT_ARY_MAX;
                } else if n > 0 {
                    s.pop()?;
                    let sp = s.sp();
                    s.code.op2(OpCode::AryPush, sp, n as u16)?;
                    s.push()?;
                }
                n = 0;
            }
            match splat {
                Some(inner) => {
                    self.codegen(s, inner, true)?;
                    s.pop_n(2)?;
                    let sp = s.sp();
                    s.code.op1(OpCode::AryCat, sp)?;
                    s.push()?;
                }
                None => {
                    self.codegen(s, elem, true)?;
                    n += 1;
                }
            }
        }

        if !first {
            s.pop()?;
            if n > 0 {
                s.pop_n(n)?;
                let sp = s.sp();
                s.code.op2(OpCode::AryPush, sp, n as u16)?;
            }
            return Ok(None);
        }
        if n > limit {
            s.pop_n(n)?;
            let sp = s.sp();
            s.code.op2(OpCode::Array, sp, n as u16)?;
            return Ok(None);
        }
        Ok(Some(n))
    }

    /// Key/value pairs of a hash literal or keyword argument list.
    ///
    /// Returns the number of pairs left on the stack, or `None` when the
    /// hash was already built (double splats, more than `limit` pairs, or a
    /// deep stack) and pushed.
    pub(super) fn gen_hash(
        &mut self,
        s: &mut Scope,
        elems: &[HashElement<'_>],
        val: bool,
        limit: usize,
    ) -> Result<Option<usize>> {
        let slimit = if usize::from(s.sp()) >= GEN_LIT_ARY_MAX {
            i16::MAX as u16
        } else {
            GEN_VAL_STACK_MAX
        };
        let mut len = 0usize;
        let mut update = false;
        let mut first = true;

        for elem in elems {
            match elem {
                HashElement::Splat(value) => {
                    if val && first {
                        let sp = s.sp();
                        s.code.op2(OpCode::Hash, sp, 0)?;
                        s.push()?;
                        update = true;
                    } else if val && len > 0 {
                        self.flush_pairs(s, len, update)?;
                    }
                    self.codegen(s, value, val)?;
                    if val && (len > 0 || update) {
                        s.pop_n(2)?;
                        let sp = s.sp();
                        s.code.op1(OpCode::HashCat, sp)?;
                        s.push()?;
                    }
                    update = true;
                    len = 0;
                }
                HashElement::Pair(key, value) => {
                    self.codegen(s, key, val)?;
                    self.codegen(s, value, val)?;
                    len += 1;
                }
            }
            if val && s.sp() >= slimit {
                self.flush_pairs(s, len, update)?;
                update = true;
                len = 0;
            }
            first = false;
        }

        if val && !update && len > limit {
            s.pop_n(len * 2)?;
            let sp = s.sp();
            s.code.op2(OpCode::Hash, sp, len as u16)?;
            s.push()?;
            return Ok(None);
        }
        if update {
            if val && len > 0 {
                s.pop_n(len * 2 + 1)?;
                let sp = s.sp();
                s.code.op2(OpCode::HashAdd, sp, len as u16)?;
                s.push()?;
            }
            return Ok(None);
        }
        Ok(Some(len))
    }

    /// Turn the pending `len` pairs into a new hash, or add them to the one
    /// below them.
    fn flush_pairs(&mut self, s: &mut Scope, len: usize, update: bool) -> Result<()> {
        s.pop_n(len * 2)?;
        if update {
            s.pop()?;
            let sp = s.sp();
            s.code.op2(OpCode::HashAdd, sp, len as u16)?;
        } else {
            let sp = s.sp();
            s.code.op2(OpCode::Hash, sp, len as u16)?;
        }
        s.push()
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    pub(super) fn gen_local_get(&mut self, s: &mut Scope, name: Sym, val: bool) -> Result<()> {
        let sp = s.sp();
        match s.local_reg(name) {
            Some(reg) => {
                if val {
                    s.gen_move(sp, reg, true)?;
                }
            }
            None => {
                let (lv, idx) = self.find_upvar(s, name)?;
                if val {
                    s.code.op3(OpCode::GetUpvar, sp, idx, lv)?;
                }
            }
        }
        if val {
            s.push()?;
        }
        Ok(())
    }

    /// `GETGV`/`GETIV`/`GETCV`/`GETCONST` of `name`.
    pub(super) fn gen_var_get(
        &mut self,
        s: &mut Scope,
        op: OpCode,
        name: Sym,
        val: bool,
    ) -> Result<()> {
        if val {
            let idx = s.sym(name)?;
            let sp = s.sp();
            s.code.op2(op, sp, idx)?;
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_scoped_const(
        &mut self,
        s: &mut Scope,
        scope: ConstScope<'_>,
        name: Sym,
        val: bool,
    ) -> Result<()> {
        match scope {
            ConstScope::Lexical => self.gen_var_get(s, OpCode::GetConst, name, val),
            ConstScope::Root => {
                let idx = s.sym(name)?;
                let sp = s.sp();
                s.code.op1(OpCode::OClass, sp)?;
                s.code.op2(OpCode::GetMcnst, sp, idx)?;
                s.push()?;
                if !val {
                    s.pop()?;
                }
                Ok(())
            }
            ConstScope::Expr(outer) => {
                self.codegen(s, outer, true)?;
                s.pop()?;
                let idx = s.sym(name)?;
                let sp = s.sp();
                s.code.op2(OpCode::GetMcnst, sp, idx)?;
                if val {
                    s.push()?;
                }
                Ok(())
            }
        }
    }

    /// Current value of an assignment target.
    fn gen_target_get(&mut self, s: &mut Scope, target: Target) -> Result<()> {
        match target {
            Target::Local(name) => self.gen_local_get(s, name, true),
            Target::IVar(name) => self.gen_var_get(s, OpCode::GetIv, name, true),
            Target::GVar(name) => self.gen_var_get(s, OpCode::GetGv, name, true),
            Target::CVar(name) => self.gen_var_get(s, OpCode::GetCv, name, true),
            Target::Const(name) => self.gen_var_get(s, OpCode::GetConst, name, true),
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    pub(super) fn gen_assign(
        &mut self,
        s: &mut Scope,
        target: Target,
        value: &Node<'_>,
        val: bool,
    ) -> Result<()> {
        self.codegen(s, value, true)?;
        s.pop()?;
        let sp = s.sp();
        self.gen_store(s, target, sp, val)
    }

    /// Store register `src` into `target`; with `val` the value is also
    /// left pushed at the stack pointer.
    pub(super) fn gen_store(
        &mut self,
        s: &mut Scope,
        target: Target,
        src: u16,
        val: bool,
    ) -> Result<()> {
        let setter = match target {
            Target::Local(name) => {
                match s.local_reg(name) {
                    Some(reg) => {
                        if reg != src {
                            s.gen_move(reg, src, val)?;
                        }
                    }
                    None => self.gen_upvar_set(s, name, src, val)?,
                }
                None
            }
            Target::IVar(name) => Some((OpCode::SetIv, name)),
            Target::GVar(name) => Some((OpCode::SetGv, name)),
            Target::CVar(name) => Some((OpCode::SetCv, name)),
            Target::Const(name) => Some((OpCode::SetConst, name)),
        };
        if let Some((op, name)) = setter {
            let idx = s.sym(name)?;
            s.gen_setxv(op, src, idx, val)?;
        }
        if val {
            s.push()?;
        }
        Ok(())
    }

    /// `SETUPVAR` of a local from an enclosing scope.
    pub(super) fn gen_upvar_set(
        &mut self,
        s: &mut Scope,
        name: Sym,
        src: u16,
        val: bool,
    ) -> Result<()> {
        let (lv, idx) = self.find_upvar(s, name)?;
        let mut src = src;
        if !val && s.code.can_peephole() {
            if let Some(data) = s.code.last_insn() {
                if data.op == OpCode::Move && data.a == u32::from(src) {
                    src = data.b;
                    s.code.rewind();
                }
            }
        }
        s.code.op3(OpCode::SetUpvar, src, idx, lv)
    }

    /// `target op= value`, with `||=` and `&&=` short-circuiting.
    pub(super) fn gen_op_assign(
        &mut self,
        s: &mut Scope,
        target: Target,
        op: Sym,
        value: &Node<'_>,
        val: bool,
    ) -> Result<()> {
        self.gen_target_get(s, target)?;

        if op == self.ops.oror || op == self.ops.andand {
            s.pop()?;
            let sp = s.sp();
            let jump = if op == self.ops.oror {
                OpCode::JmpIf
            } else {
                OpCode::JmpNot
            };
            let skip = s.cond_jump(jump, sp, val)?;
            self.codegen(s, value, true)?;
            s.pop()?;
            let sp = s.sp();
            self.gen_store(s, target, sp, val)?;
            if let Some(pos) = skip {
                s.code.patch_jump(pos)?;
            }
            return Ok(());
        }

        self.codegen(s, value, true)?;
        // room for a block argument
        s.push()?;
        s.pop()?;
        s.pop_n(2)?;
        let sp = s.sp();
        let ops = self.ops;
        if op == ops.add {
            s.gen_addsub(OpCode::Add, sp)?;
        } else if op == ops.sub {
            s.gen_addsub(OpCode::Sub, sp)?;
        } else if op == ops.mul {
            s.gen_muldiv(OpCode::Mul, sp)?;
        } else if op == ops.div {
            s.gen_muldiv(OpCode::Div, sp)?;
        } else if let Some(cmp) = self.comparison_op(op) {
            s.code.op1(cmp, sp)?;
        } else {
            let idx = s.sym(op)?;
            s.code.op3(OpCode::Send, sp, idx, 1)?;
        }
        self.gen_store(s, target, sp, val)
    }

    /// Dedicated instruction of a comparison operator.
    pub(super) fn comparison_op(&self, name: Sym) -> Option<OpCode> {
        let ops = &self.ops;
        match name {
            n if n == ops.lt => Some(OpCode::Lt),
            n if n == ops.le => Some(OpCode::Le),
            n if n == ops.gt => Some(OpCode::Gt),
            n if n == ops.ge => Some(OpCode::Ge),
            n if n == ops.eq => Some(OpCode::Eq),
            _ => None,
        }
    }
}
