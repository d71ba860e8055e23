//! Conditionals, loops, non-local jumps and exception handling.

use rite_ast::{BeginBlock, CaseExpr, Node, NodeKind};

use super::{Generator, Result};
use crate::bytecode::OpCode;
use crate::emit::{JumpList, LoopKind};
use crate::irep::CatchKind;
use crate::scope::Scope;

impl Generator {
    // ------------------------------------------------------------------
    // Boolean operators
    // ------------------------------------------------------------------

    pub(super) fn gen_and(
        &mut self,
        s: &mut Scope,
        lhs: &Node<'_>,
        rhs: &Node<'_>,
        val: bool,
    ) -> Result<()> {
        if lhs.is_always_true() {
            return self.codegen(s, rhs, val);
        }
        if lhs.is_always_false() {
            return self.codegen(s, lhs, val);
        }
        self.gen_short_circuit(s, OpCode::JmpNot, lhs, rhs, val)
    }

    pub(super) fn gen_or(
        &mut self,
        s: &mut Scope,
        lhs: &Node<'_>,
        rhs: &Node<'_>,
        val: bool,
    ) -> Result<()> {
        if lhs.is_always_true() {
            return self.codegen(s, lhs, val);
        }
        if lhs.is_always_false() {
            return self.codegen(s, rhs, val);
        }
        self.gen_short_circuit(s, OpCode::JmpIf, lhs, rhs, val)
    }

    /// `lhs`, then `rhs` unless `jump` on the value of `lhs` is taken.
    fn gen_short_circuit(
        &mut self,
        s: &mut Scope,
        jump: OpCode,
        lhs: &Node<'_>,
        rhs: &Node<'_>,
        val: bool,
    ) -> Result<()> {
        self.codegen(s, lhs, true)?;
        s.pop()?;
        let sp = s.sp();
        let skip = s.cond_jump(jump, sp, val)?;
        self.codegen(s, rhs, val)?;
        if let Some(pos) = skip {
            s.code.patch_jump(pos)?;
        }
        Ok(())
    }

    /// `!value` is a call of `!`.
    pub(super) fn gen_not(&mut self, s: &mut Scope, value: &Node<'_>, val: bool) -> Result<()> {
        self.codegen(s, value, true)?;
        s.push()?;
        s.pop()?;
        s.pop()?;
        let idx = s.sym(self.ops.not)?;
        let sp = s.sp();
        s.code.op3(OpCode::Send, sp, idx, 0)?;
        if val {
            s.push()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conditionals
    // ------------------------------------------------------------------

    pub(super) fn gen_if(
        &mut self,
        s: &mut Scope,
        cond: &Node<'_>,
        then: Option<&Node<'_>>,
        otherwise: Option<&Node<'_>>,
        val: bool,
    ) -> Result<()> {
        if cond.is_always_true() {
            return self.codegen_opt(s, then, val);
        }
        if cond.is_always_false() {
            return self.codegen_opt(s, otherwise, val);
        }

        // `if x.nil?` tests the receiver with JMPNIL instead of sending
        let nil_test = match cond.kind {
            NodeKind::Call(call)
                if call.name == self.ops.nil_p
                    && call.args.is_empty()
                    && call.kwargs.is_empty()
                    && call.block.is_none()
                    && !call.safe_nav =>
            {
                call.receiver
            }
            _ => None,
        };
        self.codegen(s, nil_test.unwrap_or(cond), true)?;
        s.pop()?;
        let sp = s.sp();

        if val || then.is_some() {
            let to_else = match nil_test {
                Some(_) => {
                    let to_then = s.cond_jump(OpCode::JmpNil, sp, val)?;
                    let to_else = s.code.jump(OpCode::Jmp, None)?;
                    if let Some(pos) = to_then {
                        s.code.patch_jump(pos)?;
                    }
                    Some(to_else)
                }
                None => s.cond_jump(OpCode::JmpNot, sp, val)?,
            };
            self.codegen_opt(s, then, val)?;
            if val {
                s.pop()?;
            }
            if otherwise.is_some() || val {
                let to_end = s.code.jump(OpCode::Jmp, None)?;
                if let Some(pos) = to_else {
                    s.code.patch_jump(pos)?;
                }
                self.codegen_opt(s, otherwise, val)?;
                s.code.patch_jump(to_end)?;
            } else if let Some(pos) = to_else {
                s.code.patch_jump(pos)?;
            }
        } else if let Some(otherwise) = otherwise {
            let jump = if nil_test.is_some() {
                OpCode::JmpNil
            } else {
                OpCode::JmpIf
            };
            let skip = s.cond_jump(jump, sp, val)?;
            self.codegen(s, otherwise, val)?;
            if let Some(pos) = skip {
                s.code.patch_jump(pos)?;
            }
        }
        Ok(())
    }

    /// `case`: with a subject each condition is matched with `===`, without
    /// one it is tested for truthiness.
    pub(super) fn gen_case(&mut self, s: &mut Scope, case: &CaseExpr<'_>, val: bool) -> Result<()> {
        let head = match case.subject {
            Some(subject) => {
                let head = s.sp();
                self.codegen(s, subject, true)?;
                Some(head)
            }
            None => None,
        };

        let mut exits = JumpList::new();
        for when in case.whens {
            let mut matched = JumpList::new();
            for cond in when.conditions {
                self.codegen(s, cond, true)?;
                match head {
                    Some(head) => {
                        let sp = s.sp();
                        s.gen_move(sp, head, false)?;
                        s.push_n(2)?;
                        s.pop_n(3)?;
                        let name = if matches!(cond.kind, NodeKind::Splat(_)) {
                            self.ops.case_eqq
                        } else {
                            self.ops.eqq
                        };
                        let idx = s.sym(name)?;
                        let sp = s.sp();
                        s.code.op3(OpCode::Send, sp, idx, 1)?;
                    }
                    None => s.pop()?,
                }
                let sp = s.sp();
                matched.push_opt(s.cond_jump(OpCode::JmpIf, sp, head.is_none())?);
            }

            let next = if when.conditions.is_empty() {
                None
            } else {
                let pos = s.code.jump(OpCode::Jmp, None)?;
                s.code.patch_all(matched)?;
                Some(pos)
            };
            self.codegen_opt(s, when.body, val)?;
            if val {
                s.pop()?;
            }
            exits.push(s.code.jump(OpCode::Jmp, None)?);
            if let Some(pos) = next {
                s.code.patch_jump(pos)?;
            }
        }
        if let Some(otherwise) = case.otherwise {
            self.codegen(s, otherwise, val)?;
            if val {
                s.pop()?;
            }
            exits.push(s.code.jump(OpCode::Jmp, None)?);
        }

        // no branch taken
        let pos = s.sp();
        if val {
            s.code.op1(OpCode::LoadNil, pos)?;
        }
        s.code.patch_all(exits)?;
        if head.is_some() {
            s.pop()?;
        }
        if val {
            let sp = s.sp();
            if sp != pos {
                s.gen_move(sp, pos, false)?;
            }
            s.push()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    pub(super) fn gen_while(
        &mut self,
        s: &mut Scope,
        cond: &Node<'_>,
        body: Option<&Node<'_>>,
        until: bool,
        val: bool,
    ) -> Result<()> {
        let never_runs = if until {
            cond.is_always_true()
        } else {
            cond.is_always_false()
        };
        if never_runs {
            return self.gen_load(s, OpCode::LoadNil, val);
        }

        let result_reg = val.then(|| s.sp());
        let start = s.code.label();
        s.loops.enter_loop(LoopKind::Normal, result_reg).next_target = Some(start);

        self.codegen(s, cond, true)?;
        s.pop()?;
        let sp = s.sp();
        let exit = if until {
            s.cond_jump(OpCode::JmpIf, sp, false)?
        } else {
            s.cond_jump(OpCode::JmpNot, sp, false)?
        };

        let body_start = s.code.label();
        if let Some(lp) = s.loops.current_mut() {
            lp.redo_target = Some(body_start);
        }
        if let Some(body) = body {
            self.codegen(s, body, false)?;
        }
        s.code.jump(OpCode::Jmp, Some(start))?;
        if let Some(pos) = exit {
            s.code.patch_jump(pos)?;
        }
        self.loop_pop(s, val)
    }

    /// Close the innermost loop: its value is `nil` unless a `break`
    /// supplied one.
    fn loop_pop(&mut self, s: &mut Scope, val: bool) -> Result<()> {
        if val {
            let sp = s.sp();
            s.code.op1(OpCode::LoadNil, sp)?;
        }
        if let Some(lp) = s.loops.exit_loop() {
            s.code.patch_all(lp.breaks)?;
        }
        if val {
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_break(
        &mut self,
        s: &mut Scope,
        value: Option<&Node<'_>>,
        val: bool,
    ) -> Result<()> {
        let target = s.loops.target_mut().map(|lp| (lp.kind, lp.result_reg));
        match target {
            None => {
                if let Some(value) = value {
                    self.codegen(s, value, false)?;
                }
                self.raise_error(s, "unexpected break")?;
            }
            Some((LoopKind::Normal, result_reg)) => {
                match (value, result_reg) {
                    (Some(value), Some(reg)) => {
                        self.codegen(s, value, true)?;
                        s.pop()?;
                        let sp = s.sp();
                        s.gen_move(reg, sp, false)?;
                    }
                    (Some(value), None) => self.codegen(s, value, false)?,
                    (None, Some(reg)) => s.code.op1(OpCode::LoadNil, reg)?,
                    (None, None) => {}
                }
                let pos = s.code.jump(OpCode::JmpUw, None)?;
                if let Some(lp) = s.loops.target_mut() {
                    lp.breaks.push(pos);
                }
            }
            Some(_) => {
                self.gen_jump_value(s, value)?;
                let sp = s.sp();
                s.gen_return(OpCode::Break, sp)?;
            }
        }
        if val {
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_next(
        &mut self,
        s: &mut Scope,
        value: Option<&Node<'_>>,
        val: bool,
    ) -> Result<()> {
        let target = s.loops.target_mut().map(|lp| (lp.kind, lp.next_target));
        match target {
            None => self.raise_error(s, "unexpected next")?,
            Some((LoopKind::Normal, Some(start))) => {
                if let Some(value) = value {
                    self.codegen(s, value, false)?;
                }
                s.code.jump(OpCode::JmpUw, Some(start))?;
            }
            Some(_) => {
                self.gen_jump_value(s, value)?;
                let sp = s.sp();
                s.gen_return(OpCode::Return, sp)?;
            }
        }
        if val {
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_redo(&mut self, s: &mut Scope, val: bool) -> Result<()> {
        match s.loops.target_mut().and_then(|lp| lp.redo_target) {
            Some(target) => {
                s.code.jump(OpCode::JmpUw, Some(target))?;
            }
            None => self.raise_error(s, "unexpected redo")?,
        }
        if val {
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_return_node(
        &mut self,
        s: &mut Scope,
        value: Option<&Node<'_>>,
        val: bool,
    ) -> Result<()> {
        self.gen_jump_value(s, value)?;
        let sp = s.sp();
        let op = if s.kind.sees_outer_locals() {
            OpCode::ReturnBlk
        } else {
            OpCode::Return
        };
        s.gen_return(op, sp)?;
        if val {
            s.push()?;
        }
        Ok(())
    }

    /// Value carried by `break`/`next`/`return`, left at the stack pointer
    /// without pushing.
    fn gen_jump_value(&mut self, s: &mut Scope, value: Option<&Node<'_>>) -> Result<()> {
        match value {
            Some(value) => {
                self.codegen(s, value, true)?;
                s.pop()
            }
            None => {
                let sp = s.sp();
                s.code.op1(OpCode::LoadNil, sp)
            }
        }
    }

    // ------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------

    /// `begin ... rescue ... else ... ensure ... end`.
    ///
    /// An `ensure` clause wraps everything else in an ensure handler whose
    /// target re-raises the pending exception, if any, after running it.
    pub(super) fn gen_begin(&mut self, s: &mut Scope, block: &BeginBlock<'_>, val: bool) -> Result<()> {
        let Some(ensure) = block.ensure else {
            return self.gen_rescue(s, block, val);
        };
        let handler = s.new_handler()?;
        let begin = s.code.label();
        self.gen_rescue(s, block, val)?;
        let end = s.code.label();

        s.push()?;
        let exc = s.sp();
        s.code.op1(OpCode::Except, exc)?;
        s.push()?;
        self.codegen(s, ensure, false)?;
        s.pop()?;
        s.code.op1(OpCode::RaiseIf, exc)?;
        s.pop()?;
        s.set_handler(handler, CatchKind::Ensure, begin, end, end);
        Ok(())
    }

    /// The `rescue` and `else` parts of a begin block.
    fn gen_rescue(&mut self, s: &mut Scope, block: &BeginBlock<'_>, val: bool) -> Result<()> {
        if block.rescues.is_empty() && block.otherwise.is_none() {
            return self.codegen_opt(s, block.body, val);
        }
        // nothing to protect
        let Some(body) = block.body else {
            return self.codegen_opt(s, block.otherwise, val);
        };

        s.loops.enter_loop(LoopKind::Begin, None);
        let handler = s.new_handler()?;
        let begin = s.code.label();
        self.codegen(s, body, true)?;
        s.pop()?;
        if let Some(lp) = s.loops.current_mut() {
            lp.kind = LoopKind::Rescue;
        }
        let end = s.code.pc();
        let no_exception = s.code.jump(OpCode::Jmp, None)?;
        let target = s.code.label();
        s.set_handler(handler, CatchKind::Rescue, begin, end, target);

        let mut exits = JumpList::new();
        if !block.rescues.is_empty() {
            let exc = s.sp();
            s.code.op1(OpCode::Except, exc)?;
            s.push()?;

            let mut next_clause: Option<u32> = None;
            for clause in block.rescues {
                if let Some(pos) = next_clause.take() {
                    s.code.patch_jump(pos)?;
                }
                let mut matched = JumpList::new();
                if clause.classes.is_empty() {
                    let idx = s.sym(self.ops.standard_error)?;
                    let sp = s.sp();
                    s.code.op2(OpCode::GetConst, sp, idx)?;
                    s.push()?;
                    s.pop()?;
                    s.code.op2(OpCode::Rescue, exc, sp)?;
                    matched.push_opt(s.cond_jump(OpCode::JmpIf, sp, val)?);
                }
                for class in clause.classes {
                    self.codegen(s, class, true)?;
                    if matches!(class.kind, NodeKind::Splat(_)) {
                        let sp = s.sp();
                        s.gen_move(sp, exc, false)?;
                        s.push_n(2)?;
                        s.pop_n(3)?;
                        let idx = s.sym(self.ops.case_eqq)?;
                        let sp = s.sp();
                        s.code.op3(OpCode::Send, sp, idx, 1)?;
                    } else {
                        s.pop()?;
                        let sp = s.sp();
                        s.code.op2(OpCode::Rescue, exc, sp)?;
                    }
                    let sp = s.sp();
                    matched.push_opt(s.cond_jump(OpCode::JmpIf, sp, val)?);
                }
                next_clause = Some(s.code.jump(OpCode::Jmp, None)?);
                s.code.patch_all(matched)?;

                s.pop()?;
                if let Some(binding) = clause.binding {
                    self.gen_store(s, binding, exc, false)?;
                }
                self.codegen_opt(s, clause.body, val)?;
                if val {
                    s.pop()?;
                }
                exits.push(s.code.jump(OpCode::Jmp, None)?);
                s.push()?;
            }
            // no clause matched
            if let Some(pos) = next_clause {
                s.code.patch_jump(pos)?;
                s.code.op1(OpCode::RaiseIf, exc)?;
            }
            s.pop()?;
        }

        s.code.patch_jump(no_exception)?;
        match block.otherwise {
            Some(otherwise) => self.codegen(s, otherwise, val)?,
            None if val => s.push()?,
            None => {}
        }
        s.code.patch_all(exits)?;
        if let Some(lp) = s.loops.exit_loop() {
            s.code.patch_all(lp.breaks)?;
        }
        Ok(())
    }
}
