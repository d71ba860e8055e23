//! Method calls, `yield`, `super` and closures.

use rite_ast::{Body, Call, Node, SuperCall};
use rite_core::{CodegenError, Sym};

use super::{CALL_ARGS_LIMIT, CALL_MAXARGS, Generator, Result};
use crate::bytecode::OpCode;
use crate::fold::FoldOp;
use crate::peephole::UnaryFold;
use crate::scope::{Scope, ScopeKind};

impl Generator {
    /// `recv.name(args, **kw, &blk)`.
    ///
    /// The receiver lands at the stack pointer, followed by the arguments,
    /// the keyword hash and the block. Arithmetic, comparison and indexing
    /// with the expected argument count use their dedicated instructions
    /// unless a block, keywords or packed arguments are involved.
    pub(super) fn gen_call(&mut self, s: &mut Scope, call: &Call<'_>, val: bool) -> Result<()> {
        let name = call.name;
        let sp_save = s.sp();
        let mut noop = !self.options.optimize;
        let noself = call.receiver.is_none();

        match call.receiver {
            None => {
                noop = true;
                s.push()?;
            }
            Some(recv) => self.codegen(s, recv, true)?,
        }

        let mut skip = None;
        if call.safe_nav {
            let sp = s.sp();
            s.gen_move(sp, sp - 1, true)?;
            skip = s.cond_jump(OpCode::JmpNil, sp, val)?;
        }

        let mut argc: u16 = 0;
        if !call.args.is_empty() {
            match self.gen_values(s, call.args, true, CALL_ARGS_LIMIT)? {
                Some(n) => argc = n as u16,
                None => {
                    noop = true;
                    argc = CALL_MAXARGS;
                    s.push()?;
                }
            }
        }

        let mut kwc: u16 = 0;
        if !call.kwargs.is_empty() {
            noop = true;
            kwc = match self.gen_hash(s, call.kwargs, true, CALL_ARGS_LIMIT)? {
                Some(n) => n as u16,
                None => CALL_MAXARGS,
            };
        }

        let mut has_block = false;
        if let Some(block) = call.block {
            self.codegen(s, block, true)?;
            s.pop()?;
            noop = true;
            has_block = true;
        }

        // room for the block slot
        s.push()?;
        s.pop()?;
        s.set_sp(sp_save);
        let sp = sp_save;

        if noop || !self.gen_fast_call(s, name, argc, sp)? {
            let idx = s.sym(name)?;
            let op = match (noself, has_block) {
                (true, false) => OpCode::SSend,
                (true, true) => OpCode::SSendB,
                (false, false) => OpCode::Send,
                (false, true) => OpCode::SendB,
            };
            s.code.op3(op, sp, idx, (argc | kwc << 4) as u8)?;
        }

        if let Some(pos) = skip {
            s.code.patch_jump(pos)?;
        }
        if val {
            s.push()?;
        }
        Ok(())
    }

    /// Dedicated instruction for an operator call with `argc` plain
    /// arguments; `false` when the call has to be sent.
    fn gen_fast_call(&mut self, s: &mut Scope, name: Sym, argc: u16, sp: u16) -> Result<bool> {
        let ops = self.ops;
        match argc {
            0 => self.fold_unary_call(s, name, sp),
            1 if name == ops.add => s.gen_addsub(OpCode::Add, sp).map(|_| true),
            1 if name == ops.sub => s.gen_addsub(OpCode::Sub, sp).map(|_| true),
            1 if name == ops.mul => s.gen_muldiv(OpCode::Mul, sp).map(|_| true),
            1 if name == ops.div => s.gen_muldiv(OpCode::Div, sp).map(|_| true),
            1 => match self.comparison_op(name) {
                Some(op) => s.code.op1(op, sp).map(|_| true),
                None => self.gen_binop(s, name, sp),
            },
            2 if name == ops.aset => s.code.op1(OpCode::SetIdx, sp).map(|_| true),
            _ => Ok(false),
        }
    }

    /// `+@`, `-@` and `~` on an integer literal.
    fn fold_unary_call(&mut self, s: &mut Scope, name: Sym, sp: u16) -> Result<bool> {
        let op = match name {
            n if n == self.ops.uplus => UnaryFold::Plus,
            n if n == self.ops.uminus => UnaryFold::Minus,
            n if n == self.ops.bit_not => UnaryFold::BitNot,
            _ => return Ok(false),
        };
        s.fold_unary(op, sp)
    }

    /// `GETIDX` for `[]`, or a folded integer operation.
    fn gen_binop(&mut self, s: &mut Scope, name: Sym, sp: u16) -> Result<bool> {
        if !s.code.can_peephole() {
            return Ok(false);
        }
        let ops = &self.ops;
        if name == ops.aref {
            s.code.op1(OpCode::GetIdx, sp)?;
            return Ok(true);
        }
        let op = match name {
            n if n == ops.rem => FoldOp::Mod,
            n if n == ops.shl => FoldOp::Shl,
            n if n == ops.shr => FoldOp::Shr,
            n if n == ops.bit_and => FoldOp::And,
            n if n == ops.bit_or => FoldOp::Or,
            n if n == ops.bit_xor => FoldOp::Xor,
            _ => return Ok(false),
        };
        s.fold_literals(op, sp)
    }

    /// `yield args`: the block of the enclosing method is fetched with
    /// `BLKPUSH` and sent `call`.
    pub(super) fn gen_yield(&mut self, s: &mut Scope, args: &[Node<'_>], val: bool) -> Result<()> {
        let (_, ainfo, lv) = self.method_scope(s);
        if lv > 0xf {
            return Err(CodegenError::TooComplex);
        }

        s.push()?;
        let mut argc: u16 = 0;
        let mut packed = false;
        if !args.is_empty() {
            match self.gen_values(s, args, true, CALL_ARGS_LIMIT)? {
                Some(n) => argc = n as u16,
                None => {
                    argc = 1;
                    packed = true;
                    s.push()?;
                }
            }
        }
        s.push()?;
        s.pop()?;
        s.pop_n(usize::from(argc) + 1)?;

        let sp = s.sp();
        s.code.op2s(OpCode::BlkPush, sp, ainfo << 4 | (lv as u16 & 0xf))?;
        if packed {
            argc = CALL_MAXARGS;
        }
        let call = s.sym(self.ops.call)?;
        s.code.op3(OpCode::Send, sp, call, argc as u8)?;
        if val {
            s.push()?;
        }
        Ok(())
    }

    /// `super(args)`. Without an explicit block the block of the current
    /// method is passed along.
    pub(super) fn gen_super(&mut self, s: &mut Scope, call: &SuperCall<'_>, val: bool) -> Result<()> {
        let (kind, ainfo, lv) = self.method_scope(s);
        let sp_save = s.sp();

        s.push()?;
        let mut argc: u16 = 0;
        if !call.args.is_empty() {
            match self.gen_values(s, call.args, true, CALL_ARGS_LIMIT)? {
                Some(n) => argc = n as u16,
                None => {
                    argc = CALL_MAXARGS;
                    s.push()?;
                }
            }
        }
        match call.block {
            Some(block) => self.codegen(s, block, true)?,
            None => self.gen_blkmove(s, kind, ainfo, lv)?,
        }
        s.set_sp(sp_save);
        s.code.op2(OpCode::Super, sp_save, argc)?;
        if val {
            s.push()?;
        }
        Ok(())
    }

    /// Copy the block argument of the enclosing method to the stack.
    fn gen_blkmove(&mut self, s: &mut Scope, kind: ScopeKind, ainfo: u16, lv: usize) -> Result<()> {
        let sp = s.sp();
        if kind != ScopeKind::Method {
            s.code.op1(OpCode::LoadNil, sp)?;
            return s.push();
        }
        let m1 = (ainfo >> 7) & 0x3f;
        let rest = (ainfo >> 6) & 0x1;
        let m2 = (ainfo >> 1) & 0x1f;
        let kd = ainfo & 0x1;
        let off = m1 + rest + m2 + kd + 1;
        if lv == 0 {
            s.gen_move(sp, off, false)?;
        } else {
            let up = u8::try_from(lv - 1).map_err(|_| CodegenError::TooComplex)?;
            s.code.op3(OpCode::GetUpvar, sp, off, up)?;
        }
        s.push()
    }

    /// `{ ... }` or `-> { ... }`: the body becomes a child unit.
    pub(super) fn gen_closure(
        &mut self,
        s: &mut Scope,
        body: &Body<'_>,
        kind: ScopeKind,
        val: bool,
    ) -> Result<()> {
        if !val {
            return Ok(());
        }
        let idx = self.lambda_body(s, body, kind)?;
        let op = if kind == ScopeKind::Lambda {
            OpCode::Lambda
        } else {
            OpCode::Block
        };
        let sp = s.sp();
        s.code.op2(op, sp, idx)?;
        s.push()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{compile, insns, ops};
    use crate::bytecode::OpCode;
    use rite_ast::{Call, Params};
    use rite_core::Sym;

    #[test]
    fn add_with_small_literal_becomes_addi() {
        let (irep, _) = compile(|b, syms| {
            let a = syms.intern("a");
            let plus = syms.intern("+");
            b.program(&[a], &[b.call(Some(b.local(a)), plus, &[b.int(1)])])
        });
        let code = insns(&irep);
        assert_eq!((code[0].op, code[0].a, code[0].b), (OpCode::Move, 2, 1));
        assert_eq!((code[1].op, code[1].a, code[1].b), (OpCode::AddI, 2, 1));
        assert_eq!(code[2].op, OpCode::Return);
    }

    #[test]
    fn literal_arithmetic_folds() {
        let (irep, _) = compile(|b, syms| {
            let plus = syms.intern("+");
            let mul = syms.intern("*");
            let shl = syms.intern("<<");
            b.program(
                &[],
                &[b.array(&[
                    b.call(Some(b.int(2)), plus, &[b.int(3)]),
                    b.call(Some(b.int(6)), mul, &[b.int(7)]),
                    b.call(Some(b.int(1)), shl, &[b.int(4)]),
                ])],
            )
        });
        let code = insns(&irep);
        assert_eq!(code[0].op, OpCode::LoadI5);
        assert_eq!((code[1].op, code[1].b), (OpCode::LoadI, 42));
        assert_eq!((code[2].op, code[2].b), (OpCode::LoadI, 16));
        assert_eq!(code[3].op, OpCode::Array);
    }

    #[test]
    fn overflowing_fold_falls_back_to_send() {
        let (irep, _) = compile(|b, syms| {
            let mul = syms.intern("*");
            b.program(&[], &[b.call(Some(b.int(i64::MAX)), mul, &[b.int(2)])])
        });
        assert_eq!(&ops(&irep)[..3], [OpCode::LoadL, OpCode::LoadI2, OpCode::Mul]);
    }

    #[test]
    fn unary_minus_folds() {
        let (irep, _) = compile(|b, syms| {
            let uminus = syms.intern("-@");
            b.program(&[], &[b.call(Some(b.int(5)), uminus, &[])])
        });
        let code = insns(&irep);
        assert_eq!((code[0].op, code[0].b), (OpCode::LoadINeg, 5));
    }

    #[test]
    fn comparison_and_index_use_dedicated_ops() {
        let (irep, _) = compile(|b, syms| {
            let a = syms.intern("a");
            let lt = syms.intern("<");
            let aref = syms.intern("[]");
            let aset = syms.intern("[]=");
            b.program(
                &[a],
                &[
                    b.call(Some(b.local(a)), lt, &[b.int(1)]),
                    b.call(Some(b.local(a)), aref, &[b.int(0)]),
                    b.call(Some(b.local(a)), aset, &[b.int(0), b.int(1)]),
                ],
            )
        });
        let all = ops(&irep);
        assert!(all.contains(&OpCode::Lt));
        assert!(all.contains(&OpCode::GetIdx));
        assert!(all.contains(&OpCode::SetIdx));
        assert!(!all.contains(&OpCode::Send));
    }

    #[test]
    fn self_call_uses_ssend() {
        let (irep, symbols) = compile(|b, syms| {
            let puts = syms.intern("puts");
            b.program(&[], &[b.fcall(puts, &[b.str("hi"), b.int(1)])])
        });
        let code = insns(&irep);
        let send = code.iter().find(|i| i.op == OpCode::SSend).unwrap();
        assert_eq!(send.a, 1);
        assert_eq!(send.c, 2);
        assert_eq!(irep.syms[send.b as usize], symbols.lookup("puts").unwrap());
    }

    #[test]
    fn keyword_arguments_are_counted_in_high_nibble() {
        let (irep, _) = compile(|b, syms| {
            let m = syms.intern("m");
            let key = syms.intern("key");
            b.program(
                &[],
                &[b.call_with(Call {
                    receiver: Some(b.alloc(b.self_())),
                    name: m,
                    args: b.nodes(&[b.int(1)]),
                    kwargs: b.kwargs(&[(b.sym(key), b.int(2))]),
                    block: None,
                    safe_nav: false,
                })],
            )
        });
        let send = insns(&irep).into_iter().find(|i| i.op == OpCode::Send).unwrap();
        assert_eq!(send.c, 1 | 1 << 4);
    }

    #[test]
    fn splat_arguments_are_packed() {
        let (irep, _) = compile(|b, syms| {
            let a = syms.intern("a");
            let m = syms.intern("m");
            b.program(&[a], &[b.fcall(m, &[b.splat(b.local(a))])])
        });
        let code = insns(&irep);
        assert!(code.iter().any(|i| i.op == OpCode::AryCat));
        let send = code.iter().find(|i| i.op == OpCode::SSend).unwrap();
        assert_eq!(send.c, 15);
    }

    #[test]
    fn many_arguments_are_packed() {
        let (irep, _) = compile(|b, syms| {
            let m = syms.intern("m");
            let args: Vec<_> = (0..20).map(|i| b.int(i)).collect();
            b.program(&[], &[b.fcall(m, &args)])
        });
        let code = insns(&irep);
        let array = code.iter().find(|i| i.op == OpCode::Array).unwrap();
        assert_eq!(array.b, 20);
        assert_eq!(code.iter().find(|i| i.op == OpCode::SSend).unwrap().c, 15);
    }

    #[test]
    fn block_argument_is_a_child_unit() {
        let (irep, _) = compile(|b, syms| {
            let each = syms.intern("each");
            let x = syms.intern("x");
            let a = syms.intern("a");
            let body = b.body(&[x], b.required_params(&[x]), &[b.local(x)]);
            b.program(&[a], &[b.call_block(Some(b.local(a)), each, &[], b.block(body))])
        });
        assert_eq!(
            &ops(&irep)[..3],
            [OpCode::Move, OpCode::Block, OpCode::SendB]
        );
        assert_eq!(irep.children.len(), 1);
        let block = &irep.children[0];
        assert_eq!(block.nlocals, 2);
        assert_eq!(ops(block)[0], OpCode::Enter);
    }

    #[test]
    fn block_reads_outer_local_through_upvar() {
        let (irep, _) = compile(|b, syms| {
            let each = syms.intern("each");
            let outer = syms.intern("outer");
            let body = b.body(&[], Params::default(), &[b.local(outer)]);
            b.program(&[outer], &[b.call_block(None, each, &[], b.block(body))])
        });
        let code = insns(&irep.children[0]);
        let get = code.iter().find(|i| i.op == OpCode::GetUpvar).unwrap();
        assert_eq!((get.b, get.c), (1, 0));
    }

    #[test]
    fn block_assigns_outer_local_through_upvar() {
        let (irep, _) = compile(|b, syms| {
            let each = syms.intern("each");
            let outer = syms.intern("outer");
            let body = b.body(
                &[],
                Params::default(),
                &[b.assign_local(outer, b.int(3)), b.nil()],
            );
            b.program(&[outer], &[b.call_block(None, each, &[], b.block(body))])
        });
        let code = insns(&irep.children[0]);
        let set = code.iter().find(|i| i.op == OpCode::SetUpvar).unwrap();
        assert_eq!((set.b, set.c), (1, 0));
    }

    #[test]
    fn safe_navigation_skips_on_nil() {
        let (irep, _) = compile(|b, syms| {
            let a = syms.intern("a");
            let m = syms.intern("m");
            b.program(&[a], &[b.safe_call(b.local(a), m, &[])])
        });
        let code = insns(&irep);
        assert_eq!(
            code.iter().take(4).map(|i| i.op).collect::<Vec<_>>(),
            [OpCode::Move, OpCode::Move, OpCode::JmpNil, OpCode::Send]
        );
        assert_eq!(code[2].jump_target(), Some(code[4].addr));
    }

    #[test]
    fn yield_in_method_pushes_block() {
        let (irep, _) = compile(|b, syms| {
            let m = syms.intern("m");
            let x = syms.intern("x");
            let body = b.body(&[x], b.required_params(&[x]), &[b.yield_(&[b.local(x)])]);
            b.program(&[], &[b.def(m, body)])
        });
        let code = insns(&irep.children[0]);
        let push = code.iter().find(|i| i.op == OpCode::BlkPush).unwrap();
        // one required argument, no rest, no post, no keywords, level 0
        assert_eq!(push.b, 1 << 7 << 4);
        let send = code.iter().find(|i| i.op == OpCode::Send).unwrap();
        assert_eq!(send.c, 1);
    }

    #[test]
    fn yield_from_nested_block_counts_levels() {
        let (irep, _) = compile(|b, syms| {
            let m = syms.intern("m");
            let each = syms.intern("each");
            let inner = b.body(&[], Params::default(), &[b.yield_(&[])]);
            let body = b.body(
                &[],
                Params::default(),
                &[b.call_block(None, each, &[], b.block(inner))],
            );
            b.program(&[], &[b.def(m, body)])
        });
        let block = &irep.children[0].children[0];
        let push = insns(block).into_iter().find(|i| i.op == OpCode::BlkPush).unwrap();
        assert_eq!(push.b & 0xf, 1);
    }

    #[test]
    fn zsuper_passes_method_block() {
        let (irep, _) = compile(|b, syms| {
            let m = syms.intern("m");
            let x = syms.intern("x");
            let body = b.body(
                &[x, Sym::NULL],
                b.required_params(&[x]),
                &[b.super_(&[b.local(x)], None)],
            );
            b.program(&[], &[b.def(m, body)])
        });
        let code = insns(&irep.children[0]);
        // the block slot follows the single required argument
        let mv = code.iter().filter(|i| i.op == OpCode::Move).last().unwrap();
        assert_eq!(mv.b, 2);
        let sup = code.iter().find(|i| i.op == OpCode::Super).unwrap();
        assert_eq!(sup.b, 1);
    }

    #[test]
    fn lambda_returns_with_return_blk() {
        let (irep, _) = compile(|b, _| {
            let body = b.body(&[], Params::default(), &[b.return_(Some(b.int(1)))]);
            b.program(&[], &[b.lambda(body)])
        });
        assert_eq!(ops(&irep)[0], OpCode::Lambda);
        assert!(ops(&irep.children[0]).contains(&OpCode::ReturnBlk));
    }
}
