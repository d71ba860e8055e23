//! Code generator.
//!
//! The [`Generator`] walks an AST and produces an [`Irep`] tree. It owns the
//! chain of enclosing scopes while a nested unit (method, block, class body)
//! is being generated; the unit currently being written is passed around as
//! a `&mut Scope`.
//!
//! Generation of one node follows the register-stack discipline of the VM:
//! with `val` set, a node leaves its value in the register at the stack
//! pointer on entry and pushes exactly one register; without it, the stack
//! pointer is unchanged.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use rite_ast::AstBuilder;
//! use rite_compiler::{Generator, bytecode::OpCode};
//! use rite_core::{CompileFlags, SymbolTable};
//!
//! let arena = Bump::new();
//! let mut symbols = SymbolTable::new();
//! let b = AstBuilder::new(&arena);
//! let program = b.program(&[], &[b.int(42)]);
//!
//! let irep = Generator::new(&mut symbols, CompileFlags::empty())
//!     .generate(&program)
//!     .unwrap();
//! let ops: Vec<_> = irep.instructions().map(|i| i.op).collect();
//! assert_eq!(ops, [OpCode::LoadI, OpCode::Return, OpCode::Stop]);
//! ```

mod call;
mod control;
mod define;
mod expr;

use rite_ast::{Body, Node, NodeKind, Params};
use rite_core::{CodegenError, CompileFlags, Sym, SymbolTable};
use tracing::trace;

use crate::bytecode::OpCode;
use crate::emit::LoopKind;
use crate::irep::Irep;
use crate::scope::{Scope, ScopeKind, ScopeOptions};

type Result<T> = std::result::Result<T, CodegenError>;

/// Deepest AST nesting the generator accepts.
pub const LEVEL_MAX: u32 = 256;

/// Argument count that tells a call its arguments were packed into an array.
const CALL_MAXARGS: u16 = 15;

/// Most arguments passed in registers before they are packed.
const CALL_ARGS_LIMIT: usize = 14;

/// Longest array or hash literal built with a single instruction.
const GEN_LIT_ARY_MAX: usize = 64;

/// Stack depth at which long literals are flushed in chunks.
const GEN_VAL_STACK_MAX: u16 = 99;

/// Widest parameter group the argument spec can encode.
const PARAM_GROUP_MAX: usize = 0x1f;

/// Names the generator refers to on its own.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OperatorSyms {
    pub add: Sym,
    pub sub: Sym,
    pub mul: Sym,
    pub div: Sym,
    pub rem: Sym,
    pub shl: Sym,
    pub shr: Sym,
    pub bit_and: Sym,
    pub bit_or: Sym,
    pub bit_xor: Sym,
    pub uplus: Sym,
    pub uminus: Sym,
    pub bit_not: Sym,
    pub aref: Sym,
    pub aset: Sym,
    pub lt: Sym,
    pub le: Sym,
    pub gt: Sym,
    pub ge: Sym,
    pub eq: Sym,
    pub eqq: Sym,
    pub not: Sym,
    pub call: Sym,
    pub nil_p: Sym,
    pub case_eqq: Sym,
    pub standard_error: Sym,
    pub oror: Sym,
    pub andand: Sym,
}

impl OperatorSyms {
    fn intern(symbols: &mut SymbolTable) -> Self {
        Self {
            add: symbols.intern("+"),
            sub: symbols.intern("-"),
            mul: symbols.intern("*"),
            div: symbols.intern("/"),
            rem: symbols.intern("%"),
            shl: symbols.intern("<<"),
            shr: symbols.intern(">>"),
            bit_and: symbols.intern("&"),
            bit_or: symbols.intern("|"),
            bit_xor: symbols.intern("^"),
            uplus: symbols.intern("+@"),
            uminus: symbols.intern("-@"),
            bit_not: symbols.intern("~"),
            aref: symbols.intern("[]"),
            aset: symbols.intern("[]="),
            lt: symbols.intern("<"),
            le: symbols.intern("<="),
            gt: symbols.intern(">"),
            ge: symbols.intern(">="),
            eq: symbols.intern("=="),
            eqq: symbols.intern("==="),
            not: symbols.intern("!"),
            call: symbols.intern("call"),
            nil_p: symbols.intern("nil?"),
            case_eqq: symbols.intern("__case_eqq"),
            standard_error: symbols.intern("StandardError"),
            oror: symbols.intern("||"),
            andand: symbols.intern("&&"),
        }
    }
}

/// What a nested unit needs to know about the scopes around it.
#[derive(Debug)]
struct OuterScope {
    kind: ScopeKind,
    locals: Vec<Sym>,
    ainfo: u16,
}

/// Translates AST nodes into bytecode units.
#[derive(Debug)]
pub struct Generator {
    ops: OperatorSyms,
    options: ScopeOptions,
    filename: Sym,
    /// Enclosing scopes of the unit being generated, outermost first.
    outer: Vec<OuterScope>,
    error_offset: Option<u32>,
}

impl Generator {
    /// Create a generator; operator names are interned into `symbols`.
    pub fn new(symbols: &mut SymbolTable, flags: CompileFlags) -> Self {
        Self {
            ops: OperatorSyms::intern(symbols),
            options: ScopeOptions {
                optimize: !flags.contains(CompileFlags::NO_OPTIMIZE),
                allow_ext: !flags.contains(CompileFlags::NO_EXT_OPS),
            },
            filename: Sym::NULL,
            outer: Vec::new(),
            error_offset: None,
        }
    }

    /// Record line numbers against `filename` (enables debug info).
    pub fn with_filename(mut self, filename: Sym) -> Self {
        self.filename = filename;
        self
    }

    /// Number of enclosing scopes currently open. Zero outside of
    /// [`Generator::generate`], including after it failed.
    pub fn depth(&self) -> usize {
        self.outer.len()
    }

    /// Byte offset of the last node the generator started on.
    pub fn error_offset(&self) -> Option<u32> {
        self.error_offset
    }

    /// Generate the unit tree of a program.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn generate(&mut self, program: &Node<'_>) -> Result<Irep> {
        self.generate_with_locals(program, &[])
    }

    /// Generate a program whose top-level scope starts with the `preset`
    /// locals, so they keep the registers they had in an earlier program.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn generate_with_locals(&mut self, program: &Node<'_>, preset: &[Sym]) -> Result<Irep> {
        self.outer.clear();
        self.error_offset = None;

        let (declared, body) = match program.kind {
            NodeKind::Program(body) => (body.locals, body.body),
            _ => (&[][..], Some(program)),
        };
        let mut locals = preset.to_vec();
        locals.extend(declared.iter().filter(|l| !preset.contains(*l)));

        let mut top = Scope::new(ScopeKind::Top, &locals, self.filename, 0, self.options)?;
        if program.pos.line > 0 {
            top.code.set_line(program.pos.line);
        }
        trace!(nlocals = top.nlocals(), "generating top-level scope");

        let result = self.scope_body(&mut top, body, true);
        self.outer.clear();
        result?;
        top.finish()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    pub(crate) fn codegen(&mut self, s: &mut Scope, node: &Node<'_>, val: bool) -> Result<()> {
        let rlev = s.rlev;
        s.rlev += 1;
        if s.rlev > LEVEL_MAX {
            return Err(CodegenError::TooComplex);
        }
        if node.pos.line > 0 {
            s.code.set_line(node.pos.line);
        }
        s.switch_file(node.pos.file);
        self.error_offset = Some(node.pos.offset);

        self.gen_node(s, node, val)?;
        s.rlev = rlev;
        Ok(())
    }

    fn gen_node(&mut self, s: &mut Scope, node: &Node<'_>, val: bool) -> Result<()> {
        match node.kind {
            NodeKind::Program(body) => self.codegen_opt(s, body.body, val),
            NodeKind::Statements(stmts) => self.gen_statements(s, stmts, val),

            NodeKind::Nil => self.gen_load(s, OpCode::LoadNil, val),
            NodeKind::True => self.gen_load(s, OpCode::LoadT, val),
            NodeKind::False => self.gen_load(s, OpCode::LoadF, val),
            NodeKind::SelfRef => self.gen_load(s, OpCode::LoadSelf, val),
            NodeKind::Integer(n) => self.gen_integer(s, n, val),
            NodeKind::BigInt(lit) => self.gen_bigint(s, lit, val),
            NodeKind::Float(f) => self.gen_float(s, f, val),
            NodeKind::Str(bytes) => self.gen_str(s, bytes, val),
            NodeKind::Interpolated(parts) => self.gen_interpolated(s, parts, val),
            NodeKind::Symbol(sym) => self.gen_symbol(s, sym, val),
            NodeKind::Array(elems) => self.gen_array(s, elems, val),
            NodeKind::Hash(elems) => self.gen_hash_literal(s, elems, val),
            NodeKind::Range {
                low,
                high,
                exclusive,
            } => self.gen_range(s, low, high, exclusive, val),
            NodeKind::Splat(value) => self.gen_splat(s, value, val),

            NodeKind::LocalVar(name) => self.gen_local_get(s, name, val),
            NodeKind::IVar(name) => self.gen_var_get(s, OpCode::GetIv, name, val),
            NodeKind::GVar(name) => self.gen_var_get(s, OpCode::GetGv, name, val),
            NodeKind::CVar(name) => self.gen_var_get(s, OpCode::GetCv, name, val),
            NodeKind::Const(name) => self.gen_var_get(s, OpCode::GetConst, name, val),
            NodeKind::ScopedConst { scope, name } => self.gen_scoped_const(s, scope, name, val),
            NodeKind::Assign { target, value } => self.gen_assign(s, target, value, val),
            NodeKind::OpAssign { target, op, value } => {
                self.gen_op_assign(s, target, op, value, val)
            }

            NodeKind::Call(call) => self.gen_call(s, call, val),
            NodeKind::BlockPass(value) => self.codegen(s, value, val),
            NodeKind::Block(body) => self.gen_closure(s, body, ScopeKind::Block, val),
            NodeKind::Lambda(body) => self.gen_closure(s, body, ScopeKind::Lambda, val),
            NodeKind::Super(call) => self.gen_super(s, call, val),
            NodeKind::Yield(args) => self.gen_yield(s, args, val),

            NodeKind::And(lhs, rhs) => self.gen_and(s, lhs, rhs, val),
            NodeKind::Or(lhs, rhs) => self.gen_or(s, lhs, rhs, val),
            NodeKind::Not(value) => self.gen_not(s, value, val),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => self.gen_if(s, cond, then, otherwise, val),
            NodeKind::While { cond, body, until } => self.gen_while(s, cond, body, until, val),
            NodeKind::Case(case) => self.gen_case(s, case, val),
            NodeKind::Break(value) => self.gen_break(s, value, val),
            NodeKind::Next(value) => self.gen_next(s, value, val),
            NodeKind::Redo => self.gen_redo(s, val),
            NodeKind::Return(value) => self.gen_return_node(s, value, val),
            NodeKind::Begin(block) => self.gen_begin(s, block, val),

            NodeKind::Def { name, body } => self.gen_def(s, name, body, val),
            NodeKind::Class(def) => self.gen_class(s, def, val),
            NodeKind::Module(def) => self.gen_module(s, def, val),
            NodeKind::SClass { target, body } => self.gen_sclass(s, target, body, val),
            NodeKind::Alias { new_name, old_name } => self.gen_alias(s, new_name, old_name, val),
            NodeKind::Undef(names) => self.gen_undef(s, names, val),
        }
    }

    /// Generate an optional node; a missing one evaluates to `nil`.
    pub(crate) fn codegen_opt(
        &mut self,
        s: &mut Scope,
        node: Option<&Node<'_>>,
        val: bool,
    ) -> Result<()> {
        match node {
            Some(node) => self.codegen(s, node, val),
            None => self.gen_load(s, OpCode::LoadNil, val),
        }
    }

    fn gen_statements(&mut self, s: &mut Scope, stmts: &[Node<'_>], val: bool) -> Result<()> {
        let Some((last, init)) = stmts.split_last() else {
            return self.gen_load(s, OpCode::LoadNil, val);
        };
        for stmt in init {
            self.codegen(s, stmt, false)?;
        }
        self.codegen(s, last, val)
    }

    /// One-operand load into the next free register.
    pub(crate) fn gen_load(&mut self, s: &mut Scope, op: OpCode, val: bool) -> Result<()> {
        if val {
            let sp = s.sp();
            s.code.op1(op, sp)?;
            s.push()?;
        }
        Ok(())
    }

    /// `OP_ERR` raising `LocalJumpError` with `message` at run time.
    pub(crate) fn raise_error(&mut self, s: &mut Scope, message: &str) -> Result<()> {
        let idx = s.pool.add_str(message.as_bytes())?;
        s.code.op1(OpCode::Err, idx)
    }

    // ------------------------------------------------------------------
    // Nested units
    // ------------------------------------------------------------------

    /// Open a child unit of `parent`, generate it with `f` and attach it.
    ///
    /// The enclosing-scope chain is restored whether or not `f` succeeds.
    fn child_scope<F>(
        &mut self,
        parent: &mut Scope,
        kind: ScopeKind,
        locals: &[Sym],
        f: F,
    ) -> Result<u16>
    where
        F: FnOnce(&mut Self, &mut Scope) -> Result<()>,
    {
        parent.next_child_index()?;
        let mut child = Scope::new(
            kind,
            locals,
            parent.filename(),
            parent.rlev + 1,
            self.options,
        )?;
        child.code.set_line(parent.code.line());
        self.outer.push(OuterScope {
            kind: parent.kind,
            locals: parent.locals().to_vec(),
            ainfo: parent.ainfo,
        });
        trace!(?kind, depth = self.outer.len(), "open scope");

        let result = f(self, &mut child);
        self.outer.pop();
        result?;

        let irep = child.finish()?;
        trace!(?kind, ilen = irep.iseq.len(), nregs = irep.nregs, "close scope");
        parent.add_child(irep)
    }

    /// Body of a program or class-like scope: the value of the body is
    /// returned, and the program unit ends with `STOP`.
    fn scope_body(&mut self, s: &mut Scope, body: Option<&Node<'_>>, top: bool) -> Result<()> {
        self.codegen_opt(s, body, true)?;
        let sp = s.sp().checked_sub(1).ok_or(CodegenError::StackUnderflow)?;
        s.gen_return(OpCode::Return, sp)?;
        if top {
            s.code.op0(OpCode::Stop)?;
        }
        Ok(())
    }

    /// Generate a class, module or singleton class body as a child unit.
    pub(crate) fn class_body(&mut self, s: &mut Scope, body: &Body<'_>) -> Result<u16> {
        self.child_scope(s, ScopeKind::Class, body.locals, |g, child| {
            g.scope_body(child, body.body, false)
        })
    }

    /// Generate a method, block or lambda as a child unit.
    pub(crate) fn lambda_body(
        &mut self,
        s: &mut Scope,
        body: &Body<'_>,
        kind: ScopeKind,
    ) -> Result<u16> {
        self.child_scope(s, kind, body.locals, |g, child| {
            let is_block = kind != ScopeKind::Method;
            if is_block {
                let start = child.code.label();
                child.loops.enter_loop(LoopKind::Block, None).next_target = Some(start);
            }
            g.gen_params(child, &body.params)?;
            if is_block {
                let body_start = child.code.label();
                if let Some(lp) = child.loops.current_mut() {
                    lp.redo_target = Some(body_start);
                }
            }

            g.codegen_opt(child, body.body, true)?;
            child.pop()?;
            if child.code.pc() > 0 {
                let sp = child.sp();
                child.gen_return(OpCode::Return, sp)?;
            }
            if is_block {
                if let Some(lp) = child.loops.exit_loop() {
                    child.code.patch_all(lp.breaks)?;
                }
            }
            Ok(())
        })
    }

    /// `ENTER` and the initializers of optional parameters.
    fn gen_params(&mut self, s: &mut Scope, params: &Params<'_>) -> Result<()> {
        if params.is_empty() {
            s.code.opw(OpCode::Enter, 0)?;
            s.ainfo = 0;
            return Ok(());
        }
        let req = params.required.len();
        let opt = params.optional.len();
        let rest = usize::from(params.rest.is_some());
        let post = params.post.len();
        let block = u32::from(params.block.is_some());
        if req > PARAM_GROUP_MAX || opt > PARAM_GROUP_MAX || post > PARAM_GROUP_MAX {
            return Err(CodegenError::TooManyParameters);
        }

        // 5:5:1:5:5:1:1
        let aspec = (req as u32) << 18
            | (opt as u32) << 13
            | (rest as u32) << 12
            | (post as u32) << 7
            | block;
        s.code.opw(OpCode::Enter, aspec)?;
        s.ainfo = (((req + opt) & 0x3f) << 7 | rest << 6 | (post & 0x1f) << 1) as u16;

        if opt == 0 {
            return Ok(());
        }
        // The VM enters at slot `given - req` of this table.
        s.code.label();
        let mut table = Vec::with_capacity(opt + 1);
        for _ in 0..=opt {
            table.push(s.code.jump(OpCode::Jmp, None)?);
        }
        for (param, &slot) in params.optional.iter().zip(&table) {
            s.code.patch_jump(slot)?;
            self.codegen(s, &param.default, true)?;
            s.pop()?;
            let sp = s.sp();
            match s.local_reg(param.name) {
                Some(reg) => s.gen_move(reg, sp, false)?,
                None => self.gen_upvar_set(s, param.name, sp, false)?,
            }
        }
        if let Some(&last) = table.last() {
            s.code.patch_jump(last)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Enclosing scopes
    // ------------------------------------------------------------------

    /// Find `name` in the scopes a block can see: `(level, register)` with
    /// level 0 for the immediately enclosing scope.
    pub(crate) fn find_upvar(&self, s: &Scope, name: Sym) -> Result<(u8, u16)> {
        if s.kind.sees_outer_locals() {
            for (lv, up) in self.outer.iter().rev().enumerate() {
                if let Some(i) = up.locals.iter().position(|&l| l == name && !l.is_null()) {
                    let lv = u8::try_from(lv).map_err(|_| CodegenError::TooComplex)?;
                    return Ok((lv, (i + 1) as u16));
                }
                if !up.kind.sees_outer_locals() {
                    break;
                }
            }
        }
        Err(CodegenError::UnknownLocal(name))
    }

    /// `ainfo` of the method scope `yield`/`super` refer to, and how many
    /// block levels lie between it and `s`.
    pub(crate) fn method_scope(&self, s: &Scope) -> (ScopeKind, u16, usize) {
        if s.kind.is_method_scope() {
            return (s.kind, s.ainfo, 0);
        }
        for (i, up) in self.outer.iter().rev().enumerate() {
            if up.kind.is_method_scope() {
                return (up.kind, up.ainfo, i + 1);
            }
        }
        (ScopeKind::Top, 0, self.outer.len())
    }
}
