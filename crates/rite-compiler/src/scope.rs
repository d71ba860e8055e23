//! Per-unit generation state.
//!
//! A [`Scope`] is opened for the program and for every method, block,
//! lambda and class body. It owns the emitter, literal pool, symbol table
//! and child units of the unit being generated, tracks the register stack
//! and is consumed by [`Scope::finish`] to produce an [`Irep`].

use rite_core::{CodegenError, Sym};
use rustc_hash::FxHashMap;

use crate::debug::DebugInfo;
use crate::emit::{Emitter, LoopStack};
use crate::irep::{CatchHandler, CatchKind, Irep};
use crate::pool::LiteralPool;

type Result<T> = std::result::Result<T, CodegenError>;

/// Highest register index plus one.
const REGISTER_LIMIT: usize = 0xffff;

/// Table sizes are written as 16-bit counts.
const TABLE_LIMIT: usize = u16::MAX as usize;

/// Most register slots (`self` included) a finished unit may declare.
const LOCALS_MAX: u16 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Top,
    Method,
    Block,
    Lambda,
    Class,
}

impl ScopeKind {
    /// Whether local lookups may continue into the enclosing scope.
    pub fn sees_outer_locals(self) -> bool {
        matches!(self, ScopeKind::Block | ScopeKind::Lambda)
    }

    /// Whether `yield` and `super` resolve against this scope.
    pub fn is_method_scope(self) -> bool {
        !self.sees_outer_locals()
    }
}

/// Generation options shared by every scope of one run.
#[derive(Debug, Clone, Copy)]
pub struct ScopeOptions {
    pub optimize: bool,
    pub allow_ext: bool,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub code: Emitter,
    pub pool: LiteralPool,
    pub loops: LoopStack,
    /// Recursion depth, inherited from the parent scope.
    pub rlev: u32,
    /// Packed argument info for `yield`: `(req+opt) << 7 | rest << 6 | post << 1 | kw`.
    pub ainfo: u16,

    syms: Vec<Sym>,
    sym_index: FxHashMap<Sym, u16>,
    children: Vec<Irep>,
    handlers: Vec<CatchHandler>,
    /// Local names; slot `i + 1` holds `locals[i]`.
    locals: Vec<Sym>,
    sp: u16,
    nlocals: u16,
    nregs: u16,

    filename: Sym,
    debug: Option<DebugInfo>,
    debug_start: u32,
}

impl Scope {
    /// Open a scope with the given local table.
    ///
    /// Line tracking is enabled when `filename` is not `Sym::NULL`.
    pub fn new(
        kind: ScopeKind,
        locals: &[Sym],
        filename: Sym,
        rlev: u32,
        options: ScopeOptions,
    ) -> Result<Self> {
        let count = locals.len() + 1;
        if count >= REGISTER_LIMIT {
            return Err(CodegenError::TooManyLocals { count });
        }
        let nlocals = count as u16;
        let track_lines = !filename.is_null();
        Ok(Self {
            kind,
            code: Emitter::new(track_lines, options.optimize, options.allow_ext),
            pool: LiteralPool::with_capacity(32),
            loops: LoopStack::new(),
            rlev,
            ainfo: 0,
            syms: Vec::with_capacity(256),
            sym_index: FxHashMap::default(),
            children: Vec::new(),
            handlers: Vec::new(),
            locals: locals.to_vec(),
            sp: nlocals,
            nlocals,
            nregs: nlocals,
            filename,
            debug: track_lines.then(DebugInfo::new),
            debug_start: 0,
        })
    }

    // ------------------------------------------------------------------
    // Register stack
    // ------------------------------------------------------------------

    /// First free register.
    #[inline]
    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn nlocals(&self) -> u16 {
        self.nlocals
    }

    pub fn nregs(&self) -> u16 {
        self.nregs
    }

    pub fn push(&mut self) -> Result<()> {
        self.push_n(1)
    }

    pub fn push_n(&mut self, n: usize) -> Result<()> {
        let sp = self.sp as usize;
        if sp + n >= REGISTER_LIMIT {
            return Err(CodegenError::RegisterOverflow { sp, n });
        }
        self.sp = (sp + n) as u16;
        self.nregs = self.nregs.max(self.sp);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<()> {
        self.pop_n(1)
    }

    pub fn pop_n(&mut self, n: usize) -> Result<()> {
        let sp = (self.sp as usize)
            .checked_sub(n)
            .ok_or(CodegenError::StackUnderflow)?;
        self.sp = sp as u16;
        Ok(())
    }

    /// Reset the stack pointer to a saved value.
    pub fn set_sp(&mut self, sp: u16) {
        self.sp = sp;
        self.nregs = self.nregs.max(sp);
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Index of `sym` in this unit's symbol table, adding it if needed.
    pub fn sym(&mut self, sym: Sym) -> Result<u16> {
        if let Some(&idx) = self.sym_index.get(&sym) {
            return Ok(idx);
        }
        if self.syms.len() >= TABLE_LIMIT {
            return Err(CodegenError::TooManySymbols);
        }
        let idx = self.syms.len() as u16;
        self.syms.push(sym);
        self.sym_index.insert(sym, idx);
        Ok(idx)
    }

    /// Declared local names in slot order.
    pub fn locals(&self) -> &[Sym] {
        &self.locals
    }

    /// Register of local `name` in this scope.
    pub fn local_reg(&self, name: Sym) -> Option<u16> {
        if name.is_null() {
            return None;
        }
        self.locals
            .iter()
            .position(|&l| l == name)
            .map(|i| (i + 1) as u16)
    }

    /// Index the next child unit will get.
    pub fn next_child_index(&self) -> Result<u16> {
        if self.children.len() >= TABLE_LIMIT {
            return Err(CodegenError::TooManyChildren);
        }
        Ok(self.children.len() as u16)
    }

    pub fn add_child(&mut self, irep: Irep) -> Result<u16> {
        let idx = self.next_child_index()?;
        self.children.push(irep);
        Ok(idx)
    }

    /// Reserve a catch handler slot; fill it with [`Scope::set_handler`].
    pub fn new_handler(&mut self) -> Result<usize> {
        if self.handlers.len() >= TABLE_LIMIT {
            return Err(CodegenError::TooManyHandlers);
        }
        self.handlers.push(CatchHandler {
            kind: CatchKind::Rescue,
            begin: 0,
            end: 0,
            target: 0,
        });
        Ok(self.handlers.len() - 1)
    }

    pub fn set_handler(&mut self, idx: usize, kind: CatchKind, begin: u32, end: u32, target: u32) {
        if let Some(h) = self.handlers.get_mut(idx) {
            *h = CatchHandler {
                kind,
                begin,
                end,
                target,
            };
        }
    }

    // ------------------------------------------------------------------
    // Source tracking
    // ------------------------------------------------------------------

    /// Start a new debug segment if `file` differs from the current file.
    pub fn switch_file(&mut self, file: Sym) {
        if file.is_null() || file == self.filename {
            return;
        }
        let Some(debug) = &mut self.debug else {
            return;
        };
        let pc = self.code.pc();
        if let Some(lines) = self.code.lines() {
            debug.append_file(self.filename, lines, self.debug_start, pc);
        }
        self.debug_start = pc;
        self.filename = file;
    }

    pub fn filename(&self) -> Sym {
        self.filename
    }

    /// Close the scope and build its unit.
    pub fn finish(self) -> Result<Irep> {
        if self.nlocals > LOCALS_MAX {
            return Err(CodegenError::TooManyLocals {
                count: self.nlocals as usize,
            });
        }
        let pc = self.code.pc();
        let (iseq, lines) = self.code.into_parts();
        let debug_info = match (self.debug, lines) {
            (Some(mut debug), Some(lines)) => {
                debug.append_file(self.filename, &lines, self.debug_start, pc);
                Some(debug)
            }
            _ => None,
        };
        let mut syms = self.syms;
        syms.shrink_to_fit();
        let mut handlers = self.handlers;
        handlers.shrink_to_fit();
        Ok(Irep {
            nlocals: self.nlocals,
            nregs: self.nregs,
            iseq,
            catch_handlers: handlers,
            pool: self.pool.into_values(),
            syms,
            children: self.children,
            lv: (!self.locals.is_empty()).then_some(self.locals),
            debug_info,
        })
    }
}
