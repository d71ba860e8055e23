//! Compile context.
//!
//! A [`CompileContext`] owns everything that outlives one compilation: the
//! symbol table, the option flags, the current filename, the source text
//! used to place diagnostics, and the top-level locals kept for the next
//! program when [`CompileFlags::KEEP_LV`] is set.

use std::io::Write;

use rite_ast::Node;
use rite_compiler::{Generator, Irep};
use rite_core::{
    CompileError, CompileFlags, Diagnostic, DiagnosticCode, Diagnostics, Location, Sym,
    SymbolTable,
};
use rite_dump::{DumpFlags, DumpOptions};
use tracing::{debug, error, info, warn};

/// State shared by successive compilations.
#[derive(Debug, Default)]
pub struct CompileContext {
    symbols: SymbolTable,
    flags: CompileFlags,
    filename: Sym,
    source: Vec<u8>,
    diagnostics: Diagnostics,
    /// Top-level locals of the last program, in register order.
    kept_locals: Vec<Sym>,
    compiler_name: [u8; 4],
    compiler_version: [u8; 4],
}

impl CompileContext {
    pub fn new() -> Self {
        Self {
            compiler_name: DumpOptions::DEFAULT_COMPILER_NAME,
            compiler_version: DumpOptions::DEFAULT_COMPILER_VERSION,
            ..Self::default()
        }
    }

    pub fn with_flags(mut self, flags: CompileFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Compiler identification written into binary headers.
    pub fn with_compiler(mut self, name: [u8; 4], version: [u8; 4]) -> Self {
        self.compiler_name = name;
        self.compiler_version = version;
        self
    }

    pub fn flags(&self) -> CompileFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: CompileFlags) {
        self.flags = flags;
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Set the file name recorded in debug info. An empty name turns debug
    /// info off.
    pub fn set_filename(&mut self, name: &str) -> Sym {
        self.filename = self.symbols.intern(name);
        self.filename
    }

    /// Current file name, if one is set.
    pub fn filename(&self) -> Option<String> {
        (!self.filename.is_null()).then(|| self.symbols.display(self.filename))
    }

    /// Source text the next diagnostics are located against.
    pub fn set_source(&mut self, source: impl Into<Vec<u8>>) {
        self.source = source.into();
    }

    /// Record a diagnostic at byte `offset` of the current source.
    ///
    /// Parser errors recorded here make the next [`Self::generate`] fail
    /// without generating anything.
    pub fn add_diagnostic(&mut self, code: DiagnosticCode, offset: Option<usize>, message: &str) {
        let diagnostic = Diagnostic::new(code, &self.source, offset, message);
        if code == DiagnosticCode::GeneratorWarning {
            warn!("{diagnostic}");
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn clear_diagnostics(&mut self) {
        self.diagnostics.clear();
    }

    /// Locals carried over to the next program.
    pub fn kept_locals(&self) -> &[Sym] {
        &self.kept_locals
    }

    /// Forget the kept locals and stop keeping them.
    pub fn cleanup_local_variables(&mut self) {
        self.kept_locals.clear();
        self.flags.remove(CompileFlags::KEEP_LV);
    }

    /// Generate the unit tree of `program`.
    ///
    /// Fails without generating when parser errors have been recorded. A
    /// generation failure is recorded as a diagnostic located at the node
    /// being compiled; it is also logged unless
    /// [`CompileFlags::CAPTURE_ERRORS`] is set.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn generate(&mut self, program: &Node<'_>) -> Result<Irep, CompileError> {
        let parse_errors = self.diagnostics.count(DiagnosticCode::ParserError);
        if parse_errors > 0 {
            debug!(parse_errors, "skipping generation");
            return Err(CompileError::ParseFailed {
                count: parse_errors,
            });
        }

        let keep_lv = self.flags.contains(CompileFlags::KEEP_LV);
        let preset = if keep_lv {
            std::mem::take(&mut self.kept_locals)
        } else {
            Vec::new()
        };

        let mut generator = Generator::new(&mut self.symbols, self.flags).with_filename(self.filename);
        let result = generator.generate_with_locals(program, &preset);

        let irep = match result {
            Ok(irep) => irep,
            Err(err) => {
                if keep_lv {
                    self.kept_locals = preset;
                }
                let offset = generator.error_offset().map(|o| o as usize);
                let location = offset
                    .map(|o| Location::from_offset(&self.source, o))
                    .unwrap_or_default();
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticCode::GeneratorError,
                    &self.source,
                    offset,
                    &err.to_string(),
                ));
                if !self.flags.contains(CompileFlags::CAPTURE_ERRORS) {
                    error!(%location, "{err}");
                }
                return Err(CompileError::Generation {
                    error: err,
                    location,
                });
            }
        };

        if keep_lv {
            self.kept_locals = irep.lv.clone().unwrap_or_default();
        }
        if self.flags.contains(CompileFlags::DUMP_RESULT) {
            self.log_irep(&irep);
        }
        Ok(irep)
    }

    /// Log every unit of the tree with its disassembly.
    fn log_irep(&self, root: &Irep) {
        let mut index = 0usize;
        root.walk(&mut |irep| {
            info!(
                irep = index,
                nlocals = irep.nlocals,
                nregs = irep.nregs,
                ilen = irep.iseq.len(),
                pool = irep.pool.len(),
                syms = irep.syms.len(),
                reps = irep.children.len(),
                handlers = irep.catch_handlers.len(),
                "unit"
            );
            if let Some(lv) = &irep.lv {
                let names: Vec<String> = lv.iter().map(|&sym| self.symbols.display(sym)).collect();
                info!(irep = index, "locals: {}", names.join(", "));
            }
            for insn in irep.instructions() {
                info!(irep = index, "{insn}");
            }
            index += 1;
        });
    }

    fn dump_options(&self, flags: DumpFlags) -> DumpOptions {
        DumpOptions::new(flags).with_compiler(self.compiler_name, self.compiler_version)
    }

    /// Serialize a tree generated by this context.
    pub fn dump(&self, irep: &Irep, flags: DumpFlags) -> Result<Vec<u8>, CompileError> {
        Ok(rite_dump::dump_irep(irep, &self.symbols, &self.dump_options(flags))?)
    }

    /// Serialize to `out`.
    pub fn dump_binary(
        &self,
        irep: &Irep,
        flags: DumpFlags,
        out: &mut impl Write,
    ) -> Result<(), CompileError> {
        rite_dump::dump_irep_binary(irep, &self.symbols, &self.dump_options(flags), out)?;
        Ok(())
    }

    /// Serialize to `out` as a C array definition named `initname`.
    pub fn dump_cfunc(
        &self,
        irep: &Irep,
        flags: DumpFlags,
        initname: &str,
        out: &mut impl Write,
    ) -> Result<(), CompileError> {
        rite_dump::dump_irep_cfunc(irep, &self.symbols, &self.dump_options(flags), initname, out)?;
        Ok(())
    }

    /// Write the tree to `out` as C struct initializers rooted at
    /// `initname`.
    pub fn dump_cstruct(
        &self,
        irep: &Irep,
        flags: DumpFlags,
        initname: &str,
        out: &mut impl Write,
    ) -> Result<(), CompileError> {
        rite_dump::dump_irep_cstruct(irep, &self.symbols, &self.dump_options(flags), initname, out)?;
        Ok(())
    }

    /// Load a binary, interning its names into this context's table.
    pub fn load(&mut self, bin: &[u8]) -> Result<Irep, CompileError> {
        Ok(rite_dump::load_irep(bin, &mut self.symbols)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use rite_ast::AstBuilder;
    use rite_compiler::OpCode;
    use rite_core::CodegenError;

    #[test]
    fn parse_errors_skip_generation() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let mut ctx = CompileContext::new();
        ctx.set_source("1 +\n");
        ctx.add_diagnostic(DiagnosticCode::ParserError, Some(3), "unexpected end-of-input");

        let err = ctx.generate(&b.program(&[], &[b.int(1)])).unwrap_err();
        assert!(matches!(err, CompileError::ParseFailed { count: 1 }));

        let diag = ctx.diagnostics().iter().next().unwrap();
        assert_eq!(diag.message, "syntax error, unexpected end-of-input");
        assert_eq!(diag.location, Location::new(1, 4));

        ctx.clear_diagnostics();
        assert!(ctx.generate(&b.program(&[], &[b.int(1)])).is_ok());
    }

    #[test]
    fn generation_error_is_recorded() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let mut ctx = CompileContext::new().with_flags(CompileFlags::CAPTURE_ERRORS);
        let ghost = ctx.symbols_mut().intern("ghost");
        ctx.set_source("x = 1\nghost\n");
        b.set_offset(6);

        let err = ctx.generate(&b.program(&[], &[b.local(ghost)])).unwrap_err();
        assert_eq!(err.codegen_error(), Some(&CodegenError::UnknownLocal(ghost)));
        let CompileError::Generation { location, .. } = err else {
            panic!("expected a generation error");
        };
        assert_eq!(location, Location::new(2, 1));

        let diag = ctx.diagnostics().errors().next().unwrap();
        assert_eq!(diag.code, DiagnosticCode::GeneratorError);
        assert!(diag.message.starts_with("generator error, "));
    }

    #[test]
    fn keep_lv_carries_registers_over() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let mut ctx = CompileContext::new().with_flags(CompileFlags::KEEP_LV);
        let a = ctx.symbols_mut().intern("a");
        let c = ctx.symbols_mut().intern("c");

        let first = b.program(&[a], &[b.assign_local(a, b.int(1))]);
        ctx.generate(&first).unwrap();
        assert_eq!(ctx.kept_locals(), &[a]);

        // `a` is still known and keeps register 1; `c` gets the next one
        let second = b.program(&[c], &[b.assign_local(c, b.local(a))]);
        let irep = ctx.generate(&second).unwrap();
        assert_eq!(irep.lv.as_deref(), Some(&[a, c][..]));
        assert_eq!(irep.nlocals, 3);
        let read = irep.decode_all()[0];
        assert_eq!((read.op, read.b), (OpCode::Move, 1));

        ctx.cleanup_local_variables();
        assert!(ctx.kept_locals().is_empty());
        assert!(!ctx.flags().contains(CompileFlags::KEEP_LV));
    }

    #[test]
    fn filename_enables_debug_section() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let mut ctx = CompileContext::new();
        assert_eq!(ctx.filename(), None);
        ctx.set_filename("app.rb");
        assert_eq!(ctx.filename().as_deref(), Some("app.rb"));

        b.set_line(1);
        let irep = ctx.generate(&b.program(&[], &[b.int(5)])).unwrap();
        let bin = ctx.dump(&irep, DumpFlags::DEBUG_INFO).unwrap();
        assert!(bin.windows(4).any(|w| w == b"DBG\0"));
        let bin = ctx.dump(&irep, DumpFlags::empty()).unwrap();
        assert!(!bin.windows(4).any(|w| w == b"DBG\0"));
    }

    #[test]
    fn custom_compiler_tag() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let mut ctx = CompileContext::new().with_compiler(*b"TEST", *b"0102");
        let irep = ctx.generate(&b.program(&[], &[])).unwrap();
        let bin = ctx.dump(&irep, DumpFlags::empty()).unwrap();
        assert_eq!(&bin[12..20], b"TEST0102");
    }
}
