//! Unit tree as C struct initializers.
//!
//! Every unit becomes a `static const mrb_irep` with its instruction bytes,
//! pool, symbol and local name arrays, child list and single-file debug
//! info as separate definitions. Symbols that have a presym macro form
//! (`MRB_SYM`, `MRB_SYM_E`, `MRB_IVSYM`, `MRB_OPSYM`, ...) are written
//! inline; the rest are interned at startup by a generated
//! `<initname>_init_syms` function.

use std::io::Write;

use rite_compiler::{DebugInfo, Irep, PoolValue};
use rite_core::{DumpError, Sym, SymbolTable};
use tracing::debug;

use crate::cdump::linkage;
use crate::{DumpFlags, DumpOptions};

const PRELUDE: &str = "#include <mruby.h>\n\
#include <mruby/irep.h>\n\
#include <mruby/debug.h>\n\
#include <mruby/proc.h>\n\
#include <mruby/presym.h>\n\
\n\
#define mrb_BRACED(...) {__VA_ARGS__}\n\
#define mrb_DEFINE_SYMS_VAR(name, len, syms, qualifier) \\\n  \
static qualifier mrb_sym name[len] = mrb_BRACED syms\n\
\n";

const ISEQ_BYTES_PER_LINE: usize = 20;

/// Write the tree as C struct definitions rooted at a `struct RProc`
/// array named `initname`.
///
/// The whole text is rendered before anything reaches `out`, so an
/// invalid tree produces no output.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn dump_irep_cstruct(
    irep: &Irep,
    symbols: &SymbolTable,
    options: &DumpOptions,
    initname: &str,
    out: &mut impl Write,
) -> Result<(), DumpError> {
    if initname.is_empty() {
        return Err(DumpError::InvalidArgument("initializer name is empty"));
    }
    let mut dumper = StructDumper {
        symbols,
        name: initname,
        debug_info: options.flags.contains(DumpFlags::DEBUG_INFO),
        body: Vec::new(),
        init_syms: Vec::new(),
        next: 1,
    };
    dumper.irep(irep, 0)?;
    debug!(
        initname,
        body = dumper.body.len(),
        init_syms = dumper.init_syms.len(),
        "c struct dump"
    );

    out.write_all(PRELUDE.as_bytes())?;
    out.write_all(&dumper.body)?;
    write!(
        out,
        "{}\nconst struct RProc {initname}[] = {{{{\n",
        linkage(options.flags)
    )?;
    write!(
        out,
        "NULL,NULL,MRB_TT_PROC,MRB_GC_RED,MRB_OBJ_IS_FROZEN,0,{{&{initname}_irep_0}},NULL,{{NULL}},\n}}}};\n"
    )?;
    write!(out, "static void\n{initname}_init_syms(mrb_state *mrb)\n{{\n")?;
    out.write_all(&dumper.init_syms)?;
    out.write_all(b"}\n")?;
    Ok(())
}

struct StructDumper<'a> {
    symbols: &'a SymbolTable,
    name: &'a str,
    debug_info: bool,
    /// Definitions, children before their parent.
    body: Vec<u8>,
    /// Statements of the `_init_syms` function.
    init_syms: Vec<u8>,
    /// Next free unit number.
    next: usize,
}

impl<'a> StructDumper<'a> {
    fn irep(&mut self, irep: &Irep, n: usize) -> Result<(), DumpError> {
        let name = self.name;
        let first_child = self.next;

        if !irep.children.is_empty() {
            let len = irep.children.len();
            for (i, child) in irep.children.iter().enumerate() {
                self.next += len;
                self.irep(child, first_child + i)?;
            }
            writeln!(self.body, "static const mrb_irep *{name}_reps_{n}[{len}] = {{")?;
            for i in 0..len {
                writeln!(self.body, "  &{name}_irep_{},", first_child + i)?;
            }
            self.body.extend_from_slice(b"};\n");
        }

        if !irep.pool.is_empty() {
            writeln!(
                self.body,
                "static const mrb_irep_pool {name}_pool_{n}[{}] = {{",
                irep.pool.len()
            )?;
            for value in &irep.pool {
                self.pool_value(value)?;
            }
            self.body.extend_from_slice(b"};\n");
        }

        if !irep.syms.is_empty() {
            self.syms("syms", n, &irep.syms)?;
        }

        let code = code_bytes(irep);
        write!(self.body, "static const mrb_code {name}_iseq_{n}[{}] = {{", code.len())?;
        for (i, byte) in code.iter().enumerate() {
            if i % ISEQ_BYTES_PER_LINE == 0 {
                self.body.push(b'\n');
            }
            write!(self.body, "0x{byte:02x},")?;
        }
        self.body.extend_from_slice(b"};\n");

        if let Some(lv) = &irep.lv {
            let slots: Vec<Sym> = (0..irep.nlocals.saturating_sub(1) as usize)
                .map(|i| lv.get(i).copied().unwrap_or(Sym::NULL))
                .collect();
            self.syms("lv", n, &slots)?;
        }

        let has_debug = self.debug_info && self.debug(n, irep.debug_info.as_ref())?;

        writeln!(self.body, "static const mrb_irep {name}_irep_{n} = {{")?;
        writeln!(
            self.body,
            "  {},{},{},",
            irep.nlocals,
            irep.nregs,
            irep.catch_handlers.len()
        )?;
        writeln!(self.body, "  MRB_IREP_STATIC,{name}_iseq_{n},")?;
        if irep.pool.is_empty() {
            self.body.extend_from_slice(b"  NULL,");
        } else {
            write!(self.body, "  {name}_pool_{n},")?;
        }
        if irep.syms.is_empty() {
            self.body.extend_from_slice(b"NULL,");
        } else {
            write!(self.body, "{name}_syms_{n},")?;
        }
        if irep.children.is_empty() {
            self.body.extend_from_slice(b"NULL,\n");
        } else {
            writeln!(self.body, "{name}_reps_{n},")?;
        }
        if irep.lv.is_some() {
            writeln!(self.body, "  {name}_lv_{n},")?;
        } else {
            self.body.extend_from_slice(b"  NULL,\t\t\t\t\t/* lv */\n");
        }
        if has_debug {
            writeln!(self.body, "  &{name}_debug_{n},")?;
        } else {
            self.body.extend_from_slice(b"  NULL,\t\t\t\t\t/* debug_info */\n");
        }
        write!(
            self.body,
            "  {},{},{},{},0\n}};\n",
            irep.iseq.len(),
            irep.pool.len(),
            irep.syms.len(),
            irep.children.len()
        )?;
        Ok(())
    }

    fn pool_value(&mut self, value: &PoolValue) -> Result<(), DumpError> {
        let out = &mut self.body;
        match value {
            PoolValue::Int32(n) => writeln!(out, "{{IREP_TT_INT32, {{.i32={n}}}}},")?,
            PoolValue::Int64(n) => match i32::try_from(*n) {
                Ok(small) => writeln!(out, "{{IREP_TT_INT32, {{.i32={small}}}}},")?,
                Err(_) => writeln!(out, "{{IREP_TT_INT64, {{.i64={n}}}}},")?,
            },
            PoolValue::Float(f) => writeln!(out, "{{IREP_TT_FLOAT, {{.f={}}}}},", format_g17(*f))?,
            PoolValue::BigInt(big) => {
                out.extend_from_slice(b"{IREP_TT_BIGINT, {\"");
                hex_escape(out, &big.to_blob())?;
                out.extend_from_slice(b"\"}},\n");
            }
            PoolValue::Str(s) => {
                write!(out, "{{IREP_TT_STR|({}<<2), {{\"", s.len())?;
                hex_escape(out, s)?;
                out.extend_from_slice(b"\"}},\n");
            }
        }
        Ok(())
    }

    /// `mrb_DEFINE_SYMS_VAR(...)` for `syms`; the array is `const` unless
    /// some entry has to be interned at startup.
    fn syms(&mut self, key: &str, n: usize, syms: &[Sym]) -> Result<(), DumpError> {
        let var = format!("{}_{key}_{n}", self.name);
        let pending = self.init_syms.len();
        write!(self.body, "mrb_DEFINE_SYMS_VAR({var}, {}, (", syms.len())?;
        for (idx, &sym) in syms.iter().enumerate() {
            self.sym(&var, idx, sym)?;
        }
        self.body.extend_from_slice(b"), ");
        if self.init_syms.len() == pending {
            self.body.extend_from_slice(b"const");
        }
        self.body.extend_from_slice(b");\n");
        Ok(())
    }

    fn sym(&mut self, var: &str, idx: usize, sym: Sym) -> Result<(), DumpError> {
        if sym.is_null() {
            self.body.extend_from_slice(b"0,");
            return Ok(());
        }
        let name = self.name_of(sym)?;
        if name.first().is_none_or(|&b| b == 0) {
            return Err(DumpError::InvalidIrep(format!("symbol {sym} has an empty name")));
        }

        let out = &mut self.body;
        if is_word(name) {
            presym(out, "MRB_SYM", name)?;
        } else if let Some(stem) = word_with_suffix(name, b'=') {
            presym(out, "MRB_SYM_E", stem)?;
        } else if let Some(stem) = word_with_suffix(name, b'?') {
            presym(out, "MRB_SYM_Q", stem)?;
        } else if let Some(stem) = word_with_suffix(name, b'!') {
            presym(out, "MRB_SYM_B", stem)?;
        } else if let Some(ivar) = name.strip_prefix(b"@").filter(|rest| is_word(rest)) {
            presym(out, "MRB_IVSYM", ivar)?;
        } else if let Some(cvar) = name.strip_prefix(b"@@").filter(|rest| is_word(rest)) {
            presym(out, "MRB_CVSYM", cvar)?;
        } else if let Some(op) = operator_name(name) {
            write!(out, "MRB_OPSYM({op})")?;
        } else {
            write!(self.init_syms, "  {var}[{idx}] = mrb_intern_lit(mrb, ")?;
            c_string(&mut self.init_syms, name);
            self.init_syms.extend_from_slice(b");\n");
            self.body.push(b'0');
        }
        self.body.extend_from_slice(b", ");
        Ok(())
    }

    /// Debug definitions for a unit generated from a single file. Returns
    /// false, writing nothing, for any other shape.
    fn debug(&mut self, n: usize, info: Option<&DebugInfo>) -> Result<bool, DumpError> {
        let Some(info) = info else {
            return Ok(false);
        };
        let [file] = info.files.as_slice() else {
            return Ok(false);
        };
        let name = self.name;
        let filename = self.name_of(file.filename)?;

        write!(
            self.init_syms,
            "  {name}_debug_file_{n}.filename_sym = mrb_intern_lit(mrb,"
        )?;
        c_string(&mut self.init_syms, filename);
        self.init_syms.extend_from_slice(b");\n");

        write!(self.body, "static const char {name}_debug_lines_{n}[] = \"")?;
        hex_escape(&mut self.body, &file.line_map)?;
        self.body.extend_from_slice(b"\";\n");
        writeln!(self.body, "static mrb_irep_debug_info_file {name}_debug_file_{n} = {{")?;
        writeln!(
            self.body,
            "{}, {}, {}, mrb_debug_line_packed_map, {{{name}_debug_lines_{n}}}}};",
            file.start_pos,
            file.filename.id(),
            file.line_map.len()
        )?;
        writeln!(
            self.body,
            "static mrb_irep_debug_info_file *{name}_debug_file_{n}_ = &{name}_debug_file_{n};"
        )?;
        writeln!(self.body, "static mrb_irep_debug_info {name}_debug_{n} = {{")?;
        writeln!(
            self.body,
            "{}, {}, &{name}_debug_file_{n}_}};",
            info.pc_count,
            info.files.len()
        )?;
        Ok(true)
    }

    fn name_of(&self, sym: Sym) -> Result<&'a [u8], DumpError> {
        self.symbols
            .name(sym)
            .ok_or_else(|| DumpError::InvalidIrep(format!("symbol {sym} is not interned")))
    }
}

/// Instruction bytes followed by the encoded catch handlers.
fn code_bytes(irep: &Irep) -> Vec<u8> {
    let mut code = irep.iseq.clone();
    for handler in &irep.catch_handlers {
        code.push(handler.kind as u8);
        code.extend_from_slice(&handler.begin.to_be_bytes());
        code.extend_from_slice(&handler.end.to_be_bytes());
        code.extend_from_slice(&handler.target.to_be_bytes());
    }
    code
}

fn presym(out: &mut Vec<u8>, macro_name: &str, name: &[u8]) -> Result<(), DumpError> {
    write!(out, "{macro_name}(")?;
    out.extend_from_slice(name);
    out.push(b')');
    Ok(())
}

fn is_word(name: &[u8]) -> bool {
    match name.split_first() {
        Some((&first, rest)) => {
            (first == b'_' || first.is_ascii_alphabetic())
                && rest.iter().all(|&b| b == b'_' || b.is_ascii_alphanumeric())
        }
        None => false,
    }
}

fn word_with_suffix(name: &[u8], suffix: u8) -> Option<&[u8]> {
    name.strip_suffix(&[suffix]).filter(|stem| is_word(stem))
}

/// Presym name of an operator method.
fn operator_name(name: &[u8]) -> Option<&'static str> {
    Some(match name {
        b"!" => "not",
        b"%" => "mod",
        b"&" => "and",
        b"*" => "mul",
        b"+" => "add",
        b"-" => "sub",
        b"/" => "div",
        b"<" => "lt",
        b">" => "gt",
        b"^" => "xor",
        b"`" => "tick",
        b"|" => "or",
        b"~" => "neg",
        b"!=" => "neq",
        b"!~" => "nmatch",
        b"&&" => "andand",
        b"**" => "pow",
        b"+@" => "plus",
        b"-@" => "minus",
        b"<<" => "lshift",
        b"<=" => "le",
        b"==" => "eq",
        b"=~" => "match",
        b">=" => "ge",
        b">>" => "rshift",
        b"[]" => "aref",
        b"||" => "oror",
        b"<=>" => "cmp",
        b"===" => "eqq",
        b"[]=" => "aset",
        _ => return None,
    })
}

fn hex_escape(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), DumpError> {
    for byte in bytes {
        write!(out, "\\x{byte:02x}")?;
    }
    Ok(())
}

/// Double-quoted C literal; only `"` and `\` are escaped.
fn c_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'"');
    for &b in bytes {
        if b == b'"' || b == b'\\' {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.push(b'"');
}

/// `printf("%.17g")`: 17 significant digits, trailing zeros dropped,
/// exponent form outside `1e-4 <= |v| < 1e17`.
fn format_g17(v: f64) -> String {
    const PRECISION: i32 = 17;

    if v.is_nan() {
        return if v.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    let sci = format!("{:.*e}", (PRECISION - 1) as usize, v);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.unsigned_abs())
    } else {
        let fixed = format!("{:.*}", (PRECISION - 1 - exp) as usize, v);
        trim_fraction(&fixed).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rite_compiler::{BigIntBlob, CatchHandler, CatchKind, DebugFile};
    use std::io;

    fn render(irep: &Irep, symbols: &SymbolTable, flags: DumpFlags, name: &str) -> String {
        let mut out = Vec::new();
        dump_irep_cstruct(irep, symbols, &DumpOptions::new(flags), name, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn tree_layout() {
        let mut symbols = SymbolTable::new();
        let puts = symbols.intern("puts");
        let x = symbols.intern("x");
        let file = symbols.intern("app.rb");

        let child = Irep {
            nlocals: 2,
            nregs: 3,
            iseq: vec![0x69],
            lv: Some(vec![x]),
            ..Irep::default()
        };
        let root = Irep {
            nlocals: 1,
            nregs: 2,
            iseq: vec![0x01, 0x02],
            pool: vec![PoolValue::Int32(7)],
            syms: vec![puts],
            children: vec![child],
            debug_info: Some(DebugInfo {
                pc_count: 2,
                files: vec![DebugFile {
                    start_pos: 0,
                    filename: file,
                    line_map: vec![0x00, 0x01],
                }],
            }),
            ..Irep::default()
        };

        let text = render(&root, &symbols, DumpFlags::STATIC | DumpFlags::DEBUG_INFO, "app");
        let expected = format!(
            "{PRELUDE}\
static const mrb_code app_iseq_1[1] = {{\n0x69,}};\n\
mrb_DEFINE_SYMS_VAR(app_lv_1, 1, (MRB_SYM(x), ), const);\n\
static const mrb_irep app_irep_1 = {{\n  2,3,0,\n  MRB_IREP_STATIC,app_iseq_1,\n  NULL,NULL,NULL,\n  app_lv_1,\n  NULL,\t\t\t\t\t/* debug_info */\n  1,0,0,0,0\n}};\n\
static const mrb_irep *app_reps_0[1] = {{\n  &app_irep_1,\n}};\n\
static const mrb_irep_pool app_pool_0[1] = {{\n{{IREP_TT_INT32, {{.i32=7}}}},\n}};\n\
mrb_DEFINE_SYMS_VAR(app_syms_0, 1, (MRB_SYM(puts), ), const);\n\
static const mrb_code app_iseq_0[2] = {{\n0x01,0x02,}};\n\
static const char app_debug_lines_0[] = \"\\x00\\x01\";\n\
static mrb_irep_debug_info_file app_debug_file_0 = {{\n0, {fid}, 2, mrb_debug_line_packed_map, {{app_debug_lines_0}}}};\n\
static mrb_irep_debug_info_file *app_debug_file_0_ = &app_debug_file_0;\n\
static mrb_irep_debug_info app_debug_0 = {{\n2, 1, &app_debug_file_0_}};\n\
static const mrb_irep app_irep_0 = {{\n  1,2,0,\n  MRB_IREP_STATIC,app_iseq_0,\n  app_pool_0,app_syms_0,app_reps_0,\n  NULL,\t\t\t\t\t/* lv */\n  &app_debug_0,\n  2,1,1,1,0\n}};\n\
static\nconst struct RProc app[] = {{{{\n\
NULL,NULL,MRB_TT_PROC,MRB_GC_RED,MRB_OBJ_IS_FROZEN,0,{{&app_irep_0}},NULL,{{NULL}},\n}}}};\n\
static void\napp_init_syms(mrb_state *mrb)\n{{\n  app_debug_file_0.filename_sym = mrb_intern_lit(mrb,\"app.rb\");\n}}\n",
            fid = file.id()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn debug_info_needs_flag() {
        let mut symbols = SymbolTable::new();
        let file = symbols.intern("a.rb");
        let unit = Irep {
            nlocals: 1,
            nregs: 1,
            iseq: vec![0x69],
            debug_info: Some(DebugInfo {
                pc_count: 1,
                files: vec![DebugFile {
                    start_pos: 0,
                    filename: file,
                    line_map: vec![0x00, 0x01],
                }],
            }),
            ..Irep::default()
        };
        let text = render(&unit, &symbols, DumpFlags::empty(), "m");
        assert!(!text.contains("m_debug_0"));
        assert!(text.contains("  NULL,\t\t\t\t\t/* debug_info */\n"));
    }

    #[test]
    fn symbol_forms() {
        let mut symbols = SymbolTable::new();
        let syms = ["x=", "empty?", "save!", "@iv", "@@cv", "+", "<=>", "a\"b"]
            .map(|name| symbols.intern(name));
        let mut all = syms.to_vec();
        all.push(Sym::NULL);
        let unit = Irep {
            nlocals: 1,
            nregs: 1,
            syms: all,
            ..Irep::default()
        };

        let text = render(&unit, &symbols, DumpFlags::empty(), "t");
        assert!(text.contains(
            "mrb_DEFINE_SYMS_VAR(t_syms_0, 9, (MRB_SYM_E(x), MRB_SYM_Q(empty), MRB_SYM_B(save), \
             MRB_IVSYM(iv), MRB_CVSYM(cv), MRB_OPSYM(add), MRB_OPSYM(cmp), 0, 0,), );\n"
        ));
        assert!(text.contains("{\n  t_syms_0[7] = mrb_intern_lit(mrb, \"a\\\"b\");\n}\n"));
    }

    #[test]
    fn pool_forms() {
        let unit = Irep {
            nlocals: 1,
            nregs: 1,
            pool: vec![
                PoolValue::Int64(5),
                PoolValue::Int64(1 << 40),
                PoolValue::Float(0.1),
                PoolValue::Float(-0.0),
                PoolValue::Float(1e20),
                PoolValue::Str(b"a\n"[..].into()),
                PoolValue::BigInt(BigIntBlob {
                    base: 16,
                    negative: false,
                    digits: b"ff"[..].into(),
                }),
            ],
            ..Irep::default()
        };
        let text = render(&unit, &SymbolTable::new(), DumpFlags::empty(), "p");
        let expected = "static const mrb_irep_pool p_pool_0[7] = {\n\
{IREP_TT_INT32, {.i32=5}},\n\
{IREP_TT_INT64, {.i64=1099511627776}},\n\
{IREP_TT_FLOAT, {.f=0.10000000000000001}},\n\
{IREP_TT_FLOAT, {.f=-0}},\n\
{IREP_TT_FLOAT, {.f=1e+20}},\n\
{IREP_TT_STR|(2<<2), {\"\\x61\\x0a\"}},\n\
{IREP_TT_BIGINT, {\"\\x02\\x10\\x66\\x66\"}},\n\
};\n";
        assert!(text.contains(expected), "{text}");
    }

    #[test]
    fn handlers_follow_instructions() {
        let unit = Irep {
            nlocals: 1,
            nregs: 1,
            iseq: vec![0x01],
            catch_handlers: vec![CatchHandler {
                kind: CatchKind::Rescue,
                begin: 0,
                end: 1,
                target: 1,
            }],
            ..Irep::default()
        };
        let text = render(&unit, &SymbolTable::new(), DumpFlags::empty(), "h");
        assert!(text.contains(
            "h_iseq_0[14] = {\n0x01,0x00,0x00,0x00,0x00,0x00,0x00,0x00,0x00,0x01,0x00,0x00,0x00,0x01,};\n"
        ));
        assert!(text.contains("  1,1,1,\n"));
        assert!(text.contains("  1,0,0,0,0\n};\n"));
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_g17(1.5), "1.5");
        assert_eq!(format_g17(0.0), "0");
        assert_eq!(format_g17(100.0), "100");
        assert_eq!(format_g17(1e-5), "1.0000000000000001e-05");
        assert_eq!(format_g17(f64::INFINITY), "inf");
        assert_eq!(format_g17(f64::NAN), "nan");
    }

    #[test]
    fn empty_name_is_rejected_before_output() {
        let mut out = Vec::new();
        let err = dump_irep_cstruct(
            &Irep::default(),
            &SymbolTable::new(),
            &DumpOptions::default(),
            "",
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, DumpError::InvalidArgument(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn unknown_symbol_writes_nothing() {
        let mut symbols = SymbolTable::new();
        let unit = Irep {
            syms: vec![symbols.intern("a")],
            ..Irep::default()
        };
        let mut out = Vec::new();
        let err = dump_irep_cstruct(
            &unit,
            &SymbolTable::new(),
            &DumpOptions::default(),
            "u",
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, DumpError::InvalidIrep(_)));
        assert!(out.is_empty());
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_write_fault() {
        let err = dump_irep_cstruct(
            &Irep::default(),
            &SymbolTable::new(),
            &DumpOptions::default(),
            "x",
            &mut FailingSink,
        )
        .unwrap_err();
        assert!(matches!(err, DumpError::WriteFault(_)));
    }
}
