//! Binary writer.
//!
//! Dumping runs in two passes over the unit tree. The size pass validates
//! every table against the field widths of the format and computes each
//! section's length; the write pass then fills a buffer allocated to exactly
//! that length. The passes must agree byte for byte.

use rite_compiler::debug::LINE_TYPE_PACKED_MAP;
use rite_compiler::{CatchHandler, Irep, PoolValue};
use rite_core::{DumpError, Sym, SymbolTable};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::format::*;
use crate::{DumpFlags, DumpOptions};

type Result<T> = std::result::Result<T, DumpError>;

/// Serialize `irep` and its descendants into a RITE binary.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn dump_irep(irep: &Irep, symbols: &SymbolTable, options: &DumpOptions) -> Result<Vec<u8>> {
    let dumper = Dumper::new(irep, symbols, options)?;
    let layout = dumper.layout(irep)?;
    debug!(
        irep = layout.irep,
        debug = layout.debug,
        lv = layout.lv,
        total = layout.total,
        "dumping {} unit(s)",
        irep.count()
    );

    let mut w = Writer::with_capacity(layout.total);
    dumper.write_header(&mut w, layout.total)?;

    let start = w.len();
    dumper.write_irep_section(&mut w, irep, layout.irep)?;
    assert_eq!(w.len() - start, layout.irep, "IREP section size mismatch");

    if layout.debug > 0 {
        let start = w.len();
        dumper.write_debug_section(&mut w, irep, layout.debug)?;
        assert_eq!(w.len() - start, layout.debug, "DBG section size mismatch");
    }

    if layout.lv > 0 {
        let start = w.len();
        dumper.write_lv_section(&mut w, irep, layout.lv)?;
        assert_eq!(w.len() - start, layout.lv, "LVAR section size mismatch");
    }

    w.bytes(BINARY_EOF);
    w.u32(FOOTER_SIZE as u32);

    assert_eq!(w.len(), layout.total, "binary size mismatch");
    Ok(w.into_inner())
}

/// Byte sizes computed by the size pass.
#[derive(Debug, Clone, Copy)]
struct Layout {
    irep: usize,
    /// Zero when the section is omitted.
    debug: usize,
    /// Zero when the section is omitted.
    lv: usize,
    total: usize,
}

/// Names shared by the whole tree, stored once per section and referenced
/// by index from the per-unit records.
#[derive(Debug, Default)]
struct NameTable {
    names: Vec<Sym>,
    index: FxHashMap<Sym, u16>,
}

impl NameTable {
    /// Add `sym` unless already present. Index `0xFFFF` stays reserved.
    fn insert(&mut self, sym: Sym) -> Result<()> {
        if self.index.contains_key(&sym) {
            return Ok(());
        }
        let idx = u16::try_from(self.names.len())
            .ok()
            .filter(|&idx| idx != LV_NULL_MARK)
            .ok_or_else(|| DumpError::InvalidIrep("too many distinct names".into()))?;
        self.names.push(sym);
        self.index.insert(sym, idx);
        Ok(())
    }

    fn index_of(&self, sym: Sym) -> Result<u16> {
        self.index
            .get(&sym)
            .copied()
            .ok_or_else(|| DumpError::InvalidIrep(format!("name {sym} missing from table")))
    }
}

struct Dumper<'a> {
    symbols: &'a SymbolTable,
    options: &'a DumpOptions,
    /// Filename table; `None` when the debug section is not written.
    filenames: Option<NameTable>,
    /// Local variable name table; `None` when no unit has local names.
    lv_names: Option<NameTable>,
}

impl<'a> Dumper<'a> {
    fn new(irep: &Irep, symbols: &'a SymbolTable, options: &'a DumpOptions) -> Result<Self> {
        let filenames = if options.flags.contains(DumpFlags::DEBUG_INFO) && irep.has_debug_info() {
            let mut table = NameTable::default();
            collect_filenames(irep, &mut table)?;
            Some(table)
        } else {
            None
        };

        let lv_names = if irep.has_lv() {
            let mut table = NameTable::default();
            collect_lv_names(irep, &mut table)?;
            Some(table)
        } else {
            None
        };

        Ok(Self {
            symbols,
            options,
            filenames,
            lv_names,
        })
    }

    fn name(&self, sym: Sym) -> Result<&'a [u8]> {
        self.symbols
            .name(sym)
            .ok_or_else(|| DumpError::InvalidIrep(format!("symbol {sym} is not interned")))
    }

    // ========================================================================
    // Size pass
    // ========================================================================

    fn layout(&self, irep: &Irep) -> Result<Layout> {
        let irep_size = IREP_SECTION_HEADER_SIZE + self.tree_record_size(irep)?;

        let debug = match &self.filenames {
            Some(table) => {
                SECTION_HEADER_SIZE
                    + self.name_table_size(table, 2)?
                    + tree_debug_record_size(irep)
            }
            None => 0,
        };

        let lv = match &self.lv_names {
            Some(table) => {
                SECTION_HEADER_SIZE + self.name_table_size(table, 4)? + tree_lv_record_size(irep)
            }
            None => 0,
        };

        let total = BINARY_HEADER_SIZE + irep_size + debug + lv + FOOTER_SIZE;
        if u32::try_from(total).is_err() {
            return Err(DumpError::InvalidIrep(format!("binary too large ({total} bytes)")));
        }
        Ok(Layout {
            irep: irep_size,
            debug,
            lv,
            total,
        })
    }

    fn tree_record_size(&self, irep: &Irep) -> Result<usize> {
        let mut size = self.record_size(irep)?;
        for child in &irep.children {
            size += self.tree_record_size(child)?;
        }
        Ok(size)
    }

    /// Size of one unit's own record, checking every count against its
    /// field width.
    fn record_size(&self, irep: &Irep) -> Result<usize> {
        check_count(irep.children.len(), "child units")?;
        check_count(irep.catch_handlers.len(), "catch handlers")?;
        check_count(irep.pool.len(), "pool entries")?;
        check_count(irep.syms.len(), "symbols")?;
        if u32::try_from(irep.iseq.len()).is_err() {
            return Err(DumpError::InvalidIrep("instruction sequence too long".into()));
        }

        let mut size = RECORD_HEADER_SIZE;
        size += 2 + 4 + irep.iseq.len() + irep.catch_handlers.len() * CatchHandler::ENCODED_SIZE;

        size += 2;
        for value in &irep.pool {
            size += 1 + pool_payload_size(value)?;
        }

        size += 2;
        for &sym in &irep.syms {
            size += 2;
            if !sym.is_null() {
                let len = self.name(sym)?.len();
                if len >= NULL_SYM_LEN as usize {
                    return Err(DumpError::InvalidIrep("symbol name too long".into()));
                }
                size += len + 1;
            }
        }
        Ok(size)
    }

    /// Count field plus one length-prefixed name per entry.
    fn name_table_size(&self, table: &NameTable, count_width: usize) -> Result<usize> {
        let mut size = count_width;
        for &sym in &table.names {
            let len = self.name(sym)?.len();
            if u16::try_from(len).is_err() {
                return Err(DumpError::InvalidIrep("name too long".into()));
            }
            size += 2 + len;
        }
        Ok(size)
    }

    // ========================================================================
    // Write pass
    // ========================================================================

    fn write_header(&self, w: &mut Writer, total: usize) -> Result<()> {
        w.bytes(BINARY_IDENT);
        w.bytes(MAJOR_VERSION);
        w.bytes(MINOR_VERSION);
        w.u32(total as u32);
        w.bytes(&self.options.compiler_name);
        w.bytes(&self.options.compiler_version);
        Ok(())
    }

    fn write_irep_section(&self, w: &mut Writer, irep: &Irep, size: usize) -> Result<()> {
        w.bytes(SECTION_IREP);
        w.u32(size as u32);
        w.bytes(VM_VERSION);
        self.write_record(w, irep)
    }

    fn write_record(&self, w: &mut Writer, irep: &Irep) -> Result<()> {
        let start = w.len();
        let own_size = self.record_size(irep)?;

        w.u32(own_size as u32);
        w.u16(irep.nlocals);
        w.u16(irep.nregs);
        w.u16(irep.children.len() as u16);

        w.u16(irep.catch_handlers.len() as u16);
        w.u32(irep.iseq.len() as u32);
        w.bytes(&irep.iseq);
        for handler in &irep.catch_handlers {
            w.u8(handler.kind as u8);
            w.u32(handler.begin);
            w.u32(handler.end);
            w.u32(handler.target);
        }

        w.u16(irep.pool.len() as u16);
        for value in &irep.pool {
            write_pool_value(w, value);
        }

        w.u16(irep.syms.len() as u16);
        for &sym in &irep.syms {
            if sym.is_null() {
                w.u16(NULL_SYM_LEN);
            } else {
                let name = self.name(sym)?;
                w.u16(name.len() as u16);
                w.bytes(name);
                w.u8(0);
            }
        }
        assert_eq!(w.len() - start, own_size, "irep record size mismatch");

        for child in &irep.children {
            self.write_record(w, child)?;
        }
        Ok(())
    }

    fn write_name_table(&self, w: &mut Writer, table: &NameTable) -> Result<()> {
        for &sym in &table.names {
            let name = self.name(sym)?;
            w.u16(name.len() as u16);
            w.bytes(name);
        }
        Ok(())
    }

    fn write_debug_section(&self, w: &mut Writer, irep: &Irep, size: usize) -> Result<()> {
        let Some(filenames) = &self.filenames else {
            return Ok(());
        };
        w.bytes(SECTION_DEBUG);
        w.u32(size as u32);
        w.u16(filenames.names.len() as u16);
        self.write_name_table(w, filenames)?;
        write_debug_records(w, irep, filenames)
    }

    fn write_lv_section(&self, w: &mut Writer, irep: &Irep, size: usize) -> Result<()> {
        let Some(lv_names) = &self.lv_names else {
            return Ok(());
        };
        w.bytes(SECTION_LV);
        w.u32(size as u32);
        w.u32(lv_names.names.len() as u32);
        self.write_name_table(w, lv_names)?;
        write_lv_records(w, irep, lv_names)
    }
}

fn check_count(n: usize, what: &str) -> Result<()> {
    if u16::try_from(n).is_err() {
        return Err(DumpError::InvalidIrep(format!("too many {what} ({n})")));
    }
    Ok(())
}

/// `Int64` entries that fit 32 bits are written as `Int32`.
fn narrow_int(n: i64) -> Option<i32> {
    i32::try_from(n).ok()
}

fn pool_payload_size(value: &PoolValue) -> Result<usize> {
    Ok(match value {
        PoolValue::Int32(_) => 4,
        PoolValue::Int64(n) => match narrow_int(*n) {
            Some(_) => 4,
            None => 8,
        },
        PoolValue::Float(_) => 8,
        PoolValue::BigInt(big) => {
            if big.digits.len() > u8::MAX as usize {
                return Err(DumpError::InvalidIrep("big integer literal too long".into()));
            }
            big.digits.len() + 2
        }
        PoolValue::Str(s) => {
            if u16::try_from(s.len()).is_err() {
                return Err(DumpError::InvalidIrep("string literal too long".into()));
            }
            2 + s.len() + 1
        }
    })
}

fn write_pool_value(w: &mut Writer, value: &PoolValue) {
    match value {
        PoolValue::Int32(n) => {
            w.u8(PoolValue::TT_INT32);
            w.u32(*n as u32);
        }
        PoolValue::Int64(n) => match narrow_int(*n) {
            Some(small) => {
                w.u8(PoolValue::TT_INT32);
                w.u32(small as u32);
            }
            None => {
                w.u8(PoolValue::TT_INT64);
                w.u32((*n >> 32) as u32);
                w.u32(*n as u32);
            }
        },
        PoolValue::Float(f) => {
            w.u8(PoolValue::TT_FLOAT);
            w.bytes(&f.to_le_bytes());
        }
        PoolValue::BigInt(big) => {
            w.u8(PoolValue::TT_BIGINT);
            w.bytes(&big.to_blob());
        }
        PoolValue::Str(s) => {
            w.u8(PoolValue::TT_STR);
            w.u16(s.len() as u16);
            w.bytes(s);
            w.u8(0);
        }
    }
}

fn collect_filenames(irep: &Irep, table: &mut NameTable) -> Result<()> {
    if let Some(info) = &irep.debug_info {
        for file in &info.files {
            table.insert(file.filename)?;
        }
    }
    for child in &irep.children {
        collect_filenames(child, table)?;
    }
    Ok(())
}

fn collect_lv_names(irep: &Irep, table: &mut NameTable) -> Result<()> {
    for sym in lv_slots(irep).flatten() {
        table.insert(sym)?;
    }
    for child in &irep.children {
        collect_lv_names(child, table)?;
    }
    Ok(())
}

/// Names of local slots `1..nlocals`, `None` for anonymous or unnamed ones.
fn lv_slots(irep: &Irep) -> impl Iterator<Item = Option<Sym>> + '_ {
    let lv = irep.lv.as_deref().unwrap_or(&[]);
    (0..irep.nlocals.saturating_sub(1) as usize)
        .map(move |i| lv.get(i).copied().filter(|sym| !sym.is_null()))
}

fn debug_record_size(irep: &Irep) -> usize {
    let files = irep.debug_info.as_ref().map_or(&[][..], |info| &info.files[..]);
    4 + 2 + files.iter().map(|f| 4 + 2 + 4 + 1 + f.line_map.len()).sum::<usize>()
}

fn tree_debug_record_size(irep: &Irep) -> usize {
    debug_record_size(irep) + irep.children.iter().map(tree_debug_record_size).sum::<usize>()
}

fn write_debug_records(w: &mut Writer, irep: &Irep, filenames: &NameTable) -> Result<()> {
    let start = w.len();
    let own_size = debug_record_size(irep);
    let files = irep.debug_info.as_ref().map_or(&[][..], |info| &info.files[..]);
    check_count(files.len(), "debug file segments")?;

    w.u32(own_size as u32);
    w.u16(files.len() as u16);
    for file in files {
        w.u32(file.start_pos);
        w.u16(filenames.index_of(file.filename)?);
        w.u32(file.line_map.len() as u32);
        w.u8(LINE_TYPE_PACKED_MAP);
        w.bytes(&file.line_map);
    }
    assert_eq!(w.len() - start, own_size, "debug record size mismatch");
    trace!(files = files.len(), size = own_size, "debug record");

    for child in &irep.children {
        write_debug_records(w, child, filenames)?;
    }
    Ok(())
}

fn tree_lv_record_size(irep: &Irep) -> usize {
    2 * irep.nlocals.saturating_sub(1) as usize
        + irep.children.iter().map(tree_lv_record_size).sum::<usize>()
}

fn write_lv_records(w: &mut Writer, irep: &Irep, lv_names: &NameTable) -> Result<()> {
    for slot in lv_slots(irep) {
        match slot {
            Some(sym) => w.u16(lv_names.index_of(sym)?),
            None => w.u16(LV_NULL_MARK),
        }
    }
    for child in &irep.children {
        write_lv_records(w, child, lv_names)?;
    }
    Ok(())
}

/// Big-endian output buffer.
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
