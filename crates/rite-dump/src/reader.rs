//! Binary loader.

use rite_compiler::debug::LINE_TYPE_PACKED_MAP;
use rite_compiler::{BigIntBlob, CatchHandler, CatchKind, DebugFile, DebugInfo, Irep, PoolValue};
use rite_core::{DumpError, Sym, SymbolTable};
use tracing::{debug, trace};

use crate::format::*;

type Result<T> = std::result::Result<T, DumpError>;

/// Deepest unit nesting accepted from a binary.
const MAX_NESTING: usize = 512;

/// Rebuild a unit tree from a RITE binary, interning every name into
/// `symbols`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn load_irep(bin: &[u8], symbols: &mut SymbolTable) -> Result<Irep> {
    let mut r = Reader::new(bin);
    if r.take(4)? != BINARY_IDENT
        || r.take(2)? != MAJOR_VERSION
        || r.take(2)? != MINOR_VERSION
    {
        return Err(DumpError::InvalidFileHeader);
    }
    let total = r.u32()? as usize;
    r.take(8)?; // compiler name and version
    if total < BINARY_HEADER_SIZE {
        return Err(DumpError::InvalidFileHeader);
    }
    if total > bin.len() {
        return Err(DumpError::ReadFault { offset: bin.len() });
    }
    let mut r = Reader {
        data: &bin[..total],
        pos: r.pos,
    };

    let mut root: Option<Irep> = None;
    loop {
        let section_start = r.pos;
        let ident = r.take(4)?;
        let size = r.u32()? as usize;
        if size < SECTION_HEADER_SIZE {
            return Err(DumpError::InvalidIrep(format!(
                "section at offset {section_start} has size {size}"
            )));
        }
        let end = section_start
            .checked_add(size)
            .filter(|&end| end <= r.data.len())
            .ok_or(DumpError::ReadFault { offset: r.data.len() })?;
        trace!(section = %String::from_utf8_lossy(ident), size, "section");

        if ident == BINARY_EOF {
            break;
        }
        let mut section = Reader {
            data: &r.data[..end],
            pos: r.pos,
        };
        if ident == SECTION_IREP {
            if section.take(4)? != VM_VERSION {
                return Err(DumpError::InvalidFileHeader);
            }
            root = Some(read_record(&mut section, symbols, 0)?);
        } else if ident == SECTION_DEBUG {
            let irep = root.as_mut().ok_or_else(|| section_before_irep("DBG"))?;
            read_debug_section(&mut section, irep, symbols)?;
        } else if ident == SECTION_LV {
            let irep = root.as_mut().ok_or_else(|| section_before_irep("LVAR"))?;
            read_lv_section(&mut section, irep, symbols)?;
        } else {
            debug!(
                section = %String::from_utf8_lossy(ident),
                "skipping unknown section"
            );
        }
        r.pos = end;
    }

    root.ok_or_else(|| DumpError::InvalidIrep("missing IREP section".into()))
}

fn section_before_irep(name: &str) -> DumpError {
    DumpError::InvalidIrep(format!("{name} section precedes IREP section"))
}

fn read_record(r: &mut Reader<'_>, symbols: &mut SymbolTable, depth: usize) -> Result<Irep> {
    if depth > MAX_NESTING {
        return Err(DumpError::InvalidIrep("units nested too deeply".into()));
    }
    let start = r.pos;
    let own_size = r.u32()? as usize;
    let nlocals = r.u16()?;
    let nregs = r.u16()?;
    let rlen = r.u16()?;

    let clen = r.u16()?;
    let ilen = r.u32()? as usize;
    let iseq = r.take(ilen)?.to_vec();
    let mut catch_handlers = Vec::with_capacity(clen as usize);
    for _ in 0..clen {
        let kind = r.u8()?;
        let kind = CatchKind::from_u8(kind)
            .ok_or_else(|| DumpError::InvalidIrep(format!("unknown catch handler kind {kind}")))?;
        catch_handlers.push(CatchHandler {
            kind,
            begin: r.u32()?,
            end: r.u32()?,
            target: r.u32()?,
        });
    }

    let plen = r.u16()?;
    let mut pool = Vec::with_capacity(plen as usize);
    for _ in 0..plen {
        pool.push(read_pool_value(r)?);
    }

    let slen = r.u16()?;
    let mut syms = Vec::with_capacity(slen as usize);
    for _ in 0..slen {
        let len = r.u16()?;
        if len == NULL_SYM_LEN {
            syms.push(Sym::NULL);
            continue;
        }
        let name = r.take(len as usize)?;
        r.nul()?;
        syms.push(symbols.intern(name));
    }

    if r.pos - start != own_size {
        return Err(DumpError::InvalidIrep(format!(
            "record at offset {start} declares {own_size} bytes but holds {}",
            r.pos - start
        )));
    }

    let mut children = Vec::with_capacity(rlen as usize);
    for _ in 0..rlen {
        children.push(read_record(r, symbols, depth + 1)?);
    }

    Ok(Irep {
        nlocals,
        nregs,
        iseq,
        catch_handlers,
        pool,
        syms,
        children,
        lv: None,
        debug_info: None,
    })
}

fn read_pool_value(r: &mut Reader<'_>) -> Result<PoolValue> {
    let tag = r.u8()?;
    Ok(match tag {
        PoolValue::TT_INT32 => PoolValue::Int32(r.u32()? as i32),
        PoolValue::TT_INT64 => {
            let hi = u64::from(r.u32()?);
            let lo = u64::from(r.u32()?);
            PoolValue::Int64(((hi << 32) | lo) as i64)
        }
        PoolValue::TT_FLOAT => {
            let bytes = r.take(8)?;
            let mut le = [0u8; 8];
            le.copy_from_slice(bytes);
            PoolValue::Float(f64::from_le_bytes(le))
        }
        PoolValue::TT_BIGINT => {
            let len = r.peek()? as usize;
            let blob = r.take(len + 2)?;
            let big = BigIntBlob::from_blob(blob)
                .ok_or_else(|| DumpError::InvalidIrep("malformed big integer".into()))?;
            PoolValue::BigInt(big)
        }
        PoolValue::TT_STR => {
            let len = r.u16()? as usize;
            let s = r.take(len)?;
            r.nul()?;
            PoolValue::Str(s.into())
        }
        _ => return Err(DumpError::InvalidIrep(format!("unknown pool tag {tag}"))),
    })
}

/// `u16` count followed by that many length-prefixed names.
fn read_name_table(r: &mut Reader<'_>, count: usize, symbols: &mut SymbolTable) -> Result<Vec<Sym>> {
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        let len = r.u16()? as usize;
        names.push(symbols.intern(r.take(len)?));
    }
    Ok(names)
}

fn read_debug_section(r: &mut Reader<'_>, irep: &mut Irep, symbols: &mut SymbolTable) -> Result<()> {
    let nfiles = r.u16()? as usize;
    let filenames = read_name_table(r, nfiles, symbols)?;
    read_debug_records(r, irep, &filenames)
}

fn read_debug_records(r: &mut Reader<'_>, irep: &mut Irep, filenames: &[Sym]) -> Result<()> {
    let start = r.pos;
    let own_size = r.u32()? as usize;
    let flen = r.u16()?;
    let mut files = Vec::with_capacity(flen as usize);
    for _ in 0..flen {
        let start_pos = r.u32()?;
        let idx = r.u16()? as usize;
        let filename = *filenames
            .get(idx)
            .ok_or_else(|| DumpError::InvalidIrep(format!("filename index {idx} out of range")))?;
        let map_len = r.u32()? as usize;
        let line_type = r.u8()?;
        if line_type != LINE_TYPE_PACKED_MAP {
            return Err(DumpError::InvalidIrep(format!(
                "unsupported line map type {line_type}"
            )));
        }
        files.push(DebugFile {
            start_pos,
            filename,
            line_map: r.take(map_len)?.to_vec(),
        });
    }
    if r.pos - start != own_size {
        return Err(DumpError::InvalidIrep("debug record size mismatch".into()));
    }

    let pc_count = if files.is_empty() { 0 } else { irep.iseq.len() as u32 };
    irep.debug_info = Some(DebugInfo { pc_count, files });

    for child in &mut irep.children {
        read_debug_records(r, child, filenames)?;
    }
    Ok(())
}

fn read_lv_section(r: &mut Reader<'_>, irep: &mut Irep, symbols: &mut SymbolTable) -> Result<()> {
    let nsyms = r.u32()? as usize;
    if nsyms > r.remaining() / 2 {
        return Err(DumpError::InvalidIrep(format!("{nsyms} local names cannot fit")));
    }
    let names = read_name_table(r, nsyms, symbols)?;
    read_lv_records(r, irep, &names)
}

fn read_lv_records(r: &mut Reader<'_>, irep: &mut Irep, names: &[Sym]) -> Result<()> {
    let slots = irep.nlocals.saturating_sub(1) as usize;
    if slots > 0 {
        let mut lv = Vec::with_capacity(slots);
        for _ in 0..slots {
            let idx = r.u16()?;
            if idx == LV_NULL_MARK {
                lv.push(Sym::NULL);
            } else {
                let sym = names.get(idx as usize).copied().ok_or_else(|| {
                    DumpError::InvalidIrep(format!("local name index {idx} out of range"))
                })?;
                lv.push(sym);
            }
        }
        irep.lv = Some(lv);
    }
    for child in &mut irep.children {
        read_lv_records(r, child, names)?;
    }
    Ok(())
}

/// Big-endian cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(DumpError::ReadFault {
                offset: self.data.len(),
            });
        }
        let data = self.data;
        let bytes = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn peek(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(DumpError::ReadFault { offset: self.pos })
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// String terminator.
    fn nul(&mut self) -> Result<()> {
        let at = self.pos;
        match self.u8()? {
            0 => Ok(()),
            _ => Err(DumpError::InvalidIrep(format!("missing terminator at offset {at}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DumpFlags, DumpOptions, dump_irep};

    fn sample(symbols: &mut SymbolTable) -> Irep {
        let puts = symbols.intern("puts");
        let x = symbols.intern("x");
        let file = symbols.intern("main.rb");
        let mut child = Irep {
            nlocals: 2,
            nregs: 4,
            iseq: vec![0x01, 0x02, 0x03],
            pool: vec![PoolValue::Str(b"inner"[..].into())],
            lv: Some(vec![x]),
            ..Irep::default()
        };
        child.debug_info = Some(DebugInfo {
            pc_count: 3,
            files: vec![DebugFile {
                start_pos: 0,
                filename: file,
                line_map: vec![0, 2],
            }],
        });
        Irep {
            nlocals: 1,
            nregs: 3,
            iseq: vec![0x10, 0x20, 0x30, 0x40],
            catch_handlers: vec![CatchHandler {
                kind: CatchKind::Rescue,
                begin: 0,
                end: 2,
                target: 3,
            }],
            pool: vec![
                PoolValue::Int32(-9),
                PoolValue::Int64(i64::MIN),
                PoolValue::Float(-0.25),
                PoolValue::BigInt(BigIntBlob {
                    base: 16,
                    negative: true,
                    digits: b"ffffffffffffffffffff"[..].into(),
                }),
            ],
            syms: vec![puts, Sym::NULL],
            children: vec![child],
            lv: None,
            debug_info: Some(DebugInfo {
                pc_count: 4,
                files: vec![DebugFile {
                    start_pos: 0,
                    filename: file,
                    line_map: vec![0, 1, 2, 1],
                }],
            }),
        }
    }

    #[test]
    fn round_trip_preserves_tree() {
        let mut symbols = SymbolTable::new();
        let irep = sample(&mut symbols);
        let bin = dump_irep(&irep, &symbols, &DumpOptions::new(DumpFlags::DEBUG_INFO)).unwrap();

        let mut fresh = SymbolTable::new();
        let loaded = load_irep(&bin, &mut fresh).unwrap();

        assert_eq!(loaded.nregs, 3);
        assert_eq!(loaded.iseq, irep.iseq);
        assert_eq!(loaded.catch_handlers, irep.catch_handlers);
        assert_eq!(loaded.pool, irep.pool);
        assert_eq!(fresh.display(loaded.syms[0]), "puts");
        assert!(loaded.syms[1].is_null());
        assert!(loaded.lv.is_none());

        let child = &loaded.children[0];
        assert_eq!(child.pool, irep.children[0].pool);
        let lv = child.lv.as_ref().unwrap();
        assert_eq!(fresh.display(lv[0]), "x");

        let debug = child.debug_info.as_ref().unwrap();
        assert_eq!(fresh.display(debug.files[0].filename), "main.rb");
        assert_eq!(debug.line_at(1), Some(2));
        assert_eq!(
            loaded.debug_info.as_ref().unwrap().files[0].line_map,
            vec![0, 1, 2, 1]
        );
    }

    #[test]
    fn reload_is_byte_identical() {
        let mut symbols = SymbolTable::new();
        let irep = sample(&mut symbols);
        let options = DumpOptions::new(DumpFlags::DEBUG_INFO);
        let bin = dump_irep(&irep, &symbols, &options).unwrap();
        let loaded = load_irep(&bin, &mut symbols).unwrap();
        assert_eq!(dump_irep(&loaded, &symbols, &options).unwrap(), bin);
    }

    #[test]
    fn bad_magic_is_header_error() {
        let mut bin = dump_irep(&Irep::default(), &SymbolTable::new(), &DumpOptions::default()).unwrap();
        bin[0] = b'X';
        assert!(matches!(
            load_irep(&bin, &mut SymbolTable::new()),
            Err(DumpError::InvalidFileHeader)
        ));
    }

    #[test]
    fn truncation_is_read_fault() {
        let mut symbols = SymbolTable::new();
        let irep = sample(&mut symbols);
        let bin = dump_irep(&irep, &symbols, &DumpOptions::default()).unwrap();
        let err = load_irep(&bin[..bin.len() - 20], &mut SymbolTable::new()).unwrap_err();
        assert!(matches!(err, DumpError::ReadFault { .. }));
        assert_eq!(err.status(), -3);
    }

    fn chain(levels: usize) -> Irep {
        let mut irep = Irep {
            nlocals: 1,
            nregs: 1,
            iseq: vec![0x69],
            ..Irep::default()
        };
        for _ in 0..levels {
            irep = Irep {
                nlocals: 1,
                nregs: 1,
                children: vec![irep],
                ..Irep::default()
            };
        }
        irep
    }

    #[test]
    fn nesting_limit() {
        let symbols = SymbolTable::new();
        let options = DumpOptions::default();

        let bin = dump_irep(&chain(MAX_NESTING), &symbols, &options).unwrap();
        let loaded = load_irep(&bin, &mut SymbolTable::new()).unwrap();
        assert_eq!(loaded.count(), MAX_NESTING + 1);

        let bin = dump_irep(&chain(600), &symbols, &options).unwrap();
        let err = load_irep(&bin, &mut SymbolTable::new()).unwrap_err();
        assert!(matches!(err, DumpError::InvalidIrep(msg) if msg.contains("nested too deeply")));
    }

    #[test]
    fn bad_pool_tag_is_invalid_irep() {
        let mut irep = Irep::default();
        irep.pool.push(PoolValue::Int32(1));
        let mut bin = dump_irep(&irep, &SymbolTable::new(), &DumpOptions::default()).unwrap();
        // section header, record header, clen, ilen, plen
        let tag_at = 32 + RECORD_HEADER_SIZE + 6 + 2;
        assert_eq!(bin[tag_at], PoolValue::TT_INT32);
        bin[tag_at] = 9;
        assert!(matches!(
            load_irep(&bin, &mut SymbolTable::new()),
            Err(DumpError::InvalidIrep(_))
        ));
    }
}
