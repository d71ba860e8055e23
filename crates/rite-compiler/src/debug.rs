//! Per-unit debug info: which file and line each instruction came from.
//!
//! A unit's instruction range is split into file segments. Each segment
//! stores a packed line map: a sequence of `(pc delta, line delta)` varint
//! pairs, emitted only where the line changes. Deltas are taken from pc 0
//! and line 0, so the map of a later segment starts with its absolute start
//! address.

use rite_core::Sym;

/// Line map encoding tag for [`DebugFile::line_map`].
pub const LINE_TYPE_PACKED_MAP: u8 = 2;

/// Line map of one contiguous instruction range from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugFile {
    pub start_pos: u32,
    pub filename: Sym,
    pub line_map: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    /// One past the last covered instruction address.
    pub pc_count: u32,
    /// Segments ordered by `start_pos`.
    pub files: Vec<DebugFile>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `[start, end)` was generated from `filename`.
    ///
    /// `lines` holds one line number per instruction byte of the whole unit.
    /// An empty range records nothing. A range continuing the previous
    /// segment's file is merged into that segment.
    pub fn append_file(&mut self, filename: Sym, lines: &[u16], start: u32, end: u32) {
        if start >= end {
            return;
        }
        let mut start = start;
        if self.files.last().is_some_and(|f| f.filename == filename) {
            if let Some(prev) = self.files.pop() {
                start = prev.start_pos;
            }
        }

        let mut line_map = Vec::new();
        let mut prev_line: u32 = 0;
        let mut prev_pc: u32 = 0;
        for pc in start..end {
            let Some(&line) = lines.get(pc as usize) else {
                break;
            };
            let line = u32::from(line);
            if line == prev_line {
                continue;
            }
            encode_varint(pc - prev_pc, &mut line_map);
            encode_varint(line.wrapping_sub(prev_line), &mut line_map);
            prev_pc = pc;
            prev_line = line;
        }

        self.files.push(DebugFile {
            start_pos: start,
            filename,
            line_map,
        });
        self.pc_count = end;
    }

    fn file_at(&self, pc: u32) -> Option<&DebugFile> {
        if pc >= self.pc_count {
            return None;
        }
        // last segment starting at or before pc
        let idx = self.files.partition_point(|f| f.start_pos <= pc);
        idx.checked_sub(1).map(|i| &self.files[i])
    }

    /// Source file of the instruction at `pc`.
    pub fn filename_at(&self, pc: u32) -> Option<Sym> {
        self.file_at(pc).map(|f| f.filename)
    }

    /// Source line of the instruction at `pc`.
    pub fn line_at(&self, pc: u32) -> Option<u32> {
        let file = self.file_at(pc)?;
        let map = &file.line_map;
        let mut cursor = 0;
        let mut pos: u32 = 0;
        let mut line: u32 = 0;
        while cursor < map.len() {
            pos = pos.wrapping_add(decode_varint(map, &mut cursor)?);
            let delta = decode_varint(map, &mut cursor)?;
            if pc < pos {
                break;
            }
            line = line.wrapping_add(delta);
        }
        Some(line)
    }
}

/// Append `n` as little-endian base-128 groups.
pub fn encode_varint(mut n: u32, out: &mut Vec<u8>) {
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if n == 0 {
            break;
        }
    }
}

/// Encoded size of `n`.
pub fn varint_len(n: u32) -> usize {
    let bits = 32 - n.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Read one varint at `*pos`, advancing it. `None` on truncation or overflow.
pub fn decode_varint(bytes: &[u8], pos: &mut usize) -> Option<u32> {
    let mut value: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        if shift >= 32 {
            return None;
        }
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
    }
}
