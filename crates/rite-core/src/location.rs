//! Source location tracking for diagnostics.

use std::fmt;

/// A 1-based line/column position in a source buffer.
///
/// Columns count bytes, not characters. `Location::default()` (0:0) means
/// "no position".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    #[inline]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Compute the position of byte `offset` by scanning `source`.
    ///
    /// Offsets past the end of the buffer are clamped to its end.
    pub fn from_offset(source: &[u8], offset: usize) -> Self {
        let end = offset.min(source.len());
        let mut line = 1;
        let mut column = 1;
        for &b in &source[..end] {
            if b == b'\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Self { line, column }
    }

    /// Whether this location carries a real position.
    #[inline]
    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_of_buffer() {
        assert_eq!(Location::from_offset(b"abc", 0), Location::new(1, 1));
    }

    #[test]
    fn counts_lines_and_columns() {
        let src = b"a = 1\nb = a + 2\n";
        assert_eq!(Location::from_offset(src, 6), Location::new(2, 1));
        assert_eq!(Location::from_offset(src, 10), Location::new(2, 5));
    }

    #[test]
    fn offset_past_end_is_clamped() {
        assert_eq!(Location::from_offset(b"x\n", 100), Location::new(2, 1));
    }

    #[test]
    fn display_format() {
        assert_eq!(Location::new(3, 14).to_string(), "3:14");
        assert!(!Location::default().is_known());
    }
}
