//! Literal pool of one unit.
//!
//! Literals are deduplicated: strings by content, integers by numeric value
//! (regardless of which width they are stored in), floats by bit pattern and
//! big integers by base and digits.

use rite_core::CodegenError;
use rustc_hash::FxHashMap;

use crate::irep::{BigIntBlob, PoolValue};

/// Hashable identity of a pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Str(Box<[u8]>),
    Int(i64),
    Float(u64),
    BigInt(BigIntBlob),
}

#[derive(Debug, Default)]
pub struct LiteralPool {
    values: Vec<PoolValue>,
    index: FxHashMap<PoolKey, u16>,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    fn add(&mut self, key: PoolKey, make: impl FnOnce() -> PoolValue) -> Result<u16, CodegenError> {
        if let Some(&idx) = self.index.get(&key) {
            return Ok(idx);
        }
        if self.values.len() >= u16::MAX as usize {
            return Err(CodegenError::TooManyLiterals);
        }
        let idx = self.values.len() as u16;
        self.values.push(make());
        self.index.insert(key, idx);
        Ok(idx)
    }

    pub fn add_str(&mut self, bytes: &[u8]) -> Result<u16, CodegenError> {
        self.add(PoolKey::Str(bytes.into()), || PoolValue::Str(bytes.into()))
    }

    /// Integer entry, stored as `Int32` when it fits.
    pub fn add_int(&mut self, value: i64) -> Result<u16, CodegenError> {
        self.add(PoolKey::Int(value), || PoolValue::int(value))
    }

    pub fn add_float(&mut self, value: f64) -> Result<u16, CodegenError> {
        self.add(PoolKey::Float(value.to_bits()), || PoolValue::Float(value))
    }

    pub fn add_bigint(&mut self, big: BigIntBlob) -> Result<u16, CodegenError> {
        if big.digits.len() > u8::MAX as usize {
            return Err(CodegenError::IntegerTooBig);
        }
        self.add(PoolKey::BigInt(big.clone()), || PoolValue::BigInt(big))
    }

    pub fn get(&self, idx: u16) -> Option<&PoolValue> {
        self.values.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in index order.
    pub fn into_values(self) -> Vec<PoolValue> {
        let mut values = self.values;
        values.shrink_to_fit();
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_deduplicated() {
        let mut pool = LiteralPool::new();
        let a = pool.add_str(b"hello").unwrap();
        let b = pool.add_str(b"world").unwrap();
        let c = pool.add_str(b"hello").unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn integers_compare_by_value() {
        let mut pool = LiteralPool::new();
        let a = pool.add_int(1_000_000).unwrap();
        let b = pool.add_int(1_000_000).unwrap();
        let big = pool.add_int(1 << 40).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.get(a), Some(&PoolValue::Int32(1_000_000)));
        assert_eq!(pool.get(big), Some(&PoolValue::Int64(1 << 40)));
    }

    #[test]
    fn floats_and_strings_do_not_collide() {
        let mut pool = LiteralPool::new();
        let f = pool.add_float(1.0).unwrap();
        let i = pool.add_int(1).unwrap();
        let s = pool.add_str(b"1").unwrap();
        assert_eq!(pool.len(), 3);
        assert!(f != i && i != s);
        assert_eq!(pool.add_float(1.0).unwrap(), f);
    }

    #[test]
    fn floats_compare_by_bits() {
        let mut pool = LiteralPool::new();
        let pos = pool.add_float(0.0).unwrap();
        let neg = pool.add_float(-0.0).unwrap();
        assert_ne!(pos, neg);

        let nan = pool.add_float(f64::NAN).unwrap();
        assert_eq!(pool.add_float(f64::NAN).unwrap(), nan);
        let other_nan = f64::from_bits(f64::NAN.to_bits() ^ 1);
        assert_ne!(pool.add_float(other_nan).unwrap(), nan);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn bigint_digit_limit() {
        let mut pool = LiteralPool::new();
        let big = BigIntBlob {
            base: 10,
            negative: false,
            digits: vec![b'9'; 300].into(),
        };
        assert_eq!(pool.add_bigint(big), Err(CodegenError::IntegerTooBig));
    }

    #[test]
    fn pool_is_full_at_u16_range() {
        let mut pool = LiteralPool::new();
        for i in 0..u16::MAX as i64 {
            pool.add_int(i).unwrap();
        }
        assert_eq!(pool.add_int(-1), Err(CodegenError::TooManyLiterals));
        assert_eq!(pool.add_int(5), Ok(5));
    }
}
