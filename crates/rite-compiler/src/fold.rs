//! Integer constant folding.
//!
//! Folding follows the runtime's integer semantics: division rounds toward
//! negative infinity, the remainder takes the sign of the divisor and shifts
//! saturate at the word width. An operation whose result the runtime would
//! promote to a float or big integer is not folded.

use crate::bytecode::{DecodedInsn, OpCode};
use crate::pool::LiteralPool;

/// Widest shift that can still produce a 64-bit result.
const SHIFT_WIDTH_MAX: i64 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

/// `lhs op rhs`, or `None` when the result must be computed at run time.
pub fn fold_binary(op: FoldOp, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        FoldOp::Add => lhs.checked_add(rhs),
        FoldOp::Sub => lhs.checked_sub(rhs),
        FoldOp::Mul => lhs.checked_mul(rhs),
        FoldOp::Div => floor_div(lhs, rhs),
        FoldOp::Mod => floor_mod(lhs, rhs),
        FoldOp::Shl => shift(lhs, rhs),
        FoldOp::Shr => {
            if rhs == i64::MIN {
                None
            } else {
                shift(lhs, -rhs)
            }
        }
        FoldOp::And => Some(lhs & rhs),
        FoldOp::Or => Some(lhs | rhs),
        FoldOp::Xor => Some(lhs ^ rhs),
    }
}

/// Division rounding toward negative infinity.
pub fn floor_div(lhs: i64, rhs: i64) -> Option<i64> {
    if rhs == 0 || (lhs == i64::MIN && rhs == -1) {
        return None;
    }
    let q = lhs / rhs;
    if lhs % rhs != 0 && ((lhs < 0) != (rhs < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Remainder with the sign of the divisor.
pub fn floor_mod(lhs: i64, rhs: i64) -> Option<i64> {
    if rhs == 0 || (lhs == i64::MIN && rhs == -1) {
        return None;
    }
    let r = lhs % rhs;
    if r != 0 && ((r < 0) != (rhs < 0)) {
        Some(r + rhs)
    } else {
        Some(r)
    }
}

/// Shift left by `width`, or right when `width` is negative.
///
/// Right shifts saturate to 0 or -1; left shifts that would overflow are
/// not folded.
pub fn shift(val: i64, width: i64) -> Option<i64> {
    if width < 0 {
        if width == i64::MIN || -width >= SHIFT_WIDTH_MAX {
            return Some(if val < 0 { -1 } else { 0 });
        }
        return Some(val >> -width);
    }
    if val > 0 {
        if width > SHIFT_WIDTH_MAX || val > (i64::MAX >> width) {
            return None;
        }
        Some(val << width)
    } else if val < 0 {
        if width > SHIFT_WIDTH_MAX || val < (i64::MIN >> width) {
            return None;
        }
        if width == SHIFT_WIDTH_MAX {
            Some(i64::MIN)
        } else {
            Some(val * (1i64 << width))
        }
    } else {
        Some(0)
    }
}

/// Integer loaded by an immediate or pool-literal load instruction.
pub fn int_operand(insn: &DecodedInsn, pool: &LiteralPool) -> Option<i64> {
    match insn.op {
        OpCode::LoadIMinus1 => Some(-1),
        OpCode::LoadI0
        | OpCode::LoadI1
        | OpCode::LoadI2
        | OpCode::LoadI3
        | OpCode::LoadI4
        | OpCode::LoadI5
        | OpCode::LoadI6
        | OpCode::LoadI7 => Some(i64::from(insn.op as u8 - OpCode::LoadI0 as u8)),
        OpCode::LoadI => Some(i64::from(insn.b)),
        OpCode::LoadINeg => Some(-i64::from(insn.b)),
        OpCode::LoadI16 => Some(i64::from(insn.b as i16)),
        OpCode::LoadI32 => Some(i64::from(((insn.b as u32) << 16 | insn.c as u32) as i32)),
        OpCode::LoadL => pool.get(insn.b)?.as_int(),
        _ => None,
    }
}
