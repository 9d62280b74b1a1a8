//! Nibble arithmetic shared by the register, immediate, and ranged instruction forms.

use crate::plat::NIBBLE_MASK;

/// The ALU's current mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluMode {
    /// Plain 4-bit arithmetic, carry past 15.
    Binary,
    /// BCD digit arithmetic, carry past 9.
    Decimal,
}

/// The result of one digit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOut {
    pub value: u8,
    /// Carry out of an add, borrow out of a subtract.
    pub carry: bool,
    /// Set if the unadjusted result was zero.
    pub zero: bool,
}

/// `a + b + carry`.
pub fn add(a: u8, b: u8, carry: bool, mode: AluMode) -> AluOut {
    let sum = a as i16 + b as i16 + carry as i16;
    let (value, carry) = match mode {
        AluMode::Binary => (sum, sum > 15),
        AluMode::Decimal if sum > 9 => (sum - 10, true),
        AluMode::Decimal => (sum, false),
    };
    AluOut {
        value: (value & NIBBLE_MASK as i16) as u8,
        carry,
        zero: sum == 0,
    }
}

/// `a - b - borrow`. Decimal mode corrects a borrowed digit by 6.
pub fn sub(a: u8, b: u8, borrow: bool, mode: AluMode) -> AluOut {
    let diff = a as i16 - b as i16 - borrow as i16;
    let carry = diff < 0;
    let value = match mode {
        AluMode::Decimal if carry => diff - 6,
        _ => diff,
    };
    AluOut {
        value: (value & NIBBLE_MASK as i16) as u8,
        carry,
        zero: diff == 0,
    }
}

/// Compares `a` against `b + borrow`, returning `(zero, carry)`.
pub fn compare(a: u8, b: u8, borrow: bool) -> (bool, bool) {
    let rhs = b as i16 + borrow as i16;
    let a = a as i16;
    (a == rhs, a < rhs)
}
