//! Fixed-point helpers shared by factor, swap and fee math
//!
//! All products go through a 256-bit intermediate so `a * b / c` never
//! overflows before the division; results round down.

use crate::constants::SCALE;
use crate::error::{PceError, Result};
use primitive_types::U256;

/// `floor(a * b / c)` with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, c: u128, context: &'static str) -> Result<u128> {
    if c == 0 {
        return Err(PceError::DivisionByZero(context));
    }
    let result = U256::from(a) * U256::from(b) / U256::from(c);
    if result > U256::from(u128::MAX) {
        return Err(PceError::Overflow(context));
    }
    Ok(result.low_u128())
}

/// Checked addition
pub fn add(a: u128, b: u128, context: &'static str) -> Result<u128> {
    a.checked_add(b).ok_or(PceError::Overflow(context))
}

/// `(numerator / denominator)^exponent` as a SCALE-scaled fixed-point ratio
///
/// Exponentiation by squaring; each intermediate product is floored, so the
/// result never exceeds the exact power.
pub fn ratio_pow(numerator: u128, denominator: u128, exponent: u64) -> Result<u128> {
    let mut base = mul_div(numerator, SCALE, denominator, "ratio_pow")?;
    let mut result = SCALE;
    let mut exp = exponent;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_div(result, base, SCALE, "ratio_pow")?;
        }
        exp >>= 1;
        if exp > 0 {
            base = mul_div(base, base, SCALE, "ratio_pow")?;
        }
        if result == 0 {
            break;
        }
    }
    Ok(result)
}
