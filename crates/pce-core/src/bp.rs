//! Basis-point validation and bound enforcement
//!
//! Every basis-point check in the engine goes through this module so token
//! creation and swaps round identically.

use crate::constants::BP_BASE;
use crate::error::{PceError, Result};
use crate::math::mul_div;

/// Reject a basis-point value above 10000
pub fn validate(field: &'static str, value: u16) -> Result<()> {
    if u128::from(value) > BP_BASE {
        return Err(PceError::BasisPointsOutOfRange { field, value });
    }
    Ok(())
}

/// `floor(reference * bp / 10000)`
pub fn portion(reference: u128, bp: u16) -> Result<u128> {
    mul_div(reference, u128::from(bp), BP_BASE, "basis point portion")
}

/// Reject `delta` if it exceeds `bp` basis points of `reference`
pub fn ensure_within(bound: &'static str, delta: u128, reference: u128, bp: u16) -> Result<()> {
    validate(bound, bp)?;
    let limit = portion(reference, bp)?;
    if delta > limit {
        return Err(PceError::BoundExceeded {
            bound,
            delta,
            limit,
        });
    }
    Ok(())
}
