//! # Swap Engine
//!
//! Quotes conversions between the base token and a registered community
//! token. A quote performs every check (membership, amounts, liquidity,
//! basis-point bounds) against the state before the swap, so the engine can
//! apply it without any further failure point.
//!
//! ```text
//! to local:    y = floor(x * swap_rate / SCALE)     pool += x
//! from local:  x = floor(y * SCALE / swap_rate)     pool -= x
//! ```
//!
//! Both directions round down, so a round trip at an unchanged factor never
//! returns more base units than went in.

use serde::{Deserialize, Serialize};

use crate::bp;
use crate::community::CommunityToken;
use crate::constants::SCALE;
use crate::error::{PceError, Result};
use crate::math::{self, mul_div};
use crate::registry::LocalTokenRegistry;
use crate::types::{Address, Amount};

/// Direction of a swap
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    ToLocal,
    FromLocal,
}

/// Fully checked swap ready to be applied
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub direction: SwapDirection,
    pub token: Address,
    /// Base units moved
    pub pce_token_amount: Amount,
    /// Local units moved
    pub target_token_amount: Amount,
    pub swap_rate: u128,
    pub pool_before: Amount,
    pub pool_after: Amount,
}

/// Quote swapping `amount` base units into `community`
pub fn quote_to_local(
    registry: &LocalTokenRegistry,
    community: &CommunityToken,
    amount: Amount,
    current_factor: u128,
    initial_factor: u128,
) -> Result<SwapQuote> {
    if amount == 0 {
        return Err(PceError::ZeroAmount("amount_to_swap"));
    }
    let token = community.address;
    let record = registry.ensure_registered(&token)?;
    let swap_rate = registry.get_swap_rate(&token, current_factor, initial_factor)?;
    let target = mul_div(amount, swap_rate, SCALE, "swap to local")?;
    if target == 0 {
        return Err(PceError::ZeroAmount("target_token_amount"));
    }

    let pool_before = record.deposited_pce_token;
    bp::ensure_within(
        "max_increase_bp",
        amount,
        pool_before,
        community.policy.max_increase_bp,
    )?;
    bp::ensure_within(
        "max_increase_of_total_supply_bp",
        target,
        community.total_supply(),
        community.policy.max_increase_of_total_supply_bp,
    )?;
    let pool_after = math::add(pool_before, amount, "pool deposit")?;

    Ok(SwapQuote {
        direction: SwapDirection::ToLocal,
        token,
        pce_token_amount: amount,
        target_token_amount: target,
        swap_rate,
        pool_before,
        pool_after,
    })
}

/// Quote swapping `amount` local units held by `holder` back to base units
pub fn quote_from_local(
    registry: &LocalTokenRegistry,
    community: &CommunityToken,
    holder: &Address,
    amount: Amount,
    current_factor: u128,
    initial_factor: u128,
) -> Result<SwapQuote> {
    if amount == 0 {
        return Err(PceError::ZeroAmount("amount_to_swap"));
    }
    let token = community.address;
    let record = registry.ensure_registered(&token)?;
    let swap_rate = registry.get_swap_rate(&token, current_factor, initial_factor)?;
    let base = mul_div(amount, SCALE, swap_rate, "swap from local")?;
    if base == 0 {
        return Err(PceError::ZeroAmount("pce_token_amount"));
    }

    let pool_before = record.deposited_pce_token;
    if base > pool_before {
        return Err(PceError::InsufficientLiquidity {
            requested: base,
            available: pool_before,
        });
    }
    bp::ensure_within(
        "max_usage_bp",
        base,
        pool_before,
        community.policy.max_usage_bp,
    )?;
    community.ledger.ensure_balance(holder, amount)?;

    Ok(SwapQuote {
        direction: SwapDirection::FromLocal,
        token,
        pce_token_amount: base,
        target_token_amount: amount,
        swap_rate,
        pool_before,
        pool_after: pool_before - base,
    })
}
