//! # Token Factory
//!
//! Validates community token parameters and computes everything a new
//! token needs before any state is touched:
//!
//! ```text
//! TokenInfo ──validate──► TokenPlan { address, exchange_rate, initial_supply }
//!                              │
//!            (engine debits creator, registers, mints) ──► CommunityToken
//! ```
//!
//! | Field | Rule |
//! |-------|------|
//! | name, symbol | non-empty |
//! | amount_to_exchange | > 0 |
//! | dilution_factor | > 0, SCALE-scaled |
//! | decrease_interval_days | > 0 |
//! | every `*_bp` | 0..=10000 |
//! | target lists | no zero address, no duplicates |

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::bp;
use crate::community::{CommunityToken, ExchangeAllowMethod, TokenPolicy};
use crate::constants::SCALE;
use crate::error::{PceError, Result};
use crate::ledger::BalanceLedger;
use crate::math::mul_div;
use crate::types::{Address, Amount, BlockContext};

/// Creation parameters for a community token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    /// Base tokens the creator deposits into the new pool
    #[serde(with = "crate::types::amount_serde")]
    pub amount_to_exchange: Amount,
    /// Local units per base unit at creation (SCALE-scaled)
    #[serde(with = "crate::types::amount_serde")]
    pub dilution_factor: u128,
    pub decrease_interval_days: u64,
    pub after_decrease_bp: u16,
    pub max_increase_of_total_supply_bp: u16,
    pub max_increase_bp: u16,
    pub max_usage_bp: u16,
    pub change_bp: u16,
    #[serde(default)]
    pub income_exchange_allow_method: ExchangeAllowMethod,
    #[serde(default)]
    pub outgo_exchange_allow_method: ExchangeAllowMethod,
    #[serde(default)]
    pub income_target_tokens: Vec<Address>,
    #[serde(default)]
    pub outgo_target_tokens: Vec<Address>,
}

impl TokenInfo {
    /// Check every field; nothing is mutated on failure
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PceError::InvalidTokenInfo("name is empty".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(PceError::InvalidTokenInfo("symbol is empty".into()));
        }
        if self.amount_to_exchange == 0 {
            return Err(PceError::ZeroAmount("amount_to_exchange"));
        }
        if self.dilution_factor == 0 {
            return Err(PceError::ZeroAmount("dilution_factor"));
        }
        if self.decrease_interval_days == 0 {
            return Err(PceError::InvalidTokenInfo(
                "decrease_interval_days must be positive".into(),
            ));
        }
        bp::validate("after_decrease_bp", self.after_decrease_bp)?;
        bp::validate(
            "max_increase_of_total_supply_bp",
            self.max_increase_of_total_supply_bp,
        )?;
        bp::validate("max_increase_bp", self.max_increase_bp)?;
        bp::validate("max_usage_bp", self.max_usage_bp)?;
        bp::validate("change_bp", self.change_bp)?;
        validate_targets("income_target_tokens", &self.income_target_tokens)?;
        validate_targets("outgo_target_tokens", &self.outgo_target_tokens)?;
        Ok(())
    }

    pub fn policy(&self) -> TokenPolicy {
        TokenPolicy {
            dilution_factor: self.dilution_factor,
            decrease_interval_days: self.decrease_interval_days,
            after_decrease_bp: self.after_decrease_bp,
            max_increase_of_total_supply_bp: self.max_increase_of_total_supply_bp,
            max_increase_bp: self.max_increase_bp,
            max_usage_bp: self.max_usage_bp,
            change_bp: self.change_bp,
            income_exchange_allow_method: self.income_exchange_allow_method,
            outgo_exchange_allow_method: self.outgo_exchange_allow_method,
            income_target_tokens: self.income_target_tokens.clone(),
            outgo_target_tokens: self.outgo_target_tokens.clone(),
        }
    }
}

fn validate_targets(field: &str, targets: &[Address]) -> Result<()> {
    let mut seen = HashSet::with_capacity(targets.len());
    for target in targets {
        if target.is_zero() {
            return Err(PceError::InvalidTokenInfo(format!("{field} contains the zero address")));
        }
        if !seen.insert(target) {
            return Err(PceError::InvalidTokenInfo(format!("{field} contains {target} twice")));
        }
    }
    Ok(())
}

/// Everything computed for a token before it is created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPlan {
    pub address: Address,
    pub exchange_rate: u128,
    pub deposit: Amount,
    pub initial_supply: Amount,
}

/// Derives addresses and creation parameters for community tokens
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenFactory {
    /// Template address new tokens are derived from
    community_token_address: Address,
    /// Tokens created so far
    nonce: u64,
}

impl TokenFactory {
    pub fn new(community_token_address: Address) -> Self {
        Self {
            community_token_address,
            nonce: 0,
        }
    }

    pub fn community_token_address(&self) -> Address {
        self.community_token_address
    }

    pub fn set_community_token_address(&mut self, address: Address) {
        self.community_token_address = address;
    }

    /// Address the next token created by `creator` will receive
    pub fn next_address(&self, creator: &Address, symbol: &str) -> Address {
        Address::derive(&[
            self.community_token_address.as_bytes(),
            creator.as_bytes(),
            &self.nonce.to_be_bytes(),
            symbol.as_bytes(),
        ])
    }

    /// Validate `info` and compute the new token's parameters
    ///
    /// The stored rate is chosen so the swap rate at creation equals the
    /// dilution factor under the current global factor.
    pub fn plan(
        &self,
        info: &TokenInfo,
        creator: &Address,
        current_factor: u128,
        initial_factor: u128,
    ) -> Result<TokenPlan> {
        info.validate()?;
        if current_factor == 0 {
            return Err(PceError::DivisionByZero("exchange rate at zero factor"));
        }
        let exchange_rate = mul_div(
            info.dilution_factor,
            initial_factor,
            current_factor,
            "exchange rate",
        )?;
        let initial_supply = mul_div(info.amount_to_exchange, info.dilution_factor, SCALE, "initial supply")?;
        if initial_supply == 0 {
            return Err(PceError::ZeroAmount("initial local supply"));
        }
        Ok(TokenPlan {
            address: self.next_address(creator, &info.symbol),
            exchange_rate,
            deposit: info.amount_to_exchange,
            initial_supply,
        })
    }

    /// Build the token record for a plan and advance the nonce
    pub fn instantiate(
        &mut self,
        plan: &TokenPlan,
        info: &TokenInfo,
        ctx: &BlockContext,
    ) -> Result<CommunityToken> {
        let mut ledger = BalanceLedger::new();
        ledger.mint(&ctx.caller, plan.initial_supply)?;
        self.nonce += 1;
        Ok(CommunityToken {
            address: plan.address,
            name: info.name.clone(),
            symbol: info.symbol.clone(),
            creator: ctx.caller,
            created_at: ctx.timestamp,
            created_block: ctx.block_number,
            policy: info.policy(),
            ledger,
        })
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}
