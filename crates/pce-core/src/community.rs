//! Community (local) token records
//!
//! Each registered local token carries its own balance ledger and the
//! policy fixed at creation.

use serde::{Deserialize, Serialize};

use crate::ledger::BalanceLedger;
use crate::types::{Address, Amount, BlockNumber, Timestamp};

/// Exchange permission applied to a list of target tokens
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeAllowMethod {
    /// No token is allowed
    #[default]
    None,
    /// Only listed tokens are allowed
    Include,
    /// Every token except the listed ones is allowed
    Exclude,
    /// Every token is allowed
    All,
}

impl ExchangeAllowMethod {
    /// Whether `token` passes this method against `targets`
    pub fn allows(&self, targets: &[Address], token: &Address) -> bool {
        match self {
            Self::None => false,
            Self::Include => targets.contains(token),
            Self::Exclude => !targets.contains(token),
            Self::All => true,
        }
    }

    /// Numeric form used on the contract surface
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Include => 1,
            Self::Exclude => 2,
            Self::All => 3,
        }
    }
}

/// Parameters fixed at token creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPolicy {
    /// Local units per base unit at creation (SCALE-scaled)
    pub dilution_factor: u128,
    pub decrease_interval_days: u64,
    pub after_decrease_bp: u16,
    /// Cap on local units minted by one swap, in bp of local supply
    pub max_increase_of_total_supply_bp: u16,
    /// Cap on base units deposited by one swap, in bp of the pool
    pub max_increase_bp: u16,
    /// Cap on base units withdrawn by one swap, in bp of the pool
    pub max_usage_bp: u16,
    pub change_bp: u16,
    pub income_exchange_allow_method: ExchangeAllowMethod,
    pub outgo_exchange_allow_method: ExchangeAllowMethod,
    pub income_target_tokens: Vec<Address>,
    pub outgo_target_tokens: Vec<Address>,
}

impl TokenPolicy {
    /// May this token receive value exchanged out of `from`?
    pub fn allows_income_from(&self, from: &Address) -> bool {
        self.income_exchange_allow_method
            .allows(&self.income_target_tokens, from)
    }

    /// May this token be exchanged into `to`?
    pub fn allows_outgo_to(&self, to: &Address) -> bool {
        self.outgo_exchange_allow_method
            .allows(&self.outgo_target_tokens, to)
    }
}

/// A community token instantiated by the factory
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommunityToken {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub creator: Address,
    pub created_at: Timestamp,
    pub created_block: BlockNumber,
    pub policy: TokenPolicy,
    pub ledger: BalanceLedger,
}

impl CommunityToken {
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.ledger.balance_of(account)
    }

    pub fn total_supply(&self) -> Amount {
        self.ledger.total_supply()
    }
}
