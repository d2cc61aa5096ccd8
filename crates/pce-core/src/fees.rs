//! Meta-transaction fee parameters
//!
//! The fee a relayer charges in base tokens for sponsoring a call:
//!
//! ```text
//! fee = gas * (base_fee + priority_fee) * native_to_pce_rate / SCALE
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::SCALE;
use crate::error::{PceError, Result};
use crate::math::{self, mul_div};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransactionFees {
    /// Gas units charged per meta-transaction
    #[serde(with = "crate::types::amount_serde", default = "default_gas")]
    pub meta_transaction_gas: u128,
    /// Priority fee per gas in native units
    #[serde(with = "crate::types::amount_serde", default)]
    pub meta_transaction_priority_fee: u128,
    /// Base tokens per native unit (SCALE-scaled)
    #[serde(with = "crate::types::amount_serde", default = "default_native_rate")]
    pub native_token_to_pce_token_rate: u128,
}

fn default_gas() -> u128 {
    200_000
}

fn default_native_rate() -> u128 {
    SCALE
}

impl Default for MetaTransactionFees {
    fn default() -> Self {
        Self {
            meta_transaction_gas: default_gas(),
            meta_transaction_priority_fee: 0,
            native_token_to_pce_token_rate: default_native_rate(),
        }
    }
}

impl MetaTransactionFees {
    /// Fee in base tokens for a block with `base_fee`
    pub fn fee(&self, base_fee: u128) -> Result<u128> {
        let per_gas = math::add(base_fee, self.meta_transaction_priority_fee, "gas price")?;
        let native = self
            .meta_transaction_gas
            .checked_mul(per_gas)
            .ok_or(PceError::Overflow("meta transaction fee"))?;
        mul_div(native, self.native_token_to_pce_token_rate, SCALE, "meta transaction fee")
    }
}
