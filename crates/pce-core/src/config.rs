//! Engine configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file yields a
//! working engine:
//!
//! ```toml
//! [token]
//! name = "PEACE COIN"
//! symbol = "PCE"
//!
//! [factor]
//! decrease_rate = 9876
//! decrease_rate_base = 10000
//! interval_days = 7
//! compounding = "discrete"
//!
//! [faucet]
//! amount = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PceError, Result};
use crate::factor::FactorSchedule;
use crate::fees::MetaTransactionFees;
use crate::types::{Address, Amount};

/// Top-level engine configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub token: TokenSettings,
    #[serde(default)]
    pub factor: FactorSchedule,
    #[serde(default)]
    pub fees: MetaTransactionFees,
    #[serde(default)]
    pub faucet: FaucetSettings,
}

/// Identity of the base token deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSettings {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Address holding the swap pools
    #[serde(default = "default_contract_address")]
    pub contract_address: Address,
    /// Template local token addresses are derived from
    #[serde(default = "default_community_token_address")]
    pub community_token_address: Address,
}

fn default_name() -> String {
    "PEACE COIN".to_string()
}

fn default_symbol() -> String {
    "PCE".to_string()
}

fn default_chain_id() -> u64 {
    1
}

fn default_contract_address() -> Address {
    Address::derive(&[b"pce-token"])
}

fn default_community_token_address() -> Address {
    Address::derive(&[b"pce-community-token"])
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            symbol: default_symbol(),
            chain_id: default_chain_id(),
            contract_address: default_contract_address(),
            community_token_address: default_community_token_address(),
        }
    }
}

/// Faucet payout per call; 0 disables the faucet
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetSettings {
    #[serde(with = "crate::types::amount_serde", default)]
    pub amount: Amount,
}

impl EngineConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| PceError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PceError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PceError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.name.trim().is_empty() {
            return Err(PceError::InvalidConfig("token.name is empty".into()));
        }
        if self.token.symbol.trim().is_empty() {
            return Err(PceError::InvalidConfig("token.symbol is empty".into()));
        }
        if self.token.contract_address.is_zero() {
            return Err(PceError::InvalidConfig(
                "token.contract_address is the zero address".into(),
            ));
        }
        self.factor.validate()
    }
}
