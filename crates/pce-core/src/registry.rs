//! # Local Token Registry
//!
//! Registered community tokens with their stored exchange rate and the pool
//! of base tokens deposited against them. Entries are permanent once
//! registered and keep their registration order.
//!
//! The stored `exchange_rate` is independent of the global factor; the
//! usable swap rate combines the two at query time:
//!
//! ```text
//! swap_rate = exchange_rate * current_factor / INITIAL_FACTOR
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{PceError, Result};
use crate::math::{self, mul_div};
use crate::types::{Address, Amount};

/// Registry record of one community token
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalToken {
    pub is_exists: bool,
    /// Stored rate, SCALE-scaled local units per base unit at INITIAL_FACTOR
    pub exchange_rate: u128,
    /// Base tokens currently backing this token
    pub deposited_pce_token: Amount,
}

/// Pool balance before and after a swap
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolChange {
    pub before: Amount,
    pub after: Amount,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalTokenRegistry {
    tokens: IndexMap<Address, LocalToken>,
}

impl LocalTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry record; unknown addresses yield an empty record
    pub fn get_local_token(&self, token: &Address) -> LocalToken {
        self.tokens.get(token).copied().unwrap_or_default()
    }

    pub fn is_community_token(&self, token: &Address) -> bool {
        self.tokens.contains_key(token)
    }

    /// Fail with a membership error unless `token` is registered
    pub fn ensure_registered(&self, token: &Address) -> Result<LocalToken> {
        self.tokens
            .get(token)
            .copied()
            .ok_or(PceError::NotCommunityToken(*token))
    }

    /// Register a new token with its initial pool deposit
    pub fn register(&mut self, token: Address, exchange_rate: u128, deposit: Amount) -> Result<()> {
        if self.tokens.contains_key(&token) {
            return Err(PceError::AlreadyRegistered(token));
        }
        self.tokens.insert(
            token,
            LocalToken {
                is_exists: true,
                exchange_rate,
                deposited_pce_token: deposit,
            },
        );
        Ok(())
    }

    /// Registered token addresses in registration order
    pub fn get_tokens(&self) -> Vec<Address> {
        self.tokens.keys().copied().collect()
    }

    /// Token registered at position `index`
    pub fn token_at(&self, index: usize) -> Result<Address> {
        self.tokens
            .get_index(index)
            .map(|(addr, _)| *addr)
            .ok_or(PceError::TokenIndexOutOfRange {
                index,
                len: self.tokens.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Base tokens deposited against `token` (zero if unknown)
    pub fn get_deposited_pce_tokens(&self, token: &Address) -> Amount {
        self.get_local_token(token).deposited_pce_token
    }

    /// Stored exchange rate of a registered token
    pub fn get_exchange_rate(&self, token: &Address) -> Result<u128> {
        Ok(self.ensure_registered(token)?.exchange_rate)
    }

    /// Effective swap rate under the given global factor
    pub fn get_swap_rate(&self, token: &Address, current_factor: u128, initial_factor: u128) -> Result<u128> {
        let record = self.ensure_registered(token)?;
        mul_div(record.exchange_rate, current_factor, initial_factor, "swap rate")
    }

    /// Add base tokens to a pool
    pub fn deposit(&mut self, token: &Address, amount: Amount) -> Result<PoolChange> {
        let record = self
            .tokens
            .get_mut(token)
            .ok_or(PceError::NotCommunityToken(*token))?;
        let before = record.deposited_pce_token;
        let after = math::add(before, amount, "pool deposit")?;
        record.deposited_pce_token = after;
        Ok(PoolChange { before, after })
    }

    /// Remove base tokens from a pool; never drives it negative
    pub fn withdraw(&mut self, token: &Address, amount: Amount) -> Result<PoolChange> {
        let record = self
            .tokens
            .get_mut(token)
            .ok_or(PceError::NotCommunityToken(*token))?;
        let before = record.deposited_pce_token;
        let after = before
            .checked_sub(amount)
            .ok_or(PceError::InsufficientLiquidity {
                requested: amount,
                available: before,
            })?;
        record.deposited_pce_token = after;
        Ok(PoolChange { before, after })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{INITIAL_FACTOR, SCALE};

    fn addr(id: u8) -> Address {
        Address::new([id; 20])
    }

    #[test]
    fn test_unknown_token_is_empty_record() {
        let registry = LocalTokenRegistry::new();
        let record = registry.get_local_token(&addr(1));
        assert!(!record.is_exists);
        assert_eq!(record.exchange_rate, 0);
        assert_eq!(record.deposited_pce_token, 0);
        assert!(matches!(
            registry.get_exchange_rate(&addr(1)),
            Err(PceError::NotCommunityToken(_))
        ));
    }

    #[test]
    fn test_register_once() {
        let mut registry = LocalTokenRegistry::new();
        registry.register(addr(1), SCALE, 1000).unwrap();
        assert!(registry.is_community_token(&addr(1)));
        assert_eq!(registry.get_deposited_pce_tokens(&addr(1)), 1000);
        assert_eq!(
            registry.register(addr(1), SCALE, 5),
            Err(PceError::AlreadyRegistered(addr(1)))
        );
        assert_eq!(registry.get_deposited_pce_tokens(&addr(1)), 1000);
    }

    #[test]
    fn test_registration_order() {
        let mut registry = LocalTokenRegistry::new();
        registry.register(addr(3), SCALE, 1).unwrap();
        registry.register(addr(1), SCALE, 1).unwrap();
        assert_eq!(registry.get_tokens(), vec![addr(3), addr(1)]);
        assert_eq!(registry.token_at(1).unwrap(), addr(1));
        assert!(registry.token_at(2).is_err());
    }

    #[test]
    fn test_swap_rate_follows_factor() {
        let mut registry = LocalTokenRegistry::new();
        registry.register(addr(1), 2 * SCALE, 1).unwrap();
        assert_eq!(
            registry.get_swap_rate(&addr(1), INITIAL_FACTOR, INITIAL_FACTOR).unwrap(),
            2 * SCALE
        );
        assert_eq!(
            registry.get_swap_rate(&addr(1), INITIAL_FACTOR / 2, INITIAL_FACTOR).unwrap(),
            SCALE
        );
    }

    #[test]
    fn test_withdraw_never_negative() {
        let mut registry = LocalTokenRegistry::new();
        registry.register(addr(1), SCALE, 1000).unwrap();
        assert_eq!(
            registry.withdraw(&addr(1), 2000),
            Err(PceError::InsufficientLiquidity {
                requested: 2000,
                available: 1000
            })
        );
        assert_eq!(registry.get_deposited_pce_tokens(&addr(1)), 1000);

        let change = registry.withdraw(&addr(1), 1000).unwrap();
        assert_eq!(change, PoolChange { before: 1000, after: 0 });
    }
}
