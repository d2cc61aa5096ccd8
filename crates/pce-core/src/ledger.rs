//! # Balance Ledger
//!
//! Fungible balances, allowances and total supply for one token. Used for
//! the base token and for every community token the factory instantiates.
//!
//! Every operation checks its preconditions before touching state, so a
//! returned error always leaves the ledger unchanged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{PceError, Result};
use crate::types::{Address, Amount};

/// Ledger of a single fungible token
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BalanceLedger {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<Address, HashMap<Address, Amount>>,
    total_supply: Amount,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an account (zero if unknown)
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Remaining amount `spender` may move on behalf of `owner`
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Fail unless `account` holds at least `amount`
    pub fn ensure_balance(&self, account: &Address, amount: Amount) -> Result<()> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(PceError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Fail unless `spender` may move `amount` for `owner`
    pub fn ensure_allowance(&self, owner: &Address, spender: &Address, amount: Amount) -> Result<()> {
        let available = self.allowance(owner, spender);
        if available < amount {
            return Err(PceError::InsufficientAllowance {
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Create `amount` new units for `to`
    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<()> {
        if to.is_zero() {
            return Err(PceError::ZeroAddress("mint receiver"));
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(PceError::Overflow("total supply"))?;
        // balance <= total supply, so this cannot overflow once supply did not
        self.total_supply = supply;
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    /// Destroy `amount` units held by `from`
    pub fn burn(&mut self, from: &Address, amount: Amount) -> Result<()> {
        if from.is_zero() {
            return Err(PceError::ZeroAddress("burn source"));
        }
        self.ensure_balance(from, amount)?;
        self.debit(from, amount);
        self.total_supply -= amount;
        Ok(())
    }

    /// Move `amount` from `from` to `to`
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        if from.is_zero() {
            return Err(PceError::ZeroAddress("transfer sender"));
        }
        if to.is_zero() {
            return Err(PceError::ZeroAddress("transfer receiver"));
        }
        self.ensure_balance(from, amount)?;
        self.debit(from, amount);
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    /// Set the allowance of `spender` over `owner`'s balance
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) -> Result<()> {
        if owner.is_zero() {
            return Err(PceError::ZeroAddress("approve owner"));
        }
        if spender.is_zero() {
            return Err(PceError::ZeroAddress("approve spender"));
        }
        self.allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
        Ok(())
    }

    /// Consume allowance; an unlimited (`u128::MAX`) allowance is never reduced
    pub fn spend_allowance(&mut self, owner: &Address, spender: &Address, amount: Amount) -> Result<()> {
        let current = self.allowance(owner, spender);
        if current == Amount::MAX {
            return Ok(());
        }
        self.ensure_allowance(owner, spender, amount)?;
        self.approve(owner, spender, current - amount)
    }

    /// Raise the allowance by `added`; returns the new allowance
    pub fn increase_allowance(&mut self, owner: &Address, spender: &Address, added: Amount) -> Result<Amount> {
        let updated = self
            .allowance(owner, spender)
            .checked_add(added)
            .ok_or(PceError::Overflow("allowance"))?;
        self.approve(owner, spender, updated)?;
        Ok(updated)
    }

    /// Lower the allowance by `subtracted`; returns the new allowance
    pub fn decrease_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        subtracted: Amount,
    ) -> Result<Amount> {
        let updated = self
            .allowance(owner, spender)
            .checked_sub(subtracted)
            .ok_or(PceError::AllowanceUnderflow)?;
        self.approve(owner, spender, updated)?;
        Ok(updated)
    }

    fn debit(&mut self, account: &Address, amount: Amount) {
        if let Some(balance) = self.balances.get_mut(account) {
            *balance -= amount;
            if *balance == 0 {
                self.balances.remove(account);
            }
        }
    }
}
