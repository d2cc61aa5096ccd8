//! Ownership gate for admin operations

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PceError, Result};
use crate::types::Address;

/// Authority check consulted by owner-gated operations
pub trait AccessControl {
    /// Current owner (zero address once renounced)
    fn owner(&self) -> Address;

    /// Fail with an authorization error unless `caller` is the owner
    fn ensure_owner(&self, caller: &Address) -> Result<()> {
        let owner = self.owner();
        if owner.is_zero() || owner != *caller {
            return Err(PceError::NotOwner(*caller));
        }
        Ok(())
    }
}

/// Single-owner access control
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ownable {
    owner: Address,
}

impl Ownable {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    /// Hand ownership to `new_owner`; returns the previous owner
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<Address> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(PceError::ZeroAddress("new owner"));
        }
        let previous = std::mem::replace(&mut self.owner, new_owner);
        info!(%previous, %new_owner, "ownership transferred");
        Ok(previous)
    }

    /// Give up ownership for good; returns the previous owner
    pub fn renounce_ownership(&mut self, caller: &Address) -> Result<Address> {
        self.ensure_owner(caller)?;
        let previous = std::mem::replace(&mut self.owner, Address::ZERO);
        info!(%previous, "ownership renounced");
        Ok(previous)
    }
}

impl AccessControl for Ownable {
    fn owner(&self) -> Address {
        self.owner
    }
}
