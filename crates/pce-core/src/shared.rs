//! Thread-safe handle to a token engine
//!
//! Mutating calls hold the write lock for their whole duration, which gives
//! every caller the same single serialization order. Views take the read
//! lock and may run concurrently.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

use crate::error::Result;
use crate::events::EventRecord;
use crate::factory::TokenInfo;
use crate::swap::SwapQuote;
use crate::token::PceToken;
use crate::types::{Address, Amount, BlockContext, BlockNumber};

/// Cloneable, shared engine handle
#[derive(Clone, Debug)]
pub struct SharedPceToken {
    inner: Arc<RwLock<PceToken>>,
}

impl SharedPceToken {
    pub fn new(token: PceToken) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    /// Read access for views not mirrored on the handle
    pub fn read(&self) -> RwLockReadGuard<'_, PceToken> {
        self.inner.read()
    }

    /// Exclusive access for a sequence of calls that must not interleave
    pub fn write(&self) -> RwLockWriteGuard<'_, PceToken> {
        self.inner.write()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.inner.read().balance_of(account)
    }

    pub fn get_current_factor(&self, ctx: &BlockContext) -> Result<u128> {
        self.inner.read().get_current_factor(ctx)
    }

    pub fn get_past_votes(&self, ctx: &BlockContext, account: &Address, block: BlockNumber) -> Result<Amount> {
        self.inner.read().get_past_votes(ctx, account, block)
    }

    pub fn get_deposited_pce_tokens(&self, token: &Address) -> Amount {
        self.inner.read().get_deposited_pce_tokens(token)
    }

    pub fn transfer(&self, ctx: &BlockContext, to: Address, amount: Amount) -> Result<()> {
        self.inner.write().transfer(ctx, to, amount)
    }

    pub fn delegate(&self, ctx: &BlockContext, delegatee: Address) -> Result<()> {
        self.inner.write().delegate(ctx, delegatee)
    }

    pub fn update_factor_if_needed(&self, ctx: &BlockContext) -> Result<u128> {
        self.inner.write().update_factor_if_needed(ctx)
    }

    pub fn create_token(&self, ctx: &BlockContext, info: TokenInfo) -> Result<Address> {
        self.inner.write().create_token(ctx, info)
    }

    pub fn swap_to_local_token(&self, ctx: &BlockContext, token: Address, amount: Amount) -> Result<SwapQuote> {
        self.inner.write().swap_to_local_token(ctx, token, amount)
    }

    pub fn swap_from_local_token(&self, ctx: &BlockContext, token: Address, amount: Amount) -> Result<SwapQuote> {
        self.inner.write().swap_from_local_token(ctx, token, amount)
    }

    pub fn take_events(&self) -> Vec<EventRecord> {
        self.inner.write().take_events()
    }
}
