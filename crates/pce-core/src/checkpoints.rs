//! # Checkpoint Ledger
//!
//! Historical voting power per delegatee plus a global total-supply history.
//!
//! ```text
//! account ──► slot ──► arena[slot] = [ (fromBlock 3, 500) (fromBlock 9, 200) ... ]
//!                                      strictly increasing fromBlock
//! ```
//!
//! Histories live in one arena of growable arrays indexed by a per-account
//! slot; lookups are an index binary search over the slot's array.
//! A second write in the same block overwrites the tail entry instead of
//! appending.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{PceError, Result};
use crate::types::{Address, Amount, BlockNumber};

/// Voting power snapshot effective from `from_block`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub from_block: BlockNumber,
    pub votes: Amount,
}

/// Checkpoint sequence ordered by strictly increasing `from_block`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHistory {
    entries: Vec<Checkpoint>,
}

impl CheckpointHistory {
    /// Value of the newest checkpoint (zero if none)
    pub fn latest(&self) -> Amount {
        self.entries.last().map(|c| c.votes).unwrap_or(0)
    }

    fn latest_block(&self) -> Option<BlockNumber> {
        self.entries.last().map(|c| c.from_block)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<Checkpoint> {
        self.entries.get(pos).copied()
    }

    /// Value of the checkpoint with the largest `from_block <= block`
    pub fn upper_lookup(&self, block: BlockNumber) -> Amount {
        let idx = self.entries.partition_point(|c| c.from_block <= block);
        if idx == 0 {
            0
        } else {
            self.entries[idx - 1].votes
        }
    }

    fn ensure_writable(&self, block: BlockNumber) -> Result<()> {
        match self.latest_block() {
            Some(last) if block < last => Err(PceError::StaleContext {
                block,
                last_seen: last,
            }),
            _ => Ok(()),
        }
    }

    /// Record `votes` at `block`; caller has checked `ensure_writable`
    fn write(&mut self, block: BlockNumber, votes: Amount) {
        match self.entries.last_mut() {
            Some(last) if last.from_block == block => last.votes = votes,
            _ => self.entries.push(Checkpoint {
                from_block: block,
                votes,
            }),
        }
    }
}

/// Voting power change of one delegatee
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteChange {
    pub delegate: Address,
    pub previous: Amount,
    pub new: Amount,
}

/// Result of a delegation change
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationChange {
    pub delegator: Address,
    pub from_delegate: Address,
    pub to_delegate: Address,
    pub vote_changes: Vec<VoteChange>,
}

/// Per-account voting checkpoints and delegation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckpointLedger {
    /// Account -> index into `arena`
    slots: HashMap<Address, usize>,
    arena: Vec<CheckpointHistory>,
    total_supply: CheckpointHistory,
    delegates: HashMap<Address, Address>,
}

impl CheckpointLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current delegatee of `account` (zero address if none)
    pub fn delegates(&self, account: &Address) -> Address {
        self.delegates.get(account).copied().unwrap_or(Address::ZERO)
    }

    /// Current voting power of `account`
    pub fn get_votes(&self, account: &Address) -> Amount {
        self.history(account).map(|h| h.latest()).unwrap_or(0)
    }

    /// Voting power of `account` at a strictly past `block`
    pub fn get_past_votes(
        &self,
        account: &Address,
        block: BlockNumber,
        current_block: BlockNumber,
    ) -> Result<Amount> {
        ensure_past(block, current_block)?;
        Ok(self.history(account).map(|h| h.upper_lookup(block)).unwrap_or(0))
    }

    /// Total supply at a strictly past `block`
    pub fn get_past_total_supply(&self, block: BlockNumber, current_block: BlockNumber) -> Result<Amount> {
        ensure_past(block, current_block)?;
        Ok(self.total_supply.upper_lookup(block))
    }

    pub fn num_checkpoints(&self, account: &Address) -> usize {
        self.history(account).map(|h| h.len()).unwrap_or(0)
    }

    /// Checkpoint at position `pos` of `account`'s history
    pub fn checkpoint(&self, account: &Address, pos: usize) -> Option<Checkpoint> {
        self.history(account).and_then(|h| h.get(pos))
    }

    /// Change `delegator`'s delegatee, carrying `balance` worth of votes
    pub fn delegate(
        &mut self,
        delegator: &Address,
        delegatee: &Address,
        balance: Amount,
        block: BlockNumber,
    ) -> Result<DelegationChange> {
        let from_delegate = self.delegates(delegator);
        let vote_changes = self.move_voting_power(&from_delegate, delegatee, balance, block)?;
        if delegatee.is_zero() {
            self.delegates.remove(delegator);
        } else {
            self.delegates.insert(*delegator, *delegatee);
        }
        debug!(%delegator, %from_delegate, to_delegate = %delegatee, "delegate changed");
        Ok(DelegationChange {
            delegator: *delegator,
            from_delegate,
            to_delegate: *delegatee,
            vote_changes,
        })
    }

    /// Hook for every balance movement of the voting token
    ///
    /// Mints (`from` zero) and burns (`to` zero) also move the total-supply
    /// history.
    pub fn after_transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
        block: BlockNumber,
    ) -> Result<Vec<VoteChange>> {
        if amount == 0 {
            return Ok(Vec::new());
        }
        let supply = if from.is_zero() {
            Some(
                self.total_supply
                    .latest()
                    .checked_add(amount)
                    .ok_or(PceError::Overflow("total supply checkpoint"))?,
            )
        } else if to.is_zero() {
            Some(
                self.total_supply
                    .latest()
                    .checked_sub(amount)
                    .ok_or(PceError::Overflow("total supply checkpoint"))?,
            )
        } else {
            None
        };
        if supply.is_some() {
            self.total_supply.ensure_writable(block)?;
        }

        let from_delegate = self.delegates(from);
        let to_delegate = self.delegates(to);
        let changes = self.move_voting_power(&from_delegate, &to_delegate, amount, block)?;
        if let Some(supply) = supply {
            self.total_supply.write(block, supply);
        }
        Ok(changes)
    }

    /// Move `amount` votes from delegatee `from` to delegatee `to`
    ///
    /// Both sides are computed and checked before either history is
    /// written.
    pub fn move_voting_power(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
        block: BlockNumber,
    ) -> Result<Vec<VoteChange>> {
        if from == to || amount == 0 {
            return Ok(Vec::new());
        }
        let mut changes = Vec::with_capacity(2);
        if !from.is_zero() {
            let previous = self.get_votes(from);
            let new = previous
                .checked_sub(amount)
                .ok_or(PceError::Overflow("voting power underflow"))?;
            if let Some(history) = self.history(from) {
                history.ensure_writable(block)?;
            }
            changes.push(VoteChange {
                delegate: *from,
                previous,
                new,
            });
        }
        if !to.is_zero() {
            let previous = self.get_votes(to);
            let new = previous
                .checked_add(amount)
                .ok_or(PceError::Overflow("voting power"))?;
            if let Some(history) = self.history(to) {
                history.ensure_writable(block)?;
            }
            changes.push(VoteChange {
                delegate: *to,
                previous,
                new,
            });
        }
        for change in &changes {
            self.history_mut(&change.delegate).write(block, change.new);
        }
        Ok(changes)
    }

    fn history(&self, account: &Address) -> Option<&CheckpointHistory> {
        self.slots.get(account).and_then(|&slot| self.arena.get(slot))
    }

    fn history_mut(&mut self, account: &Address) -> &mut CheckpointHistory {
        let next = self.arena.len();
        let slot = *self.slots.entry(*account).or_insert(next);
        if slot == next {
            self.arena.push(CheckpointHistory::default());
        }
        &mut self.arena[slot]
    }
}

fn ensure_past(block: BlockNumber, current_block: BlockNumber) -> Result<()> {
    if block >= current_block {
        return Err(PceError::FutureLookup {
            requested: block,
            current: current_block,
        });
    }
    Ok(())
}
