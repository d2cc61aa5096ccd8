//! Observable events emitted by successful calls

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, BlockNumber, Timestamp};

/// Event payloads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TokenEvent {
    /// Base token moved (zero `from` = mint, zero `to` = burn)
    Transfer {
        from: Address,
        to: Address,
        value: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: Amount,
    },
    DelegateChanged {
        delegator: Address,
        from_delegate: Address,
        to_delegate: Address,
    },
    DelegateVotesChanged {
        delegate: Address,
        previous_balance: Amount,
        new_balance: Amount,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    TokenCreated {
        token_address: Address,
        creator: Address,
        pce_token_amount: Amount,
        new_token_amount: Amount,
    },
    TokensSwappedToLocalToken {
        from: Address,
        to_token: Address,
        pce_token_amount: Amount,
        target_token_amount: Amount,
        pool_before: Amount,
        pool_after: Amount,
    },
    TokensSwappedFromLocalToken {
        to: Address,
        from_token: Address,
        target_token_amount: Amount,
        pce_token_amount: Amount,
        pool_before: Amount,
        pool_after: Amount,
    },
    FactorDecreased {
        previous: u128,
        current: u128,
        steps: u64,
        last_decrease_time: Timestamp,
    },
    /// Community token moved between holders
    LocalTransfer {
        token: Address,
        from: Address,
        to: Address,
        value: Amount,
    },
}

/// Event tagged with the block it was emitted in
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub block_number: BlockNumber,
    #[serde(flatten)]
    pub event: TokenEvent,
}

/// Append-only event log
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block_number: BlockNumber, event: TokenEvent) {
        self.records.push(EventRecord {
            block_number,
            event,
        });
    }

    pub fn extend(&mut self, block_number: BlockNumber, events: impl IntoIterator<Item = TokenEvent>) {
        for event in events {
            self.push(block_number, event);
        }
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Drain every recorded event
    pub fn take(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
