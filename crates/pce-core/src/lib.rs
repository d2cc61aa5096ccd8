//! # PCE Core - Decaying Exchange Factor, Vote Checkpoints & Community Pools
//!
//! Engine behind the PEACE COIN base token and the community ("local")
//! tokens exchanged against it.
//!
//! ## Components
//!
//! - **FactorClock** (`clock`): Wednesday-boundary calendar predicates
//! - **FactorEngine** (`factor`): the global factor, decayed lazily per interval
//! - **LocalTokenRegistry** (`registry`): per-token stored rate and base pool
//! - **SwapEngine** (`swap`): bounded conversions in both directions
//! - **CheckpointLedger** (`checkpoints`): historical voting power and delegation
//! - **TokenFactory** (`factory`): validated creation of community tokens
//! - **PceToken** (`token`): the facade running every call against a [`BlockContext`]
//!
//! ## Rates
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  factor(t)      = INITIAL_FACTOR * (rate / base)^boundaries(t)  │
//! │  exchange_rate  = dilution * INITIAL_FACTOR / factor(created)   │
//! │  swap_rate(t)   = exchange_rate * factor(t) / INITIAL_FACTOR    │
//! │                                                                 │
//! │  base -> local:  y = x * swap_rate / SCALE                      │
//! │  local -> base:  x = y * SCALE / swap_rate                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A swap made at creation time converts at exactly the dilution factor; as
//! the global factor decays, a base unit buys fewer local units.

pub mod access;
pub mod bp;
pub mod checkpoints;
pub mod clock;
pub mod community;
pub mod config;
pub mod error;
pub mod events;
pub mod factor;
pub mod factory;
pub mod fees;
pub mod ledger;
pub mod math;
pub mod registry;
pub mod shared;
pub mod signature;
pub mod swap;
pub mod token;
pub mod types;

// Re-exports
pub use access::{AccessControl, Ownable};
pub use checkpoints::{Checkpoint, CheckpointLedger};
pub use community::{CommunityToken, ExchangeAllowMethod, TokenPolicy};
pub use config::EngineConfig;
pub use error::{ErrorCategory, PceError, Result};
pub use events::{EventRecord, TokenEvent};
pub use factor::{Compounding, FactorEngine, FactorSchedule, FactorState, FactorUpdate};
pub use factory::{TokenFactory, TokenInfo};
pub use fees::MetaTransactionFees;
pub use ledger::BalanceLedger;
pub use registry::{LocalToken, LocalTokenRegistry};
pub use shared::SharedPceToken;
pub use signature::{RejectingVerifier, Signature, SignatureVerifier, SignedPayload};
pub use swap::{SwapDirection, SwapQuote};
pub use token::PceToken;
pub use types::{Address, Amount, BlockContext, BlockNumber, Timestamp};

/// PCE token constants
pub mod constants {
    /// Fixed-point scale of factors and rates
    pub const SCALE: u128 = 1_000_000_000_000_000_000; // 10^18

    /// Factor at genesis
    pub const INITIAL_FACTOR: u128 = SCALE;

    /// Default per-interval decay numerator
    pub const DECREASE_RATE: u128 = 9_876;

    /// Default per-interval decay denominator
    pub const DECREASE_RATE_BASE: u128 = 10_000;

    /// Default decay interval: one week
    pub const DEFAULT_INTERVAL_DAYS: u64 = 7;

    /// Basis points in a whole
    pub const BP_BASE: u128 = 10_000;

    pub const DECIMALS: u8 = 18;

    /// Version string bound into signature domains
    pub const VERSION: &str = "1";

    pub const SECONDS_PER_MINUTE: u64 = 60;

    pub const SECONDS_PER_DAY: u64 = 24 * 3600;
}

pub use constants::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::error::{PceError, Result};
    pub use crate::factory::TokenInfo;
    pub use crate::signature::{Signature, SignatureVerifier};
    pub use crate::token::PceToken;
    pub use crate::types::*;
}
