//! Error types for PCE token engine operations

use crate::types::Address;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, PceError>;

/// Coarse classification of a rejected call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed input or configuration
    Validation,
    /// Pool balance or swap bound exceeded
    Liquidity,
    /// Operation on an unregistered local token
    Membership,
    /// Caller lacks the required authority
    Authorization,
    /// Non-historical lookup or stale block context
    Temporal,
    /// Insufficient balance or allowance
    Funds,
    /// Result does not fit the amount type
    Arithmetic,
}

/// Errors that can occur in PCE token engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PceError {
    // === Validation ===
    /// Basis-point value outside [0, 10000]
    #[error("Basis points out of range for {field}: {value}")]
    BasisPointsOutOfRange { field: &'static str, value: u16 },

    /// Amount must be greater than zero
    #[error("Amount must be greater than zero: {0}")]
    ZeroAmount(&'static str),

    /// Zero address where a real account is required
    #[error("Zero address not allowed for {0}")]
    ZeroAddress(&'static str),

    /// Invalid token parameters
    #[error("Invalid token info: {0}")]
    InvalidTokenInfo(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Faucet is switched off
    #[error("Faucet is disabled")]
    FaucetDisabled,

    // === Liquidity ===
    /// Pool holds fewer base tokens than requested
    #[error("Insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: u128, available: u128 },

    /// Swap delta exceeds a configured basis-point bound
    #[error("{bound} exceeded: delta {delta}, limit {limit}")]
    BoundExceeded {
        bound: &'static str,
        delta: u128,
        limit: u128,
    },

    // === Membership ===
    /// Local token is not registered
    #[error("Not a community token: {0}")]
    NotCommunityToken(Address),

    /// Local token address already registered
    #[error("Community token already registered: {0}")]
    AlreadyRegistered(Address),

    /// Registry index out of bounds
    #[error("Token index out of range: {index} (registered {len})")]
    TokenIndexOutOfRange { index: usize, len: usize },

    // === Authorization ===
    /// Caller is not the owner
    #[error("Caller is not the owner: {0}")]
    NotOwner(Address),

    /// Account that cannot issue calls, such as the pool holder
    #[error("Invalid caller: {0}")]
    InvalidCaller(Address),

    /// Recovered signer does not match the expected account
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed nonce does not match the signer's current nonce
    #[error("Invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    // === Temporal ===
    /// Lookup block is not strictly in the past
    #[error("Block {requested} not yet mined (current {current})")]
    FutureLookup { requested: u64, current: u64 },

    /// Signature deadline or expiry has passed
    #[error("Signature expired at {deadline} (now {now})")]
    SignatureExpired { deadline: u64, now: u64 },

    /// Block context older than the last seen one
    #[error("Stale block context: block {block}, last seen {last_seen}")]
    StaleContext { block: u64, last_seen: u64 },

    // === Funds ===
    /// Account balance too low
    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u128, available: u128 },

    /// Spender allowance too low
    #[error("Insufficient allowance: need {required}, have {available}")]
    InsufficientAllowance { required: u128, available: u128 },

    /// Allowance decrease below zero
    #[error("Decreased allowance below zero")]
    AllowanceUnderflow,

    // === Arithmetic ===
    /// Arithmetic overflow
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Division by zero
    #[error("Division by zero in {0}")]
    DivisionByZero(&'static str),
}

impl PceError {
    /// Classification of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BasisPointsOutOfRange { .. }
            | Self::ZeroAmount(_)
            | Self::ZeroAddress(_)
            | Self::InvalidTokenInfo(_)
            | Self::InvalidConfig(_)
            | Self::FaucetDisabled => ErrorCategory::Validation,
            Self::InsufficientLiquidity { .. } | Self::BoundExceeded { .. } => {
                ErrorCategory::Liquidity
            }
            Self::NotCommunityToken(_)
            | Self::AlreadyRegistered(_)
            | Self::TokenIndexOutOfRange { .. } => ErrorCategory::Membership,
            Self::NotOwner(_)
            | Self::InvalidCaller(_)
            | Self::InvalidSignature
            | Self::InvalidNonce { .. } => ErrorCategory::Authorization,
            Self::FutureLookup { .. } | Self::SignatureExpired { .. } | Self::StaleContext { .. } => {
                ErrorCategory::Temporal
            }
            Self::InsufficientBalance { .. }
            | Self::InsufficientAllowance { .. }
            | Self::AllowanceUnderflow => ErrorCategory::Funds,
            Self::Overflow(_) | Self::DivisionByZero(_) => ErrorCategory::Arithmetic,
        }
    }

    /// Stable numeric code for API responses
    pub fn code(&self) -> u32 {
        match self.category() {
            ErrorCategory::Validation => 1001,
            ErrorCategory::Liquidity => 1002,
            ErrorCategory::Membership => 1003,
            ErrorCategory::Authorization => 1004,
            ErrorCategory::Temporal => 1005,
            ErrorCategory::Funds => 1006,
            ErrorCategory::Arithmetic => 9999,
        }
    }
}
