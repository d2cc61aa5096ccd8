//! Scenario files: a sequence of calls replayed against a fresh engine
//!
//! ```toml
//! name = "weekly decay"
//! owner = "0x0101010101010101010101010101010101010101"
//! genesis = "2024-01-03T01:00:00Z"
//!
//! [[steps]]
//! block = 1
//! caller = "0x0101010101010101010101010101010101010101"
//! op = "mint"
//! to = "0x0202020202020202020202020202020202020202"
//! amount = 10000
//!
//! [[steps]]
//! block = 2
//! time = "2024-01-10T00:00:05Z"
//! caller = "0x0202020202020202020202020202020202020202"
//! op = "swap_to_local"
//! token = "#0"
//! amount = 500
//! ```
//!
//! Local tokens are referenced either by address or as `#<index>` into the
//! registry, since their addresses are only known once created.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use pce_core::types::amount_serde;
use pce_core::{
    Address, Amount, BlockContext, BlockNumber, EngineConfig, EventRecord, PceToken,
    RejectingVerifier, Timestamp, TokenInfo,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Seconds assumed per block when a step gives no explicit time
const BLOCK_TIME_SECS: u64 = 12;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub owner: Address,
    /// RFC 3339 genesis time
    pub genesis: String,
    #[serde(default)]
    pub genesis_block: BlockNumber,
    /// Extra accounts reported in the summary
    #[serde(default)]
    pub watch: Vec<Address>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub block: BlockNumber,
    /// RFC 3339 block time; defaults to a fixed block spacing
    #[serde(default)]
    pub time: Option<String>,
    pub caller: Address,
    #[serde(default, with = "amount_serde")]
    pub base_fee: u128,
    /// The call is expected to be rejected
    #[serde(default)]
    pub expect_error: bool,
    #[serde(flatten)]
    pub call: Call,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Call {
    Mint {
        to: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    Faucet,
    Transfer {
        to: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    TransferFrom {
        from: Address,
        to: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    Approve {
        spender: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    IncreaseAllowance {
        spender: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    DecreaseAllowance {
        spender: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    Burn {
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    BurnFrom {
        account: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    Delegate {
        delegatee: Address,
    },
    CreateToken {
        info: TokenInfo,
    },
    SwapToLocal {
        token: String,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    SwapFromLocal {
        token: String,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    TransferLocal {
        token: String,
        to: Address,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    UpdateFactor,
    SetMetaTransactionGas {
        #[serde(with = "amount_serde")]
        gas: u128,
    },
    SetMetaTransactionPriorityFee {
        #[serde(with = "amount_serde")]
        fee: u128,
    },
    SetNativeTokenToPceTokenRate {
        #[serde(with = "amount_serde")]
        rate: u128,
    },
    SetCommunityTokenAddress {
        address: Address,
    },
    TransferOwnership {
        new_owner: Address,
    },
    RenounceOwnership,
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mint { .. } => "mint",
            Self::Faucet => "faucet",
            Self::Transfer { .. } => "transfer",
            Self::TransferFrom { .. } => "transfer_from",
            Self::Approve { .. } => "approve",
            Self::IncreaseAllowance { .. } => "increase_allowance",
            Self::DecreaseAllowance { .. } => "decrease_allowance",
            Self::Burn { .. } => "burn",
            Self::BurnFrom { .. } => "burn_from",
            Self::Delegate { .. } => "delegate",
            Self::CreateToken { .. } => "create_token",
            Self::SwapToLocal { .. } => "swap_to_local",
            Self::SwapFromLocal { .. } => "swap_from_local",
            Self::TransferLocal { .. } => "transfer_local",
            Self::UpdateFactor => "update_factor",
            Self::SetMetaTransactionGas { .. } => "set_meta_transaction_gas",
            Self::SetMetaTransactionPriorityFee { .. } => "set_meta_transaction_priority_fee",
            Self::SetNativeTokenToPceTokenRate { .. } => "set_native_token_to_pce_token_rate",
            Self::SetCommunityTokenAddress { .. } => "set_community_token_address",
            Self::TransferOwnership { .. } => "transfer_ownership",
            Self::RenounceOwnership => "renounce_ownership",
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub block: BlockNumber,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    /// Outcome agrees with `expect_error`
    pub as_expected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub address: Address,
    pub balance: Amount,
    pub votes: Amount,
    pub delegate: Address,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalTokenSummary {
    pub address: Address,
    pub symbol: String,
    pub deposited_pce_token: Amount,
    pub exchange_rate: u128,
    pub swap_rate: u128,
    pub total_supply: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub factor: u128,
    pub last_modified_factor: u128,
    pub last_decrease_time: String,
    pub total_supply: Amount,
    pub owner: Address,
    pub accounts: Vec<AccountSummary>,
    pub local_tokens: Vec<LocalTokenSummary>,
}

/// Everything a scenario run produced
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub scenario: String,
    pub steps: Vec<StepOutcome>,
    pub events: Vec<EventRecord>,
    pub summary: Summary,
}

impl Report {
    /// True if every step matched its expectation
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.as_expected)
    }
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let scenario: Self = toml::from_str(content).context("invalid scenario")?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Replay every step against a fresh engine built from `config`
    pub fn run(&self, config: EngineConfig) -> anyhow::Result<Report> {
        let genesis_time = parse_time(&self.genesis)?;
        let genesis = BlockContext::new(self.owner, self.genesis_block, genesis_time);
        let mut token = PceToken::new(config, self.owner, Box::new(RejectingVerifier), &genesis)?;

        info!(scenario = %self.name, steps = self.steps.len(), "running scenario");

        let mut watched: BTreeSet<Address> = self.watch.iter().copied().collect();
        watched.insert(self.owner);

        let mut previous = genesis;
        let mut outcomes = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let timestamp = match &step.time {
                Some(time) => parse_time(time)?,
                None => {
                    let blocks = step.block.saturating_sub(previous.block_number);
                    previous.timestamp + blocks * BLOCK_TIME_SECS
                }
            };
            let ctx = BlockContext::new(step.caller, step.block, timestamp).with_base_fee(step.base_fee);
            watched.insert(step.caller);

            let result = apply(&mut token, &ctx, &step.call);
            let ok = result.is_ok();
            let (error, code) = match result {
                Ok(()) => (None, None),
                Err(StepError::Engine(err)) => (Some(err.to_string()), Some(err.code())),
                Err(StepError::Reference(err)) => (Some(err.to_string()), None),
            };
            if ok {
                previous = ctx;
            }
            let as_expected = ok != step.expect_error;
            if !as_expected {
                warn!(index, op = step.call.name(), error = ?error, "step did not match expectation");
            }
            outcomes.push(StepOutcome {
                index,
                block: step.block,
                op: step.call.name(),
                ok,
                error,
                code,
                as_expected,
            });
        }

        let summary = summarize(&token, &previous, &watched)?;
        Ok(Report {
            scenario: self.name.clone(),
            steps: outcomes,
            events: token.take_events(),
            summary,
        })
    }
}

enum StepError {
    Engine(pce_core::PceError),
    Reference(anyhow::Error),
}

impl From<pce_core::PceError> for StepError {
    fn from(err: pce_core::PceError) -> Self {
        Self::Engine(err)
    }
}

fn apply(token: &mut PceToken, ctx: &BlockContext, call: &Call) -> Result<(), StepError> {
    match call {
        Call::Mint { to, amount } => token.mint(ctx, *to, *amount)?,
        Call::Faucet => {
            token.faucet(ctx)?;
        }
        Call::Transfer { to, amount } => token.transfer(ctx, *to, *amount)?,
        Call::TransferFrom { from, to, amount } => token.transfer_from(ctx, *from, *to, *amount)?,
        Call::Approve { spender, amount } => token.approve(ctx, *spender, *amount)?,
        Call::IncreaseAllowance { spender, amount } => {
            token.increase_allowance(ctx, *spender, *amount)?;
        }
        Call::DecreaseAllowance { spender, amount } => {
            token.decrease_allowance(ctx, *spender, *amount)?;
        }
        Call::Burn { amount } => token.burn(ctx, *amount)?,
        Call::BurnFrom { account, amount } => token.burn_from(ctx, *account, *amount)?,
        Call::Delegate { delegatee } => token.delegate(ctx, *delegatee)?,
        Call::CreateToken { info } => {
            token.create_token(ctx, info.clone())?;
        }
        Call::SwapToLocal { token: reference, amount } => {
            let local = resolve(token, reference).map_err(StepError::Reference)?;
            token.swap_to_local_token(ctx, local, *amount)?;
        }
        Call::SwapFromLocal { token: reference, amount } => {
            let local = resolve(token, reference).map_err(StepError::Reference)?;
            token.swap_from_local_token(ctx, local, *amount)?;
        }
        Call::TransferLocal {
            token: reference,
            to,
            amount,
        } => {
            let local = resolve(token, reference).map_err(StepError::Reference)?;
            token.transfer_local(ctx, local, *to, *amount)?;
        }
        Call::UpdateFactor => {
            token.update_factor_if_needed(ctx)?;
        }
        Call::SetMetaTransactionGas { gas } => token.set_meta_transaction_gas(ctx, *gas)?,
        Call::SetMetaTransactionPriorityFee { fee } => {
            token.set_meta_transaction_priority_fee(ctx, *fee)?
        }
        Call::SetNativeTokenToPceTokenRate { rate } => {
            token.set_native_token_to_pce_token_rate(ctx, *rate)?
        }
        Call::SetCommunityTokenAddress { address } => {
            token.set_community_token_address(ctx, *address)?
        }
        Call::TransferOwnership { new_owner } => token.transfer_ownership(ctx, *new_owner)?,
        Call::RenounceOwnership => token.renounce_ownership(ctx)?,
    }
    Ok(())
}

/// Resolve `#<index>` or a hex address to a local token address
fn resolve(token: &PceToken, reference: &str) -> anyhow::Result<Address> {
    if let Some(index) = reference.strip_prefix('#') {
        let index: usize = index
            .parse()
            .with_context(|| format!("bad token index {reference}"))?;
        return Ok(token.tokens(index)?);
    }
    reference
        .parse()
        .map_err(|e| anyhow!("bad token address {reference}: {e}"))
}

fn summarize(
    token: &PceToken,
    last: &BlockContext,
    watched: &BTreeSet<Address>,
) -> anyhow::Result<Summary> {
    let accounts = watched
        .iter()
        .map(|address| AccountSummary {
            address: *address,
            balance: token.balance_of(address),
            votes: token.get_votes(address),
            delegate: token.delegates(address),
        })
        .collect();

    let mut local_tokens = Vec::new();
    for address in token.get_tokens() {
        let record = token.get_local_token(&address);
        let local = token.local_token(&address)?;
        local_tokens.push(LocalTokenSummary {
            address,
            symbol: local.symbol.clone(),
            deposited_pce_token: record.deposited_pce_token,
            exchange_rate: record.exchange_rate,
            swap_rate: token.get_swap_rate(last, &address)?,
            total_supply: local.total_supply(),
        });
    }

    Ok(Summary {
        factor: token.get_current_factor(last)?,
        last_modified_factor: token.last_modified_factor(),
        last_decrease_time: format_time(token.last_decrease_time()),
        total_supply: token.total_supply(),
        owner: token.owner(),
        accounts,
        local_tokens,
    })
}

/// Parse an RFC 3339 time into Unix seconds
pub fn parse_time(value: &str) -> anyhow::Result<Timestamp> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid time {value}"))?;
    let seconds = parsed.with_timezone(&Utc).timestamp();
    if seconds < 0 {
        bail!("time {value} is before the Unix epoch");
    }
    Ok(seconds as Timestamp)
}

/// Render Unix seconds as RFC 3339
pub fn format_time(ts: Timestamp) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
