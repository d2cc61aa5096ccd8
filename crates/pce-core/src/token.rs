//! # PCE Token
//!
//! The facade tying every component together. It owns the base token
//! ledger, the vote checkpoints, the factor engine, the local token registry
//! with its community tokens, and the admin parameters.
//!
//! ## Call model
//!
//! Every mutating call runs through one path:
//!
//! 1. The [`BlockContext`] is checked (a real caller other than the pool
//!    holder, no stale block).
//! 2. Pending factor decay is computed but not yet persisted.
//! 3. The operation checks all of its preconditions, then mutates.
//! 4. On success the decay, the block watermark and the collected events
//!    are committed together.
//!
//! A rejected call returns before step 4 and before any mutation of step 3,
//! so it leaves the engine exactly as it was and emits nothing.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use crate::access::{AccessControl, Ownable};
use crate::checkpoints::{Checkpoint, CheckpointLedger, VoteChange};
use crate::clock;
use crate::community::{CommunityToken, TokenPolicy};
use crate::config::EngineConfig;
use crate::constants::{DECIMALS, VERSION};
use crate::error::{PceError, Result};
use crate::events::{EventLog, EventRecord, TokenEvent};
use crate::factor::FactorEngine;
use crate::factory::{TokenFactory, TokenInfo};
use crate::fees::MetaTransactionFees;
use crate::ledger::BalanceLedger;
use crate::math;
use crate::registry::{LocalToken, LocalTokenRegistry};
use crate::signature::{self, Signature, SignatureVerifier, SignedPayload};
use crate::swap::{self, SwapQuote};
use crate::types::{Address, Amount, BlockContext, BlockNumber, Timestamp};

/// The base token engine
pub struct PceToken {
    name: String,
    symbol: String,
    chain_id: u64,
    /// Account holding every swap pool
    address: Address,
    ledger: BalanceLedger,
    checkpoints: CheckpointLedger,
    factor: FactorEngine,
    registry: LocalTokenRegistry,
    factory: TokenFactory,
    communities: HashMap<Address, CommunityToken>,
    ownable: Ownable,
    fees: MetaTransactionFees,
    faucet_amount: Amount,
    nonces: HashMap<Address, u64>,
    verifier: Box<dyn SignatureVerifier>,
    last_block: BlockNumber,
    last_timestamp: Timestamp,
    events: EventLog,
}

impl fmt::Debug for PceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PceToken")
            .field("symbol", &self.symbol)
            .field("address", &self.address)
            .field("total_supply", &self.ledger.total_supply())
            .field("factor", &self.factor.stored_factor())
            .field("local_tokens", &self.registry.len())
            .field("last_block", &self.last_block)
            .finish_non_exhaustive()
    }
}

impl PceToken {
    /// Initialize a token owned by `owner` at the genesis block
    pub fn new(
        config: EngineConfig,
        owner: Address,
        verifier: Box<dyn SignatureVerifier>,
        genesis: &BlockContext,
    ) -> Result<Self> {
        config.validate()?;
        if owner.is_zero() {
            return Err(PceError::ZeroAddress("owner"));
        }
        let factor = FactorEngine::new(config.factor, genesis.timestamp)?;
        let mut events = EventLog::new();
        events.push(
            genesis.block_number,
            TokenEvent::OwnershipTransferred {
                previous_owner: Address::ZERO,
                new_owner: owner,
            },
        );
        info!(
            name = %config.token.name,
            symbol = %config.token.symbol,
            %owner,
            epoch = genesis.timestamp,
            "token initialized"
        );

        Ok(Self {
            name: config.token.name,
            symbol: config.token.symbol,
            chain_id: config.token.chain_id,
            address: config.token.contract_address,
            ledger: BalanceLedger::new(),
            checkpoints: CheckpointLedger::new(),
            factor,
            registry: LocalTokenRegistry::new(),
            factory: TokenFactory::new(config.token.community_token_address),
            communities: HashMap::new(),
            ownable: Ownable::new(owner),
            fees: config.fees,
            faucet_amount: config.faucet.amount,
            nonces: HashMap::new(),
            verifier,
            last_block: genesis.block_number,
            last_timestamp: genesis.timestamp,
            events,
        })
    }

    // ------------------------------------------------------------------
    // Call plumbing
    // ------------------------------------------------------------------

    fn ensure_context(&self, ctx: &BlockContext) -> Result<()> {
        if ctx.caller.is_zero() {
            return Err(PceError::ZeroAddress("caller"));
        }
        // the pool holder only moves funds through swaps
        if ctx.caller == self.address {
            return Err(PceError::InvalidCaller(ctx.caller));
        }
        if ctx.block_number < self.last_block || ctx.timestamp < self.last_timestamp {
            return Err(PceError::StaleContext {
                block: ctx.block_number,
                last_seen: self.last_block,
            });
        }
        Ok(())
    }

    /// Run a mutating operation with the factor as of `ctx`
    ///
    /// `op` receives the up-to-date factor and a buffer for its events. It
    /// must check every precondition before its first mutation.
    fn execute<T, F>(&mut self, ctx: &BlockContext, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self, u128, &mut Vec<TokenEvent>) -> Result<T>,
    {
        let outcome = self.ensure_context(ctx).and_then(|()| {
            let update = self.factor.pending(ctx.timestamp)?;
            let mut emitted = Vec::new();
            let value = op(self, update.current(), &mut emitted)?;
            Ok((update, value, emitted))
        });
        let (update, value, emitted) = match outcome {
            Ok(parts) => parts,
            Err(err) => {
                debug!(caller = %ctx.caller, block = ctx.block_number, code = err.code(), %err, "call rejected");
                return Err(err);
            }
        };

        if update.current() != update.previous {
            self.events.push(
                ctx.block_number,
                TokenEvent::FactorDecreased {
                    previous: update.previous,
                    current: update.current(),
                    steps: update.steps,
                    last_decrease_time: update.state.last_decrease_time,
                },
            );
        }
        self.factor.commit(&update);
        self.last_block = ctx.block_number;
        self.last_timestamp = ctx.timestamp;
        self.events.extend(ctx.block_number, emitted);
        Ok(value)
    }

    fn vote_events(changes: Vec<VoteChange>) -> impl Iterator<Item = TokenEvent> {
        changes.into_iter().map(|change| TokenEvent::DelegateVotesChanged {
            delegate: change.delegate,
            previous_balance: change.previous,
            new_balance: change.new,
        })
    }

    /// Move base tokens and carry the voting power along
    fn move_base(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
        block: BlockNumber,
        emitted: &mut Vec<TokenEvent>,
    ) -> Result<()> {
        self.ledger.transfer(from, to, amount)?;
        let changes = self.checkpoints.after_transfer(from, to, amount, block)?;
        emitted.push(TokenEvent::Transfer {
            from: *from,
            to: *to,
            value: amount,
        });
        emitted.extend(Self::vote_events(changes));
        Ok(())
    }

    fn mint_base(
        &mut self,
        to: &Address,
        amount: Amount,
        block: BlockNumber,
        emitted: &mut Vec<TokenEvent>,
    ) -> Result<()> {
        self.ledger.mint(to, amount)?;
        let changes = self
            .checkpoints
            .after_transfer(&Address::ZERO, to, amount, block)?;
        emitted.push(TokenEvent::Transfer {
            from: Address::ZERO,
            to: *to,
            value: amount,
        });
        emitted.extend(Self::vote_events(changes));
        Ok(())
    }

    fn burn_base(
        &mut self,
        from: &Address,
        amount: Amount,
        block: BlockNumber,
        emitted: &mut Vec<TokenEvent>,
    ) -> Result<()> {
        self.ledger.burn(from, amount)?;
        let changes = self
            .checkpoints
            .after_transfer(from, &Address::ZERO, amount, block)?;
        emitted.push(TokenEvent::Transfer {
            from: *from,
            to: Address::ZERO,
            value: amount,
        });
        emitted.extend(Self::vote_events(changes));
        Ok(())
    }

    /// Consume allowance, emitting the new value when it changed
    fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
        emitted: &mut Vec<TokenEvent>,
    ) -> Result<()> {
        let before = self.ledger.allowance(owner, spender);
        self.ledger.spend_allowance(owner, spender, amount)?;
        let after = self.ledger.allowance(owner, spender);
        if after != before {
            emitted.push(TokenEvent::Approval {
                owner: *owner,
                spender: *spender,
                value: after,
            });
        }
        Ok(())
    }

    fn community(&self, token: &Address) -> Result<&CommunityToken> {
        self.communities
            .get(token)
            .ok_or(PceError::NotCommunityToken(*token))
    }

    fn community_mut(&mut self, token: &Address) -> Result<&mut CommunityToken> {
        self.communities
            .get_mut(token)
            .ok_or(PceError::NotCommunityToken(*token))
    }

    fn initial_factor(&self) -> u128 {
        self.factor.schedule().initial_factor
    }

    // ------------------------------------------------------------------
    // Base token metadata and balances
    // ------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Account holding the swap pools
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn total_supply(&self) -> Amount {
        self.ledger.total_supply()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.ledger.balance_of(account)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.ledger.allowance(owner, spender)
    }

    // ------------------------------------------------------------------
    // Base token transfers
    // ------------------------------------------------------------------

    pub fn transfer(&mut self, ctx: &BlockContext, to: Address, amount: Amount) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            this.move_base(&ctx.caller, &to, amount, ctx.block_number, emitted)
        })
    }

    pub fn transfer_from(
        &mut self,
        ctx: &BlockContext,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            if from.is_zero() {
                return Err(PceError::ZeroAddress("transfer sender"));
            }
            if to.is_zero() {
                return Err(PceError::ZeroAddress("transfer receiver"));
            }
            this.ledger.ensure_balance(&from, amount)?;
            this.spend_allowance(&from, &ctx.caller, amount, emitted)?;
            this.move_base(&from, &to, amount, ctx.block_number, emitted)
        })
    }

    pub fn approve(&mut self, ctx: &BlockContext, spender: Address, amount: Amount) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            this.ledger.approve(&ctx.caller, &spender, amount)?;
            emitted.push(TokenEvent::Approval {
                owner: ctx.caller,
                spender,
                value: amount,
            });
            Ok(())
        })
    }

    /// Raise `spender`'s allowance; returns the new allowance
    pub fn increase_allowance(
        &mut self,
        ctx: &BlockContext,
        spender: Address,
        added: Amount,
    ) -> Result<Amount> {
        self.execute(ctx, |this, _, emitted| {
            let value = this.ledger.increase_allowance(&ctx.caller, &spender, added)?;
            emitted.push(TokenEvent::Approval {
                owner: ctx.caller,
                spender,
                value,
            });
            Ok(value)
        })
    }

    /// Lower `spender`'s allowance; returns the new allowance
    pub fn decrease_allowance(
        &mut self,
        ctx: &BlockContext,
        spender: Address,
        subtracted: Amount,
    ) -> Result<Amount> {
        self.execute(ctx, |this, _, emitted| {
            let value = this
                .ledger
                .decrease_allowance(&ctx.caller, &spender, subtracted)?;
            emitted.push(TokenEvent::Approval {
                owner: ctx.caller,
                spender,
                value,
            });
            Ok(value)
        })
    }

    /// Owner-only issuance of new base tokens
    pub fn mint(&mut self, ctx: &BlockContext, to: Address, amount: Amount) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            this.ownable.ensure_owner(&ctx.caller)?;
            this.mint_base(&to, amount, ctx.block_number, emitted)?;
            info!(%to, amount, "minted");
            Ok(())
        })
    }

    pub fn burn(&mut self, ctx: &BlockContext, amount: Amount) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            this.burn_base(&ctx.caller, amount, ctx.block_number, emitted)
        })
    }

    /// Burn from `account` using the caller's allowance
    pub fn burn_from(&mut self, ctx: &BlockContext, account: Address, amount: Amount) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            if account.is_zero() {
                return Err(PceError::ZeroAddress("burn source"));
            }
            this.ledger.ensure_balance(&account, amount)?;
            this.spend_allowance(&account, &ctx.caller, amount, emitted)?;
            this.burn_base(&account, amount, ctx.block_number, emitted)
        })
    }

    /// Mint the configured faucet amount to the caller
    pub fn faucet(&mut self, ctx: &BlockContext) -> Result<Amount> {
        self.execute(ctx, |this, _, emitted| {
            let amount = this.faucet_amount;
            if amount == 0 {
                return Err(PceError::FaucetDisabled);
            }
            this.mint_base(&ctx.caller, amount, ctx.block_number, emitted)?;
            Ok(amount)
        })
    }

    // ------------------------------------------------------------------
    // Voting power
    // ------------------------------------------------------------------

    pub fn delegates(&self, account: &Address) -> Address {
        self.checkpoints.delegates(account)
    }

    pub fn get_votes(&self, account: &Address) -> Amount {
        self.checkpoints.get_votes(account)
    }

    /// Votes of `account` at `block`, which must precede `ctx`'s block
    pub fn get_past_votes(&self, ctx: &BlockContext, account: &Address, block: BlockNumber) -> Result<Amount> {
        self.checkpoints
            .get_past_votes(account, block, ctx.block_number)
    }

    /// Total supply at `block`, which must precede `ctx`'s block
    pub fn get_past_total_supply(&self, ctx: &BlockContext, block: BlockNumber) -> Result<Amount> {
        self.checkpoints
            .get_past_total_supply(block, ctx.block_number)
    }

    pub fn num_checkpoints(&self, account: &Address) -> usize {
        self.checkpoints.num_checkpoints(account)
    }

    pub fn checkpoints(&self, account: &Address, pos: usize) -> Option<Checkpoint> {
        self.checkpoints.checkpoint(account, pos)
    }

    pub fn delegate(&mut self, ctx: &BlockContext, delegatee: Address) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            this.delegate_for(&ctx.caller, &delegatee, ctx.block_number, emitted)
        })
    }

    fn delegate_for(
        &mut self,
        delegator: &Address,
        delegatee: &Address,
        block: BlockNumber,
        emitted: &mut Vec<TokenEvent>,
    ) -> Result<()> {
        let balance = self.ledger.balance_of(delegator);
        let change = self
            .checkpoints
            .delegate(delegator, delegatee, balance, block)?;
        emitted.push(TokenEvent::DelegateChanged {
            delegator: change.delegator,
            from_delegate: change.from_delegate,
            to_delegate: change.to_delegate,
        });
        emitted.extend(Self::vote_events(change.vote_changes));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Signed operations
    // ------------------------------------------------------------------

    pub fn nonces(&self, owner: &Address) -> u64 {
        self.nonces.get(owner).copied().unwrap_or(0)
    }

    pub fn domain_separator(&self) -> [u8; 32] {
        signature::domain_separator(&self.name, VERSION, self.chain_id, &self.address)
    }

    fn recover(&self, payload: &SignedPayload, sig: &Signature) -> Result<Address> {
        let digest = payload.digest(&self.domain_separator());
        let signer = self.verifier.recover(&digest, sig)?;
        if signer.is_zero() || signer == self.address {
            return Err(PceError::InvalidSignature);
        }
        Ok(signer)
    }

    fn use_nonce(&mut self, owner: &Address) {
        *self.nonces.entry(*owner).or_insert(0) += 1;
    }

    /// Set an allowance authorized by `owner`'s signature
    pub fn permit(
        &mut self,
        ctx: &BlockContext,
        owner: Address,
        spender: Address,
        value: Amount,
        deadline: Timestamp,
        sig: Signature,
    ) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            if ctx.timestamp > deadline {
                return Err(PceError::SignatureExpired {
                    deadline,
                    now: ctx.timestamp,
                });
            }
            let payload = SignedPayload::Permit {
                owner,
                spender,
                value,
                nonce: this.nonces(&owner),
                deadline,
            };
            if this.recover(&payload, &sig)? != owner {
                return Err(PceError::InvalidSignature);
            }
            this.ledger.approve(&owner, &spender, value)?;
            this.use_nonce(&owner);
            emitted.push(TokenEvent::Approval {
                owner,
                spender,
                value,
            });
            Ok(())
        })
    }

    /// Delegate on behalf of the signer of `sig`
    pub fn delegate_by_sig(
        &mut self,
        ctx: &BlockContext,
        delegatee: Address,
        nonce: u64,
        expiry: Timestamp,
        sig: Signature,
    ) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            if ctx.timestamp > expiry {
                return Err(PceError::SignatureExpired {
                    deadline: expiry,
                    now: ctx.timestamp,
                });
            }
            let payload = SignedPayload::Delegation {
                delegatee,
                nonce,
                expiry,
            };
            let signer = this.recover(&payload, &sig)?;
            let expected = this.nonces(&signer);
            if nonce != expected {
                return Err(PceError::InvalidNonce {
                    expected,
                    got: nonce,
                });
            }
            this.delegate_for(&signer, &delegatee, ctx.block_number, emitted)?;
            this.use_nonce(&signer);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Factor
    // ------------------------------------------------------------------

    /// Factor as of `ctx`, including decay not yet persisted
    pub fn get_current_factor(&self, ctx: &BlockContext) -> Result<u128> {
        self.factor.current_factor(ctx.timestamp)
    }

    /// Persist due decay; returns the factor afterwards
    pub fn update_factor_if_needed(&mut self, ctx: &BlockContext) -> Result<u128> {
        self.execute(ctx, |_, factor, _| Ok(factor))
    }

    pub fn factor(&self) -> &FactorEngine {
        &self.factor
    }

    pub fn last_modified_factor(&self) -> u128 {
        self.factor.last_modified_factor()
    }

    pub fn last_decrease_time(&self) -> Timestamp {
        self.factor.last_decrease_time()
    }

    pub fn epoch_time(&self) -> Timestamp {
        self.factor.epoch_time()
    }

    pub fn get_elapsed_minutes(&self, start: Timestamp, end: Timestamp) -> u64 {
        clock::get_elapsed_minutes(start, end)
    }

    pub fn is_wednesday_between(&self, start: Timestamp, end: Timestamp) -> bool {
        clock::is_wednesday_between(start, end)
    }

    /// Whether a decay boundary of this token's schedule falls in `(start, end]`
    pub fn has_decrease_time_within(&self, start: Timestamp, end: Timestamp) -> bool {
        clock::has_decrease_time_within(start, end, self.factor.schedule().interval_days)
    }

    // ------------------------------------------------------------------
    // Local tokens
    // ------------------------------------------------------------------

    /// Create a community token funded by the caller's deposit
    pub fn create_token(&mut self, ctx: &BlockContext, info: TokenInfo) -> Result<Address> {
        self.execute(ctx, |this, factor, emitted| {
            let plan = this
                .factory
                .plan(&info, &ctx.caller, factor, this.initial_factor())?;
            if this.registry.is_community_token(&plan.address) {
                return Err(PceError::AlreadyRegistered(plan.address));
            }
            this.ledger.ensure_balance(&ctx.caller, plan.deposit)?;

            let pool = this.address;
            this.move_base(&ctx.caller, &pool, plan.deposit, ctx.block_number, emitted)?;
            let token = this.factory.instantiate(&plan, &info, ctx)?;
            this.registry
                .register(plan.address, plan.exchange_rate, plan.deposit)?;
            this.communities.insert(plan.address, token);

            emitted.push(TokenEvent::LocalTransfer {
                token: plan.address,
                from: Address::ZERO,
                to: ctx.caller,
                value: plan.initial_supply,
            });
            emitted.push(TokenEvent::TokenCreated {
                token_address: plan.address,
                creator: ctx.caller,
                pce_token_amount: plan.deposit,
                new_token_amount: plan.initial_supply,
            });
            info!(
                token = %plan.address,
                symbol = %info.symbol,
                creator = %ctx.caller,
                deposit = plan.deposit,
                supply = plan.initial_supply,
                "community token created"
            );
            Ok(plan.address)
        })
    }

    /// Swap base tokens into `token`
    pub fn swap_to_local_token(
        &mut self,
        ctx: &BlockContext,
        token: Address,
        amount: Amount,
    ) -> Result<SwapQuote> {
        self.execute(ctx, |this, factor, emitted| {
            let community = this.community(&token)?;
            let quote = swap::quote_to_local(
                &this.registry,
                community,
                amount,
                factor,
                this.initial_factor(),
            )?;
            math::add(community.total_supply(), quote.target_token_amount, "local supply")?;
            this.ledger.ensure_balance(&ctx.caller, amount)?;

            let pool = this.address;
            this.move_base(&ctx.caller, &pool, amount, ctx.block_number, emitted)?;
            this.registry.deposit(&token, amount)?;
            this.community_mut(&token)?
                .ledger
                .mint(&ctx.caller, quote.target_token_amount)?;

            emitted.push(TokenEvent::LocalTransfer {
                token,
                from: Address::ZERO,
                to: ctx.caller,
                value: quote.target_token_amount,
            });
            emitted.push(TokenEvent::TokensSwappedToLocalToken {
                from: ctx.caller,
                to_token: token,
                pce_token_amount: quote.pce_token_amount,
                target_token_amount: quote.target_token_amount,
                pool_before: quote.pool_before,
                pool_after: quote.pool_after,
            });
            debug!(%token, caller = %ctx.caller, pce = amount, local = quote.target_token_amount, "swapped to local");
            Ok(quote)
        })
    }

    /// Swap `amount` units of `token` back into base tokens
    pub fn swap_from_local_token(
        &mut self,
        ctx: &BlockContext,
        token: Address,
        amount: Amount,
    ) -> Result<SwapQuote> {
        self.execute(ctx, |this, factor, emitted| {
            let quote = swap::quote_from_local(
                &this.registry,
                this.community(&token)?,
                &ctx.caller,
                amount,
                factor,
                this.initial_factor(),
            )?;

            let pool = this.address;
            this.move_base(&pool, &ctx.caller, quote.pce_token_amount, ctx.block_number, emitted)?;
            this.registry.withdraw(&token, quote.pce_token_amount)?;
            this.community_mut(&token)?.ledger.burn(&ctx.caller, amount)?;

            emitted.push(TokenEvent::LocalTransfer {
                token,
                from: ctx.caller,
                to: Address::ZERO,
                value: amount,
            });
            emitted.push(TokenEvent::TokensSwappedFromLocalToken {
                to: ctx.caller,
                from_token: token,
                target_token_amount: amount,
                pce_token_amount: quote.pce_token_amount,
                pool_before: quote.pool_before,
                pool_after: quote.pool_after,
            });
            debug!(%token, caller = %ctx.caller, local = amount, pce = quote.pce_token_amount, "swapped from local");
            Ok(quote)
        })
    }

    /// Move local tokens between holders
    pub fn transfer_local(
        &mut self,
        ctx: &BlockContext,
        token: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            this.community_mut(&token)?
                .ledger
                .transfer(&ctx.caller, &to, amount)?;
            emitted.push(TokenEvent::LocalTransfer {
                token,
                from: ctx.caller,
                to,
                value: amount,
            });
            Ok(())
        })
    }

    pub fn get_local_token(&self, token: &Address) -> LocalToken {
        self.registry.get_local_token(token)
    }

    pub fn is_community_token(&self, token: &Address) -> bool {
        self.registry.is_community_token(token)
    }

    /// Registered local tokens in creation order
    pub fn get_tokens(&self) -> Vec<Address> {
        self.registry.get_tokens()
    }

    pub fn tokens(&self, index: usize) -> Result<Address> {
        self.registry.token_at(index)
    }

    pub fn get_deposited_pce_tokens(&self, token: &Address) -> Amount {
        self.registry.get_deposited_pce_tokens(token)
    }

    /// Stored rate of `token`, fixed at creation
    pub fn get_exchange_rate(&self, token: &Address) -> Result<u128> {
        self.registry.get_exchange_rate(token)
    }

    /// Local units per base unit as of `ctx` (SCALE-scaled)
    pub fn get_swap_rate(&self, ctx: &BlockContext, token: &Address) -> Result<u128> {
        let current = self.factor.current_factor(ctx.timestamp)?;
        self.registry
            .get_swap_rate(token, current, self.initial_factor())
    }

    pub fn local_balance_of(&self, token: &Address, account: &Address) -> Result<Amount> {
        Ok(self.community(token)?.balance_of(account))
    }

    pub fn local_total_supply(&self, token: &Address) -> Result<Amount> {
        Ok(self.community(token)?.total_supply())
    }

    pub fn local_token_policy(&self, token: &Address) -> Result<&TokenPolicy> {
        Ok(&self.community(token)?.policy)
    }

    pub fn local_token(&self, token: &Address) -> Result<&CommunityToken> {
        self.community(token)
    }

    /// Whether value may be exchanged out of `from` into `to`
    pub fn is_exchange_allowed(&self, from: &Address, to: &Address) -> Result<bool> {
        let source = self.community(from)?;
        let target = self.community(to)?;
        Ok(source.policy.allows_outgo_to(to) && target.policy.allows_income_from(from))
    }

    pub fn community_token_address(&self) -> Address {
        self.factory.community_token_address()
    }

    // ------------------------------------------------------------------
    // Meta-transaction fees
    // ------------------------------------------------------------------

    pub fn get_block_base_fee(&self, ctx: &BlockContext) -> u128 {
        ctx.base_fee
    }

    /// Base tokens charged for a sponsored call in `ctx`'s block
    pub fn get_meta_transaction_fee(&self, ctx: &BlockContext) -> Result<Amount> {
        self.fees.fee(ctx.base_fee)
    }

    pub fn meta_transaction_gas(&self) -> u128 {
        self.fees.meta_transaction_gas
    }

    pub fn meta_transaction_priority_fee(&self) -> u128 {
        self.fees.meta_transaction_priority_fee
    }

    pub fn get_native_token_to_pce_token_rate(&self) -> u128 {
        self.fees.native_token_to_pce_token_rate
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub fn owner(&self) -> Address {
        self.ownable.owner()
    }

    pub fn set_community_token_address(&mut self, ctx: &BlockContext, address: Address) -> Result<()> {
        self.execute(ctx, |this, _, _| {
            this.ownable.ensure_owner(&ctx.caller)?;
            if address.is_zero() {
                return Err(PceError::ZeroAddress("community token address"));
            }
            this.factory.set_community_token_address(address);
            info!(%address, "community token template updated");
            Ok(())
        })
    }

    pub fn set_meta_transaction_gas(&mut self, ctx: &BlockContext, gas: u128) -> Result<()> {
        self.execute(ctx, |this, _, _| {
            this.ownable.ensure_owner(&ctx.caller)?;
            this.fees.meta_transaction_gas = gas;
            info!(gas, "meta transaction gas updated");
            Ok(())
        })
    }

    pub fn set_meta_transaction_priority_fee(&mut self, ctx: &BlockContext, fee: u128) -> Result<()> {
        self.execute(ctx, |this, _, _| {
            this.ownable.ensure_owner(&ctx.caller)?;
            this.fees.meta_transaction_priority_fee = fee;
            info!(fee, "meta transaction priority fee updated");
            Ok(())
        })
    }

    pub fn set_native_token_to_pce_token_rate(&mut self, ctx: &BlockContext, rate: u128) -> Result<()> {
        self.execute(ctx, |this, _, _| {
            this.ownable.ensure_owner(&ctx.caller)?;
            if rate == 0 {
                return Err(PceError::ZeroAmount("native token to pce token rate"));
            }
            this.fees.native_token_to_pce_token_rate = rate;
            info!(rate, "native token rate updated");
            Ok(())
        })
    }

    pub fn transfer_ownership(&mut self, ctx: &BlockContext, new_owner: Address) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            let previous_owner = this.ownable.transfer_ownership(&ctx.caller, new_owner)?;
            emitted.push(TokenEvent::OwnershipTransferred {
                previous_owner,
                new_owner,
            });
            Ok(())
        })
    }

    pub fn renounce_ownership(&mut self, ctx: &BlockContext) -> Result<()> {
        self.execute(ctx, |this, _, emitted| {
            let previous_owner = this.ownable.renounce_ownership(&ctx.caller)?;
            emitted.push(TokenEvent::OwnershipTransferred {
                previous_owner,
                new_owner: Address::ZERO,
            });
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn events(&self) -> &[EventRecord] {
        self.events.records()
    }

    /// Drain the event log
    pub fn take_events(&mut self) -> Vec<EventRecord> {
        self.events.take()
    }

    /// Highest block a mutating call has executed in
    pub fn last_block(&self) -> BlockNumber {
        self.last_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{INITIAL_FACTOR, SCALE};
    use crate::factory::tests::sample_info;
    use crate::signature::RejectingVerifier;

    const WED: Timestamp = 1_704_240_000;

    fn addr(id: u8) -> Address {
        Address::new([id; 20])
    }

    fn owner() -> Address {
        addr(1)
    }

    fn ctx(caller: Address, block: BlockNumber) -> BlockContext {
        BlockContext::new(caller, block, WED + block)
    }

    fn token() -> PceToken {
        PceToken::new(
            EngineConfig::default(),
            owner(),
            Box::new(RejectingVerifier),
            &ctx(owner(), 1),
        )
        .unwrap()
    }

    #[test]
    fn test_genesis() {
        let token = token();
        assert_eq!(token.owner(), owner());
        assert_eq!(token.decimals(), 18);
        assert_eq!(token.symbol(), "PCE");
        assert_eq!(token.epoch_time(), WED + 1);
        assert!(matches!(
            token.events()[0].event,
            TokenEvent::OwnershipTransferred { .. }
        ));
    }

    #[test]
    fn test_mint_is_owner_gated() {
        let mut token = token();
        let result = token.mint(&ctx(addr(2), 2), addr(2), 100);
        assert_eq!(result, Err(PceError::NotOwner(addr(2))));
        assert_eq!(token.total_supply(), 0);

        token.mint(&ctx(owner(), 2), addr(2), 100).unwrap();
        assert_eq!(token.balance_of(&addr(2)), 100);
    }

    #[test]
    fn test_rejected_call_emits_nothing() {
        let mut token = token();
        token.take_events();
        assert!(token.transfer(&ctx(addr(2), 2), addr(3), 1).is_err());
        assert!(token.events().is_empty());
        assert_eq!(token.last_block(), 1);
    }

    #[test]
    fn test_stale_context_rejected() {
        let mut token = token();
        token.mint(&ctx(owner(), 5), addr(2), 100).unwrap();
        assert_eq!(
            token.transfer(&ctx(addr(2), 4), addr(3), 1),
            Err(PceError::StaleContext {
                block: 4,
                last_seen: 5
            })
        );
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let mut token = token();
        token.mint(&ctx(owner(), 2), addr(2), 100).unwrap();
        token.approve(&ctx(addr(2), 3), addr(3), 60).unwrap();

        token
            .transfer_from(&ctx(addr(3), 4), addr(2), addr(4), 50)
            .unwrap();
        assert_eq!(token.allowance(&addr(2), &addr(3)), 10);
        assert_eq!(token.balance_of(&addr(4)), 50);

        let result = token.transfer_from(&ctx(addr(3), 5), addr(2), addr(4), 11);
        assert!(matches!(result, Err(PceError::InsufficientAllowance { .. })));
        assert_eq!(token.balance_of(&addr(2)), 50);
    }

    #[test]
    fn test_burn_from_checks_balance_before_allowance() {
        let mut token = token();
        token.mint(&ctx(owner(), 2), addr(2), 10).unwrap();
        token.approve(&ctx(addr(2), 3), addr(3), 100).unwrap();

        assert!(token.burn_from(&ctx(addr(3), 4), addr(2), 11).is_err());
        assert_eq!(token.allowance(&addr(2), &addr(3)), 100);

        token.burn_from(&ctx(addr(3), 4), addr(2), 10).unwrap();
        assert_eq!(token.total_supply(), 0);
        assert_eq!(token.allowance(&addr(2), &addr(3)), 90);
    }

    #[test]
    fn test_faucet_disabled_by_default() {
        let mut token = token();
        assert_eq!(token.faucet(&ctx(addr(2), 2)), Err(PceError::FaucetDisabled));
    }

    #[test]
    fn test_create_token_moves_deposit_to_pool() {
        let mut token = token();
        token.mint(&ctx(owner(), 2), addr(2), 5_000).unwrap();

        let local = token
            .create_token(&ctx(addr(2), 3), sample_info(1_000))
            .unwrap();
        assert_eq!(token.get_deposited_pce_tokens(&local), 1_000);
        assert_eq!(token.balance_of(&addr(2)), 4_000);
        assert_eq!(token.balance_of(&token.address()), 1_000);
        assert_eq!(token.local_balance_of(&local, &addr(2)).unwrap(), 1_000);
        assert_eq!(token.get_tokens(), vec![local]);
        assert_eq!(token.tokens(0).unwrap(), local);
        assert_eq!(token.get_exchange_rate(&local).unwrap(), SCALE);
    }

    #[test]
    fn test_create_token_without_funds_leaves_no_entry() {
        let mut token = token();
        let result = token.create_token(&ctx(addr(2), 2), sample_info(1_000));
        assert!(matches!(result, Err(PceError::InsufficientBalance { .. })));
        assert!(token.get_tokens().is_empty());
    }

    #[test]
    fn test_swap_on_unknown_token() {
        let mut token = token();
        token.mint(&ctx(owner(), 2), addr(2), 100).unwrap();
        assert_eq!(
            token.swap_to_local_token(&ctx(addr(2), 3), addr(9), 10),
            Err(PceError::NotCommunityToken(addr(9)))
        );
        assert_eq!(token.balance_of(&addr(2)), 100);
    }

    #[test]
    fn test_swap_both_directions() {
        let mut token = token();
        token.mint(&ctx(owner(), 2), addr(2), 5_000).unwrap();
        let local = token
            .create_token(&ctx(addr(2), 3), sample_info(1_000))
            .unwrap();

        let quote = token
            .swap_to_local_token(&ctx(addr(2), 4), local, 500)
            .unwrap();
        assert_eq!(quote.target_token_amount, 500);
        assert_eq!(token.get_deposited_pce_tokens(&local), 1_500);
        assert_eq!(token.local_total_supply(&local).unwrap(), 1_500);

        let back = token
            .swap_from_local_token(&ctx(addr(2), 5), local, 500)
            .unwrap();
        assert_eq!(back.pce_token_amount, 500);
        assert_eq!(token.get_deposited_pce_tokens(&local), 1_000);
        assert_eq!(token.balance_of(&addr(2)), 4_000);
    }

    #[test]
    fn test_transfer_local() {
        let mut token = token();
        token.mint(&ctx(owner(), 2), addr(2), 5_000).unwrap();
        let local = token
            .create_token(&ctx(addr(2), 3), sample_info(1_000))
            .unwrap();
        token
            .transfer_local(&ctx(addr(2), 4), local, addr(3), 250)
            .unwrap();
        assert_eq!(token.local_balance_of(&local, &addr(3)).unwrap(), 250);
        assert!(token
            .transfer_local(&ctx(addr(3), 5), addr(9), addr(2), 1)
            .is_err());
    }

    #[test]
    fn test_exchange_allowed_between_locals() {
        let mut token = token();
        token.mint(&ctx(owner(), 2), addr(2), 5_000).unwrap();
        let a = token
            .create_token(&ctx(addr(2), 3), sample_info(1_000))
            .unwrap();
        let mut closed = sample_info(1_000);
        closed.symbol = "CLOSED".into();
        closed.income_exchange_allow_method = crate::community::ExchangeAllowMethod::None;
        let b = token.create_token(&ctx(addr(2), 4), closed).unwrap();

        assert!(token.is_exchange_allowed(&b, &a).unwrap());
        assert!(!token.is_exchange_allowed(&a, &b).unwrap());
        assert!(token.is_exchange_allowed(&a, &addr(9)).is_err());
    }

    #[test]
    fn test_admin_setters() {
        let mut token = token();
        let stranger = ctx(addr(2), 2);
        assert!(token.set_meta_transaction_gas(&stranger, 1).is_err());

        let admin = ctx(owner(), 2).with_base_fee(10);
        token.set_meta_transaction_gas(&admin, 100_000).unwrap();
        token.set_meta_transaction_priority_fee(&admin, 2).unwrap();
        token
            .set_native_token_to_pce_token_rate(&admin, 3 * SCALE)
            .unwrap();
        assert_eq!(token.get_block_base_fee(&admin), 10);
        assert_eq!(token.get_meta_transaction_fee(&admin).unwrap(), 3_600_000);

        token.set_community_token_address(&admin, addr(7)).unwrap();
        assert_eq!(token.community_token_address(), addr(7));
    }

    #[test]
    fn test_ownership_transfer_emits_event() {
        let mut token = token();
        token.take_events();
        token.transfer_ownership(&ctx(owner(), 2), addr(5)).unwrap();
        assert_eq!(token.owner(), addr(5));
        assert_eq!(
            token.events()[0].event,
            TokenEvent::OwnershipTransferred {
                previous_owner: owner(),
                new_owner: addr(5)
            }
        );
        token.renounce_ownership(&ctx(addr(5), 3)).unwrap();
        assert!(token.mint(&ctx(addr(5), 4), addr(5), 1).is_err());
    }

    #[test]
    fn test_signed_calls_need_a_verifier() {
        let mut token = token();
        let sig = Signature {
            v: 27,
            r: [1; 32],
            s: [2; 32],
        };
        assert_eq!(
            token.delegate_by_sig(&ctx(addr(2), 2), addr(2), 0, WED + 100, sig),
            Err(PceError::InvalidSignature)
        );
        assert_eq!(
            token.permit(&ctx(addr(2), 2), addr(2), addr(3), 1, WED, sig),
            Err(PceError::SignatureExpired {
                deadline: WED,
                now: WED + 2
            })
        );
    }

    #[test]
    fn test_factor_decay_is_committed_with_the_call() {
        let mut token = token();
        let week_later = BlockContext::new(owner(), 10, WED + 7 * 86_400 + 10);
        assert!(token.get_current_factor(&week_later).unwrap() < INITIAL_FACTOR);
        assert_eq!(token.factor().stored_factor(), INITIAL_FACTOR);

        // rejected call: nothing persisted
        assert!(token.transfer(&week_later.with_caller(addr(2)), addr(3), 1).is_err());
        assert_eq!(token.factor().stored_factor(), INITIAL_FACTOR);

        let factor = token.update_factor_if_needed(&week_later).unwrap();
        assert_eq!(factor, INITIAL_FACTOR * 9_876 / 10_000);
        assert!(token
            .events()
            .iter()
            .any(|r| matches!(r.event, TokenEvent::FactorDecreased { steps: 1, .. })));
    }
}
