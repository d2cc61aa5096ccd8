//! # Factor Engine
//!
//! Owns the global exchange factor and its decay schedule.
//!
//! ## Decay
//!
//! The factor starts at `INITIAL_FACTOR` and is multiplied by
//! `decrease_rate / decrease_rate_base` (rounded down) at every due
//! boundary of the [`clock`](crate::clock) schedule.
//!
//! | Compounding | N due boundaries | `last_modified_factor` |
//! |-------------|------------------|------------------------|
//! | Discrete | N floored steps | value before the last step |
//! | Exponentiated | one floored step by `(rate/base)^N` | value before the update |
//!
//! Both the read-only view and the persisting update call the same pure
//! [`decayed_factor`], so they can never disagree.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock;
use crate::constants::*;
use crate::error::{PceError, Result};
use crate::math::{mul_div, ratio_pow};
use crate::types::Timestamp;

/// How several elapsed boundaries are folded into the factor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compounding {
    /// One floored multiplication per boundary
    #[default]
    Discrete,
    /// A single multiplication by the ratio raised to the boundary count
    Exponentiated,
}

/// Decay schedule parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorSchedule {
    /// Factor at genesis
    #[serde(with = "crate::types::amount_serde", default = "default_initial_factor")]
    pub initial_factor: u128,
    /// Numerator of the per-interval ratio
    #[serde(with = "crate::types::amount_serde", default = "default_decrease_rate")]
    pub decrease_rate: u128,
    /// Denominator of the per-interval ratio
    #[serde(with = "crate::types::amount_serde", default = "default_decrease_rate_base")]
    pub decrease_rate_base: u128,
    /// Interval between decay boundaries, a multiple of 7
    #[serde(default = "default_interval_days")]
    pub interval_days: u64,
    /// Floor the factor never decays below
    #[serde(with = "crate::types::amount_serde", default)]
    pub min_factor: u128,
    /// Compounding rule for multiple due boundaries
    #[serde(default)]
    pub compounding: Compounding,
}

fn default_initial_factor() -> u128 {
    INITIAL_FACTOR
}

fn default_decrease_rate() -> u128 {
    DECREASE_RATE
}

fn default_decrease_rate_base() -> u128 {
    DECREASE_RATE_BASE
}

fn default_interval_days() -> u64 {
    DEFAULT_INTERVAL_DAYS
}

impl Default for FactorSchedule {
    fn default() -> Self {
        Self {
            initial_factor: INITIAL_FACTOR,
            decrease_rate: DECREASE_RATE,
            decrease_rate_base: DECREASE_RATE_BASE,
            interval_days: DEFAULT_INTERVAL_DAYS,
            min_factor: 0,
            compounding: Compounding::Discrete,
        }
    }
}

impl FactorSchedule {
    pub fn validate(&self) -> Result<()> {
        if self.decrease_rate_base == 0 {
            return Err(PceError::InvalidConfig(
                "decrease_rate_base must be non-zero".into(),
            ));
        }
        if self.decrease_rate_base > SCALE {
            return Err(PceError::InvalidConfig(format!(
                "decrease_rate_base {} exceeds {}",
                self.decrease_rate_base, SCALE
            )));
        }
        if self.decrease_rate > self.decrease_rate_base {
            return Err(PceError::InvalidConfig(format!(
                "decrease_rate {} exceeds decrease_rate_base {}",
                self.decrease_rate, self.decrease_rate_base
            )));
        }
        if self.interval_days == 0 || self.interval_days % 7 != 0 {
            return Err(PceError::InvalidConfig(format!(
                "interval_days must be a positive multiple of 7, got {}",
                self.interval_days
            )));
        }
        if self.initial_factor == 0 || self.initial_factor < self.min_factor {
            return Err(PceError::InvalidConfig(format!(
                "initial_factor {} must be non-zero and at least min_factor {}",
                self.initial_factor, self.min_factor
            )));
        }
        Ok(())
    }
}

/// Persisted factor state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorState {
    pub current_factor: u128,
    /// Factor immediately before the most recent decay step
    pub last_modified_factor: u128,
    /// Last consumed decay boundary (genesis time before the first decay)
    pub last_decrease_time: Timestamp,
}

impl FactorState {
    pub fn genesis(schedule: &FactorSchedule, timestamp: Timestamp) -> Self {
        Self {
            current_factor: schedule.initial_factor,
            last_modified_factor: schedule.initial_factor,
            last_decrease_time: timestamp,
        }
    }
}

/// Outcome of evaluating pending decay
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorUpdate {
    /// Factor before evaluation
    pub previous: u128,
    /// State after applying every due step
    pub state: FactorState,
    /// Boundaries consumed
    pub steps: u64,
}

impl FactorUpdate {
    pub fn current(&self) -> u128 {
        self.state.current_factor
    }

    pub fn is_noop(&self) -> bool {
        self.steps == 0
    }
}

/// Boundaries folded one at a time before the rest is exponentiated
pub const MAX_DISCRETE_STEPS: u64 = 1_024;

/// Apply every decay step due by `now` to `state` without persisting it
///
/// Discrete compounding floors once per boundary for the first
/// [`MAX_DISCRETE_STEPS`] boundaries; any beyond that are applied as one
/// exponentiated step.
pub fn decayed_factor(
    state: &FactorState,
    schedule: &FactorSchedule,
    now: Timestamp,
) -> Result<FactorUpdate> {
    let due = clock::count_boundaries(state.last_decrease_time, now, schedule.interval_days);
    let mut next = *state;
    if due.count == 0 {
        return Ok(FactorUpdate {
            previous: state.current_factor,
            state: next,
            steps: 0,
        });
    }

    match schedule.compounding {
        Compounding::Discrete => {
            let mut factor = state.current_factor;
            let stepped_count = due.count.min(MAX_DISCRETE_STEPS);
            for _ in 0..stepped_count {
                if factor <= schedule.min_factor {
                    break;
                }
                let stepped = mul_div(
                    factor,
                    schedule.decrease_rate,
                    schedule.decrease_rate_base,
                    "factor decay",
                )?
                .max(schedule.min_factor);
                if stepped == factor {
                    break;
                }
                next.last_modified_factor = factor;
                factor = stepped;
            }
            let remaining = due.count - stepped_count;
            if remaining > 0 && factor > schedule.min_factor {
                let ratio = ratio_pow(schedule.decrease_rate, schedule.decrease_rate_base, remaining)?;
                let tail = mul_div(factor, ratio, SCALE, "factor decay")?
                    .max(schedule.min_factor)
                    .min(factor);
                if tail != factor {
                    next.last_modified_factor = factor;
                    factor = tail;
                }
            }
            next.current_factor = factor;
        }
        Compounding::Exponentiated => {
            let ratio = ratio_pow(schedule.decrease_rate, schedule.decrease_rate_base, due.count)?;
            let factor = mul_div(state.current_factor, ratio, SCALE, "factor decay")?
                .max(schedule.min_factor)
                .min(state.current_factor);
            if factor != state.current_factor {
                next.last_modified_factor = state.current_factor;
            }
            next.current_factor = factor;
        }
    }
    next.last_decrease_time = due.last_boundary;

    Ok(FactorUpdate {
        previous: state.current_factor,
        state: next,
        steps: due.count,
    })
}

/// Owner of the global decaying factor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactorEngine {
    schedule: FactorSchedule,
    state: FactorState,
    epoch_time: Timestamp,
}

impl FactorEngine {
    /// Create an engine whose schedule starts at `genesis`
    pub fn new(schedule: FactorSchedule, genesis: Timestamp) -> Result<Self> {
        schedule.validate()?;
        let state = FactorState::genesis(&schedule, genesis);
        Ok(Self {
            schedule,
            state,
            epoch_time: genesis,
        })
    }

    /// Factor as of `now`, simulating pending decay without persisting it
    pub fn current_factor(&self, now: Timestamp) -> Result<u128> {
        Ok(self.pending(now)?.current())
    }

    /// Pending decay as of `now`
    pub fn pending(&self, now: Timestamp) -> Result<FactorUpdate> {
        decayed_factor(&self.state, &self.schedule, now)
    }

    /// Persist every decay step due by `now`
    pub fn update_factor_if_needed(&mut self, now: Timestamp) -> Result<FactorUpdate> {
        let update = self.pending(now)?;
        self.commit(&update);
        Ok(update)
    }

    /// Persist an update previously computed by [`pending`](Self::pending)
    pub fn commit(&mut self, update: &FactorUpdate) {
        if update.is_noop() {
            return;
        }
        debug!(
            previous = update.previous,
            current = update.current(),
            steps = update.steps,
            "factor decayed"
        );
        self.state = update.state;
    }

    /// True if a decay boundary has passed since the last persisted step
    pub fn is_update_due(&self, now: Timestamp) -> bool {
        clock::has_decrease_time_within(self.state.last_decrease_time, now, self.schedule.interval_days)
    }

    pub fn state(&self) -> &FactorState {
        &self.state
    }

    pub fn schedule(&self) -> &FactorSchedule {
        &self.schedule
    }

    /// Persisted factor, without pending decay
    pub fn stored_factor(&self) -> u128 {
        self.state.current_factor
    }

    pub fn last_modified_factor(&self) -> u128 {
        self.state.last_modified_factor
    }

    pub fn last_decrease_time(&self) -> Timestamp {
        self.state.last_decrease_time
    }

    /// Genesis timestamp of the schedule
    pub fn epoch_time(&self) -> Timestamp {
        self.epoch_time
    }
}
