//! Difficulty adjustment algorithm.
//!
//! The required difficulty of a block is a pure function of its timestamp,
//! its parent header and the fork active at the block's height. Three rule
//! generations exist and are selected most-recent-first on
//! `parent.number + 1`:
//!
//! | Rule | Main adjustment | Bomb period counter |
//! |---|---|---|
//! | Byzantium | `parent + parent/2048 * max(base - Δt/9, -99)`, base 2 with parent uncles else 1 | `max(0, parent.number - 2_999_999) / 100_000` |
//! | Homestead | `parent + parent/2048 * max(1 - Δt/10, -99)` | `(parent.number + 1) / 100_000` |
//! | Frontier | `parent ± parent/2048` (increase iff Δt < 13 s) | `(parent.number + 1) / 100_000` |
//!
//! Every rule clamps to [`MINIMUM_DIFFICULTY`] and then adds the exponential
//! "difficulty bomb" `2^(periods - 2)` once `periods > 1`.
//!
//! # Arithmetic
//!
//! All arithmetic is integer. Δt is the difference of the two timestamps
//! each truncated to whole seconds. Division of a signed Δt uses Euclidean
//! division (rounds toward negative infinity for the positive divisors used
//! here), which keeps results bit-exact with the reference big-integer
//! implementation even when a child is stamped before its parent.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};

use crate::constants::{
    BYZANTIUM_BOMB_DELAY, BYZANTIUM_TIME_DIVISOR, DIFFICULTY_BOUND_DIVISOR, DURATION_LIMIT,
    EXP_DIFF_PERIOD, HOMESTEAD_TIME_DIVISOR, MIN_ADJUSTMENT_FACTOR, MINIMUM_DIFFICULTY,
};
use crate::forks::ChainConfig;
use crate::types::{EMPTY_UNCLE_HASH, Header};

/// Compute the difficulty a child of `parent` stamped at `time_ms` must carry.
///
/// Selects the rule for the fork active at `parent.number + 1`.
pub fn calc_difficulty(config: &ChainConfig, time_ms: u64, parent: &Header) -> BigUint {
    let next = parent.number.saturating_add(1);
    if config.is_byzantium(next) {
        calc_difficulty_byzantium(time_ms, parent)
    } else if config.is_homestead(next) {
        calc_difficulty_homestead(time_ms, parent)
    } else {
        calc_difficulty_frontier(time_ms, parent)
    }
}

/// Byzantium rule: uncle-aware base, divisor 9, delayed bomb.
pub fn calc_difficulty_byzantium(time_ms: u64, parent: &Header) -> BigUint {
    let base: i128 = if parent.uncle_hash == *EMPTY_UNCLE_HASH { 1 } else { 2 };
    let x = base - elapsed_secs(time_ms, parent).div_euclid(BYZANTIUM_TIME_DIVISOR as i128);
    let mut diff = adjust(&parent.difficulty, x);

    let delayed = parent.number.saturating_sub(BYZANTIUM_BOMB_DELAY);
    diff += bomb(delayed / EXP_DIFF_PERIOD);
    diff
}

/// Homestead rule: divisor 10, undelayed bomb.
pub fn calc_difficulty_homestead(time_ms: u64, parent: &Header) -> BigUint {
    let x = 1 - elapsed_secs(time_ms, parent).div_euclid(HOMESTEAD_TIME_DIVISOR as i128);
    let mut diff = adjust(&parent.difficulty, x);

    diff += bomb(period_count(parent.number));
    diff
}

/// Frontier rule: fixed step up or down around a 13 second threshold.
pub fn calc_difficulty_frontier(time_ms: u64, parent: &Header) -> BigUint {
    let step = &parent.difficulty / DIFFICULTY_BOUND_DIVISOR;
    let mut diff = if elapsed_secs(time_ms, parent) < DURATION_LIMIT as i128 {
        &parent.difficulty + step
    } else {
        &parent.difficulty - step
    };
    let floor = minimum_difficulty();
    if diff < floor {
        diff = floor.clone();
    }

    diff += bomb(period_count(parent.number));
    diff.max(floor)
}

/// The protocol difficulty floor as a big integer.
pub fn minimum_difficulty() -> BigUint {
    BigUint::from(MINIMUM_DIFFICULTY)
}

/// Bomb period counter for the Frontier and Homestead rules.
pub fn period_count(parent_number: u64) -> u64 {
    parent_number.saturating_add(1) / EXP_DIFF_PERIOD
}

/// Exponential difficulty-bomb term: zero for `periods <= 1`, else
/// `2^(periods - 2)`.
pub fn bomb(periods: u64) -> BigUint {
    if periods <= 1 {
        return BigUint::zero();
    }
    BigUint::one() << (periods - 2)
}

/// Seconds elapsed between parent and child, each truncated to whole seconds.
fn elapsed_secs(time_ms: u64, parent: &Header) -> i128 {
    (time_ms / 1000) as i128 - (parent.time_ms / 1000) as i128
}

/// `parent + parent/2048 * max(x, -99)`, clamped to the difficulty floor.
fn adjust(parent_difficulty: &BigUint, x: i128) -> BigUint {
    let x = x.max(MIN_ADJUSTMENT_FACTOR as i128);
    let step = BigInt::from(parent_difficulty / DIFFICULTY_BOUND_DIVISOR);
    let diff = BigInt::from(parent_difficulty.clone()) + step * BigInt::from(x);

    let floor = minimum_difficulty();
    match diff.to_biguint() {
        Some(d) if d >= floor => d,
        _ => floor,
    }
}
