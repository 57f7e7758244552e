//! Block and uncle reward accumulation.
//!
//! The base reward depends on the active fork:
//! - before Byzantium: [`FRONTIER_BLOCK_REWARD`] (5 KLN)
//! - from Byzantium: [`BYZANTIUM_BLOCK_REWARD`] (3 KLN)
//!
//! Each included uncle pays its own coinbase `R * (8 - d) / 8`, where `d` is
//! how many generations behind the including block it is, and adds `R / 32`
//! to the including block's reward. Division truncates throughout.
//!
//! | Uncle distance | Uncle share of R |
//! |---|---|
//! | 1 | 7/8 |
//! | 2 | 6/8 |
//! | ... | ... |
//! | 7 | 1/8 |

use num_bigint::BigUint;

use crate::constants::{BYZANTIUM_BLOCK_REWARD, FRONTIER_BLOCK_REWARD};
use crate::forks::ChainConfig;
use crate::traits::AccountState;
use crate::types::Header;

/// Base mining reward (in wei) for a block at `number`.
pub fn block_reward(config: &ChainConfig, number: u64) -> BigUint {
    if config.is_byzantium(number) {
        BigUint::from(BYZANTIUM_BLOCK_REWARD)
    } else {
        BigUint::from(FRONTIER_BLOCK_REWARD)
    }
}

/// Reward paid to an uncle at `uncle_number` included by a block at
/// `header_number`: `(uncle_number + 8 - header_number) * reward / 8`.
///
/// Uncles more than 8 generations back earn nothing. Validated uncles are
/// always 1 to 7 generations back.
pub fn uncle_reward(reward: &BigUint, uncle_number: u64, header_number: u64) -> BigUint {
    let weight = uncle_number.saturating_add(8).saturating_sub(header_number);
    reward * weight / 8u32
}

/// Bonus the including block earns per uncle: `reward / 32`.
pub fn nephew_reward(reward: &BigUint) -> BigUint {
    reward / 32u32
}

/// Credit the block and uncle rewards for `header` to `state`.
///
/// Every uncle's coinbase is credited first, in order; the header's coinbase
/// is credited once at the end with the base reward plus all nephew bonuses.
pub fn accumulate_rewards(
    config: &ChainConfig,
    state: &mut dyn AccountState,
    header: &Header,
    uncles: &[Header],
) {
    let base = block_reward(config, header.number);
    let mut reward = base.clone();
    for uncle in uncles {
        let paid = uncle_reward(&base, uncle.number, header.number);
        state.add_balance(&uncle.coinbase, &paid);
        reward += nephew_reward(&base);
    }
    state.add_balance(&header.coinbase, &reward);
}
