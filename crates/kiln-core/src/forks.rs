//! Chain configuration and height-pinned fork rules.
//!
//! [`ChainConfig`] records the activation height of every protocol fork the
//! engine knows about. A fork is active for block `n` when its activation
//! height is set and `<= n`.
//!
//! Two rules pin specific heights to specific content:
//!
//! - **DAO extra-data** ([`verify_dao_header_extra_data`]): the
//!   [`DAO_FORK_EXTRA_RANGE`] blocks starting at the DAO fork block must (or,
//!   on an opposing chain, must not) carry [`DAO_FORK_BLOCK_EXTRA`].
//! - **Fork-hash pinning** ([`verify_fork_hashes`]): the header at the gas
//!   reprice fork height must hash to the configured value.
//!
//! # Attack vectors
//!
//! - **Fork-side confusion:** without the DAO marker, a node could be fed a
//!   chain from the other side of the split. The marker makes the side
//!   visible in the first headers after the fork.

use serde::{Deserialize, Serialize};

use crate::constants::{DAO_FORK_BLOCK_EXTRA, DAO_FORK_EXTRA_RANGE};
use crate::error::ForkError;
use crate::types::{Hash256, Header};

/// Fork activation heights. `None` means the fork never activates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ChainConfig {
    pub homestead_block: Option<u64>,
    pub dao_fork_block: Option<u64>,
    /// Whether this chain follows the DAO fork (true) or opposes it (false).
    pub dao_fork_support: bool,
    /// Gas reprice fork.
    pub eip150_block: Option<u64>,
    /// Expected header hash at `eip150_block`. Zero disables the pin.
    pub eip150_hash: Hash256,
    pub eip155_block: Option<u64>,
    /// State-clearing fork; selects the intermediate-root mode on finalize.
    pub eip158_block: Option<u64>,
    pub byzantium_block: Option<u64>,
}

fn is_forked(activation: Option<u64>, number: u64) -> bool {
    activation.is_some_and(|at| at <= number)
}

impl ChainConfig {
    /// Historical mainnet activation heights.
    pub fn mainnet() -> Self {
        Self {
            homestead_block: Some(1_150_000),
            dao_fork_block: Some(1_920_000),
            dao_fork_support: true,
            eip150_block: Some(2_463_000),
            eip150_hash: Hash256::ZERO,
            eip155_block: Some(2_675_000),
            eip158_block: Some(2_675_000),
            byzantium_block: Some(4_370_000),
        }
    }

    /// Every fork active from genesis. No DAO fork, no hash pin.
    pub fn all_forks() -> Self {
        Self {
            homestead_block: Some(0),
            dao_fork_block: None,
            dao_fork_support: false,
            eip150_block: Some(0),
            eip150_hash: Hash256::ZERO,
            eip155_block: Some(0),
            eip158_block: Some(0),
            byzantium_block: Some(0),
        }
    }

    /// No forks at all: Frontier rules forever.
    pub fn frontier_only() -> Self {
        Self::default()
    }

    pub fn is_homestead(&self, number: u64) -> bool {
        is_forked(self.homestead_block, number)
    }

    pub fn is_dao_fork(&self, number: u64) -> bool {
        is_forked(self.dao_fork_block, number)
    }

    pub fn is_eip150(&self, number: u64) -> bool {
        is_forked(self.eip150_block, number)
    }

    pub fn is_eip155(&self, number: u64) -> bool {
        is_forked(self.eip155_block, number)
    }

    pub fn is_eip158(&self, number: u64) -> bool {
        is_forked(self.eip158_block, number)
    }

    pub fn is_byzantium(&self, number: u64) -> bool {
        is_forked(self.byzantium_block, number)
    }
}

/// Check the DAO fork extra-data marker.
///
/// Inside `[dao_fork_block, dao_fork_block + DAO_FORK_EXTRA_RANGE)` a
/// supporting chain requires `extra == DAO_FORK_BLOCK_EXTRA`, and an opposing
/// chain forbids it. Outside that range, or with no DAO block configured,
/// every header passes.
///
/// # Errors
///
/// [`ForkError::BadProDaoExtra`] or [`ForkError::BadNoDaoExtra`].
pub fn verify_dao_header_extra_data(config: &ChainConfig, header: &Header) -> Result<(), ForkError> {
    let Some(dao_block) = config.dao_fork_block else {
        return Ok(());
    };
    let limit = dao_block.saturating_add(DAO_FORK_EXTRA_RANGE);
    if header.number < dao_block || header.number >= limit {
        return Ok(());
    }
    let marked = header.extra.as_slice() == DAO_FORK_BLOCK_EXTRA;
    if config.dao_fork_support {
        if !marked {
            return Err(ForkError::BadProDaoExtra);
        }
    } else if marked {
        return Err(ForkError::BadNoDaoExtra);
    }
    Ok(())
}

/// Check that a header at a pinned fork height has the pinned hash.
///
/// Uncles are exempt: they never become canonical at the pinned height.
///
/// # Errors
///
/// [`ForkError::ForkHashMismatch`] when the hash differs from the pin.
pub fn verify_fork_hashes(config: &ChainConfig, header: &Header, uncle: bool) -> Result<(), ForkError> {
    if uncle {
        return Ok(());
    }
    if config.eip150_block == Some(header.number) && !config.eip150_hash.is_zero() {
        let have = header.hash();
        if have != config.eip150_hash {
            return Err(ForkError::ForkHashMismatch {
                have,
                want: config.eip150_hash,
            });
        }
    }
    Ok(())
}
