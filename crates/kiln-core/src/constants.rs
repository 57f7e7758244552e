//! Protocol constants. All rewards in wei (1 KLN = 10^18 wei).
//!
//! These are fork-era consensus values. Changing any of them splits the
//! chain; they are reproduced bit-exact from the historical parameter set.

pub const WEI_PER_COIN: u64 = 1_000_000_000_000_000_000;

/// Base block reward before the Byzantium fork (5 KLN).
pub const FRONTIER_BLOCK_REWARD: u64 = 5 * WEI_PER_COIN;

/// Base block reward from the Byzantium fork onwards (3 KLN).
pub const BYZANTIUM_BLOCK_REWARD: u64 = 3 * WEI_PER_COIN;

/// Maximum number of uncle headers a block may include.
pub const MAX_UNCLES: usize = 2;

/// Number of ancestors (starting at the parent) searched for uncle parents.
///
/// Bounds how far back an uncle may attach: the uncle's parent must be one of
/// these ancestors, so uncles are between 2 and 7 generations behind the
/// including block.
pub const UNCLE_ANCESTRY_DEPTH: usize = 7;

/// Maximum header extra-data length in bytes.
pub const MAXIMUM_EXTRA_DATA_SIZE: usize = 32;

/// How far into the future (milliseconds) a non-uncle header may be stamped.
pub const ALLOWED_FUTURE_BLOCK_TIME_MS: u64 = 15_000;

pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;
pub const MIN_GAS_LIMIT: u64 = 5000;
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// Bound divisor of the difficulty, used in the update calculations.
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2048;

/// The minimum that the difficulty may ever be.
pub const MINIMUM_DIFFICULTY: u64 = 131_072;

/// Frontier block-time threshold (seconds) deciding increase vs decrease.
pub const DURATION_LIMIT: u64 = 13;

/// Blocks per difficulty-bomb period.
pub const EXP_DIFF_PERIOD: u64 = 100_000;

/// Byzantium bomb delay: the bomb counts from `parent.number - 2_999_999`.
pub const BYZANTIUM_BOMB_DELAY: u64 = 2_999_999;

/// Lower bound on the main difficulty adjustment factor (Homestead onwards).
pub const MIN_ADJUSTMENT_FACTOR: i64 = -99;

/// Homestead block-time divisor.
pub const HOMESTEAD_TIME_DIVISOR: u64 = 10;

/// Byzantium block-time divisor.
pub const BYZANTIUM_TIME_DIVISOR: u64 = 9;

/// Blocks per PoW epoch. Every block in an epoch shares one dataset.
pub const EPOCH_LENGTH: u64 = 30_000;

/// Highest epoch for which dataset sizes are supported.
pub const MAX_EPOCH: u64 = 2048;

pub const DATASET_INIT_BYTES: u64 = 1 << 30;
pub const DATASET_GROWTH_BYTES: u64 = 1 << 23;
pub const CACHE_INIT_BYTES: u64 = 1 << 24;
pub const CACHE_GROWTH_BYTES: u64 = 1 << 17;
pub const MIX_BYTES: u64 = 128;
pub const HASH_BYTES: u64 = 64;

/// Dataset size used by the light verifier in test mode.
pub const TEST_DATASET_SIZE: u64 = 32 * 1024;

/// Worker attempts accumulated before being reported to the hashrate meter.
pub const HASHRATE_REPORT_INTERVAL: u64 = 1 << 15;

/// Number of blocks, starting at the DAO fork block, that must carry the
/// fork marker in their extra-data.
pub const DAO_FORK_EXTRA_RANGE: u64 = 10;

/// Extra-data marker carried by pro-fork blocks in the DAO range.
pub const DAO_FORK_BLOCK_EXTRA: &[u8] = b"dao-hard-fork";
