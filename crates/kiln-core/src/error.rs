//! Error types for the Kiln consensus engine.
use num_bigint::BigUint;
use thiserror::Error;

use crate::types::Hash256;

/// Violations of height-pinned fork rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForkError {
    #[error("bad DAO pro-fork extra-data")] BadProDaoExtra,
    #[error("bad DAO no-fork extra-data")] BadNoDaoExtra,
    #[error("fork hash mismatch at pinned height: have {have}, want {want}")] ForkHashMismatch { have: Hash256, want: Hash256 },
}

/// Header, uncle and seal verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("unknown ancestor")] UnknownAncestor,
    #[error("block in the future")] FutureBlock,
    #[error("timestamp equals parent's")] TimestampNotIncreasing,
    #[error("too many uncles")] TooManyUncles,
    #[error("duplicate uncle")] DuplicateUncle,
    #[error("uncle is ancestor")] UncleIsAncestor,
    #[error("uncle's parent is not ancestor")] DanglingUncle,
    #[error("nonce out of range")] NonceOutOfRange,
    #[error("non-positive difficulty")] NonPositiveDifficulty,
    #[error("invalid difficulty: have {have}, want {want}")] InvalidDifficulty { have: BigUint, want: BigUint },
    #[error("invalid gasLimit: have {have}, max {max}")] GasLimitTooHigh { have: u64, max: u64 },
    #[error("invalid gas limit: have {have}, want {parent} += {bound}")] InvalidGasLimit { have: u64, parent: u64, bound: u64 },
    #[error("invalid gasUsed: have {have}, gasLimit {limit}")] InvalidGasUsed { have: u64, limit: u64 },
    #[error("invalid block number")] InvalidBlockNumber,
    #[error("invalid mix digest")] InvalidMixDigest,
    #[error("invalid proof-of-work")] InvalidPoW,
    #[error("extra-data too long: {len} > {max}")] ExtraDataTooLong { len: usize, max: usize },
    #[error(transparent)] ForkRuleViolation(#[from] ForkError),
}
