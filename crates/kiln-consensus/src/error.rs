//! Engine-level errors that are not validation verdicts.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("failed to seed nonce generator: {0}")] NonceSeed(String),
    #[error("cannot seal a header with zero difficulty")] ZeroDifficulty,
    #[error("block {number} lies beyond the last supported epoch")] EpochOutOfRange { number: u64 },
    #[error("epoch data preparation failed: {0}")] EpochData(String),
}
