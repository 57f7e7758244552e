//! Trait interfaces between the consensus engine and its collaborators.
//!
//! These traits define the contracts the engine consumes:
//! - [`ChainView`]: read-only header/block lookup plus fork configuration
//! - [`AccountState`]: balance credits and state-root computation
//! - [`PowPrimitive`]: the epoch-keyed proof-of-work hash function

use std::sync::Arc;

use num_bigint::BigUint;

use crate::forks::ChainConfig;
use crate::types::{Address, Block, Hash256, Header};

/// Read-only view of the local chain.
///
/// Lookups are keyed by `(hash, number)`; a lookup for a hash at the wrong
/// number returns `None`.
pub trait ChainView: Send + Sync {
    /// Fork activation heights of this chain.
    fn config(&self) -> &ChainConfig;

    /// Get a header by hash and number. Returns `None` if not found.
    fn get_header(&self, hash: &Hash256, number: u64) -> Option<Header>;

    /// Get a full block by hash and number. Returns `None` if not found.
    fn get_block(&self, hash: &Hash256, number: u64) -> Option<Block>;
}

/// Mutable account state touched during block finalization.
pub trait AccountState {
    /// Credit `amount` wei to `address`.
    fn add_balance(&mut self, address: &Address, amount: &BigUint);

    /// Compute the current state root.
    ///
    /// `delete_empty_objects` is set once the state-clearing fork is active.
    fn intermediate_root(&mut self, delete_empty_objects: bool) -> Hash256;
}

/// Epoch-keyed lookup data for the PoW function.
///
/// Light verification uses the (small) cache, mining the (large) dataset.
/// Both produce identical digests for the same input. Handles are shared as
/// `Arc<EpochData>`: a hash call keeps its own strong reference for as long
/// as it runs, so a provider may drop its copy at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochData {
    /// Epoch index (`number / EPOCH_LENGTH`).
    pub epoch: u64,
    /// Size in bytes of the full dataset this data represents.
    pub size: u64,
    /// Provider-defined contents.
    pub data: Vec<u8>,
}

/// Output of one PoW hash evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowOutput {
    /// Digest proving the dataset was consulted; sealed into the header.
    pub mix_digest: Hash256,
    /// Value compared (as a big-endian integer) against the target.
    pub result: Hash256,
}

/// The proof-of-work hash function and its epoch data provider.
///
/// Deterministic: equal inputs always give equal outputs, whether evaluated
/// through the light cache or the full dataset.
pub trait PowPrimitive: Send + Sync {
    /// Full dataset size in bytes for the epoch containing `number`.
    fn dataset_size(&self, number: u64) -> u64;

    /// Verification cache size in bytes for the epoch containing `number`.
    fn cache_size(&self, number: u64) -> u64;

    /// Verification cache for the epoch containing `number`. Built lazily.
    fn cache(&self, number: u64) -> Arc<EpochData>;

    /// Mining dataset for the epoch containing `number`. Built lazily.
    fn dataset(&self, number: u64) -> Arc<EpochData>;

    /// Evaluate the PoW using the light cache against a dataset of `size` bytes.
    fn hash_light(&self, size: u64, cache: &EpochData, hash: &Hash256, nonce: u64) -> PowOutput;

    /// Evaluate the PoW using the full dataset.
    fn hash_full(&self, dataset: &EpochData, hash: &Hash256, nonce: u64) -> PowOutput;
}
