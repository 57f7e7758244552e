//! Reference SHA-256 proof-of-work primitive with an epoch cache.
//!
//! [`Sha256Pow`] is a deterministic, cheap stand-in for a memory-hard PoW
//! function. It keeps the interface of the real thing: epoch-keyed cache and
//! dataset handles, light and full evaluation producing identical output,
//! and sizes that follow the growth schedule.
//!
//! | Quantity | Definition |
//! |---|---|
//! | epoch seed | SHA-256 applied `epoch` times to the zero hash |
//! | mix digest | `SHA-256(seed ‖ size ‖ header-hash ‖ nonce)` |
//! | result | `SHA-256(header-hash ‖ nonce ‖ mix)` |
//!
//! Integers are little-endian. Handles are `Arc<EpochData>`; the most recent
//! [`RETAINED_EPOCHS`] of each kind are kept, and a hash call holds its own
//! strong reference, so eviction never invalidates an in-flight call.

use std::collections::VecDeque;
use std::sync::Arc;

use kiln_core::constants::{
    CACHE_GROWTH_BYTES, CACHE_INIT_BYTES, DATASET_GROWTH_BYTES, DATASET_INIT_BYTES, EPOCH_LENGTH,
    HASH_BYTES, MIX_BYTES,
};
use kiln_core::traits::{EpochData, PowOutput, PowPrimitive};
use kiln_core::types::Hash256;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Epoch handles retained per kind.
pub const RETAINED_EPOCHS: usize = 3;

/// Bounded most-recently-used store of epoch handles.
#[derive(Debug, Default)]
struct EpochCache {
    entries: VecDeque<Arc<EpochData>>,
}

impl EpochCache {
    fn get_or_build(&mut self, epoch: u64, build: impl FnOnce() -> EpochData) -> Arc<EpochData> {
        if let Some(pos) = self.entries.iter().position(|e| e.epoch == epoch) {
            if let Some(entry) = self.entries.remove(pos) {
                self.entries.push_back(Arc::clone(&entry));
                return entry;
            }
        }
        let entry = Arc::new(build());
        self.entries.push_back(Arc::clone(&entry));
        while self.entries.len() > RETAINED_EPOCHS {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(epoch = evicted.epoch, "evicted epoch data");
            }
        }
        entry
    }

    fn epochs(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.epoch).collect()
    }
}

/// SHA-256 based PoW primitive.
#[derive(Debug, Default)]
pub struct Sha256Pow {
    caches: Mutex<EpochCache>,
    datasets: Mutex<EpochCache>,
}

impl Sha256Pow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Epochs whose caches are currently retained, oldest first.
    pub fn cached_epochs(&self) -> Vec<u64> {
        self.caches.lock().epochs()
    }

    fn build(&self, number: u64, size: u64) -> EpochData {
        let epoch = number / EPOCH_LENGTH;
        debug!(epoch, size, "generating epoch data");
        EpochData {
            epoch,
            size,
            data: seed_hash(epoch).0.to_vec(),
        }
    }
}

/// Seed for `epoch`: SHA-256 applied `epoch` times to the zero hash.
pub fn seed_hash(epoch: u64) -> Hash256 {
    let mut seed = [0u8; 32];
    for _ in 0..epoch {
        seed = Sha256::digest(seed).into();
    }
    Hash256(seed)
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut i = 3u64;
    while i <= n / i {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// `init + growth * epoch - item`, walked down by two items until the item
/// count is prime. Saturates instead of wrapping for absurd epochs.
fn grown_size(init: u64, growth: u64, item: u64, epoch: u64) -> u64 {
    let step = item.saturating_mul(2);
    let mut size = init.saturating_add(growth.saturating_mul(epoch)).saturating_sub(item);
    while size >= step && !is_prime(size / item) {
        size -= step;
    }
    size
}

fn evaluate(seed: &[u8], size: u64, hash: &Hash256, nonce: u64) -> PowOutput {
    let mix: [u8; 32] = Sha256::new()
        .chain_update(seed)
        .chain_update(size.to_le_bytes())
        .chain_update(hash.as_bytes())
        .chain_update(nonce.to_le_bytes())
        .finalize()
        .into();
    let result: [u8; 32] = Sha256::new()
        .chain_update(hash.as_bytes())
        .chain_update(nonce.to_le_bytes())
        .chain_update(mix)
        .finalize()
        .into();
    PowOutput {
        mix_digest: Hash256(mix),
        result: Hash256(result),
    }
}

impl PowPrimitive for Sha256Pow {
    fn dataset_size(&self, number: u64) -> u64 {
        grown_size(DATASET_INIT_BYTES, DATASET_GROWTH_BYTES, MIX_BYTES, number / EPOCH_LENGTH)
    }

    fn cache_size(&self, number: u64) -> u64 {
        grown_size(CACHE_INIT_BYTES, CACHE_GROWTH_BYTES, HASH_BYTES, number / EPOCH_LENGTH)
    }

    fn cache(&self, number: u64) -> Arc<EpochData> {
        // The cache is tagged with the dataset size it stands in for.
        let size = self.dataset_size(number);
        self.caches
            .lock()
            .get_or_build(number / EPOCH_LENGTH, || self.build(number, size))
    }

    fn dataset(&self, number: u64) -> Arc<EpochData> {
        let size = self.dataset_size(number);
        self.datasets
            .lock()
            .get_or_build(number / EPOCH_LENGTH, || self.build(number, size))
    }

    fn hash_light(&self, size: u64, cache: &EpochData, hash: &Hash256, nonce: u64) -> PowOutput {
        evaluate(&cache.data, size, hash, nonce)
    }

    fn hash_full(&self, dataset: &EpochData, hash: &Hash256, nonce: u64) -> PowOutput {
        evaluate(&dataset.data, dataset.size, hash, nonce)
    }
}
