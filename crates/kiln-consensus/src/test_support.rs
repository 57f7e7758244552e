//! Mocks shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kiln_core::constants::MINIMUM_DIFFICULTY;
use kiln_core::difficulty::calc_difficulty;
use kiln_core::forks::ChainConfig;
use kiln_core::traits::{ChainView, EpochData, PowOutput, PowPrimitive};
use kiln_core::types::{Address, Block, Hash256, Header};
use num_bigint::BigUint;

use crate::config::EngineConfig;
use crate::engine::PowEngine;

pub const GENESIS_TIME_MS: u64 = 1_600_000_000_000;
pub const GAS_LIMIT: u64 = 8_000_000;

// ------------------------------------------------------------------
// Mock: ChainView
// ------------------------------------------------------------------

pub struct MockChain {
    config: ChainConfig,
    blocks: HashMap<Hash256, Block>,
}

impl MockChain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            blocks: HashMap::new(),
        }
    }

    pub fn insert(&mut self, block: Block) {
        self.blocks.insert(block.hash(), block);
    }

    pub fn insert_header(&mut self, header: Header) {
        self.insert(Block::new(header, vec![], vec![]));
    }
}

impl ChainView for MockChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn get_header(&self, hash: &Hash256, number: u64) -> Option<Header> {
        self.get_block(hash, number).map(|b| b.header().clone())
    }

    fn get_block(&self, hash: &Hash256, number: u64) -> Option<Block> {
        self.blocks.get(hash).filter(|b| b.number() == number).cloned()
    }
}

// ------------------------------------------------------------------
// Mock: PowPrimitive
// ------------------------------------------------------------------

/// PoW stub: a seal is valid iff the nonce is even and the mix digest equals
/// [`stub_mix`] of the nonce. Optionally sleeps per call, by a pseudo-random
/// amount derived from the header hash.
#[derive(Default)]
pub struct StubPow {
    pub max_delay_us: u64,
    /// Time spent building each full dataset.
    pub dataset_delay: Duration,
    /// Hashing this nonce panics.
    pub panic_on_nonce: Option<u64>,
    pub light_calls: AtomicUsize,
    pub dataset_calls: AtomicUsize,
}

impl StubPow {
    pub fn with_delay(max_delay_us: u64) -> Self {
        Self {
            max_delay_us,
            ..Self::default()
        }
    }

    fn output(&self, hash: &Hash256, nonce: u64) -> PowOutput {
        if self.panic_on_nonce == Some(nonce) {
            panic!("stub hash failure at nonce {nonce}");
        }
        if self.max_delay_us > 0 {
            let spread = u64::from_le_bytes(hash.0[..8].try_into().unwrap());
            std::thread::sleep(Duration::from_micros(spread % self.max_delay_us));
        }
        let result = if nonce % 2 == 0 { Hash256::ZERO } else { Hash256([0xFF; 32]) };
        PowOutput {
            mix_digest: stub_mix(nonce),
            result,
        }
    }
}

pub fn stub_mix(nonce: u64) -> Hash256 {
    let mut mix = [0x5A; 32];
    mix[..8].copy_from_slice(&nonce.to_le_bytes());
    Hash256(mix)
}

impl PowPrimitive for StubPow {
    fn dataset_size(&self, _number: u64) -> u64 {
        1024
    }

    fn cache_size(&self, _number: u64) -> u64 {
        64
    }

    fn cache(&self, number: u64) -> Arc<EpochData> {
        Arc::new(EpochData {
            epoch: number / kiln_core::constants::EPOCH_LENGTH,
            size: 1024,
            data: vec![],
        })
    }

    fn dataset(&self, number: u64) -> Arc<EpochData> {
        self.dataset_calls.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(self.dataset_delay);
        self.cache(number)
    }

    fn hash_light(&self, _size: u64, _cache: &EpochData, hash: &Hash256, nonce: u64) -> PowOutput {
        self.light_calls.fetch_add(1, Ordering::Relaxed);
        self.output(hash, nonce)
    }

    fn hash_full(&self, _dataset: &EpochData, hash: &Hash256, nonce: u64) -> PowOutput {
        self.output(hash, nonce)
    }
}

// ------------------------------------------------------------------
// Chain building
// ------------------------------------------------------------------

pub fn stub_engine(config: EngineConfig) -> PowEngine {
    PowEngine::new(config, Arc::new(StubPow::default()))
}

pub fn genesis() -> Header {
    Header {
        number: 0,
        time_ms: GENESIS_TIME_MS,
        difficulty: BigUint::from(MINIMUM_DIFFICULTY),
        gas_limit: GAS_LIMIT,
        ..Header::default()
    }
}

/// A valid, stub-sealed child of `parent` stamped `dt_ms` later.
pub fn child(config: &ChainConfig, parent: &Header, dt_ms: u64) -> Header {
    let time_ms = parent.time_ms + dt_ms;
    Header {
        parent_hash: parent.hash(),
        coinbase: Address([0xC0; 20]),
        difficulty: calc_difficulty(config, time_ms, parent),
        number: parent.number + 1,
        gas_limit: parent.gas_limit,
        time_ms,
        mix_digest: stub_mix(0),
        nonce: 0,
        ..Header::default()
    }
}

/// `n` linked, stub-sealed headers on top of `parent`.
pub fn chain_of(config: &ChainConfig, parent: &Header, n: usize) -> Vec<Header> {
    let mut out: Vec<Header> = Vec::with_capacity(n);
    for _ in 0..n {
        let prev = out.last().unwrap_or(parent);
        let next = child(config, prev, 10_000);
        out.push(next);
    }
    out
}
