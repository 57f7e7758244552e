//! The proof-of-work consensus engine.
//!
//! [`PowEngine`] verifies headers, uncles and seals, prepares and finalizes
//! blocks, and owns the mining state used by the sealer (`sealer.rs`) and the
//! batch verifier (`batch.rs`).
//!
//! Header checks run in a fixed order and stop at the first failure:
//!
//! 1. extra-data length
//! 2. timestamp (future bound for non-uncles, strictly after parent)
//! 3. difficulty equals the calculated value
//! 4. gas limit cap, gas used, gas limit bound and floor
//! 5. number continuity
//! 6. seal (optional)
//! 7. DAO extra-data and fork-hash pinning
//!
//! # Attack vectors
//!
//! - **Timestamp drift:** a miner stamping blocks far ahead lowers the
//!   difficulty of its own chain. Non-uncle headers more than
//!   [`ALLOWED_FUTURE_BLOCK_TIME_MS`] ahead of the local clock are rejected.
//! - **Uncle farming:** uncles are limited to [`MAX_UNCLES`] per block, must
//!   attach to one of the last [`UNCLE_ANCESTRY_DEPTH`] ancestors and may be
//!   included only once across that window.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_core::constants::{
    ALLOWED_FUTURE_BLOCK_TIME_MS, EPOCH_LENGTH, GAS_LIMIT_BOUND_DIVISOR, MAX_EPOCH, MAX_GAS_LIMIT,
    MAX_UNCLES, MAXIMUM_EXTRA_DATA_SIZE, MIN_GAS_LIMIT, UNCLE_ANCESTRY_DEPTH,
};
use kiln_core::difficulty;
use kiln_core::error::ConsensusError;
use kiln_core::forks::{verify_dao_header_extra_data, verify_fork_hashes};
use kiln_core::reward::accumulate_rewards;
use kiln_core::traits::{AccountState, ChainView, PowPrimitive};
use kiln_core::types::{Address, Block, Hash256, Header, Transaction};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::config::{EngineConfig, PowMode};
use crate::hashrate::Hashrate;

/// `2^256`: the PoW target for difficulty 1.
pub fn two_256() -> BigUint {
    BigUint::one() << 256u32
}

/// PoW target for `difficulty`: `2^256 / difficulty`. `None` for zero.
pub fn target_for(difficulty: &BigUint) -> Option<BigUint> {
    if difficulty.is_zero() {
        return None;
    }
    Some(two_256() / difficulty)
}

fn system_clock_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

pub(crate) struct Inner {
    pub(crate) config: EngineConfig,
    pub(crate) pow: Arc<dyn PowPrimitive>,
    clock: Box<dyn Fn() -> u64 + Send + Sync>,
    /// Configured mining worker count.
    pub(crate) threads: Mutex<i32>,
    /// Notifies running sealing sessions of worker count changes.
    pub(crate) threads_tx: watch::Sender<i32>,
    /// Seeded on first use.
    pub(crate) rng: Mutex<Option<StdRng>>,
    pub(crate) hashrate: Hashrate,
    pub(crate) active_workers: AtomicUsize,
}

/// The proof-of-work engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct PowEngine {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for PowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowEngine")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl PowEngine {
    /// Create an engine using the system clock.
    pub fn new(config: EngineConfig, pow: Arc<dyn PowPrimitive>) -> Self {
        Self::with_clock(config, pow, system_clock_ms)
    }

    /// Create an engine with a custom millisecond clock for testing.
    pub fn with_clock(
        config: EngineConfig,
        pow: Arc<dyn PowPrimitive>,
        clock: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        let threads = config.threads;
        let (threads_tx, _) = watch::channel(threads);
        Self {
            inner: Arc::new(Inner {
                config,
                pow,
                clock: Box::new(clock),
                threads: Mutex::new(threads),
                threads_tx,
                rng: Mutex::new(None),
                hashrate: Hashrate::new(),
                active_workers: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Reward recipient of the block.
    pub fn author(&self, header: &Header) -> Address {
        header.coinbase
    }

    /// Configured mining worker count.
    pub fn threads(&self) -> i32 {
        *self.inner.threads.lock()
    }

    /// Change the mining worker count. Running sealing sessions restart
    /// with the new count.
    pub fn set_threads(&self, threads: i32) {
        let mut current = self.inner.threads.lock();
        *current = threads;
        self.inner.threads_tx.send_replace(threads);
    }

    /// Mining hashrate meter.
    pub fn hashrate(&self) -> &Hashrate {
        &self.inner.hashrate
    }

    /// Number of mining workers currently running.
    pub fn mining_workers(&self) -> usize {
        self.inner.active_workers.load(Ordering::Acquire)
    }

    /// Difficulty a child of `parent` stamped at `time_ms` must carry.
    pub fn calc_difficulty(&self, chain: &dyn ChainView, time_ms: u64, parent: &Header) -> BigUint {
        difficulty::calc_difficulty(chain.config(), time_ms, parent)
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Verify a single header against its parent in `chain`.
    ///
    /// Headers already present in the chain pass without further checks.
    pub fn verify_header(&self, chain: &dyn ChainView, header: &Header, seal: bool) -> Result<(), ConsensusError> {
        if self.inner.config.pow_mode == PowMode::FullFake {
            return Ok(());
        }
        if chain.get_header(&header.hash(), header.number).is_some() {
            return Ok(());
        }
        let parent = parent_of(chain, header).ok_or(ConsensusError::UnknownAncestor)?;
        self.verify_header_with_parent(chain, header, &parent, false, seal)
    }

    /// Apply the header rule set to `header` given its `parent`.
    pub fn verify_header_with_parent(
        &self,
        chain: &dyn ChainView,
        header: &Header,
        parent: &Header,
        uncle: bool,
        seal: bool,
    ) -> Result<(), ConsensusError> {
        if header.extra.len() > MAXIMUM_EXTRA_DATA_SIZE {
            return Err(ConsensusError::ExtraDataTooLong {
                len: header.extra.len(),
                max: MAXIMUM_EXTRA_DATA_SIZE,
            });
        }

        // Uncle timestamps are bounded by the width of the field itself.
        if !uncle {
            let now = (self.inner.clock)();
            if header.time_ms > now.saturating_add(ALLOWED_FUTURE_BLOCK_TIME_MS) {
                return Err(ConsensusError::FutureBlock);
            }
        }
        if header.time_ms <= parent.time_ms {
            return Err(ConsensusError::TimestampNotIncreasing);
        }

        let expected = self.calc_difficulty(chain, header.time_ms, parent);
        if expected != header.difficulty {
            return Err(ConsensusError::InvalidDifficulty {
                have: header.difficulty.clone(),
                want: expected,
            });
        }

        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(ConsensusError::GasLimitTooHigh {
                have: header.gas_limit,
                max: MAX_GAS_LIMIT,
            });
        }
        if header.gas_used > header.gas_limit {
            return Err(ConsensusError::InvalidGasUsed {
                have: header.gas_used,
                limit: header.gas_limit,
            });
        }
        let bound = parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR;
        if header.gas_limit.abs_diff(parent.gas_limit) >= bound || header.gas_limit < MIN_GAS_LIMIT {
            return Err(ConsensusError::InvalidGasLimit {
                have: header.gas_limit,
                parent: parent.gas_limit,
                bound,
            });
        }

        if parent.number.checked_add(1) != Some(header.number) {
            return Err(ConsensusError::InvalidBlockNumber);
        }

        if seal {
            self.verify_seal(header)?;
        }

        verify_dao_header_extra_data(chain.config(), header)?;
        verify_fork_hashes(chain.config(), header, uncle)?;
        Ok(())
    }

    /// Verify the uncles of `block`.
    ///
    /// Each uncle must be unique within the last [`UNCLE_ANCESTRY_DEPTH`]
    /// generations, must not be an ancestor, and must attach to an ancestor
    /// other than the block's own parent.
    pub fn verify_uncles(&self, chain: &dyn ChainView, block: &Block) -> Result<(), ConsensusError> {
        if self.inner.config.pow_mode == PowMode::FullFake {
            return Ok(());
        }
        if block.uncles().len() > MAX_UNCLES {
            return Err(ConsensusError::TooManyUncles);
        }
        if block.uncles().is_empty() {
            return Ok(());
        }

        let mut seen: HashSet<Hash256> = HashSet::new();
        let mut ancestors: HashMap<Hash256, Header> = HashMap::new();

        let mut parent_hash = block.parent_hash();
        let mut number = block.number().checked_sub(1);
        for _ in 0..UNCLE_ANCESTRY_DEPTH {
            let Some(n) = number else { break };
            let Some(ancestor) = chain.get_block(&parent_hash, n) else {
                break;
            };
            seen.extend(ancestor.uncles().iter().map(Header::hash));
            parent_hash = ancestor.parent_hash();
            number = n.checked_sub(1);
            ancestors.insert(ancestor.hash(), ancestor.header().clone());
        }
        ancestors.insert(block.hash(), block.header().clone());
        seen.insert(block.hash());

        for uncle in block.uncles() {
            let hash = uncle.hash();
            if !seen.insert(hash) {
                return Err(ConsensusError::DuplicateUncle);
            }
            if ancestors.contains_key(&hash) {
                return Err(ConsensusError::UncleIsAncestor);
            }
            let Some(uncle_parent) = ancestors.get(&uncle.parent_hash) else {
                return Err(ConsensusError::DanglingUncle);
            };
            if uncle.parent_hash == block.parent_hash() {
                return Err(ConsensusError::DanglingUncle);
            }
            self.verify_header_with_parent(chain, uncle, uncle_parent, true, true)?;
        }
        Ok(())
    }

    /// Check the header's PoW seal.
    ///
    /// In fake modes the PoW is not evaluated: verification sleeps for the
    /// configured delay and fails only at the configured height.
    pub fn verify_seal(&self, header: &Header) -> Result<(), ConsensusError> {
        let config = &self.inner.config;
        if config.pow_mode.is_fake() {
            let delay = config.fake_delay();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            if config.fake_fail == Some(header.number) {
                return Err(ConsensusError::InvalidPoW);
            }
            return Ok(());
        }

        if header.number / EPOCH_LENGTH >= MAX_EPOCH {
            return Err(ConsensusError::NonceOutOfRange);
        }
        let Some(target) = target_for(&header.difficulty) else {
            return Err(ConsensusError::NonPositiveDifficulty);
        };

        let pow = &self.inner.pow;
        let cache = pow.cache(header.number);
        let size = match config.pow_mode {
            PowMode::Test => config.test_dataset_size,
            _ => pow.dataset_size(header.number),
        };
        let output = pow.hash_light(size, &cache, &header.hash_no_nonce(), header.nonce);

        if output.mix_digest != header.mix_digest {
            return Err(ConsensusError::InvalidMixDigest);
        }
        if output.result.to_biguint() > target {
            return Err(ConsensusError::InvalidPoW);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Block assembly
    // ------------------------------------------------------------------

    /// Fill in the difficulty of an unsealed header from its parent.
    pub fn prepare(&self, chain: &dyn ChainView, header: &mut Header) -> Result<(), ConsensusError> {
        let parent = parent_of(chain, header).ok_or(ConsensusError::UnknownAncestor)?;
        header.difficulty = self.calc_difficulty(chain, header.time_ms, &parent);
        Ok(())
    }

    /// Credit rewards, set the state root and assemble the block.
    pub fn finalize(
        &self,
        chain: &dyn ChainView,
        mut header: Header,
        state: &mut dyn AccountState,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
    ) -> Block {
        let config = chain.config();
        accumulate_rewards(config, state, &header, &uncles);
        header.root = state.intermediate_root(config.is_eip158(header.number));
        trace!(number = header.number, uncles = uncles.len(), "finalized block");
        Block::new(header, transactions, uncles)
    }

    pub(crate) fn log_rejection(&self, header: &Header, err: &ConsensusError) {
        debug!(number = header.number, hash = %header.hash(), error = %err, "rejected header");
    }
}

/// Resolve the parent of `header` in `chain`.
pub(crate) fn parent_of(chain: &dyn ChainView, header: &Header) -> Option<Header> {
    let number = header.number.checked_sub(1)?;
    chain.get_header(&header.parent_hash, number)
}
