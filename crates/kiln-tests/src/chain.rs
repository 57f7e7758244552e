//! In-memory chain and account ledger.

use std::collections::{BTreeMap, HashMap};

use kiln_core::forks::ChainConfig;
use kiln_core::traits::{AccountState, ChainView};
use kiln_core::types::{Address, Block, Hash256, Header, double_sha256};
use num_bigint::BigUint;
use parking_lot::RwLock;

/// Block store keyed by hash. Insertion takes `&self` so the chain can be
/// extended while shared with a running batch verification.
pub struct MemoryChain {
    config: ChainConfig,
    blocks: RwLock<HashMap<Hash256, Block>>,
}

impl MemoryChain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// A chain holding only `genesis`, with an empty body.
    pub fn with_genesis(config: ChainConfig, genesis: Header) -> Self {
        let chain = Self::new(config);
        chain.insert(Block::new(genesis, vec![], vec![]));
        chain
    }

    pub fn insert(&self, block: Block) {
        self.blocks.write().insert(block.hash(), block);
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl ChainView for MemoryChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn get_header(&self, hash: &Hash256, number: u64) -> Option<Header> {
        self.get_block(hash, number).map(|b| b.header().clone())
    }

    fn get_block(&self, hash: &Hash256, number: u64) -> Option<Block> {
        self.blocks
            .read()
            .get(hash)
            .filter(|b| b.number() == number)
            .cloned()
    }
}

/// Balances by address. The root is a hash over the sorted balances, so two
/// ledgers with the same balances share a root.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    balances: BTreeMap<Address, BigUint>,
    credits: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, address: &Address) -> BigUint {
        self.balances.get(address).cloned().unwrap_or_default()
    }

    /// Sum of every balance.
    pub fn supply(&self) -> BigUint {
        self.balances.values().sum()
    }

    /// Number of `add_balance` calls so far.
    pub fn credits(&self) -> usize {
        self.credits
    }
}

impl AccountState for Ledger {
    fn add_balance(&mut self, address: &Address, amount: &BigUint) {
        *self.balances.entry(*address).or_default() += amount;
        self.credits += 1;
    }

    fn intermediate_root(&mut self, delete_empty_objects: bool) -> Hash256 {
        if delete_empty_objects {
            self.balances.retain(|_, balance| *balance != BigUint::default());
        }
        let mut data = Vec::new();
        for (address, balance) in &self.balances {
            data.extend_from_slice(&address.0);
            data.extend_from_slice(&balance.to_bytes_be());
        }
        double_sha256(&data)
    }
}
