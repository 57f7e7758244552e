//! Shared helpers for the integration tests: genesis, block assembly and
//! mining through the engine.

use kiln_consensus::PowEngine;
use kiln_core::constants::MINIMUM_DIFFICULTY;
use kiln_core::types::{Address, Block, Header, Transaction};
use num_bigint::BigUint;
use tokio_util::sync::CancellationToken;

use crate::chain::{Ledger, MemoryChain};

pub const GENESIS_TIME_MS: u64 = 1_600_000_000_000;
pub const GAS_LIMIT: u64 = 8_000_000;

/// Seconds between consecutive blocks built by these helpers.
pub const BLOCK_INTERVAL_MS: u64 = 10_000;

/// Install a `RUST_LOG`-filtered subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Simple address from a seed byte.
pub fn miner(seed: u8) -> Address {
    Address([seed; 20])
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

/// Unsealed child of `parent` stamped `dt_ms` later, with the difficulty
/// filled in by [`PowEngine::prepare`].
pub fn prepared_child(
    engine: &PowEngine,
    chain: &MemoryChain,
    parent: &Header,
    dt_ms: u64,
    coinbase: Address,
) -> Header {
    let mut header = Header {
        parent_hash: parent.hash(),
        coinbase,
        number: parent.number + 1,
        gas_limit: parent.gas_limit,
        time_ms: parent.time_ms + dt_ms,
        ..Header::default()
    };
    engine
        .prepare(chain, &mut header)
        .expect("parent must be in the chain");
    header
}

/// Prepare, finalize and seal a child of `parent`. The block is not
/// inserted into the chain.
pub async fn mine_child(
    engine: &PowEngine,
    chain: &MemoryChain,
    ledger: &mut Ledger,
    parent: &Header,
    dt_ms: u64,
    coinbase: Address,
    uncles: Vec<Header>,
) -> Block {
    let header = prepared_child(engine, chain, parent, dt_ms, coinbase);
    let txs = vec![Transaction {
        payload: header.number.to_le_bytes().to_vec(),
    }];
    let block = engine.finalize(chain, header, ledger, txs, uncles);
    engine
        .seal(&block, CancellationToken::new())
        .await
        .expect("sealing failed")
        .expect("sealing stopped")
}

/// Mine `n` blocks on top of `parent`, inserting each into the chain.
/// Block `i` is credited to `miner(i)`.
pub async fn mine_chain(
    engine: &PowEngine,
    chain: &MemoryChain,
    ledger: &mut Ledger,
    parent: &Header,
    n: usize,
) -> Vec<Block> {
    let mut out: Vec<Block> = Vec::with_capacity(n);
    for i in 0..n {
        let prev = out.last().map(Block::header).unwrap_or(parent).clone();
        let block = mine_child(engine, chain, ledger, &prev, BLOCK_INTERVAL_MS, miner(i as u8), vec![]).await;
        chain.insert(block.clone());
        out.push(block);
    }
    out
}

/// Headers of `blocks`, in order.
pub fn headers_of(blocks: &[Block]) -> Vec<Header> {
    blocks.iter().map(|b| b.header().clone()).collect()
}

/// Drain a batch result stream.
pub async fn collect<T>(mut rx: tokio::sync::mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Some(r) = rx.recv().await {
        out.push(r);
    }
    out
}
