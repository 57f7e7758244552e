//! Mining sessions over the reference PoW primitive: cancellation, worker
//! accounting, restarts on thread-count changes and epoch cache reuse.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_consensus::{EngineConfig, EngineError, PowEngine, Sha256Pow};
use kiln_core::constants::EPOCH_LENGTH;
use kiln_core::forks::ChainConfig;
use kiln_core::types::{Block, Header, Transaction};
use kiln_tests::chain::MemoryChain;
use kiln_tests::helpers::*;
use num_bigint::BigUint;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine_with_threads(threads: i32) -> (PowEngine, Arc<Sha256Pow>) {
    let pow = Arc::new(Sha256Pow::new());
    let config = EngineConfig {
        threads,
        ..EngineConfig::test()
    };
    (PowEngine::new(config, pow.clone()), pow)
}

/// A block on genesis at the real (minimum) difficulty.
fn easy_block(engine: &PowEngine) -> Block {
    let g = genesis();
    let chain = MemoryChain::with_genesis(ChainConfig::all_forks(), g.clone());
    let header = prepared_child(engine, &chain, &g, BLOCK_INTERVAL_MS, miner(1));
    let txs = vec![Transaction { payload: b"tx".to_vec() }];
    Block::new(header, txs, vec![])
}

/// A block no worker will seal within the test.
fn hopeless_block(engine: &PowEngine) -> Block {
    let block = easy_block(engine);
    let mut header = block.header().clone();
    header.difficulty = BigUint::from(1u32) << 255;
    block.with_seal(header)
}

async fn wait_for_workers(engine: &PowEngine, want: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.mining_workers() != want {
        assert!(Instant::now() < deadline, "workers stuck at {}", engine.mining_workers());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sealed_block_keeps_body_and_verifies() {
    init_tracing();
    let (engine, _) = engine_with_threads(2);
    let block = easy_block(&engine);

    let sealed = engine
        .seal(&block, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sealed.transactions(), block.transactions());
    assert_eq!(sealed.uncles(), block.uncles());
    assert_eq!(sealed.header().hash_no_nonce(), block.header().hash_no_nonce());
    assert_eq!(engine.verify_seal(sealed.header()), Ok(()));
    assert_eq!(engine.mining_workers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_before_start_returns_none() {
    let (engine, _) = engine_with_threads(2);
    let block = hopeless_block(&engine);
    let stop = CancellationToken::new();
    stop.cancel();

    assert_eq!(engine.seal(&block, stop).await, Ok(None));
    assert_eq!(engine.mining_workers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_mid_search_joins_every_worker() {
    let (engine, _) = engine_with_threads(3);
    let block = hopeless_block(&engine);
    let stop = CancellationToken::new();

    let task = {
        let engine = engine.clone();
        let stop = stop.clone();
        tokio::spawn(async move { engine.seal(&block, stop).await })
    };
    wait_for_workers(&engine, 3).await;
    stop.cancel();

    assert_eq!(task.await.unwrap(), Ok(None));
    assert_eq!(engine.mining_workers(), 0);
    assert!(engine.hashrate().total() > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_difficulty_is_an_error() {
    let (engine, _) = engine_with_threads(1);
    let block = easy_block(&engine);
    let mut header = block.header().clone();
    header.difficulty = BigUint::default();

    assert_eq!(
        engine.seal(&block.with_seal(header), CancellationToken::new()).await,
        Err(EngineError::ZeroDifficulty)
    );
}

// ---------------------------------------------------------------------------
// Thread count
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn thread_change_restarts_session() {
    let (engine, _) = engine_with_threads(1);
    let block = hopeless_block(&engine);
    let stop = CancellationToken::new();

    let task = {
        let engine = engine.clone();
        let stop = stop.clone();
        tokio::spawn(async move { engine.seal(&block, stop).await })
    };
    wait_for_workers(&engine, 1).await;
    engine.set_threads(3);
    assert_eq!(engine.threads(), 3);
    wait_for_workers(&engine, 3).await;

    stop.cancel();
    assert_eq!(task.await.unwrap(), Ok(None));
    assert_eq!(engine.mining_workers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_miner_resumes_when_threads_set() {
    let (engine, _) = engine_with_threads(-1);
    let block = easy_block(&engine);

    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.seal(&block, CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.mining_workers(), 0);
    assert!(!task.is_finished());

    engine.set_threads(2);
    let sealed = tokio::time::timeout(Duration::from_secs(120), task)
        .await
        .expect("sealing did not finish")
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(engine.verify_seal(sealed.header()), Ok(()));
}

#[tokio::test]
async fn fake_mode_seals_instantly() {
    let engine = PowEngine::new(EngineConfig::fake(), Arc::new(Sha256Pow::new()));
    let block = hopeless_block(&engine);
    let sealed = engine
        .seal(&block, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sealed.header().nonce, 0);
    assert_eq!(engine.mining_workers(), 0);
    assert_eq!(engine.hashrate().total(), 0);
}

// ---------------------------------------------------------------------------
// Epoch cache
// ---------------------------------------------------------------------------

#[test]
fn verification_keeps_most_recent_epochs() {
    let (engine, pow) = engine_with_threads(1);
    for epoch in [0u64, 1, 2, 3, 2] {
        let header = Header {
            number: epoch * EPOCH_LENGTH + 5,
            difficulty: BigUint::from(1u32),
            ..Header::default()
        };
        // The seal is garbage; only the cache side effect matters here.
        let _ = engine.verify_seal(&header);
    }
    assert_eq!(pow.cached_epochs(), vec![1, 3, 2]);
}
