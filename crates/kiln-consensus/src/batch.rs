//! Parallel batch header verification with ordered results.
//!
//! [`PowEngine::verify_headers`] checks a run of headers where each header's
//! parent is either in the chain (for the first) or the previous header of
//! the batch. Work is spread over a pool of OS threads; results are streamed
//! back strictly in input order.
//!
//! # Layout
//!
//! ```text
//!   workers (≤ num_cpus) ── claim index ──► verify ──► slot[i] = result
//!                                                          │ notify
//!   reducer ◄───────────── wait on condvar ◄───────────────┘
//!      └── emit slot[next..] while filled ──► mpsc (input order)
//! ```
//!
//! Workers and the reducer share one small [`BatchState`] behind a mutex:
//! the next unclaimed index and the result slots. [`BatchAbort::abort`] stops
//! both claiming and emitting; a verification already in progress finishes
//! but its result is dropped.

use std::sync::Arc;
use std::time::Instant;

use kiln_core::error::ConsensusError;
use kiln_core::traits::ChainView;
use kiln_core::types::Header;
use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::PowMode;
use crate::engine::{PowEngine, parent_of};

/// Ordered stream of per-header verification results.
pub type BatchResults = mpsc::UnboundedReceiver<Result<(), ConsensusError>>;

struct BatchState {
    next_task: usize,
    slots: Vec<Option<Result<(), ConsensusError>>>,
    aborted: bool,
}

struct Shared {
    state: Mutex<BatchState>,
    progress: Condvar,
}

/// Held by a worker while it owns a claimed slot. Dropped before the slot is
/// filled (the worker panicked), it aborts the batch so the reducer never
/// waits on a result that will not come.
struct SlotGuard<'a> {
    shared: &'a Shared,
    index: usize,
    armed: bool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(index = self.index, "batch worker died before storing its result, aborting batch");
        let mut state = self.shared.state.lock();
        state.aborted = true;
        self.shared.progress.notify_all();
    }
}

/// Stops a running batch verification.
#[derive(Clone)]
pub struct BatchAbort {
    shared: Arc<Shared>,
}

impl BatchAbort {
    /// No further headers are started and no further results are emitted.
    pub fn abort(&self) {
        let mut state = self.shared.state.lock();
        state.aborted = true;
        self.shared.progress.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.state.lock().aborted
    }
}

impl PowEngine {
    /// Verify `headers` concurrently, streaming one result per header in
    /// input order.
    ///
    /// `seals[i]` selects whether header `i`'s seal is checked; a missing
    /// entry means it is. A failing header does not stop the others.
    pub fn verify_headers(
        &self,
        chain: Arc<dyn ChainView>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> (BatchAbort, BatchResults) {
        let total = headers.len();
        let shared = Arc::new(Shared {
            state: Mutex::new(BatchState {
                next_task: 0,
                slots: vec![None; total],
                aborted: false,
            }),
            progress: Condvar::new(),
        });
        let abort = BatchAbort {
            shared: Arc::clone(&shared),
        };
        let (tx, rx) = mpsc::unbounded_channel();

        if total == 0 || self.config().pow_mode == PowMode::FullFake {
            for _ in 0..total {
                let _ = tx.send(Ok(()));
            }
            return (abort, rx);
        }

        let headers = Arc::new(headers);
        let seals = Arc::new(seals);
        let workers = num_cpus::get().clamp(1, total);
        debug!(headers = total, workers, "verifying header batch");

        for _ in 0..workers {
            let engine = self.clone();
            let chain = Arc::clone(&chain);
            let headers = Arc::clone(&headers);
            let seals = Arc::clone(&seals);
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                engine.batch_worker(chain.as_ref(), &headers, &seals, &shared)
            });
        }

        std::thread::spawn(move || reduce(&shared, tx, total));
        (abort, rx)
    }

    fn batch_worker(&self, chain: &dyn ChainView, headers: &[Header], seals: &[bool], shared: &Shared) {
        loop {
            let index = {
                let mut state = shared.state.lock();
                if state.aborted || state.next_task >= headers.len() {
                    return;
                }
                state.next_task += 1;
                state.next_task - 1
            };

            let mut guard = SlotGuard {
                shared,
                index,
                armed: true,
            };

            let seal = seals.get(index).copied().unwrap_or(true);
            let result = self.verify_batch_item(chain, headers, index, seal);
            if let Err(err) = &result {
                self.log_rejection(&headers[index], err);
            }

            let mut state = shared.state.lock();
            guard.armed = false;
            if state.aborted {
                return;
            }
            state.slots[index] = Some(result);
            shared.progress.notify_all();
        }
    }

    fn verify_batch_item(
        &self,
        chain: &dyn ChainView,
        headers: &[Header],
        index: usize,
        seal: bool,
    ) -> Result<(), ConsensusError> {
        let header = &headers[index];
        let parent = match index {
            0 => parent_of(chain, header),
            _ => {
                let prev = &headers[index - 1];
                (prev.hash() == header.parent_hash).then(|| prev.clone())
            }
        };
        let Some(parent) = parent else {
            return Err(ConsensusError::UnknownAncestor);
        };
        if chain.get_header(&header.hash(), header.number).is_some() {
            return Ok(());
        }
        self.verify_header_with_parent(chain, header, &parent, false, seal)
    }
}

/// Emit filled slots in index order until every result is out, the batch is
/// aborted or the receiver is gone.
fn reduce(shared: &Shared, tx: mpsc::UnboundedSender<Result<(), ConsensusError>>, total: usize) {
    let started = Instant::now();
    let mut next = 0;
    let mut state = shared.state.lock();
    while next < total {
        while !state.aborted && state.slots[next].is_none() {
            shared.progress.wait(&mut state);
        }
        if state.aborted {
            debug!(emitted = next, total, "header batch aborted");
            return;
        }
        while next < total {
            let Some(result) = state.slots[next].take() else {
                break;
            };
            if tx.send(result).is_err() {
                state.aborted = true;
                shared.progress.notify_all();
                return;
            }
            next += 1;
        }
    }
    debug!(total, elapsed = ?started.elapsed(), "header batch verified");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::test_support::*;
    use kiln_core::forks::ChainConfig;
    use kiln_core::types::Hash256;
    use proptest::prelude::*;
    use std::time::Duration;

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn chain_with_genesis() -> (Arc<MockChain>, Header) {
        let mut chain = MockChain::new(ChainConfig::all_forks());
        let g = genesis();
        chain.insert_header(g.clone());
        (Arc::new(chain), g)
    }

    fn collect(mut rx: BatchResults) -> Vec<Result<(), ConsensusError>> {
        let mut out = Vec::new();
        while let Some(r) = rx.blocking_recv() {
            out.push(r);
        }
        out
    }

    fn sequential(engine: &PowEngine, chain: &MockChain, headers: &[Header], seals: &[bool]) -> Vec<Result<(), ConsensusError>> {
        (0..headers.len())
            .map(|i| engine.verify_batch_item(chain, headers, i, seals[i]))
            .collect()
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn empty_batch_yields_nothing() {
        let engine = stub_engine(EngineConfig::normal());
        let (chain, _) = chain_with_genesis();
        let (_, rx) = engine.verify_headers(chain, vec![], vec![]);
        assert!(collect(rx).is_empty());
    }

    #[test]
    fn full_fake_yields_all_ok_without_verifying() {
        let pow = Arc::new(StubPow::default());
        let engine = PowEngine::new(EngineConfig::full_fake(), pow.clone());
        let (chain, _) = chain_with_genesis();
        let headers = vec![Header::default(); 5];
        let (_, rx) = engine.verify_headers(chain, headers, vec![true; 5]);
        assert_eq!(collect(rx), vec![Ok(()); 5]);
        assert_eq!(pow.light_calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn valid_run_all_ok() {
        let engine = stub_engine(EngineConfig::normal());
        let (chain, g) = chain_with_genesis();
        let headers = chain_of(chain.config(), &g, 20);
        let (_, rx) = engine.verify_headers(chain, headers, vec![true; 20]);
        assert_eq!(collect(rx), vec![Ok(()); 20]);
    }

    #[test]
    fn broken_link_reports_unknown_ancestor_at_index() {
        let engine = stub_engine(EngineConfig::normal());
        let (chain, g) = chain_with_genesis();
        let mut headers = chain_of(chain.config(), &g, 6);
        headers[3].parent_hash = Hash256([0xAB; 32]);
        let (_, rx) = engine.verify_headers(chain, headers, vec![true; 6]);
        let results = collect(rx);
        assert_eq!(results.len(), 6);
        assert_eq!(results[3], Err(ConsensusError::UnknownAncestor));
        // Header 4 no longer links to the modified header 3.
        assert_eq!(results[4], Err(ConsensusError::UnknownAncestor));
        assert_eq!(results[..3], [Ok(()), Ok(()), Ok(())]);
        assert_eq!(results[5], Ok(()));
    }

    #[test]
    fn first_header_needs_chain_parent() {
        let engine = stub_engine(EngineConfig::normal());
        let (chain, g) = chain_with_genesis();
        let headers = chain_of(chain.config(), &g, 3);
        let (_, rx) = engine.verify_headers(chain, headers[1..].to_vec(), vec![true; 2]);
        assert_eq!(collect(rx), vec![Err(ConsensusError::UnknownAncestor), Ok(())]);
    }

    #[test]
    fn seal_flags_per_header() {
        let engine = stub_engine(EngineConfig::normal());
        let (chain, g) = chain_with_genesis();
        let mut headers = chain_of(chain.config(), &g, 1);
        headers[0].mix_digest = Hash256::ZERO;
        let (_, rx) = engine.verify_headers(chain.clone(), headers.clone(), vec![false]);
        assert_eq!(collect(rx), vec![Ok(())]);
        let (_, rx) = engine.verify_headers(chain, headers, vec![true]);
        assert_eq!(collect(rx), vec![Err(ConsensusError::InvalidMixDigest)]);
    }

    #[test]
    fn abort_stops_emission() {
        let engine = PowEngine::new(EngineConfig::normal(), Arc::new(StubPow::with_delay(20_000)));
        let (chain, g) = chain_with_genesis();
        let headers = chain_of(chain.config(), &g, 200);
        let (abort, mut rx) = engine.verify_headers(chain, headers, vec![true; 200]);
        assert_eq!(rx.blocking_recv(), Some(Ok(())));
        abort.abort();
        assert!(abort.is_aborted());
        let mut rest = 0;
        while rx.blocking_recv().is_some() {
            rest += 1;
        }
        assert!(rest < 199);
    }

    #[test]
    fn dropped_receiver_stops_batch() {
        let engine = PowEngine::new(EngineConfig::normal(), Arc::new(StubPow::with_delay(5_000)));
        let (chain, g) = chain_with_genesis();
        let headers = chain_of(chain.config(), &g, 64);
        let (abort, rx) = engine.verify_headers(chain, headers, vec![true; 64]);
        drop(rx);
        let deadline = Instant::now() + Duration::from_secs(10);
        while !abort.is_aborted() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(abort.is_aborted());
    }

    #[test]
    fn panicking_worker_ends_the_stream() {
        let pow = StubPow {
            panic_on_nonce: Some(2),
            ..StubPow::default()
        };
        let engine = PowEngine::new(EngineConfig::normal(), Arc::new(pow));
        let (chain, g) = chain_with_genesis();
        let mut headers = chain_of(chain.config(), &g, 6);
        headers[3].nonce = 2;
        headers[3].mix_digest = stub_mix(2);
        let (abort, rx) = engine.verify_headers(chain, headers, vec![true; 6]);
        let results = collect(rx);
        assert!(results.len() <= 3, "{} results past the failed header", results.len());
        assert!(results.iter().all(Result::is_ok));
        assert!(abort.is_aborted());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn results_follow_input_order(
            len in 1usize..40,
            faults in proptest::collection::vec(any::<bool>(), 40),
            seals in proptest::collection::vec(any::<bool>(), 40),
        ) {
            let engine = PowEngine::new(EngineConfig::normal(), Arc::new(StubPow::with_delay(2_000)));
            let (chain, g) = chain_with_genesis();
            let mut headers = chain_of(chain.config(), &g, len);
            for (h, &bad) in headers.iter_mut().zip(&faults) {
                if bad {
                    h.mix_digest = Hash256::ZERO;
                }
            }
            let seals = seals[..len].to_vec();
            let expected = sequential(&engine, &chain, &headers, &seals);
            let (_, rx) = engine.verify_headers(chain, headers, seals);
            prop_assert_eq!(collect(rx), expected);
        }
    }
}
