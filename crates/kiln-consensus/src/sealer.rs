//! Nonce search (sealing).
//!
//! [`PowEngine::seal`] runs a mining session: one blocking worker per
//! configured thread, each searching upward from its own random nonce. The
//! session races three events:
//!
//! | Event | Outcome |
//! |---|---|
//! | caller's stop token cancelled | abort workers, return `None` |
//! | a worker publishes a seal | abort the others, return the sealed block |
//! | worker count changed | abort workers, start a new session |
//!
//! Every exit path cancels the session token and awaits all worker handles,
//! so no search outlives the call.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use kiln_core::constants::{EPOCH_LENGTH, HASHRATE_REPORT_INTERVAL, MAX_EPOCH};
use kiln_core::traits::{EpochData, PowOutput, PowPrimitive};
use kiln_core::types::{Block, Hash256, Header};
use num_bigint::BigUint;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::PowMode;
use crate::engine::{PowEngine, target_for};
use crate::error::EngineError;

/// Data a worker hashes against.
#[derive(Clone)]
enum SealSource {
    /// Full dataset (normal mode).
    Full(Arc<EpochData>),
    /// Light cache against a fixed dataset size (test mode).
    Light { cache: Arc<EpochData>, size: u64 },
}

impl SealSource {
    fn hash(&self, pow: &dyn PowPrimitive, hash: &Hash256, nonce: u64) -> PowOutput {
        match self {
            Self::Full(dataset) => pow.hash_full(dataset, hash, nonce),
            Self::Light { cache, size } => pow.hash_light(*size, cache, hash, nonce),
        }
    }
}

enum SessionEnd {
    Stopped,
    Found(Header),
    Restart,
}

/// Decrements the active worker count when a worker exits, however it exits.
struct WorkerGuard<'a>(&'a PowEngine);

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.0.inner.active_workers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PowEngine {
    /// Search for a nonce sealing `block`.
    ///
    /// Returns `Ok(None)` when `stop` is cancelled first. In fake modes the
    /// block is returned at once with a zero nonce and mix digest.
    ///
    /// # Errors
    ///
    /// [`EngineError::ZeroDifficulty`] if the header has no difficulty set,
    /// [`EngineError::EpochOutOfRange`] past the last supported epoch,
    /// [`EngineError::EpochData`] if building the epoch data panics,
    /// [`EngineError::NonceSeed`] if the OS random source fails.
    pub async fn seal(&self, block: &Block, stop: CancellationToken) -> Result<Option<Block>, EngineError> {
        if self.config().pow_mode.is_fake() {
            let mut header = block.header().clone();
            header.nonce = 0;
            header.mix_digest = Hash256::ZERO;
            return Ok(Some(block.with_seal(header)));
        }
        let target = target_for(&block.header().difficulty).ok_or(EngineError::ZeroDifficulty)?;
        let target = Arc::new(target);
        let number = block.number();
        if number / EPOCH_LENGTH >= MAX_EPOCH {
            return Err(EngineError::EpochOutOfRange { number });
        }

        // Epoch data is expensive to build; keep it off the async workers
        // and stay responsive to `stop` meanwhile.
        let build = {
            let engine = self.clone();
            tokio::task::spawn_blocking(move || engine.seal_source(number))
        };
        let source = tokio::select! {
            _ = stop.cancelled() => {
                debug!(number, "sealing stopped while preparing epoch data");
                return Ok(None);
            }
            built = build => built.map_err(|e| EngineError::EpochData(e.to_string()))?,
        };

        let mut threads_rx = self.inner.threads_tx.subscribe();
        loop {
            // Read and mark seen in one step so a concurrent change is
            // either in this session's count or still pending.
            let threads = *threads_rx.borrow_and_update();
            let workers = match threads {
                0 => num_cpus::get(),
                n if n < 0 => 0,
                n => n as usize,
            };
            let seeds = self.nonce_seeds(workers)?;
            debug!(number = block.number(), workers, "starting sealing session");

            let abort = stop.child_token();
            let (found_tx, mut found_rx) = mpsc::channel::<Header>(1);
            let mut handles = Vec::with_capacity(workers);
            for (id, seed) in seeds.into_iter().enumerate() {
                let engine = self.clone();
                let header = block.header().clone();
                let source = source.clone();
                let target = Arc::clone(&target);
                let abort = abort.clone();
                let found_tx = found_tx.clone();
                self.inner.active_workers.fetch_add(1, Ordering::AcqRel);
                handles.push(tokio::task::spawn_blocking(move || {
                    engine.mine(id, &header, &source, &target, seed, &abort, &found_tx)
                }));
            }
            drop(found_tx);

            let end = tokio::select! {
                _ = stop.cancelled() => SessionEnd::Stopped,
                Some(header) = found_rx.recv() => SessionEnd::Found(header),
                Ok(()) = threads_rx.changed() => SessionEnd::Restart,
            };

            abort.cancel();
            for handle in handles {
                if let Err(err) = handle.await {
                    warn!(error = %err, "mining worker panicked");
                }
            }

            match end {
                SessionEnd::Stopped => {
                    debug!(number = block.number(), "sealing stopped");
                    return Ok(None);
                }
                SessionEnd::Found(header) => {
                    debug!(number = header.number, nonce = header.nonce, "sealed block");
                    return Ok(Some(block.with_seal(header)));
                }
                SessionEnd::Restart => {
                    debug!(threads = self.threads(), "worker count changed, restarting sealing session");
                }
            }
        }
    }

    /// One random starting nonce per worker.
    fn nonce_seeds(&self, workers: usize) -> Result<Vec<u64>, EngineError> {
        let mut rng = self.inner.rng.lock();
        if rng.is_none() {
            let seeded = StdRng::from_rng(OsRng).map_err(|e| EngineError::NonceSeed(e.to_string()))?;
            *rng = Some(seeded);
        }
        let Some(rng) = rng.as_mut() else {
            return Ok(Vec::new());
        };
        Ok((0..workers).map(|_| rng.next_u64()).collect())
    }

    fn seal_source(&self, number: u64) -> SealSource {
        let pow = &self.inner.pow;
        match self.config().pow_mode {
            PowMode::Test => SealSource::Light {
                cache: pow.cache(number),
                size: self.config().test_dataset_size,
            },
            _ => SealSource::Full(pow.dataset(number)),
        }
    }

    /// Worker loop: hash nonces upward from `seed` until a seal is found or
    /// `abort` fires.
    #[allow(clippy::too_many_arguments)]
    fn mine(
        &self,
        id: usize,
        header: &Header,
        source: &SealSource,
        target: &BigUint,
        seed: u64,
        abort: &CancellationToken,
        found: &mpsc::Sender<Header>,
    ) {
        let _guard = WorkerGuard(self);
        let pow = self.inner.pow.as_ref();
        let hash = header.hash_no_nonce();
        let mut nonce = seed;
        let mut attempts = 0u64;
        trace!(worker = id, seed, "started nonce search");

        loop {
            if abort.is_cancelled() {
                self.inner.hashrate.mark(attempts);
                trace!(worker = id, nonce, "nonce search aborted");
                return;
            }
            attempts += 1;
            if attempts % HASHRATE_REPORT_INTERVAL == 0 {
                self.inner.hashrate.mark(attempts);
                attempts = 0;
            }

            let output = source.hash(pow, &hash, nonce);
            if &output.result.to_biguint() <= target {
                let mut sealed = header.clone();
                sealed.nonce = nonce;
                sealed.mix_digest = output.mix_digest;
                // Capacity 1: the first seal wins, later ones are dropped.
                match found.try_send(sealed) {
                    Ok(()) => trace!(worker = id, nonce, "nonce found"),
                    Err(_) => trace!(worker = id, nonce, "nonce found, discarded"),
                }
                self.inner.hashrate.mark(attempts);
                return;
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}
