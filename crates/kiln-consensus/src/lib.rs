//! # kiln-consensus: proof-of-work verification and sealing.
//!
//! [`PowEngine`] wires kiln-core's difficulty, reward and fork rules to a
//! [`PowPrimitive`](kiln_core::traits::PowPrimitive):
//!
//! - single-header, uncle and seal verification (`engine`)
//! - ordered parallel batch verification (`batch`)
//! - multi-worker nonce search with restart on worker count change (`sealer`)
//!
//! [`Sha256Pow`] is a cheap reference primitive for tests and dev networks.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod hashrate;
pub mod pow;
pub mod sealer;
#[cfg(test)]
mod test_support;

pub use batch::{BatchAbort, BatchResults};
pub use config::{EngineConfig, PowMode};
pub use engine::PowEngine;
pub use error::EngineError;
pub use pow::Sha256Pow;
