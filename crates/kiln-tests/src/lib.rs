//! Integration test support for the Kiln consensus engine.
//!
//! This crate has no production code. It provides an in-memory chain and
//! account ledger plus block-building helpers, and the `tests/` directory
//! drives the engine end to end through them: mining, single and batch
//! header verification, uncle rules and reward accounting.

pub mod chain;
pub mod helpers;
