//! # kiln-core
//! Foundation types, protocol rules and collaborator traits for the Kiln
//! proof-of-work engine.
//!
//! Everything here is pure: no threads, no I/O. The engine, batch verifier
//! and sealer live in `kiln-consensus`.

pub mod constants;
pub mod difficulty;
pub mod error;
pub mod forks;
pub mod reward;
pub mod traits;
pub mod types;
