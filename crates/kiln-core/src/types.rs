//! Core protocol types: headers, blocks, hashes, addresses.
//!
//! Header hashes are double SHA-256 over an explicit fixed byte layout, so
//! they are independent of any serialization framework.

use std::fmt;
use std::sync::LazyLock;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte hash value.
///
/// Used for header hashes, uncle-list hashes, transaction roots and PoW
/// mix digests.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Unsealed headers carry it as mix digest.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interpret the hash as a big-endian unsigned integer.
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte account identity. Block and uncle rewards are credited to it.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Double SHA-256 of `data`.
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256(Sha256::digest(first).into())
}

/// Hash of an empty uncle list. Byzantium difficulty keys off it.
pub static EMPTY_UNCLE_HASH: LazyLock<Hash256> = LazyLock::new(|| calc_uncle_hash(&[]));

/// Hash of an empty transaction list.
pub static EMPTY_TX_HASH: LazyLock<Hash256> = LazyLock::new(|| calc_tx_hash(&[]));

/// Block header: the unit of proof-of-work.
///
/// Immutable once sealed: `nonce` and `mix_digest` must satisfy the PoW
/// target implied by `difficulty`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Hash of the parent header.
    pub parent_hash: Hash256,
    /// Hash over the uncle headers included in the block.
    pub uncle_hash: Hash256,
    /// Reward recipient.
    pub coinbase: Address,
    /// State root after applying the block and its rewards.
    pub root: Hash256,
    /// Hash over the block's transactions.
    pub tx_hash: Hash256,
    /// Required proof-of-work difficulty.
    pub difficulty: BigUint,
    /// Height of the block.
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Unix timestamp in milliseconds.
    pub time_ms: u64,
    /// Free-form extra data, at most
    /// [`MAXIMUM_EXTRA_DATA_SIZE`](crate::constants::MAXIMUM_EXTRA_DATA_SIZE) bytes.
    pub extra: Vec<u8>,
    /// PoW mix digest proving the dataset was consulted.
    pub mix_digest: Hash256,
    /// PoW search value.
    pub nonce: u64,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: Hash256::ZERO,
            uncle_hash: *EMPTY_UNCLE_HASH,
            coinbase: Address::ZERO,
            root: Hash256::ZERO,
            tx_hash: *EMPTY_TX_HASH,
            difficulty: BigUint::default(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            time_ms: 0,
            extra: Vec::new(),
            mix_digest: Hash256::ZERO,
            nonce: 0,
        }
    }
}

impl Header {
    /// Serialize the sealing-independent fields in their fixed layout:
    /// parent || uncle_hash || coinbase || root || tx_hash ||
    /// len(difficulty) || difficulty (BE) || number || gas_limit || gas_used ||
    /// time_ms || len(extra) || extra. Integers are little-endian.
    fn write_unsealed(&self, data: &mut Vec<u8>) {
        data.extend_from_slice(self.parent_hash.as_bytes());
        data.extend_from_slice(self.uncle_hash.as_bytes());
        data.extend_from_slice(&self.coinbase.0);
        data.extend_from_slice(self.root.as_bytes());
        data.extend_from_slice(self.tx_hash.as_bytes());
        let difficulty = self.difficulty.to_bytes_be();
        data.extend_from_slice(&(difficulty.len() as u64).to_le_bytes());
        data.extend_from_slice(&difficulty);
        data.extend_from_slice(&self.number.to_le_bytes());
        data.extend_from_slice(&self.gas_limit.to_le_bytes());
        data.extend_from_slice(&self.gas_used.to_le_bytes());
        data.extend_from_slice(&self.time_ms.to_le_bytes());
        data.extend_from_slice(&(self.extra.len() as u64).to_le_bytes());
        data.extend_from_slice(&self.extra);
    }

    /// Compute the header hash (double SHA-256 over all fields, seal included).
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(256 + self.extra.len());
        self.write_unsealed(&mut data);
        data.extend_from_slice(self.mix_digest.as_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        double_sha256(&data)
    }

    /// Hash of the header excluding `mix_digest` and `nonce`.
    ///
    /// This is the PoW seal input: it is identical before and after sealing.
    pub fn hash_no_nonce(&self) -> Hash256 {
        let mut data = Vec::with_capacity(192 + self.extra.len());
        self.write_unsealed(&mut data);
        double_sha256(&data)
    }
}

/// An opaque, already-encoded transaction. Execution is out of scope here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Transaction {
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn hash(&self) -> Hash256 {
        double_sha256(&self.payload)
    }
}

/// Hash over an ordered uncle list.
pub fn calc_uncle_hash(uncles: &[Header]) -> Hash256 {
    let mut data = Vec::with_capacity(8 + uncles.len() * 32);
    data.extend_from_slice(&(uncles.len() as u64).to_le_bytes());
    for uncle in uncles {
        data.extend_from_slice(uncle.hash().as_bytes());
    }
    double_sha256(&data)
}

/// Hash over an ordered transaction list.
pub fn calc_tx_hash(txs: &[Transaction]) -> Hash256 {
    let mut data = Vec::with_capacity(8 + txs.len() * 32);
    data.extend_from_slice(&(txs.len() as u64).to_le_bytes());
    for tx in txs {
        data.extend_from_slice(tx.hash().as_bytes());
    }
    double_sha256(&data)
}

/// A complete block: header, transactions and uncle headers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    header: Header,
    transactions: Vec<Transaction>,
    uncles: Vec<Header>,
}

impl Block {
    /// Assemble a block, deriving `uncle_hash` and `tx_hash` from the body.
    pub fn new(mut header: Header, transactions: Vec<Transaction>, uncles: Vec<Header>) -> Self {
        header.uncle_hash = calc_uncle_hash(&uncles);
        header.tx_hash = calc_tx_hash(&transactions);
        Self {
            header,
            transactions,
            uncles,
        }
    }

    /// Replace the header with a sealed copy, keeping the body untouched.
    pub fn with_seal(&self, header: Header) -> Self {
        Self {
            header,
            transactions: self.transactions.clone(),
            uncles: self.uncles.clone(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn uncles(&self) -> &[Header] {
        &self.uncles
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> Hash256 {
        self.header.parent_hash
    }
}
