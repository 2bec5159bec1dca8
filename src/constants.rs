//! Consensus constants and default parameters

use crate::types::Hash;

/// Width of a recipient key: raw secp256k1 public key, X || Y without the
/// SEC1 prefix byte
pub const KEY_WIDTH: usize = 64;

/// Width of an input signature
pub const SIGNATURE_WIDTH: usize = 64;

/// Sentinel transaction hash marking a coinbase input
pub const COINBASE_SENTINEL: Hash = [0u8; 32];

/// Index used by the genesis coinbase reference
pub const GENESIS_COINBASE_INDEX: u32 = 0xffffffff;

/// Only supported transaction version
pub const TRANSACTION_VERSION: u8 = 0;

/// Only supported block header version
pub const BLOCK_VERSION: u8 = 0;

/// Maximum encoded block size: 1MB
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Maximum distance a block timestamp may sit ahead of the local clock: 2 hours
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Easiest target accepted by the validator (regtest-style limit)
pub const POW_LIMIT_BITS: u32 = 0x207fffff;

/// Genesis coinbase reward
pub const GENESIS_REWARD: u64 = 50_000_000;

/// Genesis compact target
pub const GENESIS_BITS: u32 = 0x207fffff;

/// Genesis timestamp, fixed so the genesis block is deterministic
pub const GENESIS_TIMESTAMP: u32 = 1_650_000_000;

/// Longest VLQ accepted for a u64: ceil(64 / 7)
pub const MAX_VLQ_BYTES: usize = 10;

/// Nonces between two mining progress events
pub const MINING_PROGRESS_INTERVAL: u64 = 1_000_000;
