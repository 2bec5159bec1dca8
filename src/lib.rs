//! # Flatcoin Consensus
//!
//! Ledger engine for a minimal proof-of-work cryptocurrency: canonical
//! encoding of transactions and blocks, an immutable UTXO coin state, block
//! validation, a nonce search engine and a chain that ties them to block
//! storage.
//!
//! ## Architecture
//!
//! - [`codec`]: canonical big-endian encoding with VLQ counts
//! - [`types`], [`transaction`], [`block`]: ledger entities and identity hashes
//! - [`coin_state`]: persistent UTXO set, built on [`persistent_map`]
//! - [`consensus`]: stateless block validation
//! - [`pow`]: targets, difficulty and nonce search
//! - [`store`], [`chain`]: persistence and orchestration
//!
//! ## Design Principles
//!
//! 1. **Validate, then commit**: a rejected block changes nothing
//! 2. **Immutable state**: coin state snapshots are never mutated in place
//! 3. **Exact Version Pinning**: consensus-critical cryptography is pinned
//!
//! ## Usage
//!
//! ```rust
//! use flatcoin_consensus::{Chain, ConsensusParams, MemoryBlockStore, RecipientKey};
//!
//! let miner = RecipientKey::from_bytes([7u8; 64]);
//! let chain = Chain::with_genesis(MemoryBlockStore::new(), miner, ConsensusParams::default())?;
//! assert_eq!(chain.height(), 1);
//! assert_eq!(chain.balance_of(&miner), 50_000_000);
//! # Ok::<(), flatcoin_consensus::ConsensusError>(())
//! ```

#![forbid(unsafe_code)]

pub mod block;
pub mod chain;
pub mod codec;
pub mod coin_state;
pub mod config;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod hash;
pub mod persistent_map;
pub mod pow;
pub mod store;
pub mod transaction;
pub mod types;

mod serde_hex;

pub use block::{genesis_block, Block, BlockHeader, BlockSummary};
pub use chain::Chain;
pub use codec::{Decode, Encode};
pub use coin_state::{build_spend, CoinState};
pub use config::ConsensusParams;
pub use consensus::{validate_block, ValidationResult};
pub use constants::*;
pub use error::{
    CodecError, ConfigError, ConsensusError, KeyError, MiningError, Result, StateError, StoreError,
    TransactionDefect, ValidationError,
};
pub use pow::{CancelFlag, Difficulty, Miner, Solution, Target};
pub use store::{BlockStore, FileBlockStore, MemoryBlockStore};
pub use transaction::Transaction;
pub use types::*;
