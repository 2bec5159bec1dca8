//! Error types for the ledger engine
//!
//! Each component owns a narrow error enum so callers can branch on the
//! failure class: a malformed byte stream, a rejected block, a state conflict,
//! an exhausted search, or a storage failure. [`ConsensusError`] folds them
//! together for code that drives several components at once.

use std::time::Duration;

use thiserror::Error;

use crate::types::{Hash, OutputReference};

/// Canonical encoding failures. Unrecoverable for the affected byte stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("Malformed length: {0}")]
    MalformedLength(&'static str),

    #[error("Trailing bytes after decode: {0}")]
    TrailingBytes(usize),
}

/// Fixed-width key and signature construction failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(#[from] secp256k1::Error),
}

/// Why a non-coinbase transaction was rejected by the validator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionDefect {
    #[error("no inputs")]
    NoInputs,

    #[error("no outputs")]
    NoOutputs,

    #[error("encoded size {size} exceeds {limit} bytes")]
    Oversize { size: usize, limit: usize },
}

/// Consensus rule violations. The block is not applied or persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid proof of work: hash {} is not below target {}", hex::encode(.hash), hex::encode(.target))]
    ProofOfWorkInvalid { hash: Hash, target: Hash },

    #[error("Invalid compact target: {0:#010x}")]
    InvalidTarget(u32),

    #[error("Target {bits:#010x} is easier than the proof-of-work limit {limit:#010x}")]
    TargetAboveLimit { bits: u32, limit: u32 },

    #[error("Block timestamp {timestamp} is later than {limit}")]
    TimestampTooFarInFuture { timestamp: u64, limit: u64 },

    #[error("Block has no transactions")]
    EmptyBlock,

    #[error("Block size {size} exceeds {limit} bytes")]
    OversizeBlock { size: usize, limit: usize },

    #[error("Coinbase must have exactly 1 input, found {inputs}")]
    MalformedCoinbase { inputs: usize },

    #[error("Malformed transaction at index {index}: {defect}")]
    MalformedTransaction { index: usize, defect: TransactionDefect },

    #[error("Self-reported block hash {} does not match {}", hex::encode(.reported), hex::encode(.computed))]
    BlockHashMismatch { reported: Hash, computed: Hash },
}

/// UTXO state conflicts. Only the offending transaction or block is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Input {} not found or already spent", .0)]
    UnknownOrSpentOutput(OutputReference),

    #[error("Output {} already exists", .0)]
    OutputAlreadyExists(OutputReference),

    #[error("Insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },
}

/// Proof-of-work search failures. Recoverable by widening the range or
/// changing the preimage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Nonce space exhausted: checked {checked} nonces in {elapsed:?}")]
    NonceSpaceExhausted { checked: u64, elapsed: Duration },

    #[error("Search cancelled after {checked} nonces")]
    Cancelled { checked: u64 },

    #[error("Invalid difficulty: {0}")]
    InvalidDifficulty(&'static str),
}

/// Block store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Block {} not found", hex::encode(.0))]
    NotFound(Hash),

    #[error("Block {} already stored", hex::encode(.0))]
    DuplicateKey(Hash),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Consensus parameter loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
