//! Block structure, block identity and the genesis block
//!
//! The block identity hash covers the header only. The self-reported
//! `block_hash` field sits inside the header, so its 32 bytes are left out of
//! the hashed range; a block can therefore carry its own identity without a
//! fixed-point search.

use std::sync::OnceLock;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::{self, CodecResult, Decode, Encode, Reader};
use crate::config::ConsensusParams;
use crate::constants::*;
use crate::error::{CodecError, MiningError};
use crate::hash::double_sha256_parts;
use crate::pow;
use crate::transaction::Transaction;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    /// Unix seconds
    pub timestamp: u32,
    pub height: u64,
    #[serde(with = "crate::serde_hex")]
    pub block_hash: Hash,
    pub nonce: u32,
    /// Compact target ("bits"), expanded by [`pow::Target::from_compact`]
    pub target: u32,
    #[serde(with = "crate::serde_hex")]
    pub previous_block_hash: Hash,
}

impl BlockSummary {
    /// Offset of `block_hash` within the encoded summary
    fn block_hash_offset(height: u64) -> usize {
        4 + codec::vlq_len(height)
    }
}

impl Encode for BlockSummary {
    fn encode_to(&self, out: &mut Vec<u8>) {
        codec::write_u32(out, self.timestamp);
        codec::write_vlq(out, self.height);
        out.extend_from_slice(&self.block_hash);
        codec::write_u32(out, self.nonce);
        codec::write_u32(out, self.target);
        out.extend_from_slice(&self.previous_block_hash);
    }

    fn encoded_len(&self) -> usize {
        4 + codec::vlq_len(self.height) + 32 + 4 + 4 + 32
    }
}

impl Decode for BlockSummary {
    fn decode_from(reader: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(Self {
            timestamp: reader.read_u32()?,
            height: reader.read_vlq()?,
            block_hash: reader.read_array()?,
            nonce: reader.read_u32()?,
            target: reader.read_u32()?,
            previous_block_hash: reader.read_array()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub summary: BlockSummary,
    /// Always [`BLOCK_VERSION`]; every constructor and decoder enforces it
    #[serde(deserialize_with = "block_version")]
    version: u8,
}

fn block_version<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let version = u8::deserialize(deserializer)?;
    if version != BLOCK_VERSION {
        return Err(D::Error::custom(CodecError::UnsupportedVersion(version)));
    }
    Ok(version)
}

impl BlockHeader {
    pub fn new(summary: BlockSummary) -> Self {
        Self { summary, version: BLOCK_VERSION }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Double SHA-256 over the encoded header minus the `block_hash` bytes
    pub fn identity_hash(&self) -> Hash {
        let bytes = self.encode();
        hash_header_bytes(&bytes, self.summary.height)
    }
}

fn hash_header_bytes(bytes: &[u8], height: u64) -> Hash {
    let offset = BlockSummary::block_hash_offset(height);
    double_sha256_parts(&[&bytes[..offset], &bytes[offset + 32..]])
}

impl Encode for BlockHeader {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.summary.encode_to(out);
        codec::write_u8(out, self.version);
    }

    fn encoded_len(&self) -> usize {
        self.summary.encoded_len() + 1
    }
}

impl Decode for BlockHeader {
    fn decode_from(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let summary = BlockSummary::decode_from(reader)?;
        let version = reader.read_u8()?;
        if version != BLOCK_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        Ok(Self { summary, version })
    }
}

/// Block: header plus ordered transactions, immutable once built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    #[serde(skip)]
    hash: OnceLock<Hash>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
            hash: OnceLock::new(),
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn summary(&self) -> &BlockSummary {
        &self.header.summary
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn identity_hash(&self) -> Hash {
        *self.hash.get_or_init(|| self.header.identity_hash())
    }

    /// Same transactions under a different header
    pub fn with_header(self, header: BlockHeader) -> Self {
        Self::new(header, self.transactions)
    }

    /// Record the identity hash in the header's `block_hash` field
    pub fn sealed(self) -> Self {
        let hash = self.identity_hash();
        let mut header = self.header;
        header.summary.block_hash = hash;
        Self {
            header,
            transactions: self.transactions,
            hash: OnceLock::from(hash),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.header.summary.block_hash == self.identity_hash()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}

impl Eq for Block {}

impl Encode for Block {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.header.encode_to(out);
        codec::write_sequence(out, &self.transactions);
    }

    fn encoded_len(&self) -> usize {
        self.header.encoded_len()
            + codec::vlq_len(self.transactions.len() as u64)
            + self.transactions.iter().map(Encode::encoded_len).sum::<usize>()
    }
}

impl Decode for Block {
    fn decode_from(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let start = reader.position();
        let header = BlockHeader::decode_from(reader)?;
        let hash = hash_header_bytes(reader.span_from(start), header.summary.height);
        let transactions = reader.read_sequence()?;
        Ok(Self {
            header,
            transactions,
            hash: OnceLock::from(hash),
        })
    }
}

/// Deterministic genesis block paying the genesis reward to `recipient`.
///
/// The header nonce is searched from zero until the block meets its own
/// target, so the same recipient and parameters always yield the same block.
pub fn genesis_block(recipient: RecipientKey, params: &ConsensusParams) -> Result<Block, MiningError> {
    let coinbase = Transaction::coinbase(recipient, params.genesis_reward, GENESIS_COINBASE_INDEX);
    let header = BlockHeader::new(BlockSummary {
        timestamp: params.genesis_timestamp,
        height: 0,
        block_hash: [0u8; 32],
        nonce: 0,
        target: params.genesis_bits,
        previous_block_hash: [0u8; 32],
    });
    pow::mine_block(Block::new(header, vec![coinbase]), None)
}
