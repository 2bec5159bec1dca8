//! Transactions and their identity hash

use std::sync::OnceLock;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::{self, CodecResult, Decode, Encode, Reader};
use crate::constants::TRANSACTION_VERSION;
use crate::error::CodecError;
use crate::hash::double_sha256;
use crate::types::*;

/// Transaction: version, ordered inputs, ordered outputs.
///
/// Immutable once built. The identity hash is computed lazily and cached;
/// a decoded transaction hashes the exact bytes it was read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(deserialize_with = "transaction_version")]
    version: u8,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    #[serde(skip)]
    hash: OnceLock<Hash>,
}

fn transaction_version<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let version = u8::deserialize(deserializer)?;
    if version != TRANSACTION_VERSION {
        return Err(D::Error::custom(CodecError::UnsupportedVersion(version)));
    }
    Ok(version)
}

impl Transaction {
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        Self {
            version: TRANSACTION_VERSION,
            inputs,
            outputs,
            hash: OnceLock::new(),
        }
    }

    /// Value-creating transaction: a single input carrying the sentinel
    /// reference, a single output paying `reward` to `recipient`.
    ///
    /// `tag` becomes the sentinel reference index; giving each block's coinbase
    /// a distinct tag (e.g. its height) keeps their hashes distinct.
    pub fn coinbase(recipient: RecipientKey, reward: u64, tag: u32) -> Self {
        Self::new(
            vec![Input::unsigned(OutputReference::coinbase(tag))],
            vec![Output::new(reward, recipient)],
        )
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Exactly one input whose reference carries the sentinel hash
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].output_reference.is_coinbase_sentinel()
    }

    /// Double SHA-256 over the canonical `{version, inputs, outputs}` bytes
    pub fn identity_hash(&self) -> Hash {
        *self.hash.get_or_init(|| double_sha256(&self.encode()))
    }

    pub fn total_output_value(&self) -> u128 {
        self.outputs.iter().map(|o| u128::from(o.value)).sum()
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.inputs == other.inputs && self.outputs == other.outputs
    }
}

impl Eq for Transaction {}

impl Encode for Transaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        codec::write_u8(out, self.version);
        codec::write_sequence(out, &self.inputs);
        codec::write_sequence(out, &self.outputs);
    }

    fn encoded_len(&self) -> usize {
        1 + codec::vlq_len(self.inputs.len() as u64)
            + self.inputs.len() * Input::ENCODED_LEN
            + codec::vlq_len(self.outputs.len() as u64)
            + self.outputs.len() * Output::ENCODED_LEN
    }
}

impl Decode for Transaction {
    fn decode_from(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let start = reader.position();

        let version = reader.read_u8()?;
        if version != TRANSACTION_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let inputs = reader.read_sequence()?;
        let outputs = reader.read_sequence()?;

        let hash = double_sha256(reader.span_from(start));
        Ok(Self {
            version,
            inputs,
            outputs,
            hash: OnceLock::from(hash),
        })
    }
}
