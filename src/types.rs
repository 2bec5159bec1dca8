//! Core ledger types: output references, outputs and inputs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecResult, Decode, Encode, Reader};
use crate::constants::*;
use crate::error::KeyError;

/// Hash type: 256-bit double SHA-256 digest
pub type Hash = [u8; 32];

/// OutputReference: one output of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputReference {
    #[serde(with = "crate::serde_hex")]
    pub tx_hash: Hash,
    pub index: u32,
}

impl OutputReference {
    pub const ENCODED_LEN: usize = 32 + 4;

    pub const fn new(tx_hash: Hash, index: u32) -> Self {
        Self { tx_hash, index }
    }

    /// Reference carried by a coinbase input
    pub const fn coinbase(index: u32) -> Self {
        Self::new(COINBASE_SENTINEL, index)
    }

    pub fn is_coinbase_sentinel(&self) -> bool {
        self.tx_hash == COINBASE_SENTINEL
    }
}

impl fmt::Display for OutputReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.tx_hash), self.index)
    }
}

impl Encode for OutputReference {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tx_hash);
        codec::write_u32(out, self.index);
    }

    fn encoded_len(&self) -> usize {
        Self::ENCODED_LEN
    }
}

impl Decode for OutputReference {
    fn decode_from(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let tx_hash = reader.read_array()?;
        let index = reader.read_u32()?;
        Ok(Self { tx_hash, index })
    }
}

/// Recipient public key, fixed at [`KEY_WIDTH`] bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipientKey(#[serde(with = "crate::serde_hex")] [u8; KEY_WIDTH]);

impl RecipientKey {
    pub const fn from_bytes(bytes: [u8; KEY_WIDTH]) -> Self {
        Self(bytes)
    }

    /// Raw X || Y coordinates of a secp256k1 key
    pub fn from_public_key(public_key: &secp256k1::PublicKey) -> Self {
        let uncompressed = public_key.serialize_uncompressed();
        let mut bytes = [0u8; KEY_WIDTH];
        bytes.copy_from_slice(&uncompressed[1..]);
        Self(bytes)
    }

    /// Parse back into a curve point. Fails if the bytes are not on the curve.
    pub fn to_public_key(&self) -> Result<secp256k1::PublicKey, KeyError> {
        let mut uncompressed = [0u8; KEY_WIDTH + 1];
        uncompressed[0] = 0x04;
        uncompressed[1..].copy_from_slice(&self.0);
        Ok(secp256k1::PublicKey::from_slice(&uncompressed)?)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_WIDTH] {
        &self.0
    }
}

impl TryFrom<&[u8]> for RecipientKey {
    type Error = KeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: KEY_WIDTH,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }
}

impl fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecipientKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Input signature, fixed at [`SIGNATURE_WIDTH`] bytes.
///
/// An input that has not been signed yet carries [`Signature::UNSIGNED`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "crate::serde_hex")] [u8; SIGNATURE_WIDTH]);

impl Signature {
    pub const UNSIGNED: Signature = Signature([0u8; SIGNATURE_WIDTH]);

    pub const fn from_bytes(bytes: [u8; SIGNATURE_WIDTH]) -> Self {
        Self(bytes)
    }

    pub fn is_unsigned(&self) -> bool {
        *self == Self::UNSIGNED
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_WIDTH] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::UNSIGNED
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = KeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: SIGNATURE_WIDTH,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unsigned() {
            f.write_str("Signature(unsigned)")
        } else {
            write!(f, "Signature({})", hex::encode(self.0))
        }
    }
}

/// Output: spendable value assigned to a public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: u64,
    pub recipient: RecipientKey,
}

impl Output {
    pub const ENCODED_LEN: usize = 8 + KEY_WIDTH;

    pub fn new(value: u64, recipient: RecipientKey) -> Self {
        Self { value, recipient }
    }
}

impl Encode for Output {
    fn encode_to(&self, out: &mut Vec<u8>) {
        codec::write_u64(out, self.value);
        out.extend_from_slice(self.recipient.as_bytes());
    }

    fn encoded_len(&self) -> usize {
        Self::ENCODED_LEN
    }
}

impl Decode for Output {
    fn decode_from(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let value = reader.read_u64()?;
        let recipient = RecipientKey(reader.read_array()?);
        Ok(Self { value, recipient })
    }
}

/// Input: the output being spent plus the spender's signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub output_reference: OutputReference,
    pub signature: Signature,
}

impl Input {
    pub const ENCODED_LEN: usize = OutputReference::ENCODED_LEN + SIGNATURE_WIDTH;

    pub fn new(output_reference: OutputReference, signature: Signature) -> Self {
        Self { output_reference, signature }
    }

    pub fn unsigned(output_reference: OutputReference) -> Self {
        Self::new(output_reference, Signature::UNSIGNED)
    }
}

impl Encode for Input {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.output_reference.encode_to(out);
        out.extend_from_slice(self.signature.as_bytes());
    }

    fn encoded_len(&self) -> usize {
        Self::ENCODED_LEN
    }
}

impl Decode for Input {
    fn decode_from(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let output_reference = OutputReference::decode_from(reader)?;
        let signature = Signature(reader.read_array()?);
        Ok(Self { output_reference, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    #[test]
    fn test_output_reference_layout() {
        let reference = OutputReference::new([0xab; 32], 0x01020304);
        let bytes = reference.encode();
        assert_eq!(bytes.len(), OutputReference::ENCODED_LEN);
        assert_eq!(&bytes[..32], &[0xab; 32]);
        assert_eq!(&bytes[32..], &[1, 2, 3, 4]);
        assert_eq!(OutputReference::decode(&bytes).unwrap(), reference);
    }

    #[test]
    fn test_output_reference_display() {
        let reference = OutputReference::new([0; 32], 7);
        assert_eq!(reference.to_string(), format!("{}:7", "00".repeat(32)));
    }

    #[test]
    fn test_coinbase_sentinel() {
        assert!(OutputReference::coinbase(GENESIS_COINBASE_INDEX).is_coinbase_sentinel());
        assert!(!OutputReference::new([1; 32], 0).is_coinbase_sentinel());
    }

    #[test]
    fn test_recipient_key_rejects_wrong_width() {
        let short = [7u8; 32];
        assert_eq!(
            RecipientKey::try_from(&short[..]),
            Err(KeyError::InvalidLength { expected: KEY_WIDTH, actual: 32 })
        );
        let exact = [7u8; KEY_WIDTH];
        assert!(RecipientKey::try_from(&exact[..]).is_ok());
    }

    #[test]
    fn test_recipient_key_secp256k1_round_trip() {
        let secp = secp256k1::Secp256k1::new();
        let secret = secp256k1::SecretKey::from_slice(&[0x42; 32]).unwrap();
        let public = secp256k1::PublicKey::from_secret_key(&secp, &secret);

        let key = RecipientKey::from_public_key(&public);
        assert_eq!(key.to_public_key().unwrap(), public);
    }

    #[test]
    fn test_recipient_key_off_curve() {
        let key = RecipientKey::from_bytes([0xff; KEY_WIDTH]);
        assert!(matches!(key.to_public_key(), Err(KeyError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_signature_width() {
        assert!(Signature::try_from(&[1u8; 63][..]).is_err());
        let signature = Signature::try_from(&[1u8; 64][..]).unwrap();
        assert!(!signature.is_unsigned());
        assert!(Signature::default().is_unsigned());
    }

    #[test]
    fn test_input_and_output_layout() {
        let input = Input::unsigned(OutputReference::new([3; 32], 1));
        assert_eq!(input.encode().len(), 100);
        assert_eq!(Input::decode(&input.encode()).unwrap(), input);

        let output = Output::new(u64::MAX, RecipientKey::from_bytes([9; KEY_WIDTH]));
        let bytes = output.encode();
        assert_eq!(bytes.len(), 72);
        assert_eq!(&bytes[..8], &[0xff; 8]);
        assert_eq!(Output::decode(&bytes).unwrap(), output);
    }

    #[test]
    fn test_output_truncated_key() {
        let output = Output::new(5, RecipientKey::from_bytes([9; KEY_WIDTH]));
        let bytes = output.encode();
        assert!(matches!(
            Output::decode(&bytes[..40]),
            Err(CodecError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_output_json_uses_hex() {
        let output = Output::new(10, RecipientKey::from_bytes([0x0f; KEY_WIDTH]));
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains(&"0f".repeat(KEY_WIDTH)));
        let back: Output = serde_json::from_str(&json).unwrap();
        assert_eq!(back, output);
    }
}
