//! Canonical byte encoding
//!
//! Every value has exactly one valid encoding, so the hash of an entity is a
//! pure function of its logical value:
//!
//! - `u8`, `u32`, `u64`: fixed width, big-endian
//! - VLQ: little-endian 7-bit groups, high bit set on every byte but the last
//! - sequences: VLQ element count followed by each element's encoding
//!
//! Decoding goes through [`Reader`], which never returns a short read.

use crate::constants::MAX_VLQ_BYTES;
use crate::error::CodecError;

pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Types with a canonical byte encoding
pub trait Encode {
    /// Append the canonical encoding of `self` to `out`
    fn encode_to(&self, out: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_to(&mut out);
        out
    }

    fn encoded_len(&self) -> usize {
        self.encode().len()
    }
}

/// Types that can be read back from their canonical encoding
pub trait Decode: Sized {
    fn decode_from(reader: &mut Reader<'_>) -> CodecResult<Self>;

    /// Decode a value that must span the whole buffer
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut reader = Reader::new(bytes);
        let value = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Cursor over an input buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Bytes consumed since `start`, which must be an earlier [`position`](Self::position)
    pub fn span_from(&self, start: usize) -> &'a [u8] {
        &self.bytes[start..self.position]
    }

    /// Consume exactly `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CodecError::TruncatedInput {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a canonical VLQ.
    ///
    /// Rejects runs longer than [`MAX_VLQ_BYTES`], values above `u64::MAX`,
    /// and encodings that end in a redundant zero group.
    pub fn read_vlq(&mut self) -> CodecResult<u64> {
        let mut value: u64 = 0;
        for i in 0..MAX_VLQ_BYTES {
            let byte = self.read_u8()?;
            let group = u64::from(byte & 0x7f);
            let shift = 7 * i as u32;

            if shift == 63 && group > 1 {
                return Err(CodecError::MalformedLength("VLQ overflows u64"));
            }
            value |= group << shift;

            if byte & 0x80 == 0 {
                if i > 0 && group == 0 {
                    return Err(CodecError::MalformedLength("non-canonical VLQ"));
                }
                return Ok(value);
            }
        }
        Err(CodecError::MalformedLength("unterminated VLQ"))
    }

    /// Read a VLQ length prefix.
    ///
    /// Every element occupies at least one byte, so a count above the
    /// remaining input is rejected before anything is allocated.
    pub fn read_length(&mut self) -> CodecResult<usize> {
        let count = self.read_vlq()?;
        match usize::try_from(count) {
            Ok(count) if count <= self.remaining() => Ok(count),
            _ => Err(CodecError::MalformedLength("sequence longer than input")),
        }
    }

    pub fn read_sequence<T: Decode>(&mut self) -> CodecResult<Vec<T>> {
        let count = self.read_length()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::decode_from(self)?);
        }
        Ok(items)
    }

    /// Fail if any input is left unconsumed
    pub fn finish(&self) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_vlq(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let group = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(group);
            return;
        }
        out.push(group | 0x80);
    }
}

/// Number of bytes [`write_vlq`] emits for `value`
pub fn vlq_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

pub fn write_sequence<T: Encode>(out: &mut Vec<u8>, items: &[T]) {
    write_vlq(out, items.len() as u64);
    for item in items {
        item.encode_to(out);
    }
}
