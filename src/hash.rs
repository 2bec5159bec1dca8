//! Double SHA-256, the hash primitive behind every identity in the ledger

use sha2::{Digest, Sha256};

use crate::types::Hash;

/// SHA256(SHA256(bytes))
pub fn double_sha256(bytes: &[u8]) -> Hash {
    double_sha256_parts(&[bytes])
}

/// Double SHA-256 over the concatenation of `parts` without materializing it.
pub fn double_sha256_parts(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let first = hasher.finalize();
    Sha256::digest(first).into()
}
