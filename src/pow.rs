//! Proof of work: target expansion, nonce search and verification
//!
//! Two hashing schemes meet here:
//!
//! - the generic engine ([`search`], [`verify`], [`Miner`]) hashes an
//!   arbitrary preimage followed by a big-endian `u64` nonce;
//! - block mining ([`mine_block`]) walks the header's `u32` nonce and tests
//!   the block identity hash against the header's own compact target.
//!
//! Both use the same [`Difficulty`] predicate, so a nonce accepted by a
//! search is always accepted by the matching verification.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::block::Block;
use crate::constants::MINING_PROGRESS_INTERVAL;
use crate::error::{MiningError, ValidationError};
use crate::hash::double_sha256_parts;
use crate::types::Hash;

/// 256-bit proof-of-work target, stored big-endian.
///
/// Byte-wise ordering of big-endian arrays is numeric ordering, so a hash
/// meets the target exactly when it compares below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target(Hash);

impl Target {
    pub const MAX: Target = Target([0xff; 32]);

    pub const fn from_bytes(bytes: Hash) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Expand the compact header form.
    ///
    /// `bits` is `exponent << 24 | mantissa`; the target is
    /// `mantissa * 256^(exponent - 3)`. A set sign bit, a zero result or a
    /// value wider than 256 bits is rejected.
    pub fn from_compact(bits: u32) -> Result<Self, ValidationError> {
        let exponent = (bits >> 24) as i64;
        let mantissa = bits & 0x007f_ffff;
        if bits & 0x0080_0000 != 0 || mantissa == 0 {
            return Err(ValidationError::InvalidTarget(bits));
        }

        let mantissa_bytes = [(mantissa >> 16) as u8, (mantissa >> 8) as u8, mantissa as u8];
        let mut target = [0u8; 32];
        for (i, byte) in mantissa_bytes.into_iter().enumerate() {
            let position = 32 + i as i64 - exponent;
            if (0..32).contains(&position) {
                target[position as usize] = byte;
            } else if position < 0 && byte != 0 {
                return Err(ValidationError::InvalidTarget(bits));
            }
        }

        if target == [0u8; 32] {
            return Err(ValidationError::InvalidTarget(bits));
        }
        Ok(Self(target))
    }

    /// Compress to the compact form, keeping the three most significant bytes
    pub fn to_compact(&self) -> u32 {
        let Some(first) = self.0.iter().position(|&b| b != 0) else {
            return 0;
        };
        let mut size = (32 - first) as u32;
        let byte_at = |i: usize| self.0.get(i).copied().unwrap_or(0) as u32;
        let mut mantissa = byte_at(first) << 16 | byte_at(first + 1) << 8 | byte_at(first + 2);
        if mantissa & 0x0080_0000 != 0 {
            mantissa >>= 8;
            size += 1;
        }
        size << 24 | mantissa
    }

    /// `(2^256 - 1) >> bits`
    pub fn from_leading_zero_bits(bits: u32) -> Self {
        let mut target = [0u8; 32];
        for (i, byte) in target.iter_mut().enumerate() {
            let start = i as u32 * 8;
            *byte = if bits >= start + 8 {
                0
            } else if bits <= start {
                0xff
            } else {
                0xff >> (bits - start)
            };
        }
        Self(target)
    }

    pub fn is_met_by(&self, hash: &Hash) -> bool {
        hash < &self.0
    }
}

/// Difficulty predicate over a candidate hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difficulty {
    /// The first N bytes of the hash are zero
    LeadingZeroBytes(u8),
    /// The hash, read as a big-endian integer, has at least N leading zero bits
    LeadingZeroBits(u16),
    /// The hash is strictly below a full-width target
    Target(Target),
}

impl Difficulty {
    /// Build from the two optional encodings; exactly one must be supplied.
    pub fn from_options(zero_bytes: Option<u32>, zero_bits: Option<u32>) -> Result<Self, MiningError> {
        match (zero_bytes, zero_bits) {
            (Some(n), None) if n <= 32 => Ok(Self::LeadingZeroBytes(n as u8)),
            (Some(_), None) => Err(MiningError::InvalidDifficulty("more than 32 zero bytes")),
            (None, Some(n)) if n <= 256 => Ok(Self::LeadingZeroBits(n as u16)),
            (None, Some(_)) => Err(MiningError::InvalidDifficulty("more than 256 zero bits")),
            (Some(_), Some(_)) => Err(MiningError::InvalidDifficulty("both zero bytes and zero bits given")),
            (None, None) => Err(MiningError::InvalidDifficulty("neither zero bytes nor zero bits given")),
        }
    }

    pub fn is_satisfied_by(&self, hash: &Hash) -> bool {
        match self {
            Self::LeadingZeroBytes(n) => {
                let n = usize::from(*n);
                n <= hash.len() && hash[..n].iter().all(|&b| b == 0)
            }
            Self::LeadingZeroBits(n) => leading_zero_bits(hash) >= u32::from(*n),
            Self::Target(target) => target.is_met_by(hash),
        }
    }
}

fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut count = 0;
    for &byte in hash {
        if byte != 0 {
            return count + byte.leading_zeros();
        }
        count += 8;
    }
    count
}

/// Hash tested by the generic engine: `double_sha256(preimage || be_u64(nonce))`
pub fn pow_hash(preimage: &[u8], nonce: u64) -> Hash {
    double_sha256_parts(&[preimage, &nonce.to_be_bytes()])
}

/// Single-shot check using the same predicate as [`search`]
pub fn verify(preimage: &[u8], nonce: u64, difficulty: &Difficulty) -> bool {
    difficulty.is_satisfied_by(&pow_hash(preimage, nonce))
}

/// Search `start_nonce..=max_nonce` (unbounded when `max_nonce` is `None`)
pub fn search(
    preimage: &[u8],
    difficulty: &Difficulty,
    start_nonce: u64,
    max_nonce: Option<u64>,
) -> Result<Solution, MiningError> {
    let mut miner = Miner::new(difficulty.clone()).with_start_nonce(start_nonce);
    if let Some(max_nonce) = max_nonce {
        miner = miner.with_max_nonce(max_nonce);
    }
    miner.search(preimage)
}

/// Winning nonce and the statistics of the search that found it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub nonce: u64,
    pub hash: Hash,
    pub checked: u64,
    pub elapsed: Duration,
}

/// Shared stop signal for an in-flight search
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Configured nonce search over a preimage
#[derive(Debug, Clone)]
pub struct Miner {
    difficulty: Difficulty,
    start_nonce: u64,
    max_nonce: Option<u64>,
    cancel: Option<CancelFlag>,
    progress_interval: u64,
}

enum Scan {
    Found { nonce: u64, hash: Hash, checked: u64 },
    Exhausted { checked: u64 },
    Stopped { checked: u64 },
}

impl Miner {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            start_nonce: 0,
            max_nonce: None,
            cancel: None,
            progress_interval: MINING_PROGRESS_INTERVAL,
        }
    }

    pub fn with_start_nonce(mut self, start_nonce: u64) -> Self {
        self.start_nonce = start_nonce;
        self
    }

    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = Some(max_nonce);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Emit a progress event every `interval` nonces; zero disables it
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    fn last_nonce(&self) -> u64 {
        self.max_nonce.unwrap_or(u64::MAX)
    }

    pub fn search(&self, preimage: &[u8]) -> Result<Solution, MiningError> {
        let started = Instant::now();
        let stop = || self.is_cancelled();
        let outcome = self.scan(preimage, self.start_nonce, self.last_nonce(), &stop, started);
        self.finish(outcome, started)
    }

    /// Split the nonce range into `workers` disjoint slices searched in
    /// parallel. The first worker to find a solution stops the others.
    pub fn search_parallel(&self, preimage: &[u8], workers: usize) -> Result<Solution, MiningError> {
        let started = Instant::now();
        let ranges = split_range(self.start_nonce, self.last_nonce(), workers.max(1) as u64);

        let found = AtomicBool::new(false);
        let checked_total = AtomicU64::new(0);
        let stop = || found.load(Ordering::Relaxed) || self.is_cancelled();

        let winner = ranges.par_iter().find_map_any(|&(lo, hi)| {
            match self.scan(preimage, lo, hi, &stop, started) {
                Scan::Found { nonce, hash, checked } => {
                    found.store(true, Ordering::Relaxed);
                    checked_total.fetch_add(checked, Ordering::Relaxed);
                    Some((nonce, hash))
                }
                Scan::Exhausted { checked } | Scan::Stopped { checked } => {
                    checked_total.fetch_add(checked, Ordering::Relaxed);
                    None
                }
            }
        });

        let checked = checked_total.load(Ordering::Relaxed);
        let outcome = match winner {
            Some((nonce, hash)) => Scan::Found { nonce, hash, checked },
            None if self.is_cancelled() => Scan::Stopped { checked },
            None => Scan::Exhausted { checked },
        };
        self.finish(outcome, started)
    }

    fn scan(&self, preimage: &[u8], first: u64, last: u64, stop: &dyn Fn() -> bool, started: Instant) -> Scan {
        let mut checked = 0u64;
        if first > last {
            return Scan::Exhausted { checked };
        }

        let mut nonce = first;
        loop {
            if stop() {
                return Scan::Stopped { checked };
            }

            let hash = pow_hash(preimage, nonce);
            checked += 1;
            if self.difficulty.is_satisfied_by(&hash) {
                return Scan::Found { nonce, hash, checked };
            }
            if nonce == last {
                return Scan::Exhausted { checked };
            }
            nonce += 1;

            if self.progress_interval > 0 && checked % self.progress_interval == 0 {
                debug!(checked, nonce, elapsed = ?started.elapsed(), "mining progress");
            }
        }
    }

    fn finish(&self, outcome: Scan, started: Instant) -> Result<Solution, MiningError> {
        let elapsed = started.elapsed();
        match outcome {
            Scan::Found { nonce, hash, checked } => {
                debug!(nonce, checked, ?elapsed, hash = %hex::encode(hash), "found nonce");
                Ok(Solution { nonce, hash, checked, elapsed })
            }
            Scan::Exhausted { checked } => Err(MiningError::NonceSpaceExhausted { checked, elapsed }),
            Scan::Stopped { checked } => Err(MiningError::Cancelled { checked }),
        }
    }
}

/// Cut `first..=last` into at most `parts` contiguous inclusive ranges
fn split_range(first: u64, last: u64, parts: u64) -> Vec<(u64, u64)> {
    if first > last {
        return Vec::new();
    }
    // 0..=u64::MAX holds 2^64 nonces, one more than a u64 can count
    let span = u128::from(last - first) + 1;
    let chunk = span.div_ceil(u128::from(parts.max(1)));
    let last = u128::from(last);

    let mut ranges = Vec::new();
    let mut lo = u128::from(first);
    while lo <= last {
        let hi = (lo + chunk - 1).min(last);
        ranges.push((lo as u64, hi as u64));
        lo = hi + 1;
    }
    ranges
}

/// Walk the header nonce from its current value until the block identity hash
/// meets the header's compact target, then seal the block.
pub fn mine_block(block: Block, max_nonce: Option<u32>) -> Result<Block, MiningError> {
    let target = Target::from_compact(block.summary().target)
        .map_err(|_| MiningError::InvalidDifficulty("block target does not expand"))?;
    let difficulty = Difficulty::Target(target);

    let started = Instant::now();
    let mut header = block.header().clone();
    let first = header.summary.nonce;
    let last = max_nonce.unwrap_or(u32::MAX);
    let mut checked = 0u64;

    for nonce in first..=last {
        header.summary.nonce = nonce;
        checked += 1;
        if difficulty.is_satisfied_by(&header.identity_hash()) {
            trace!(nonce, checked, "mined block header");
            return Ok(block.with_header(header).sealed());
        }
    }

    Err(MiningError::NonceSpaceExhausted {
        checked,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_compact_regtest_limit() {
        let target = Target::from_compact(0x207fffff).unwrap();
        assert_eq!(&target.as_bytes()[..4], &[0x7f, 0xff, 0xff, 0x00]);
    }

    #[test]
    fn test_from_compact_bitcoin_genesis() {
        let target = Target::from_compact(0x1d00ffff).unwrap();
        let mut expected = [0u8; 32];
        expected[4] = 0xff;
        expected[5] = 0xff;
        assert_eq!(target.as_bytes(), &expected);
    }

    #[test]
    fn test_from_compact_small_exponent() {
        let target = Target::from_compact(0x01120000).unwrap();
        let mut expected = [0u8; 32];
        expected[31] = 0x12;
        assert_eq!(target.as_bytes(), &expected);
    }

    #[test]
    fn test_from_compact_rejects_invalid() {
        // zero mantissa
        assert!(Target::from_compact(0x1d000000).is_err());
        // sign bit
        assert!(Target::from_compact(0x1d800000).is_err());
        // wider than 256 bits
        assert!(Target::from_compact(0x2200ffff).is_err());
        // shifted out entirely
        assert!(Target::from_compact(0x0000ffff).is_err());
    }

    #[test]
    fn test_compact_round_trip() {
        for bits in [0x207fffff, 0x1d00ffff, 0x1b0404cb, 0x03123456] {
            let target = Target::from_compact(bits).unwrap();
            assert_eq!(target.to_compact(), bits, "bits {:#010x}", bits);
        }
    }

    #[test]
    fn test_from_leading_zero_bits() {
        assert_eq!(Target::from_leading_zero_bits(0), Target::MAX);
        let target = Target::from_leading_zero_bits(12);
        assert_eq!(&target.as_bytes()[..3], &[0x00, 0x0f, 0xff]);
        assert_eq!(Target::from_leading_zero_bits(256).as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_target_is_strict() {
        let target = Target::from_bytes([0x10; 32]);
        assert!(!target.is_met_by(&[0x10; 32]));
        let mut below = [0x10; 32];
        below[31] = 0x0f;
        assert!(target.is_met_by(&below));
    }

    #[test]
    fn test_leading_zero_bits() {
        let mut hash = [0u8; 32];
        assert_eq!(leading_zero_bits(&hash), 256);
        hash[1] = 0x10;
        assert_eq!(leading_zero_bits(&hash), 11);
    }

    #[test]
    fn test_difficulty_from_options() {
        assert_eq!(
            Difficulty::from_options(Some(2), None).unwrap(),
            Difficulty::LeadingZeroBytes(2)
        );
        assert_eq!(
            Difficulty::from_options(None, Some(20)).unwrap(),
            Difficulty::LeadingZeroBits(20)
        );
        assert!(Difficulty::from_options(Some(1), Some(8)).is_err());
        assert!(Difficulty::from_options(None, None).is_err());
        assert!(Difficulty::from_options(Some(33), None).is_err());
        assert!(Difficulty::from_options(None, Some(257)).is_err());
    }

    #[test]
    fn test_zero_bits_matches_shifted_target() {
        let difficulty = Difficulty::LeadingZeroBits(9);
        let limit = Target::from_leading_zero_bits(9);
        for nonce in 0..2_000u64 {
            let hash = pow_hash(b"agreement", nonce);
            assert_eq!(difficulty.is_satisfied_by(&hash), &hash <= limit.as_bytes());
        }
    }

    #[test]
    fn test_split_range_covers_everything() {
        assert_eq!(split_range(0, 9, 3), vec![(0, 3), (4, 7), (8, 9)]);
        assert_eq!(split_range(5, 5, 4), vec![(5, 5)]);
        assert_eq!(split_range(6, 5, 4), vec![]);
        let full = split_range(0, u64::MAX, 4);
        assert_eq!(full.first().unwrap().0, 0);
        assert_eq!(full.last().unwrap().1, u64::MAX);
    }

    #[test]
    fn test_split_range_single_part_full_space() {
        assert_eq!(split_range(0, u64::MAX, 1), vec![(0, u64::MAX)]);
        assert_eq!(split_range(0, u64::MAX, 0), vec![(0, u64::MAX)]);
        assert_eq!(split_range(u64::MAX, u64::MAX, 1), vec![(u64::MAX, u64::MAX)]);
    }

    #[test]
    fn test_search_parallel_with_one_or_zero_workers() {
        let difficulty = Difficulty::LeadingZeroBits(4);
        let single = search(b"one worker", &difficulty, 0, None).unwrap();
        for workers in [0, 1] {
            let solution = Miner::new(difficulty.clone())
                .search_parallel(b"one worker", workers)
                .unwrap();
            assert_eq!(solution.nonce, single.nonce);
            assert!(verify(b"one worker", solution.nonce, &difficulty));
        }
    }

    #[test]
    fn test_search_then_verify() {
        let difficulty = Difficulty::LeadingZeroBits(8);
        let solution = search(b"header bytes", &difficulty, 0, None).unwrap();
        assert!(verify(b"header bytes", solution.nonce, &difficulty));
        assert_eq!(solution.hash, pow_hash(b"header bytes", solution.nonce));
        assert_eq!(solution.checked, solution.nonce + 1);
    }

    #[test]
    fn test_search_respects_start_nonce() {
        let difficulty = Difficulty::LeadingZeroBits(4);
        let solution = search(b"start", &difficulty, 1_000, None).unwrap();
        assert!(solution.nonce >= 1_000);
    }

    #[test]
    fn test_cancelled_before_start() {
        let flag = CancelFlag::new();
        flag.cancel();
        let miner = Miner::new(Difficulty::LeadingZeroBytes(32)).with_cancel_flag(flag);
        assert_eq!(miner.search(b"x"), Err(MiningError::Cancelled { checked: 0 }));
    }
}
