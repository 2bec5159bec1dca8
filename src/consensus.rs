//! Block validation
//!
//! Stateless structural and proof-of-work checks on a candidate block. Rules
//! run in a fixed order and the first violation is reported. Spendability of
//! inputs is not checked here; that happens when the block is folded into a
//! [`CoinState`](crate::coin_state::CoinState).

use crate::block::Block;
use crate::codec::Encode;
use crate::config::ConsensusParams;
use crate::error::{TransactionDefect, ValidationError};
use crate::pow::Target;
use crate::transaction::Transaction;

/// Outcome of [`validate_block`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(ValidationError),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid(error) => Err(error),
        }
    }
}

impl From<Result<(), ValidationError>> for ValidationResult {
    fn from(result: Result<(), ValidationError>) -> Self {
        match result {
            Ok(()) => ValidationResult::Valid,
            Err(error) => ValidationResult::Invalid(error),
        }
    }
}

/// Validate `block` against `current_timestamp` (unix seconds).
///
/// Order:
/// 1. proof of work against the header's own target, which must not be
///    easier than `pow_limit_bits`
/// 2. timestamp no later than `current_timestamp + max_future_block_time`
/// 3. at least one transaction
/// 4. encoded block within `max_block_size`
/// 5. first transaction has exactly one input
/// 6. every later transaction has inputs, outputs and fits `max_block_size`
/// 7. self-reported `block_hash` equals the identity hash
///
/// A block straight from [`Block::new`] carries a zero `block_hash` and fails
/// rule 7; seal it with [`Block::sealed`] or mine it with
/// [`pow::mine_block`](crate::pow::mine_block) first.
pub fn validate_block(block: &Block, current_timestamp: u64, params: &ConsensusParams) -> ValidationResult {
    check_block(block, current_timestamp, params).into()
}

fn check_block(block: &Block, current_timestamp: u64, params: &ConsensusParams) -> Result<(), ValidationError> {
    let summary = block.summary();
    let identity = block.identity_hash();

    // 1. Proof of work
    let target = Target::from_compact(summary.target)?;
    let limit = Target::from_compact(params.pow_limit_bits)?;
    if target > limit {
        return Err(ValidationError::TargetAboveLimit {
            bits: summary.target,
            limit: params.pow_limit_bits,
        });
    }
    if !target.is_met_by(&identity) {
        return Err(ValidationError::ProofOfWorkInvalid {
            hash: identity,
            target: *target.as_bytes(),
        });
    }

    // 2. Timestamp
    let limit = current_timestamp.saturating_add(params.max_future_block_time);
    if u64::from(summary.timestamp) > limit {
        return Err(ValidationError::TimestampTooFarInFuture {
            timestamp: u64::from(summary.timestamp),
            limit,
        });
    }

    // 3. Non-empty
    let Some((coinbase, rest)) = block.transactions().split_first() else {
        return Err(ValidationError::EmptyBlock);
    };

    // 4. Block size
    let size = block.encoded_len();
    if size > params.max_block_size {
        return Err(ValidationError::OversizeBlock {
            size,
            limit: params.max_block_size,
        });
    }

    // 5. Coinbase shape
    check_coinbase(coinbase)?;

    // 6. Remaining transactions
    for (offset, tx) in rest.iter().enumerate() {
        check_transaction(tx, params).map_err(|defect| ValidationError::MalformedTransaction {
            index: offset + 1,
            defect,
        })?;
    }

    // 7. Self-reported hash
    if summary.block_hash != identity {
        return Err(ValidationError::BlockHashMismatch {
            reported: summary.block_hash,
            computed: identity,
        });
    }

    Ok(())
}

fn check_coinbase(tx: &Transaction) -> Result<(), ValidationError> {
    match tx.inputs().len() {
        1 => Ok(()),
        inputs => Err(ValidationError::MalformedCoinbase { inputs }),
    }
}

/// Context-free checks on a non-coinbase transaction
pub fn check_transaction(tx: &Transaction, params: &ConsensusParams) -> Result<(), TransactionDefect> {
    if tx.inputs().is_empty() {
        return Err(TransactionDefect::NoInputs);
    }
    if tx.outputs().is_empty() {
        return Err(TransactionDefect::NoOutputs);
    }
    let size = tx.encoded_len();
    if size > params.max_block_size {
        return Err(TransactionDefect::Oversize {
            size,
            limit: params.max_block_size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockHeader, BlockSummary};
    use crate::constants::KEY_WIDTH;
    use crate::pow;
    use crate::types::*;

    const NOW: u64 = 1_700_000_000;

    fn key(byte: u8) -> RecipientKey {
        RecipientKey::from_bytes([byte; KEY_WIDTH])
    }

    fn header(timestamp: u32) -> BlockHeader {
        BlockHeader::new(BlockSummary {
            timestamp,
            height: 1,
            block_hash: [0; 32],
            nonce: 0,
            target: 0x207fffff,
            previous_block_hash: [3; 32],
        })
    }

    fn mined(timestamp: u32, transactions: Vec<Transaction>) -> Block {
        pow::mine_block(Block::new(header(timestamp), transactions), None).unwrap()
    }

    fn coinbase() -> Transaction {
        Transaction::coinbase(key(1), 50, 1)
    }

    fn spend(inputs: usize, outputs: usize) -> Transaction {
        Transaction::new(
            (0..inputs)
                .map(|i| Input::unsigned(OutputReference::new([4; 32], i as u32)))
                .collect(),
            (0..outputs).map(|i| Output::new(i as u64, key(2))).collect(),
        )
    }

    fn invalid(block: &Block, params: &ConsensusParams) -> ValidationError {
        match validate_block(block, NOW, params) {
            ValidationResult::Invalid(error) => error,
            ValidationResult::Valid => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_valid_block() {
        let block = mined(NOW as u32, vec![coinbase(), spend(1, 2)]);
        let result = validate_block(&block, NOW, &ConsensusParams::default());
        assert!(result.is_valid());
        assert_eq!(result.into_result(), Ok(()));
    }

    #[test]
    fn test_unsolved_block_fails_pow() {
        // Walk nonces until the header misses the target
        let mut nonce = 0;
        let block = loop {
            let mut h = header(NOW as u32);
            h.summary.nonce = nonce;
            let block = Block::new(h, vec![coinbase()]).sealed();
            let target = Target::from_compact(0x207fffff).unwrap();
            if !target.is_met_by(&block.identity_hash()) {
                break block;
            }
            nonce += 1;
        };
        assert!(matches!(
            invalid(&block, &ConsensusParams::default()),
            ValidationError::ProofOfWorkInvalid { .. }
        ));
    }

    #[test]
    fn test_invalid_and_too_easy_targets() {
        let mut h = header(NOW as u32);
        h.summary.target = 0;
        let block = Block::new(h, vec![coinbase()]);
        assert_eq!(
            invalid(&block, &ConsensusParams::default()),
            ValidationError::InvalidTarget(0)
        );

        let params = ConsensusParams {
            pow_limit_bits: 0x1f00ffff,
            ..ConsensusParams::default()
        };
        let block = mined(NOW as u32, vec![coinbase()]);
        assert_eq!(
            invalid(&block, &params),
            ValidationError::TargetAboveLimit {
                bits: 0x207fffff,
                limit: 0x1f00ffff
            }
        );
    }

    #[test]
    fn test_timestamp_boundary() {
        let params = ConsensusParams::default();
        let edge = (NOW + params.max_future_block_time) as u32;
        assert!(validate_block(&mined(edge, vec![coinbase()]), NOW, &params).is_valid());
        assert!(matches!(
            invalid(&mined(edge + 1, vec![coinbase()]), &params),
            ValidationError::TimestampTooFarInFuture { .. }
        ));
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(
            invalid(&mined(NOW as u32, vec![]), &ConsensusParams::default()),
            ValidationError::EmptyBlock
        );
    }

    #[test]
    fn test_oversize_block_of_valid_transactions() {
        let params = ConsensusParams {
            max_block_size: 1_000,
            ..ConsensusParams::default()
        };
        // Each spend is 1+1+100+1+72 = 175 bytes, well under the limit alone
        let transactions: Vec<_> = std::iter::once(coinbase())
            .chain((0..6).map(|_| spend(1, 1)))
            .collect();
        for tx in &transactions[1..] {
            assert!(check_transaction(tx, &params).is_ok());
        }
        assert!(matches!(
            invalid(&mined(NOW as u32, transactions), &params),
            ValidationError::OversizeBlock { limit: 1_000, .. }
        ));
    }

    #[test]
    fn test_malformed_coinbase() {
        let block = mined(NOW as u32, vec![spend(2, 1)]);
        assert_eq!(
            invalid(&block, &ConsensusParams::default()),
            ValidationError::MalformedCoinbase { inputs: 2 }
        );
    }

    #[test]
    fn test_malformed_transaction_index() {
        let block = mined(NOW as u32, vec![coinbase(), spend(1, 1), spend(1, 0)]);
        assert_eq!(
            invalid(&block, &ConsensusParams::default()),
            ValidationError::MalformedTransaction {
                index: 2,
                defect: TransactionDefect::NoOutputs
            }
        );

        let block = mined(NOW as u32, vec![coinbase(), spend(0, 1)]);
        assert_eq!(
            invalid(&block, &ConsensusParams::default()),
            ValidationError::MalformedTransaction {
                index: 1,
                defect: TransactionDefect::NoInputs
            }
        );
    }

    #[test]
    fn test_block_hash_mismatch() {
        let block = mined(NOW as u32, vec![coinbase()]);
        let mut h = block.header().clone();
        h.summary.block_hash = [0xaa; 32];
        let forged = block.with_header(h);
        assert!(matches!(
            invalid(&forged, &ConsensusParams::default()),
            ValidationError::BlockHashMismatch { .. }
        ));
    }

    #[test]
    fn test_rule_order_pow_before_emptiness() {
        let mut h = header(u32::MAX);
        h.summary.target = 0x01000000;
        let block = Block::new(h, vec![]);
        // Zero mantissa: invalid target wins over the far-future timestamp
        assert_eq!(
            invalid(&block, &ConsensusParams::default()),
            ValidationError::InvalidTarget(0x01000000)
        );
    }
}
