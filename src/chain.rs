//! Chain orchestration
//!
//! A [`Chain`] ties validation, coin state and block storage together. A
//! block is validated, folded into a fresh coin state snapshot and persisted;
//! only when all three succeed do the chain's state, height and tip move.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::block::{genesis_block, Block};
use crate::codec::{Decode, Encode};
use crate::coin_state::CoinState;
use crate::config::ConsensusParams;
use crate::consensus::validate_block;
use crate::error::Result;
use crate::store::BlockStore;
use crate::types::{Hash, RecipientKey};

#[derive(Debug)]
pub struct Chain<S: BlockStore> {
    store: S,
    coin_state: CoinState,
    height: u64,
    tip: Hash,
    params: ConsensusParams,
}

impl<S: BlockStore> Chain<S> {
    /// Start a chain on `store` with the deterministic genesis block paying
    /// `params.genesis_reward` to `recipient`
    pub fn with_genesis(mut store: S, recipient: RecipientKey, params: ConsensusParams) -> Result<Self> {
        params.validate()?;
        let genesis = genesis_block(recipient, &params)?;
        let coin_state = CoinState::empty().apply_block(&genesis)?;
        let tip = genesis.identity_hash();
        store.insert(&tip, &genesis.encode())?;

        info!(hash = %hex::encode(tip), recipient = %recipient, "initialised chain with genesis block");
        Ok(Self {
            store,
            coin_state,
            height: 1,
            tip,
            params,
        })
    }

    /// Validate `block` against the wall clock and append it
    pub fn add_block_with_validation(&mut self, block: Block) -> Result<Hash> {
        self.add_block_at(block, unix_now())
    }

    /// Validate `block` as of `now` (unix seconds) and append it.
    ///
    /// On any failure the chain is left exactly as it was.
    pub fn add_block_at(&mut self, block: Block, now: u64) -> Result<Hash> {
        let hash = block.identity_hash();
        match self.connect(&block, now) {
            Ok(coin_state) => {
                self.coin_state = coin_state;
                self.height += 1;
                self.tip = hash;
                info!(
                    hash = %hex::encode(hash),
                    height = self.height,
                    transactions = block.transactions().len(),
                    utxos = self.coin_state.len(),
                    "accepted block"
                );
                Ok(hash)
            }
            Err(e) => {
                warn!(hash = %hex::encode(hash), error = %e, "rejected block");
                Err(e)
            }
        }
    }

    fn connect(&mut self, block: &Block, now: u64) -> Result<CoinState> {
        validate_block(block, now, &self.params).into_result()?;
        let coin_state = self.coin_state.apply_block(block)?;
        self.store.insert(&block.identity_hash(), &block.encode())?;
        Ok(coin_state)
    }

    /// Load and decode a stored block
    pub fn get_block(&self, hash: &Hash) -> Result<Block> {
        let bytes = self.store.get(hash)?;
        Ok(Block::decode(&bytes)?)
    }

    /// Snapshot of the current coin state; stays valid as the chain advances
    pub fn coin_state(&self) -> CoinState {
        self.coin_state.clone()
    }

    pub fn balance_of(&self, owner: &RecipientKey) -> u128 {
        self.coin_state.balance_of(owner)
    }

    /// Number of blocks accepted, genesis included
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn tip(&self) -> Hash {
        self.tip
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockHeader, BlockSummary};
    use crate::constants::KEY_WIDTH;
    use crate::error::{ConsensusError, StateError, StoreError, ValidationError};
    use crate::pow;
    use crate::store::MemoryBlockStore;
    use crate::transaction::Transaction;
    use crate::types::{Input, Output, OutputReference};

    const NOW: u64 = 1_700_000_000;

    fn key(byte: u8) -> RecipientKey {
        RecipientKey::from_bytes([byte; KEY_WIDTH])
    }

    fn chain() -> Chain<MemoryBlockStore> {
        Chain::with_genesis(MemoryBlockStore::new(), key(1), ConsensusParams::default()).unwrap()
    }

    fn next_block(chain: &Chain<MemoryBlockStore>, transactions: Vec<Transaction>) -> Block {
        let header = BlockHeader::new(BlockSummary {
            timestamp: NOW as u32,
            height: chain.height(),
            block_hash: [0; 32],
            nonce: 0,
            target: 0x207fffff,
            previous_block_hash: chain.tip(),
        });
        pow::mine_block(Block::new(header, transactions), None).unwrap()
    }

    #[test]
    fn test_genesis_state() {
        let chain = chain();
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.coin_state().len(), 1);
        assert_eq!(chain.balance_of(&key(1)), 50_000_000);
        let genesis = chain.get_block(&chain.tip()).unwrap();
        assert_eq!(genesis.identity_hash(), chain.tip());
        assert_eq!(chain.store().len(), 1);
    }

    #[test]
    fn test_accepts_valid_block() {
        let mut chain = chain();
        let block = next_block(&chain, vec![Transaction::coinbase(key(2), 10, 1)]);
        let hash = chain.add_block_at(block.clone(), NOW).unwrap();
        assert_eq!(hash, block.identity_hash());
        assert_eq!(chain.tip(), hash);
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.balance_of(&key(2)), 10);
        assert_eq!(chain.get_block(&hash).unwrap(), block);
    }

    #[test]
    fn test_invalid_block_leaves_chain_untouched() {
        let mut chain = chain();
        let before = chain.coin_state();
        let tip = chain.tip();

        let empty = next_block(&chain, vec![]);
        let err = chain.add_block_at(empty, NOW).unwrap_err();
        assert!(matches!(err, ConsensusError::Validation(ValidationError::EmptyBlock)));

        assert_eq!(chain.height(), 1);
        assert_eq!(chain.tip(), tip);
        assert_eq!(chain.coin_state(), before);
        assert_eq!(chain.store().len(), 1);
    }

    #[test]
    fn test_state_conflict_is_not_persisted() {
        let mut chain = chain();
        let bogus = Transaction::new(
            vec![Input::unsigned(OutputReference::new([5; 32], 0))],
            vec![Output::new(1, key(3))],
        );
        let block = next_block(&chain, vec![Transaction::coinbase(key(2), 10, 1), bogus]);
        let hash = block.identity_hash();
        let err = chain.add_block_at(block, NOW).unwrap_err();
        assert!(matches!(err, ConsensusError::State(StateError::UnknownOrSpentOutput(_))));
        assert!(!chain.store().contains(&hash).unwrap());
        assert_eq!(chain.balance_of(&key(2)), 0);
    }

    #[test]
    fn test_replayed_block_rejected() {
        let mut chain = chain();
        let first = next_block(&chain, vec![Transaction::coinbase(key(2), 10, 1)]);
        chain.add_block_at(first.clone(), NOW).unwrap();

        let err = chain.add_block_at(first.clone(), NOW).unwrap_err();
        assert!(matches!(err, ConsensusError::State(StateError::OutputAlreadyExists(_))));

        // Same header over different transactions: same identity, refused by the store
        let twin = Block::new(first.header().clone(), vec![Transaction::coinbase(key(3), 7, 2)]);
        assert_eq!(twin.identity_hash(), first.identity_hash());
        let err = chain.add_block_at(twin, NOW).unwrap_err();
        assert!(matches!(err, ConsensusError::Store(StoreError::DuplicateKey(_))));

        assert_eq!(chain.height(), 2);
        assert_eq!(chain.balance_of(&key(3)), 0);
    }

    #[test]
    fn test_future_block_rejected_at_now() {
        let mut chain = chain();
        let block = next_block(&chain, vec![Transaction::coinbase(key(2), 10, 1)]);
        let err = chain.add_block_at(block, NOW - 10_000).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Validation(ValidationError::TimestampTooFarInFuture { .. })
        ));
    }

    #[test]
    fn test_snapshot_survives_new_blocks() {
        let mut chain = chain();
        let snapshot = chain.coin_state();
        let block = next_block(&chain, vec![Transaction::coinbase(key(2), 10, 1)]);
        chain.add_block_at(block, NOW).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(chain.coin_state().len(), 2);
    }
}
