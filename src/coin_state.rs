//! Coin state: the set of unspent transaction outputs
//!
//! A `CoinState` is an immutable snapshot. Applying a transaction or a block
//! returns a new snapshot that shares untouched structure with the old one,
//! so earlier snapshots stay readable while the chain moves on.

use tracing::trace;

use crate::block::Block;
use crate::error::StateError;
use crate::persistent_map::PersistentMap;
use crate::transaction::Transaction;
use crate::types::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinState {
    unspent: PersistentMap<OutputReference, Output>,
}

impl CoinState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, reference: &OutputReference) -> Option<&Output> {
        self.unspent.get(reference)
    }

    pub fn contains(&self, reference: &OutputReference) -> bool {
        self.unspent.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.unspent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unspent.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutputReference, &Output)> {
        self.unspent.iter()
    }

    /// Spend the inputs of `transaction` and add its outputs.
    ///
    /// Coinbase inputs reference nothing and are skipped. A reference listed
    /// twice in one transaction fails on its second occurrence.
    pub fn apply_transaction(&self, transaction: &Transaction) -> Result<CoinState, StateError> {
        let mut unspent = self.unspent.clone();

        if !transaction.is_coinbase() {
            for input in transaction.inputs() {
                let reference = input.output_reference;
                unspent = unspent
                    .remove(&reference)
                    .ok_or(StateError::UnknownOrSpentOutput(reference))?;
            }
        }

        let tx_hash = transaction.identity_hash();
        for (index, output) in transaction.outputs().iter().enumerate() {
            let reference = OutputReference::new(tx_hash, index as u32);
            if unspent.contains_key(&reference) {
                return Err(StateError::OutputAlreadyExists(reference));
            }
            unspent = unspent.insert(reference, output.clone());
        }

        trace!(
            tx = %hex::encode(tx_hash),
            spent = if transaction.is_coinbase() { 0 } else { transaction.inputs().len() },
            created = transaction.outputs().len(),
            "applied transaction"
        );
        Ok(CoinState { unspent })
    }

    /// Apply every transaction of `block` in order; the first failure aborts
    /// the whole block
    pub fn apply_block(&self, block: &Block) -> Result<CoinState, StateError> {
        block
            .transactions()
            .iter()
            .try_fold(self.clone(), |state, tx| state.apply_transaction(tx))
    }

    pub fn outputs_owned_by<'a>(
        &'a self,
        owner: &'a RecipientKey,
    ) -> impl Iterator<Item = (&'a OutputReference, &'a Output)> + 'a {
        self.unspent.iter().filter(move |(_, output)| output.recipient == *owner)
    }

    pub fn balance_of(&self, owner: &RecipientKey) -> u128 {
        self.outputs_owned_by(owner)
            .map(|(_, output)| u128::from(output.value))
            .sum()
    }
}

/// Build an unsigned transaction paying `amount` from `owner` to `recipient`.
///
/// Coins owned by `owner` are taken in reference order until they cover
/// `amount + fee`; any surplus returns to `owner` as a second output. The fee
/// is whatever the outputs leave unclaimed.
pub fn build_spend(
    state: &CoinState,
    owner: &RecipientKey,
    recipient: &RecipientKey,
    amount: u64,
    fee: u64,
) -> Result<Transaction, StateError> {
    let needed = amount.checked_add(fee).ok_or(StateError::InsufficientFunds {
        needed: u64::MAX,
        available: 0,
    })?;

    let mut candidates: Vec<_> = state.outputs_owned_by(owner).collect();
    candidates.sort_by_key(|(reference, _)| **reference);

    let mut total: u64 = 0;
    let mut inputs = Vec::new();
    for (reference, output) in candidates {
        if total >= needed {
            break;
        }
        total = total.saturating_add(output.value);
        inputs.push(Input::unsigned(*reference));
    }

    if total < needed {
        return Err(StateError::InsufficientFunds {
            needed,
            available: total,
        });
    }

    let mut outputs = vec![Output::new(amount, *recipient)];
    let change = total - needed;
    if change > 0 {
        outputs.push(Output::new(change, *owner));
    }
    Ok(Transaction::new(inputs, outputs))
}
