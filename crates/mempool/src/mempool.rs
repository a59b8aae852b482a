use crate::{utils::calculate_valid_gas, MempoolError, Reputation};
use ethers::types::{Address, U256};
use operon_primitives::{
    constants::{
        mempool::{GAS_INCREASE_PERC, MAX_USER_OPERATIONS_PER_SENDER},
        validation::entities::SENDER,
    },
    reputation::StakeInfo,
    UserOperation, UserOperationHash,
};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// A user operation admitted into the mempool, together with the data recorded
/// at validation time that bundle assembly needs later
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub user_operation: UserOperation,
    pub hash: UserOperationHash,
    /// Max value the entry point (or the paymaster's deposit) must already hold to
    /// pay for this operation; recorded for bundle feasibility checks
    pub prefund: U256,
    pub aggregator: Option<Address>,
}

#[derive(Default)]
struct PoolInner {
    /// Insertion-ordered entries; the order is what makes the inclusion sort FIFO-stable
    /// among equal tips
    entries: Vec<MempoolEntry>,
    count_by_sender: HashMap<Address, usize>,
}

impl PoolInner {
    fn position_by_sender_nonce(&self, sender: &Address, nonce: &U256) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry.user_operation.sender == *sender && entry.user_operation.nonce == *nonce
        })
    }

    fn position_by_hash(&self, hash: &UserOperationHash) -> Option<usize> {
        self.entries.iter().position(|entry| entry.hash == *hash)
    }

    fn remove_at(&mut self, idx: usize) -> MempoolEntry {
        let entry = self.entries.remove(idx);
        let sender = entry.user_operation.sender;
        let count = self.count_by_sender.get(&sender).copied().unwrap_or_default();
        if count <= 1 {
            self.count_by_sender.remove(&sender);
        } else {
            self.count_by_sender.insert(sender, count - 1);
        }
        entry
    }
}

/// In-memory set of pending user operations with per-sender quotas and
/// replace-by-fee semantics.
///
/// Cheap to clone; clones share the underlying pool.
#[derive(Clone)]
pub struct Mempool {
    inner: Arc<RwLock<PoolInner>>,
    reputation: Reputation,
}

impl Mempool {
    pub fn new(reputation: Reputation) -> Self {
        Self { inner: Arc::new(RwLock::new(PoolInner::default())), reputation }
    }

    /// Number of user operations currently in the pool
    pub fn count(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Adds a user operation to the pool.
    ///
    /// An entry sharing `(sender, nonce)` with an existing one is a replacement: it is
    /// accepted only when both fee fields are bumped by at least
    /// [GAS_INCREASE_PERC](GAS_INCREASE_PERC) percent, and overwrites the old entry in place.
    /// A new entry from a sender already at the quota is rejected unless the sender is
    /// sufficiently staked.
    pub fn add(
        &self,
        entry: MempoolEntry,
        sender_info: &StakeInfo,
    ) -> Result<(), MempoolError> {
        {
            let mut pool = self.inner.write();

            let sender = entry.user_operation.sender;
            if let Some(idx) =
                pool.position_by_sender_nonce(&sender, &entry.user_operation.nonce)
            {
                let old = &pool.entries[idx].user_operation;

                let old_max_priority_fee_per_gas = old.max_priority_fee_per_gas;
                let new_max_priority_fee_per_gas = entry.user_operation.max_priority_fee_per_gas;
                if new_max_priority_fee_per_gas <
                    calculate_valid_gas(
                        old_max_priority_fee_per_gas,
                        U256::from(GAS_INCREASE_PERC),
                    )
                {
                    return Err(MempoolError::ReplacementUnderpriced {
                        fee_field: "maxPriorityFeePerGas",
                        old: old_max_priority_fee_per_gas,
                        new: new_max_priority_fee_per_gas,
                    });
                }

                let old_max_fee_per_gas = old.max_fee_per_gas;
                let new_max_fee_per_gas = entry.user_operation.max_fee_per_gas;
                if new_max_fee_per_gas <
                    calculate_valid_gas(old_max_fee_per_gas, U256::from(GAS_INCREASE_PERC))
                {
                    return Err(MempoolError::ReplacementUnderpriced {
                        fee_field: "maxFeePerGas",
                        old: old_max_fee_per_gas,
                        new: new_max_fee_per_gas,
                    });
                }

                pool.entries[idx] = entry.clone();
            } else {
                if pool.count_by_sender.get(&sender).copied().unwrap_or_default() >=
                    MAX_USER_OPERATIONS_PER_SENDER &&
                    self.reputation.check_stake(SENDER, Some(sender_info)).is_err()
                {
                    return Err(MempoolError::TooManyUserOperations { sender });
                }
                *pool.count_by_sender.entry(sender).or_default() += 1;
                pool.entries.push(entry.clone());
            }
        }

        if let Some(aggregator) = entry.aggregator {
            self.reputation.increment_seen(&aggregator);
        }
        if let Some(paymaster) = entry.user_operation.paymaster() {
            self.reputation.increment_seen(&paymaster);
        }
        if let Some(factory) = entry.user_operation.factory() {
            self.reputation.increment_seen(&factory);
        }

        Ok(())
    }

    /// Removes the user operation with the given `(sender, nonce)`, if present
    pub fn remove(&self, sender: &Address, nonce: &U256) -> bool {
        let mut pool = self.inner.write();
        match pool.position_by_sender_nonce(sender, nonce) {
            Some(idx) => {
                pool.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Removes the user operation with the given hash, if present
    pub fn remove_by_hash(&self, hash: &UserOperationHash) -> bool {
        let mut pool = self.inner.write();
        match pool.position_by_hash(hash) {
            Some(idx) => {
                pool.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the pool sorted for inclusion: by `max_priority_fee_per_gas`
    /// descending, insertion order among equal tips
    pub fn get_sorted_for_inclusion(&self) -> Vec<MempoolEntry> {
        let mut entries = self.inner.read().entries.clone();
        entries.sort_by(|a, b| {
            b.user_operation
                .max_priority_fee_per_gas
                .cmp(&a.user_operation.max_priority_fee_per_gas)
        });
        entries
    }

    /// All user operations currently in the pool, in insertion order (debug aid)
    pub fn dump(&self) -> Vec<UserOperation> {
        self.inner.read().entries.iter().map(|entry| entry.user_operation.clone()).collect()
    }

    /// Drops every entry (debug aid)
    pub fn clear(&self) {
        let mut pool = self.inner.write();
        pool.entries.clear();
        pool.count_by_sender.clear();
    }
}
