use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;

use crate::common::types::TxnId;
use crate::transaction::transaction::Transaction;

/// Process-wide map of live transactions.
///
/// The lock manager is parameterized on this instead of reaching for a
/// global: wound–wait needs to abort a transaction it only knows by id.
#[derive(Default)]
pub struct TransactionRegistry {
    txns: RwLock<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, txn: Arc<Transaction>) {
        self.txns.write().insert(txn.id(), txn);
    }

    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txns.read().get(&txn_id).cloned()
    }

    pub fn remove(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txns.write().remove(&txn_id)
    }

    pub fn live_ids(&self) -> Vec<TxnId> {
        self.txns.read().keys().copied().collect()
    }
}
