use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::index::hash::{ExtendibleHashTable, HashTableError};
use crate::common::types::TxnId;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::registry::TransactionRegistry;
use crate::transaction::transaction::{IndexWriteOp, IsolationLevel, Transaction, TransactionState};

/// Creates and finishes transactions.
///
/// Commit and abort both release every lock the transaction still holds;
/// abort first plays the index write set backwards so the index forgets the
/// transaction's mutations.
pub struct TransactionManager {
    registry: Arc<TransactionRegistry>,
    lock_manager: Arc<LockManager>,
    next_txn_id: AtomicU32,
}

impl TransactionManager {
    pub fn new(registry: Arc<TransactionRegistry>, lock_manager: Arc<LockManager>) -> Self {
        Self {
            registry,
            lock_manager,
            next_txn_id: AtomicU32::new(1),
        }
    }

    /// Start a new transaction in its growing phase.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.registry.register(txn.clone());
        txn
    }

    /// Commit: release all locks, then forget the transaction.
    pub fn commit(&self, txn: &Transaction) {
        txn.set_state(TransactionState::Committed);
        txn.take_index_writes(); // the mutations stand; drop the undo log
        self.lock_manager.release_all(txn);
        self.registry.remove(txn.id());
    }

    /// Abort: undo recorded index mutations newest-first against `index`,
    /// release all locks, forget the transaction.
    pub fn abort(
        &self,
        txn: &Transaction,
        index: Option<&ExtendibleHashTable>,
    ) -> Result<(), HashTableError> {
        txn.set_state(TransactionState::Aborted);

        if let Some(index) = index {
            for record in txn.take_index_writes() {
                match record.op {
                    IndexWriteOp::Insert => {
                        index.remove(None, record.key, record.rid)?;
                    }
                    IndexWriteOp::Delete => {
                        index.insert(None, record.key, record.rid)?;
                    }
                }
            }
        }

        self.lock_manager.release_all(txn);
        self.registry.remove(txn.id());
        Ok(())
    }

    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.registry.get(txn_id)
    }
}
