use std::collections::HashSet;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Rid, TxnId};
use crate::storage::page::bucket::IndexKey;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase-locking transaction states. A transaction is born `Growing`,
/// moves to `Shrinking` on its first unlock under REPEATABLE READ, and ends
/// in one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// What an index mutation did, for rollback on abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWriteOp {
    Insert,
    Delete,
}

/// One recorded index mutation.
#[derive(Debug, Clone, Copy)]
pub struct IndexWriteRecord {
    pub key: IndexKey,
    pub rid: Rid,
    pub op: IndexWriteOp,
}

/// An active transaction.
///
/// Everything mutable sits behind its own latch: wound–wait aborts a
/// transaction from whichever thread discovered the conflict, so state and
/// lock sets must be safe to touch cross-thread.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: RwLock<TransactionState>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    index_write_set: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: RwLock::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            index_write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }

    /// Snapshot of every RID this transaction holds a lock on.
    pub fn locked_rids(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }

    pub fn shared_lock_count(&self) -> usize {
        self.shared_lock_set.lock().len()
    }

    pub fn exclusive_lock_count(&self) -> usize {
        self.exclusive_lock_set.lock().len()
    }

    pub fn record_index_write(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    /// Drain the index write set, newest first, for rollback.
    pub fn take_index_writes(&self) -> Vec<IndexWriteRecord> {
        let mut writes = std::mem::take(&mut *self.index_write_set.lock());
        writes.reverse();
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_is_growing() {
        let txn = Transaction::new(1, IsolationLevel::RepeatableRead);
        assert_eq!(txn.id(), 1);
        assert_eq!(txn.state(), TransactionState::Growing);
        assert_eq!(txn.isolation_level(), IsolationLevel::RepeatableRead);
    }

    #[test]
    fn test_lock_set_bookkeeping() {
        let txn = Transaction::new(2, IsolationLevel::ReadCommitted);
        let rid = Rid::new(3, 4);

        txn.add_shared_lock(rid);
        assert!(txn.is_shared_locked(rid));
        assert!(!txn.is_exclusive_locked(rid));

        txn.remove_shared_lock(rid);
        txn.add_exclusive_lock(rid);
        assert!(txn.is_exclusive_locked(rid));
        assert_eq!(txn.locked_rids(), vec![rid]);
    }

    #[test]
    fn test_index_writes_drain_newest_first() {
        let txn = Transaction::new(3, IsolationLevel::RepeatableRead);
        txn.record_index_write(IndexWriteRecord {
            key: 10,
            rid: Rid::new(0, 0),
            op: IndexWriteOp::Insert,
        });
        txn.record_index_write(IndexWriteRecord {
            key: 20,
            rid: Rid::new(0, 1),
            op: IndexWriteOp::Delete,
        });

        let writes = txn.take_index_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].key, 20);
        assert_eq!(writes[1].key, 10);
        assert!(txn.take_index_writes().is_empty());
    }
}
