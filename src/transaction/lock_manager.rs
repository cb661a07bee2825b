use std::collections::HashMap;
use std::sync::Arc;
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::common::types::{Rid, TxnId};
use crate::transaction::registry::TransactionRegistry;
use crate::transaction::transaction::{IsolationLevel, Transaction, TransactionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// One queued lock request. Mode and grant state are bookkeeping mirrored
/// into the transaction's lock sets, which are what the protocol reads.
#[derive(Debug)]
#[allow(dead_code)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

/// Per-RID request queue. Waiters sleep on the condvar while the global
/// latch is released for them.
struct LockRequestQueue {
    requests: Vec<LockRequest>,
    upgrading: bool,
    cv: Arc<Condvar>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            upgrading: false,
            cv: Arc::new(Condvar::new()),
        }
    }
}

type LockTable = HashMap<Rid, LockRequestQueue>;

/// Record-granularity lock manager: strict two-phase locking with wound–wait
/// deadlock avoidance.
///
/// Transactions are ordered by id (lower = older). A requester wounds any
/// younger transaction holding a conflicting lock; a younger exclusive
/// requester facing an older holder aborts itself; a younger shared
/// requester waits. A wounded transaction observes `Aborted` on its next
/// lock call and bails out.
pub struct LockManager {
    registry: Arc<TransactionRegistry>,
    latch: Mutex<LockTable>,
}

impl LockManager {
    pub fn new(registry: Arc<TransactionRegistry>) -> Self {
        Self {
            registry,
            latch: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a shared lock. Blocks while an older transaction holds the
    /// record exclusively. Returns false when the transaction is or becomes
    /// aborted.
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.latch.lock();
        let mut pending = false;

        loop {
            if txn.state() == TransactionState::Aborted {
                if pending {
                    Self::drop_pending_request(&mut table, txn, rid);
                }
                return false;
            }
            // Dirty reads are the point of READ UNCOMMITTED: it never takes
            // shared locks, and asking for one is a protocol violation.
            if txn.isolation_level() == IsolationLevel::ReadUncommitted {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            if txn.state() == TransactionState::Shrinking {
                txn.set_state(TransactionState::Aborted);
                if pending {
                    Self::drop_pending_request(&mut table, txn, rid);
                }
                return false;
            }
            if txn.is_shared_locked(rid) {
                return true;
            }

            let queue = table.entry(rid).or_default();
            let mut must_wait = false;
            let mut wounded_any = false;

            let mut i = 0;
            while i < queue.requests.len() {
                let other_id = queue.requests[i].txn_id;
                let Some(other) = self.registry.get(other_id) else {
                    i += 1;
                    continue;
                };
                if other_id > txn.id() && other.is_exclusive_locked(rid) {
                    Self::wound(queue, i, &other, rid);
                    wounded_any = true;
                } else {
                    if other_id < txn.id() && other.is_exclusive_locked(rid) {
                        must_wait = true;
                    }
                    i += 1;
                }
            }
            if wounded_any {
                queue.cv.notify_all();
            }

            if must_wait {
                // Register the pending request, but grant nothing yet: the
                // wait can wake spuriously, so the conflict scan must come
                // back clean before the lock set is touched.
                Self::insert_into_queue(queue, txn.id(), LockMode::Shared);
                pending = true;
                let cv = queue.cv.clone();
                cv.wait(&mut table);
                continue;
            }

            txn.set_state(TransactionState::Growing);
            Self::insert_into_queue(queue, txn.id(), LockMode::Shared);
            txn.add_shared_lock(rid);
            return true;
        }
    }

    /// Acquire an exclusive lock. Never blocks: younger holders are wounded,
    /// and against an older holder the caller itself aborts (the wound–wait
    /// "wait" arm collapses to a self-abort for writers).
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Aborted {
            return false;
        }
        if txn.state() == TransactionState::Shrinking
            && txn.isolation_level() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let queue = table.entry(rid).or_default();
        let mut wounded_any = false;

        let mut i = 0;
        while i < queue.requests.len() {
            let other_id = queue.requests[i].txn_id;
            if other_id == txn.id() {
                i += 1;
                continue;
            }
            let Some(other) = self.registry.get(other_id) else {
                i += 1;
                continue;
            };
            if other_id > txn.id() {
                // Every queued lock conflicts with an exclusive request.
                Self::wound(queue, i, &other, rid);
                wounded_any = true;
            } else {
                // Older transaction in the way: the younger requester yields.
                txn.remove_shared_lock(rid);
                txn.remove_exclusive_lock(rid);
                txn.set_state(TransactionState::Aborted);
                if wounded_any {
                    queue.cv.notify_all();
                }
                return false;
            }
        }
        if wounded_any {
            queue.cv.notify_all();
        }

        txn.set_state(TransactionState::Growing);
        Self::insert_into_queue(queue, txn.id(), LockMode::Exclusive);
        txn.add_exclusive_lock(rid);
        true
    }

    /// Promote a held shared lock to exclusive. At most one upgrade may be
    /// in flight per record; a second upgrader aborts.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.latch.lock();
        let mut marked = false;

        let granted = loop {
            if txn.state() == TransactionState::Aborted {
                break false;
            }
            if txn.state() == TransactionState::Shrinking
                && txn.isolation_level() == IsolationLevel::RepeatableRead
            {
                txn.set_state(TransactionState::Aborted);
                break false;
            }

            let queue = table.entry(rid).or_default();
            if !marked {
                if queue.upgrading {
                    txn.set_state(TransactionState::Aborted);
                    return false;
                }
                queue.upgrading = true;
                marked = true;
            }

            let mut must_wait = false;
            let mut wounded_any = false;
            let mut i = 0;
            while i < queue.requests.len() {
                let other_id = queue.requests[i].txn_id;
                if other_id == txn.id() {
                    i += 1;
                    continue;
                }
                let Some(other) = self.registry.get(other_id) else {
                    i += 1;
                    continue;
                };
                if other_id > txn.id() {
                    Self::wound(queue, i, &other, rid);
                    wounded_any = true;
                } else {
                    must_wait = true;
                    i += 1;
                }
            }
            if wounded_any {
                queue.cv.notify_all();
            }

            if must_wait {
                let cv = queue.cv.clone();
                cv.wait(&mut table);
                continue;
            }

            txn.set_state(TransactionState::Growing);
            match queue.requests.iter_mut().find(|r| r.txn_id == txn.id()) {
                Some(request) => {
                    request.mode = LockMode::Exclusive;
                    request.granted = true;
                }
                None => queue.requests.push(LockRequest {
                    txn_id: txn.id(),
                    mode: LockMode::Exclusive,
                    granted: true,
                }),
            }
            txn.remove_shared_lock(rid);
            txn.add_exclusive_lock(rid);
            break true;
        };

        if marked {
            if let Some(queue) = table.get_mut(&rid) {
                queue.upgrading = false;
            }
        }
        granted
    }

    /// Release one lock. Under REPEATABLE READ the first unlock flips a
    /// growing transaction into its shrinking phase; weaker levels may
    /// release and re-acquire freely.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.latch.lock();

        if txn.state() == TransactionState::Growing
            && txn.isolation_level() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Shrinking);
        }

        Self::remove_request(&mut table, txn, rid)
    }

    /// Release every lock a finished transaction still holds, without
    /// touching its phase. Commit/abort path.
    pub fn release_all(&self, txn: &Transaction) {
        let mut table = self.latch.lock();
        for rid in txn.locked_rids() {
            Self::remove_request(&mut table, txn, rid);
        }
    }

    /// Remove a never-granted queue entry left behind when a waiter bails.
    fn drop_pending_request(table: &mut LockTable, txn: &Transaction, rid: Rid) {
        if let Some(queue) = table.get_mut(&rid) {
            if let Some(pos) = queue.requests.iter().position(|r| r.txn_id == txn.id()) {
                queue.requests.remove(pos);
            }
        }
    }

    fn remove_request(table: &mut LockTable, txn: &Transaction, rid: Rid) -> bool {
        let Some(queue) = table.get_mut(&rid) else {
            return false;
        };
        let Some(pos) = queue.requests.iter().position(|r| r.txn_id == txn.id()) else {
            return false;
        };
        queue.requests.remove(pos);
        if txn.is_shared_locked(rid) {
            txn.remove_shared_lock(rid);
        } else {
            txn.remove_exclusive_lock(rid);
        }
        queue.cv.notify_all();
        true
    }

    /// Abort a younger transaction in the way of an older one: drop its
    /// request, erase the record from its lock sets, mark it aborted. The
    /// caller notifies the queue so a wounded waiter can wake and bail.
    fn wound(queue: &mut LockRequestQueue, at: usize, other: &Transaction, rid: Rid) {
        debug!("wound-wait: aborting transaction {} over {}", other.id(), rid);
        queue.requests.remove(at);
        other.remove_shared_lock(rid);
        other.remove_exclusive_lock(rid);
        other.set_state(TransactionState::Aborted);
    }

    /// Idempotent on the transaction id; re-inserting rewrites the granted
    /// flag from the current mode.
    fn insert_into_queue(queue: &mut LockRequestQueue, txn_id: TxnId, mode: LockMode) {
        for request in &mut queue.requests {
            if request.txn_id == txn_id {
                request.granted = mode == LockMode::Exclusive;
                return;
            }
        }
        queue.requests.push(LockRequest {
            txn_id,
            mode,
            granted: false,
        });
    }

    /// Granted/queued request count for a record (test support).
    pub fn queue_len(&self, rid: Rid) -> usize {
        self.latch
            .lock()
            .get(&rid)
            .map(|queue| queue.requests.len())
            .unwrap_or(0)
    }
}
