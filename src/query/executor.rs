use std::sync::Arc;
use thiserror::Error;

use crate::common::types::{PageId, Rid, TxnId};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::error::PageError;
use crate::storage::page::record::RecordPage;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::transaction::{IsolationLevel, Transaction};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Transaction {0} could not lock record {1}")]
    LockDenied(TxnId, Rid),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Pull-based executor contract. `Ok(None)` means end of stream; a fatal
/// child failure surfaces as an error, never as an unwound panic.
pub trait Executor {
    fn next(&mut self) -> ExecutorResult<Option<(Vec<u8>, Rid)>>;
}

/// Row predicate over raw record bytes.
pub type Predicate = Box<dyn Fn(&[u8]) -> bool + Send>;

/// Reference client of the storage core: scans record pages in order,
/// taking a shared lock per row as its isolation level demands and dropping
/// it early under READ COMMITTED.
pub struct SeqScanExecutor {
    buffer_pool: Arc<BufferPoolManager>,
    lock_manager: Arc<LockManager>,
    txn: Arc<Transaction>,
    page_ids: Vec<PageId>,
    predicate: Option<Predicate>,
    page_cursor: usize,
    slot_cursor: u32,
}

impl SeqScanExecutor {
    pub fn new(
        buffer_pool: Arc<BufferPoolManager>,
        lock_manager: Arc<LockManager>,
        txn: Arc<Transaction>,
        page_ids: Vec<PageId>,
        predicate: Option<Predicate>,
    ) -> Self {
        Self {
            buffer_pool,
            lock_manager,
            txn,
            page_ids,
            predicate,
            page_cursor: 0,
            slot_cursor: 0,
        }
    }

    fn lock_row(&self, rid: Rid) -> ExecutorResult<()> {
        if self.txn.isolation_level() == IsolationLevel::ReadUncommitted {
            return Ok(());
        }
        if self.txn.is_shared_locked(rid) || self.txn.is_exclusive_locked(rid) {
            return Ok(());
        }
        if !self.lock_manager.lock_shared(&self.txn, rid) {
            return Err(ExecutorError::LockDenied(self.txn.id(), rid));
        }
        Ok(())
    }

    fn unlock_row_if_read_committed(&self, rid: Rid) {
        if self.txn.isolation_level() == IsolationLevel::ReadCommitted {
            self.lock_manager.unlock(&self.txn, rid);
        }
    }
}

impl Executor for SeqScanExecutor {
    fn next(&mut self) -> ExecutorResult<Option<(Vec<u8>, Rid)>> {
        // Rows failing the predicate are skipped by looping, not recursing.
        loop {
            let Some(&page_id) = self.page_ids.get(self.page_cursor) else {
                return Ok(None);
            };

            let page = self.buffer_pool.fetch_page(page_id)?;
            let record_count = RecordPage::record_count(&page.read());

            if self.slot_cursor >= record_count {
                self.buffer_pool.unpin_page(page_id, false)?;
                self.page_cursor += 1;
                self.slot_cursor = 0;
                continue;
            }

            let rid = Rid::new(page_id, self.slot_cursor);
            self.slot_cursor += 1;

            if let Err(e) = self.lock_row(rid) {
                self.buffer_pool.unpin_page(page_id, false)?;
                return Err(e);
            }

            let record = {
                let page_guard = page.read();
                RecordPage::get_record(&page_guard, rid.slot_num)
            };
            self.buffer_pool.unpin_page(page_id, false)?;

            match record {
                Ok(data) => {
                    self.unlock_row_if_read_committed(rid);
                    if self
                        .predicate
                        .as_ref()
                        .map(|predicate| predicate(&data))
                        .unwrap_or(true)
                    {
                        return Ok(Some((data, rid)));
                    }
                }
                Err(PageError::RecordNotFound) => {
                    // Tombstone: release the lock where the level allows it
                    // and move on.
                    self.unlock_row_if_read_committed(rid);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
