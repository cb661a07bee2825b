use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::{PagePtr, PageId};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::manager::BufferPoolManager;
use crate::storage::disk::{DiskManager, LogManager};

/// Facade sharding page ids across several buffer pool instances.
///
/// A known page lives in instance `page_id % num_instances`; new pages are
/// allocated round-robin so the instances fill evenly.
pub struct ParallelBufferPoolManager {
    instances: Vec<Arc<BufferPoolManager>>,
    pool_size: usize,
    last_alloc_idx: Mutex<usize>,
}

impl ParallelBufferPoolManager {
    pub fn new(
        num_instances: u32,
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let instances = (0..num_instances)
            .map(|i| {
                Arc::new(BufferPoolManager::new_sharded(
                    pool_size,
                    num_instances,
                    i,
                    disk_manager.clone(),
                    log_manager.clone(),
                ))
            })
            .collect();

        Self {
            instances,
            pool_size,
            last_alloc_idx: Mutex::new(0),
        }
    }

    /// Aggregate capacity across all instances.
    pub fn pool_size(&self) -> usize {
        self.instances.len() * self.pool_size
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// The instance responsible for a page id.
    pub fn instance_for(&self, page_id: PageId) -> &Arc<BufferPoolManager> {
        &self.instances[page_id as usize % self.instances.len()]
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).flush_page(page_id)
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).delete_page(page_id)
    }

    /// Allocate a page from the first instance willing, probing round-robin
    /// from a rotating cursor. The cursor advances by one on every call,
    /// successful or not, so consecutive allocations spread across shards.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut cursor = self.last_alloc_idx.lock();
        let start = *cursor;
        *cursor = (*cursor + 1) % self.instances.len();

        for probe in 0..self.instances.len() {
            let idx = (start + probe) % self.instances.len();
            match self.instances[idx].new_page() {
                Ok(result) => return Ok(result),
                Err(BufferPoolError::BufferPoolFull) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BufferPoolError::BufferPoolFull)
    }

    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }
}
