use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Frame, FramePtr, FrameId, Page, PagePtr, PageId, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::{DiskManager, LogManager};

/// Mutable bookkeeping guarded by the instance latch.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// One buffer pool instance: a fixed set of frames caching disk pages.
///
/// When the instance is one shard of a parallel pool it only ever allocates
/// page ids in its own residue class (`instance_index + k * num_instances`).
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    frames: Vec<FramePtr>,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
    #[allow(dead_code)] // wired for forward compatibility, not exercised yet
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManager {
    /// Stand-alone pool over a database file at `db_path`.
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::new_sharded(pool_size, 1, 0, disk_manager, None))
    }

    /// Instance `instance_index` of `num_instances` over a shared disk manager.
    pub fn new_sharded(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = i as FrameId;
            let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index,
            }),
            replacer: LruReplacer::new(pool_size),
            disk_manager,
            log_manager,
        }
    }

    /// Fetch a page, pinning it. Reads through to disk on a miss.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();
            frame_guard.pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(frame_guard.page.clone());
        }

        let frame_id = self.find_fresh_frame(&mut state)?;
        let frame = &self.frames[frame_id as usize];
        {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                if let Err(e) = self.disk_manager.read_page(page_id, &mut page_guard) {
                    page_guard.reset();
                    drop(page_guard);
                    state.free_list.push_back(frame_id);
                    return Err(e.into());
                }
            }
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
        }
        state.page_table.insert(page_id, frame_id);

        Ok(frame.read().page.clone())
    }

    /// Allocate a fresh page in this instance's residue class, pinned.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = self.find_fresh_frame(&mut state)?;
        let page_id = self.allocate_page(&mut state);

        let frame = &self.frames[frame_id as usize];
        {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                page_guard.reset();
                page_guard.page_id = page_id;
            }
            frame_guard.pin_count = 1;
            // The zeroed frame differs from whatever the file holds, so an
            // eviction before the first flush must write.
            frame_guard.is_dirty = true;
        }
        state.page_table.insert(page_id, frame_id);

        Ok((frame.read().page.clone(), page_id))
    }

    /// Drop one pin; when the count reaches zero the frame becomes evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        if frame_guard.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }
        frame_guard.is_dirty |= is_dirty;
        frame_guard.pin_count -= 1;
        if frame_guard.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a resident page back to disk and clear its dirty bit.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        // Resolve the frame under the instance latch, but copy the bytes
        // without it so a latched page can be flushed while its holder is
        // inside another pool operation.
        let frame_id = {
            let state = self.state.lock();
            *state
                .page_table
                .get(&page_id)
                .ok_or(BufferPoolError::PageNotFound(page_id))?
        };

        let frame = &self.frames[frame_id as usize];
        let page_ptr = frame.read().page.clone();
        let page_copy = page_ptr.read().clone();
        self.disk_manager.write_page(&page_copy)?;
        frame.write().is_dirty = false;

        Ok(())
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Delete a page. Absent pages count as deleted; pinned pages cannot be.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        self.disk_manager.deallocate_page(page_id);

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(());
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        if frame_guard.pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame_guard.page.write().reset();
        frame_guard.is_dirty = false;
        drop(frame_guard);
        state.free_list.push_back(frame_id);

        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Pin count of a resident page, if any. Exposed for invariant checks.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(self.frames[frame_id as usize].read().pin_count)
    }

    /// Number of frames the replacer currently considers evictable.
    pub fn evictable_count(&self) -> usize {
        self.replacer.len()
    }

    /// Take a frame from the free list, or evict the LRU victim. Dirty
    /// victims are written back before the frame is reused.
    fn find_fresh_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.victim() else {
            return Err(BufferPoolError::BufferPoolFull);
        };

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        let victim_page_id = frame_guard.page.read().page_id;

        if frame_guard.is_dirty {
            let page_copy = frame_guard.page.read().clone();
            self.disk_manager.write_page(&page_copy)?;
            frame_guard.is_dirty = false;
        }
        if victim_page_id != INVALID_PAGE_ID {
            debug!(
                "evicting page {} from frame {} of instance {}",
                victim_page_id, frame_id, self.instance_index
            );
            state.page_table.remove(&victim_page_id);
        }

        Ok(frame_id)
    }

    /// Next page id in this instance's residue class. The modular invariant
    /// is a hard assertion: violating it is a programming error.
    fn allocate_page(&self, state: &mut PoolState) -> PageId {
        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances;
        assert_eq!(
            page_id % self.num_instances,
            self.instance_index,
            "page id {} escaped the residue class of instance {}/{}",
            page_id,
            self.instance_index,
            self.num_instances
        );
        page_id
    }
}
