use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, INVALID_PAGE_ID};

/// Maximum number of hash bits the directory can consume.
pub const MAX_DEPTH: u32 = 9;

/// Directory slots available at full depth.
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << MAX_DEPTH;

const PAGE_ID_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;

/// Working copy of the extendible-hash directory page.
///
/// Loaded from its buffer-pool page at the start of an operation and stored
/// back after structural mutation; the table latch serializes both.
/// The directory holds bucket *page ids*, never bucket storage — the buffer
/// pool owns every page.
pub struct HashDirectory {
    page_id: PageId,
    global_depth: u32,
    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
    bucket_page_ids: [PageId; DIRECTORY_ARRAY_SIZE],
}

impl HashDirectory {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            global_depth: 0,
            local_depths: [0; DIRECTORY_ARRAY_SIZE],
            bucket_page_ids: [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE],
        }
    }

    pub fn load(page: &Page) -> Self {
        let mut dir = Self::new(LittleEndian::read_u32(&page.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]));
        dir.global_depth = LittleEndian::read_u32(&page.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]);
        dir.local_depths
            .copy_from_slice(&page.data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE]);
        for i in 0..DIRECTORY_ARRAY_SIZE {
            let at = BUCKET_PAGE_IDS_OFFSET + i * 4;
            dir.bucket_page_ids[i] = LittleEndian::read_u32(&page.data[at..at + 4]);
        }
        dir
    }

    pub fn store(&self, page: &mut Page) {
        LittleEndian::write_u32(&mut page.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4], self.page_id);
        LittleEndian::write_u32(
            &mut page.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4],
            self.global_depth,
        );
        page.data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE]
            .copy_from_slice(&self.local_depths);
        for i in 0..DIRECTORY_ARRAY_SIZE {
            let at = BUCKET_PAGE_IDS_OFFSET + i * 4;
            LittleEndian::write_u32(&mut page.data[at..at + 4], self.bucket_page_ids[i]);
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Number of directory slots currently in use: `2^global_depth`.
    pub fn size(&self) -> usize {
        1 << self.global_depth
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth) - 1
    }

    pub fn incr_global_depth(&mut self) {
        assert!(self.global_depth < MAX_DEPTH, "directory is at maximum depth");
        self.global_depth += 1;
    }

    pub fn decr_global_depth(&mut self) {
        assert!(self.global_depth > 0, "directory is at minimum depth");
        self.global_depth -= 1;
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        self.local_depths[idx] as u32
    }

    pub fn set_local_depth(&mut self, idx: usize, depth: u32) {
        self.local_depths[idx] = depth as u8;
    }

    pub fn incr_local_depth(&mut self, idx: usize) {
        self.local_depths[idx] += 1;
    }

    pub fn decr_local_depth(&mut self, idx: usize) {
        self.local_depths[idx] -= 1;
    }

    /// Mask selecting the hash bits that distinguish slot `idx`'s bucket.
    pub fn local_depth_mask(&self, idx: usize) -> u32 {
        (1 << self.local_depth(idx)) - 1
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        self.bucket_page_ids[idx]
    }

    pub fn set_bucket_page_id(&mut self, idx: usize, page_id: PageId) {
        self.bucket_page_ids[idx] = page_id;
    }

    /// The sibling slot split off from `idx` at its current local depth.
    pub fn split_image_index(&self, idx: usize) -> usize {
        let local_depth = self.local_depth(idx);
        debug_assert!(local_depth > 0, "slot {} has no split image at depth 0", idx);
        idx ^ (1 << (local_depth - 1))
    }

    /// The directory may halve iff every local depth is strictly below the
    /// global depth.
    pub fn can_shrink(&self) -> bool {
        (0..self.size()).all(|i| self.local_depth(i) < self.global_depth)
    }

    /// Directory structure invariants; panics on violation. Test support.
    pub fn verify_integrity(&self) {
        use std::collections::HashMap;

        let mut slots_per_bucket: HashMap<PageId, u32> = HashMap::new();
        let mut depth_per_bucket: HashMap<PageId, u32> = HashMap::new();

        for i in 0..self.size() {
            let bucket_page_id = self.bucket_page_id(i);
            let local_depth = self.local_depth(i);
            assert!(
                local_depth <= self.global_depth,
                "slot {} local depth {} exceeds global depth {}",
                i,
                local_depth,
                self.global_depth
            );

            *slots_per_bucket.entry(bucket_page_id).or_insert(0) += 1;
            match depth_per_bucket.get(&bucket_page_id) {
                Some(&depth) => assert_eq!(
                    depth, local_depth,
                    "slots sharing bucket page {} disagree on local depth",
                    bucket_page_id
                ),
                None => {
                    depth_per_bucket.insert(bucket_page_id, local_depth);
                }
            }
        }

        for (bucket_page_id, count) in slots_per_bucket {
            let depth = depth_per_bucket[&bucket_page_id];
            assert_eq!(
                count,
                1 << (self.global_depth - depth),
                "bucket page {} is pointed at by the wrong number of slots",
                bucket_page_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_page() {
        let mut dir = HashDirectory::new(7);
        dir.incr_global_depth();
        dir.set_bucket_page_id(0, 11);
        dir.set_local_depth(0, 1);
        dir.set_bucket_page_id(1, 12);
        dir.set_local_depth(1, 1);

        let mut page = Page::new(7);
        dir.store(&mut page);
        let loaded = HashDirectory::load(&page);

        assert_eq!(loaded.page_id(), 7);
        assert_eq!(loaded.global_depth(), 1);
        assert_eq!(loaded.bucket_page_id(0), 11);
        assert_eq!(loaded.bucket_page_id(1), 12);
        loaded.verify_integrity();
    }

    #[test]
    fn test_split_image_index() {
        let mut dir = HashDirectory::new(0);
        dir.incr_global_depth();
        dir.incr_global_depth();
        dir.set_local_depth(1, 2);
        assert_eq!(dir.split_image_index(1), 3);
        dir.set_local_depth(2, 1);
        assert_eq!(dir.split_image_index(2), 3);
    }

    #[test]
    fn test_can_shrink() {
        let mut dir = HashDirectory::new(0);
        dir.incr_global_depth();
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        assert!(!dir.can_shrink());
        dir.set_local_depth(0, 0);
        dir.set_local_depth(1, 0);
        assert!(dir.can_shrink());
    }
}
