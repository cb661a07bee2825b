use std::hash::Hasher;
use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;
use twox_hash::XxHash64;

use crate::common::types::{PageId, Rid};
use crate::index::hash::error::HashTableError;
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::bucket::{HashBucket, IndexKey, BUCKET_ARRAY_SIZE};
use crate::storage::page::directory::{HashDirectory, MAX_DEPTH};
use crate::transaction::transaction::{IndexWriteOp, IndexWriteRecord, Transaction};

/// Disk-backed extendible hash index mapping fixed-width keys to RIDs.
///
/// All index state lives in buffer-pool pages: one directory page plus one
/// page per bucket. Two latch levels protect it — a table-wide RwLock taken
/// shared by operations that leave the directory alone and exclusive by the
/// ones that grow or shrink it, and a per-bucket latch (the bucket page's own
/// RwLock). Latch order is always table first, then a single bucket.
pub struct ExtendibleHashTable {
    buffer_pool: Arc<BufferPoolManager>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    hash_seed: u64,
}

impl ExtendibleHashTable {
    /// Build an empty table: a directory at global depth 1 over two fresh
    /// bucket pages.
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, HashTableError> {
        let (directory_page, directory_page_id) = buffer_pool.new_page()?;
        let (_bucket0, bucket0_page_id) = buffer_pool.new_page()?;
        let (_bucket1, bucket1_page_id) = buffer_pool.new_page()?;

        let mut directory = HashDirectory::new(directory_page_id);
        directory.incr_global_depth();
        directory.set_bucket_page_id(0, bucket0_page_id);
        directory.set_local_depth(0, 1);
        directory.set_bucket_page_id(1, bucket1_page_id);
        directory.set_local_depth(1, 1);
        directory.store(&mut directory_page.write());

        // A zeroed page is a valid empty bucket, so the bucket pages need no
        // further initialization.
        buffer_pool.unpin_page(directory_page_id, true)?;
        buffer_pool.unpin_page(bucket0_page_id, false)?;
        buffer_pool.unpin_page(bucket1_page_id, false)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            hash_seed: 0,
        })
    }

    /// 64-bit hash truncated to 32 bits; the directory consumes its low bits.
    fn hash(&self, key: IndexKey) -> u32 {
        let mut hasher = XxHash64::with_seed(self.hash_seed);
        hasher.write_u64(key);
        hasher.finish() as u32
    }

    fn key_to_index(&self, key: IndexKey, directory: &HashDirectory) -> usize {
        (self.hash(key) & directory.global_depth_mask()) as usize
    }

    /// Fetch the directory page and copy it out.
    fn load_directory(&self) -> Result<HashDirectory, HashTableError> {
        let page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = HashDirectory::load(&page.read());
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(directory)
    }

    /// Write the directory back to its page.
    fn store_directory(&self, directory: &HashDirectory) -> Result<(), HashTableError> {
        let page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        directory.store(&mut page.write());
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        Ok(())
    }

    /// Look up every value stored under `key`.
    pub fn get_value(&self, key: IndexKey) -> Result<Vec<Rid>, HashTableError> {
        let _table = self.table_latch.read();

        let directory = self.load_directory()?;
        let bucket_page_id = directory.bucket_page_id(self.key_to_index(key, &directory));
        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;

        let result = {
            let bucket_guard = bucket_page.read();
            HashBucket::get_value(&bucket_guard, key)
        };
        self.buffer_pool.unpin_page(bucket_page_id, false)?;

        Ok(result)
    }

    /// Insert a `(key, rid)` pair. Duplicate pairs are rejected before any
    /// split. Returns whether the pair went in.
    pub fn insert(
        &self,
        txn: Option<&Transaction>,
        key: IndexKey,
        value: Rid,
    ) -> Result<bool, HashTableError> {
        let mut bucket_was_full = false;
        {
            let _table = self.table_latch.read();

            let directory = self.load_directory()?;
            let bucket_page_id = directory.bucket_page_id(self.key_to_index(key, &directory));
            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;

            let mut bucket_guard = bucket_page.write();
            if HashBucket::get_value(&bucket_guard, key).contains(&value) {
                drop(bucket_guard);
                self.buffer_pool.unpin_page(bucket_page_id, false)?;
                return Ok(false);
            }
            if HashBucket::is_full(&bucket_guard) {
                bucket_was_full = true;
                drop(bucket_guard);
                self.buffer_pool.unpin_page(bucket_page_id, false)?;
            } else {
                let inserted = HashBucket::insert(&mut bucket_guard, key, value);
                drop(bucket_guard);
                self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
                if inserted {
                    Self::record_write(txn, key, value, IndexWriteOp::Insert);
                }
                return Ok(inserted);
            }
        }

        debug_assert!(bucket_was_full);
        self.split_insert(txn, key, value)
    }

    /// Insert path for a full bucket: split (growing the directory when the
    /// victim is at global depth) until the key's bucket has room.
    fn split_insert(
        &self,
        txn: Option<&Transaction>,
        key: IndexKey,
        value: Rid,
    ) -> Result<bool, HashTableError> {
        let _table = self.table_latch.write();

        let mut directory = self.load_directory()?;
        let mut directory_dirty = false;

        let inserted = loop {
            let bucket_idx = self.key_to_index(key, &directory);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let mut bucket_guard = bucket_page.write();

            if HashBucket::get_value(&bucket_guard, key).contains(&value) {
                drop(bucket_guard);
                self.buffer_pool.unpin_page(bucket_page_id, false)?;
                break false;
            }

            if !HashBucket::is_full(&bucket_guard) {
                let inserted = HashBucket::insert(&mut bucket_guard, key, value);
                drop(bucket_guard);
                self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
                break inserted;
            }

            // Split the victim bucket. Growing first if it sits at global
            // depth; the old slots' pointers are duplicated into the new
            // half so every slot still resolves.
            let old_size = directory.size();
            if directory.local_depth(bucket_idx) == directory.global_depth() {
                if directory.global_depth() == MAX_DEPTH {
                    // Every hash bit is already consumed: this bucket holds
                    // more low-bit collisions than a split can separate.
                    drop(bucket_guard);
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    if directory_dirty {
                        self.store_directory(&directory)?;
                    }
                    return Ok(false);
                }
                directory.incr_global_depth();
                directory_dirty = true;
                for slot in old_size..directory.size() {
                    directory.set_bucket_page_id(slot, directory.bucket_page_id(slot - old_size));
                    directory.set_local_depth(slot, directory.local_depth(slot - old_size));
                }
                debug!(
                    "hash directory grew to global depth {}",
                    directory.global_depth()
                );
            }

            let new_local_depth = directory.local_depth(bucket_idx) + 1;
            let image_bit = 1usize << (new_local_depth - 1);
            let image_idx = bucket_idx ^ image_bit;

            let (image_page, image_page_id) = match self.buffer_pool.new_page() {
                Ok(page) => page,
                Err(BufferPoolError::BufferPoolFull) => {
                    // No frame for a new bucket: surface as a refused insert.
                    // Any completed split from an earlier pass still has to
                    // reach the directory page; a bare grow is consistent.
                    drop(bucket_guard);
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    if directory_dirty {
                        self.store_directory(&directory)?;
                    }
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };

            // Every slot sharing the split bucket re-aims by the bit that now
            // distinguishes the two halves, and adopts the new local depth.
            let image_bit_set = image_idx & image_bit != 0;
            for slot in 0..directory.size() {
                if directory.bucket_page_id(slot) != bucket_page_id {
                    continue;
                }
                if (slot & image_bit != 0) == image_bit_set {
                    directory.set_bucket_page_id(slot, image_page_id);
                }
                directory.set_local_depth(slot, new_local_depth);
            }
            directory_dirty = true;

            // Rehash: entries whose distinguishing bit matches the image
            // migrate into the new bucket.
            {
                let mut image_guard = image_page.write();
                for i in 0..BUCKET_ARRAY_SIZE {
                    if !HashBucket::is_readable(&bucket_guard, i) {
                        if !HashBucket::is_occupied(&bucket_guard, i) {
                            break;
                        }
                        continue;
                    }
                    let entry_key = HashBucket::key_at(&bucket_guard, i);
                    let entry_bit_set = self.hash(entry_key) as usize & image_bit != 0;
                    if entry_bit_set == image_bit_set {
                        let entry_value = HashBucket::value_at(&bucket_guard, i);
                        HashBucket::insert(&mut image_guard, entry_key, entry_value);
                        HashBucket::remove_at(&mut bucket_guard, i);
                    }
                }
            }
            debug!(
                "split bucket page {} into page {} at local depth {}",
                bucket_page_id, image_page_id, new_local_depth
            );

            drop(bucket_guard);
            self.buffer_pool.unpin_page(bucket_page_id, true)?;
            self.buffer_pool.unpin_page(image_page_id, true)?;
            // Loop: the key's slot may still resolve to a full bucket.
        };

        if directory_dirty {
            self.store_directory(&directory)?;
        }
        if inserted {
            Self::record_write(txn, key, value, IndexWriteOp::Insert);
        }
        Ok(inserted)
    }

    /// Remove the exact `(key, rid)` pair. A removal that empties its bucket
    /// triggers a merge pass.
    pub fn remove(
        &self,
        txn: Option<&Transaction>,
        key: IndexKey,
        value: Rid,
    ) -> Result<bool, HashTableError> {
        let removed;
        let mut emptied = false;
        {
            let _table = self.table_latch.read();

            let directory = self.load_directory()?;
            let bucket_page_id = directory.bucket_page_id(self.key_to_index(key, &directory));
            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;

            let mut bucket_guard = bucket_page.write();
            removed = HashBucket::remove(&mut bucket_guard, key, value);
            if removed && HashBucket::is_empty(&bucket_guard) {
                emptied = true;
            }
            drop(bucket_guard);
            self.buffer_pool.unpin_page(bucket_page_id, removed)?;
        }

        if emptied {
            self.merge()?;
        }
        if removed {
            Self::record_write(txn, key, value, IndexWriteOp::Delete);
        }
        Ok(removed)
    }

    /// Fold empty buckets into their split images and shrink the directory
    /// while every local depth sits strictly below the global depth.
    fn merge(&self) -> Result<(), HashTableError> {
        let _table = self.table_latch.write();

        let mut directory = self.load_directory()?;
        let mut directory_dirty = false;

        let mut slot = 0;
        // The directory may shrink mid-scan; re-read the size every pass.
        while slot < directory.size() {
            let local_depth = directory.local_depth(slot);
            let bucket_page_id = directory.bucket_page_id(slot);

            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let is_empty = {
                let bucket_guard = bucket_page.read();
                HashBucket::is_empty(&bucket_guard)
            };
            self.buffer_pool.unpin_page(bucket_page_id, false)?;

            if local_depth > 1 && is_empty {
                let image_idx = directory.split_image_index(slot);
                let image_page_id = directory.bucket_page_id(image_idx);

                if directory.local_depth(image_idx) == local_depth
                    && image_page_id != bucket_page_id
                {
                    // Point every slot at the surviving bucket one level up.
                    for other in 0..directory.size() {
                        let other_page_id = directory.bucket_page_id(other);
                        if other_page_id == bucket_page_id || other_page_id == image_page_id {
                            directory.set_bucket_page_id(other, image_page_id);
                            directory.set_local_depth(other, local_depth - 1);
                        }
                    }
                    directory_dirty = true;
                    self.buffer_pool.delete_page(bucket_page_id)?;
                    debug!(
                        "merged empty bucket page {} into page {}",
                        bucket_page_id, image_page_id
                    );
                }

                if directory.can_shrink() {
                    directory.decr_global_depth();
                    directory_dirty = true;
                    debug!(
                        "hash directory shrank to global depth {}",
                        directory.global_depth()
                    );
                }
            }
            slot += 1;
        }

        if directory_dirty {
            self.store_directory(&directory)?;
        }
        Ok(())
    }

    /// Current global depth (test support).
    pub fn global_depth(&self) -> Result<u32, HashTableError> {
        let _table = self.table_latch.read();
        Ok(self.load_directory()?.global_depth())
    }

    /// Check directory invariants and that every stored key hashes into the
    /// bucket holding it. Panics on violation; test support.
    pub fn verify_integrity(&self) -> Result<(), HashTableError> {
        let _table = self.table_latch.read();

        let directory = self.load_directory()?;
        directory.verify_integrity();

        for slot in 0..directory.size() {
            let bucket_page_id = directory.bucket_page_id(slot);
            let mask = directory.local_depth_mask(slot);
            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
            {
                let bucket_guard = bucket_page.read();
                for i in 0..BUCKET_ARRAY_SIZE {
                    if !HashBucket::is_readable(&bucket_guard, i) {
                        if !HashBucket::is_occupied(&bucket_guard, i) {
                            break;
                        }
                        continue;
                    }
                    let key = HashBucket::key_at(&bucket_guard, i);
                    assert_eq!(
                        self.hash(key) & mask,
                        slot as u32 & mask,
                        "key {} is stored in a bucket it does not hash to",
                        key
                    );
                }
            }
            self.buffer_pool.unpin_page(bucket_page_id, false)?;
        }
        Ok(())
    }

    fn record_write(txn: Option<&Transaction>, key: IndexKey, rid: Rid, op: IndexWriteOp) {
        if let Some(txn) = txn {
            txn.record_index_write(IndexWriteRecord { key, rid, op });
        }
    }
}
