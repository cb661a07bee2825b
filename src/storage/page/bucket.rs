use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, Rid, PAGE_SIZE};

/// Fixed-width index key. The 8-byte width matches the common integer-key
/// instantiation; wider keys are out of scope for the teaching core.
pub type IndexKey = u64;

/// Bytes per stored `(key, rid)` pair: u64 key + u32 page id + u32 slot.
pub const BUCKET_PAIR_SIZE: usize = 16;

/// Pairs per bucket page. Each pair costs its own bytes plus two bitmap bits
/// (occupied and readable), i.e. `PAGE_SIZE / (PAIR_SIZE + 1/4)` pairs.
pub const BUCKET_ARRAY_SIZE: usize = 4 * PAGE_SIZE / (4 * BUCKET_PAIR_SIZE + 1);

const BITMAP_BYTES: usize = (BUCKET_ARRAY_SIZE + 7) / 8;
const OCCUPIED_OFFSET: usize = 0;
const READABLE_OFFSET: usize = BITMAP_BYTES;
const PAIRS_OFFSET: usize = 2 * BITMAP_BYTES;

/// Bucket page codec for the extendible hash index.
///
/// Two bitmaps guard the pair array: `occupied` marks slots that have ever
/// held a value (a tombstone-aware probe sentinel), `readable` marks slots
/// that currently hold one. Probes stop at the first never-occupied slot.
pub struct HashBucket;

impl HashBucket {
    /// Collect every value stored under `key`.
    pub fn get_value(page: &Page, key: IndexKey) -> Vec<Rid> {
        let mut result = Vec::new();
        for i in 0..BUCKET_ARRAY_SIZE {
            if !Self::is_readable(page, i) {
                if !Self::is_occupied(page, i) {
                    break;
                }
                continue;
            }
            if Self::key_at(page, i) == key {
                result.push(Self::value_at(page, i));
            }
        }
        result
    }

    /// Insert a pair. Refuses duplicates of the exact `(key, value)` pair and
    /// refuses when no free slot remains.
    pub fn insert(page: &mut Page, key: IndexKey, value: Rid) -> bool {
        if Self::is_full(page) {
            return false;
        }
        if Self::get_value(page, key).contains(&value) {
            return false;
        }

        for i in 0..BUCKET_ARRAY_SIZE {
            if !Self::is_readable(page, i) {
                Self::put_pair(page, i, key, value);
                Self::set_readable(page, i, true);
                Self::set_occupied(page, i, true);
                return true;
            }
        }
        false
    }

    /// Remove the exact `(key, value)` pair, leaving a tombstone.
    pub fn remove(page: &mut Page, key: IndexKey, value: Rid) -> bool {
        for i in 0..BUCKET_ARRAY_SIZE {
            if !Self::is_readable(page, i) {
                continue;
            }
            if Self::key_at(page, i) == key && Self::value_at(page, i) == value {
                Self::set_readable(page, i, false);
                return true;
            }
        }
        false
    }

    /// Tombstone slot `i` without looking at its contents (split migration).
    pub fn remove_at(page: &mut Page, i: usize) {
        Self::set_occupied(page, i, true);
        Self::set_readable(page, i, false);
    }

    pub fn key_at(page: &Page, i: usize) -> IndexKey {
        let at = PAIRS_OFFSET + i * BUCKET_PAIR_SIZE;
        LittleEndian::read_u64(&page.data[at..at + 8])
    }

    pub fn value_at(page: &Page, i: usize) -> Rid {
        let at = PAIRS_OFFSET + i * BUCKET_PAIR_SIZE + 8;
        Rid::new(
            LittleEndian::read_u32(&page.data[at..at + 4]),
            LittleEndian::read_u32(&page.data[at + 4..at + 8]),
        )
    }

    fn put_pair(page: &mut Page, i: usize, key: IndexKey, value: Rid) {
        let at = PAIRS_OFFSET + i * BUCKET_PAIR_SIZE;
        LittleEndian::write_u64(&mut page.data[at..at + 8], key);
        LittleEndian::write_u32(&mut page.data[at + 8..at + 12], value.page_id);
        LittleEndian::write_u32(&mut page.data[at + 12..at + 16], value.slot_num);
    }

    pub fn is_occupied(page: &Page, i: usize) -> bool {
        page.data[OCCUPIED_OFFSET + i / 8] >> (i % 8) & 1 == 1
    }

    pub fn is_readable(page: &Page, i: usize) -> bool {
        page.data[READABLE_OFFSET + i / 8] >> (i % 8) & 1 == 1
    }

    fn set_occupied(page: &mut Page, i: usize, bit: bool) {
        Self::set_bit(page, OCCUPIED_OFFSET + i / 8, i % 8, bit);
    }

    fn set_readable(page: &mut Page, i: usize, bit: bool) {
        Self::set_bit(page, READABLE_OFFSET + i / 8, i % 8, bit);
    }

    fn set_bit(page: &mut Page, byte: usize, shift: usize, bit: bool) {
        if bit {
            page.data[byte] |= 1 << shift;
        } else {
            page.data[byte] &= !(1 << shift);
        }
    }

    pub fn num_readable(page: &Page) -> usize {
        page.data[READABLE_OFFSET..READABLE_OFFSET + BITMAP_BYTES]
            .iter()
            .map(|byte| byte.count_ones() as usize)
            .sum()
    }

    pub fn is_full(page: &Page) -> bool {
        Self::num_readable(page) == BUCKET_ARRAY_SIZE
    }

    pub fn is_empty(page: &Page) -> bool {
        Self::num_readable(page) == 0
    }
}
