use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::types::FrameId;

/// LRU replacement policy over the currently-unpinned frames.
///
/// Insertion order is recency order: `unpin` appends at the most-recent end,
/// `victim` pops the least-recently-unpinned frame. Capacity is maintained by
/// the buffer pool through `pin`/`victim`; the replacer never evicts on its
/// own.
pub struct LruReplacer {
    frames: Mutex<LinkedHashMap<FrameId, ()>>,
}

impl LruReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            frames: Mutex::new(LinkedHashMap::with_capacity(pool_size)),
        }
    }

    /// Mark a frame evictable. No-op if the frame is already tracked.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut frames = self.frames.lock();
        if frames.contains_key(&frame_id) {
            return;
        }
        frames.insert(frame_id, ());
    }

    /// Remove a frame from consideration. No-op if the frame is not tracked.
    pub fn pin(&self, frame_id: FrameId) {
        self.frames.lock().remove(&frame_id);
    }

    /// Pop the least-recently-unpinned frame, if any.
    pub fn victim(&self) -> Option<FrameId> {
        self.frames.lock().pop_front().map(|(frame_id, ())| frame_id)
    }

    /// Number of frames currently evictable.
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a frame is currently evictable.
    pub fn contains(&self, frame_id: FrameId) -> bool {
        self.frames.lock().contains_key(&frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_is_least_recently_unpinned() {
        let replacer = LruReplacer::new(7);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_unpin_is_idempotent() {
        let replacer = LruReplacer::new(7);
        replacer.unpin(1);
        replacer.unpin(2);
        // Re-unpinning frame 1 must not refresh its recency.
        replacer.unpin(1);

        assert_eq!(replacer.len(), 2);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_pin_removes() {
        let replacer = LruReplacer::new(7);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.pin(1);
        replacer.pin(99); // untracked, no-op

        assert_eq!(replacer.len(), 1);
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }
}
