use std::fs::{File, OpenOptions};
use std::io::{Read, Write, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager handles the actual page I/O against the database file.
///
/// Page `p` lives at byte offset `p * PAGE_SIZE`. Reads past the end of the
/// file yield a zeroed page, so freshly allocated ids are readable before
/// their first flush.
pub struct DiskManager {
    db_file: Mutex<File>,
    next_page_id: AtomicU32,
}

impl DiskManager {
    /// Open (or create) the database file at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        let file_size = file.metadata()?.len();
        let next_page_id = (file_size / PAGE_SIZE as u64) as PageId;

        Ok(Self {
            db_file: Mutex::new(file),
            next_page_id: AtomicU32::new(next_page_id),
        })
    }

    /// Read a page from disk into `page`.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut buffer = [0u8; PAGE_SIZE];

        {
            let mut file = self.db_file.lock();
            let file_size = file.metadata()?.len();

            // The page has never been written: hand back a fresh zeroed page.
            if offset >= file_size {
                page.data = [0; PAGE_SIZE];
                page.page_id = page_id;
                return Ok(());
            }

            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }

        page.data.copy_from_slice(&buffer);
        page.page_id = page_id;

        Ok(())
    }

    /// Write a page to disk, extending the file if needed.
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = Self::page_offset(page.page_id);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.flush()?;

        Ok(())
    }

    /// Hand out the next unused page id. Only non-sharded callers use this;
    /// sharded buffer-pool instances allocate within their own residue class.
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Release a page id. The teaching engine keeps no on-disk free map, so
    /// this is a sink; the id is simply never reused within a run.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_disk_manager() -> (DiskManager, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path()).unwrap();
        (dm, file)
    }

    #[test]
    fn test_write_then_read_page() {
        let (dm, _file) = test_disk_manager();

        let mut page = Page::new(3);
        page.data[0..5].copy_from_slice(b"hello");
        dm.write_page(&page).unwrap();

        let mut read_back = Page::new(INVALID_PAGE_ID);
        dm.read_page(3, &mut read_back).unwrap();
        assert_eq!(read_back.page_id, 3);
        assert_eq!(&read_back.data[0..5], b"hello");
    }

    #[test]
    fn test_read_unwritten_page_is_zeroed() {
        let (dm, _file) = test_disk_manager();

        let mut page = Page::new(INVALID_PAGE_ID);
        page.data[17] = 0xAB;
        dm.read_page(42, &mut page).unwrap();
        assert_eq!(page.page_id, 42);
        assert!(page.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_allocate_is_sequential() {
        let (dm, _file) = test_disk_manager();
        let first = dm.allocate_page();
        assert_eq!(dm.allocate_page(), first + 1);
        assert_eq!(dm.allocate_page(), first + 2);
    }

    #[test]
    fn test_invalid_page_id_rejected() {
        let (dm, _file) = test_disk_manager();
        let mut page = Page::new(INVALID_PAGE_ID);
        assert!(dm.read_page(INVALID_PAGE_ID, &mut page).is_err());
        assert!(dm.write_page(&page).is_err());
    }
}
