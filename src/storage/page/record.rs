use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, SlotNum, PAGE_SIZE};
use crate::storage::page::error::PageError;

pub const RECORD_HEADER_SIZE: usize = 12;
pub const SLOT_ENTRY_SIZE: usize = 8; // 4 bytes offset + 4 bytes length

/// Header of a slotted record page.
#[derive(Debug, Clone, Copy)]
pub struct RecordPageHeader {
    pub record_count: u32,
    pub free_space_offset: u32,
    pub free_space_size: u32,
}

impl RecordPageHeader {
    pub fn new() -> Self {
        Self {
            record_count: 0,
            free_space_offset: RECORD_HEADER_SIZE as u32,
            free_space_size: (PAGE_SIZE - RECORD_HEADER_SIZE) as u32,
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.record_count);
        LittleEndian::write_u32(&mut bytes[4..8], self.free_space_offset);
        LittleEndian::write_u32(&mut bytes[8..12], self.free_space_size);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            record_count: LittleEndian::read_u32(&bytes[0..4]),
            free_space_offset: LittleEndian::read_u32(&bytes[4..8]),
            free_space_size: LittleEndian::read_u32(&bytes[8..12]),
        }
    }
}

impl Default for RecordPageHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Slotted record page codec. Records grow from the header, the slot array
/// grows from the page tail; a deleted record keeps its slot with length 0.
/// Slot numbers are stable for the lifetime of the page, which is what makes
/// a `Rid` a usable lock handle.
pub struct RecordPage;

impl RecordPage {
    pub fn init(page: &mut Page) {
        let header = RecordPageHeader::new();
        page.data[0..RECORD_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn header(page: &Page) -> RecordPageHeader {
        RecordPageHeader::from_bytes(&page.data[0..RECORD_HEADER_SIZE])
    }

    /// Append a record, returning its slot number.
    pub fn insert_record(page: &mut Page, data: &[u8]) -> Result<SlotNum, PageError> {
        let mut header = Self::header(page);

        let record_size = data.len() as u32;
        let needed = record_size + SLOT_ENTRY_SIZE as u32;
        if header.free_space_size < needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.record_count;
        let slot_pos = Self::slot_position(slot);

        let start = header.free_space_offset as usize;
        page.data[start..start + data.len()].copy_from_slice(data);

        LittleEndian::write_u32(&mut page.data[slot_pos..slot_pos + 4], header.free_space_offset);
        LittleEndian::write_u32(&mut page.data[slot_pos + 4..slot_pos + 8], record_size);

        header.record_count += 1;
        header.free_space_offset += record_size;
        header.free_space_size -= needed;
        page.data[0..RECORD_HEADER_SIZE].copy_from_slice(&header.to_bytes());

        Ok(slot)
    }

    /// Read a live record's bytes.
    pub fn get_record(page: &Page, slot: SlotNum) -> Result<Vec<u8>, PageError> {
        let header = Self::header(page);
        if slot >= header.record_count {
            return Err(PageError::InvalidSlot);
        }

        let (offset, length) = Self::slot_entry(page, slot);
        if length == 0 {
            return Err(PageError::RecordNotFound);
        }

        Ok(page.data[offset as usize..(offset + length) as usize].to_vec())
    }

    /// Tombstone a record; its slot number is never reused.
    pub fn delete_record(page: &mut Page, slot: SlotNum) -> Result<(), PageError> {
        let header = Self::header(page);
        if slot >= header.record_count {
            return Err(PageError::InvalidSlot);
        }

        let (offset, length) = Self::slot_entry(page, slot);
        if length == 0 {
            return Err(PageError::RecordNotFound);
        }

        let slot_pos = Self::slot_position(slot);
        LittleEndian::write_u32(&mut page.data[slot_pos..slot_pos + 4], offset);
        LittleEndian::write_u32(&mut page.data[slot_pos + 4..slot_pos + 8], 0);

        Ok(())
    }

    pub fn record_count(page: &Page) -> u32 {
        Self::header(page).record_count
    }

    fn slot_position(slot: SlotNum) -> usize {
        PAGE_SIZE - SLOT_ENTRY_SIZE * (slot as usize + 1)
    }

    fn slot_entry(page: &Page, slot: SlotNum) -> (u32, u32) {
        let slot_pos = Self::slot_position(slot);
        let offset = LittleEndian::read_u32(&page.data[slot_pos..slot_pos + 4]);
        let length = LittleEndian::read_u32(&page.data[slot_pos + 4..slot_pos + 8]);
        (offset, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::INVALID_PAGE_ID;

    #[test]
    fn test_insert_and_get_record() {
        let mut page = Page::new(INVALID_PAGE_ID);
        RecordPage::init(&mut page);

        let slot_a = RecordPage::insert_record(&mut page, b"alpha").unwrap();
        let slot_b = RecordPage::insert_record(&mut page, b"beta").unwrap();
        assert_eq!(slot_a, 0);
        assert_eq!(slot_b, 1);

        assert_eq!(RecordPage::get_record(&page, slot_a).unwrap(), b"alpha");
        assert_eq!(RecordPage::get_record(&page, slot_b).unwrap(), b"beta");
    }

    #[test]
    fn test_delete_leaves_tombstone() {
        let mut page = Page::new(INVALID_PAGE_ID);
        RecordPage::init(&mut page);

        let slot = RecordPage::insert_record(&mut page, b"gone").unwrap();
        RecordPage::delete_record(&mut page, slot).unwrap();

        assert!(matches!(
            RecordPage::get_record(&page, slot),
            Err(PageError::RecordNotFound)
        ));
        // Slot numbers remain stable: the next insert gets a fresh slot.
        let next = RecordPage::insert_record(&mut page, b"after").unwrap();
        assert_eq!(next, slot + 1);
    }

    #[test]
    fn test_page_fills_up() {
        let mut page = Page::new(INVALID_PAGE_ID);
        RecordPage::init(&mut page);

        let big = vec![7u8; 4000];
        RecordPage::insert_record(&mut page, &big).unwrap();
        RecordPage::insert_record(&mut page, &big).unwrap();
        assert!(matches!(
            RecordPage::insert_record(&mut page, &big),
            Err(PageError::InsufficientSpace)
        ));
    }
}
