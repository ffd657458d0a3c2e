use super::error::{RecordError, RecordResult};
use crate::file::PAGE_SIZE;

/// Slot identifier within a page
pub type SlotId = usize;

/// Slotted page for variable-length tuples.
///
/// Layout: an 8-byte header, then a slot directory growing forward, and
/// tuple bytes growing backward from the end of the page. An all-zero
/// buffer is a valid empty page, so freshly allocated pages need no
/// formatting.
///
/// ```text
/// [slot_count u16][free_end u16][tuple_count u16][reserved u16]
/// [slot 0: offset u16, len u16][slot 1] ...    free    ... [tuple 1][tuple 0]
/// ```
///
/// Pages are append-only: tuples are never removed in place.
pub struct HeapPage<B> {
    buffer: B,
}

const HEADER_SIZE: usize = 8;
const SLOT_SIZE: usize = 4;

/// Largest tuple a page can hold
pub const MAX_TUPLE_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

fn read_u16(buffer: &[u8], at: usize) -> usize {
    u16::from_le_bytes([buffer[at], buffer[at + 1]]) as usize
}

fn write_u16(buffer: &mut [u8], at: usize, value: usize) {
    buffer[at..at + 2].copy_from_slice(&(value as u16).to_le_bytes());
}

fn corrupt(msg: String) -> RecordError {
    RecordError::CorruptPage(msg)
}

impl<B: AsRef<[u8]>> HeapPage<B> {
    /// Wrap a page buffer (zero-copy).
    ///
    /// The header and slot directory are checked up front, so a damaged
    /// page read from disk fails here instead of in the accessors.
    pub fn from_buffer(buffer: B) -> RecordResult<Self> {
        let len = buffer.as_ref().len();
        if len != PAGE_SIZE {
            return Err(RecordError::File(crate::file::FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: len,
            }));
        }
        let page = Self { buffer };
        page.validate()?;
        Ok(page)
    }

    fn validate(&self) -> RecordResult<()> {
        let slot_count = self.slot_count();
        let directory_end = HEADER_SIZE + slot_count * SLOT_SIZE;
        let free_end = self.free_end();
        if directory_end > free_end {
            return Err(corrupt(format!(
                "{} slots end at byte {}, past the tuple area at {}",
                slot_count, directory_end, free_end
            )));
        }
        if self.tuple_count() != slot_count {
            return Err(corrupt(format!(
                "{} tuples recorded for {} slots",
                self.tuple_count(),
                slot_count
            )));
        }

        for slot_id in 0..slot_count {
            let (offset, len) = self.slot(slot_id);
            if offset < free_end || offset + len > PAGE_SIZE {
                return Err(corrupt(format!(
                    "slot {} spans {}..{}, outside the tuple area {}..{}",
                    slot_id,
                    offset,
                    offset + len,
                    free_end,
                    PAGE_SIZE
                )));
            }
        }
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        self.buffer.as_ref()
    }

    pub fn slot_count(&self) -> usize {
        read_u16(self.bytes(), 0)
    }

    /// Start of the tuple area (0 in the header means "end of page")
    fn free_end(&self) -> usize {
        match read_u16(self.bytes(), 2) {
            0 => PAGE_SIZE,
            end => end,
        }
    }

    pub fn tuple_count(&self) -> usize {
        read_u16(self.bytes(), 4)
    }

    pub fn is_empty(&self) -> bool {
        self.tuple_count() == 0
    }

    /// Contiguous free bytes between the slot directory and the tuples
    pub fn free_space(&self) -> usize {
        self.free_end()
            .saturating_sub(HEADER_SIZE + self.slot_count() * SLOT_SIZE)
    }

    fn slot(&self, slot_id: SlotId) -> (usize, usize) {
        let at = HEADER_SIZE + slot_id * SLOT_SIZE;
        (read_u16(self.bytes(), at), read_u16(self.bytes(), at + 2))
    }

    /// Get tuple bytes from a slot
    pub fn get(&self, slot_id: SlotId) -> RecordResult<&[u8]> {
        if slot_id >= self.slot_count() {
            return Err(RecordError::InvalidSlot(0, slot_id));
        }
        let (offset, len) = self.slot(slot_id);
        self.bytes()
            .get(offset..offset + len)
            .ok_or(RecordError::InvalidSlot(0, slot_id))
    }

    /// Tuples in slot order
    pub fn tuples(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.slot_count()).filter_map(move |slot_id| {
            let (offset, len) = self.slot(slot_id);
            self.bytes().get(offset..offset + len)
        })
    }

    /// Check whether a tuple of `len` bytes (plus its slot) fits
    pub fn can_fit(&self, len: usize) -> bool {
        len + SLOT_SIZE <= self.free_space()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut()
    }

    /// Store a tuple, returning its slot, or `None` if the page is full
    pub fn insert(&mut self, tuple: &[u8]) -> Option<SlotId> {
        if tuple.is_empty() || !self.can_fit(tuple.len()) {
            return None;
        }

        let slot_id = self.slot_count();
        let offset = self.free_end() - tuple.len();
        let buffer = self.bytes_mut();
        buffer[offset..offset + tuple.len()].copy_from_slice(tuple);
        write_u16(buffer, 0, slot_id + 1);
        write_u16(buffer, 2, offset);
        write_u16(buffer, 4, slot_id + 1);

        let at = HEADER_SIZE + slot_id * SLOT_SIZE;
        write_u16(buffer, at, offset);
        write_u16(buffer, at + 2, tuple.len());

        Some(slot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_buffer_is_empty_page() {
        let buffer = vec![0u8; PAGE_SIZE];
        let page = HeapPage::from_buffer(&buffer[..]).unwrap();
        assert_eq!(page.slot_count(), 0);
        assert!(page.is_empty());
        assert_eq!(page.free_space(), PAGE_SIZE - HEADER_SIZE);
        assert_eq!(page.tuples().count(), 0);
    }

    #[test]
    fn test_wrong_buffer_size() {
        let buffer = vec![0u8; 100];
        assert!(HeapPage::from_buffer(&buffer[..]).is_err());
    }

    #[test]
    fn test_insert_and_get() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = HeapPage::from_buffer(&mut buffer[..]).unwrap();

        assert_eq!(page.insert(b"abcd"), Some(0));
        assert_eq!(page.insert(b"efghijkl"), Some(1));
        assert_eq!(page.get(0).unwrap(), b"abcd");
        assert_eq!(page.get(1).unwrap(), b"efghijkl");
        assert_eq!(page.tuple_count(), 2);
        assert_eq!(
            page.free_space(),
            PAGE_SIZE - HEADER_SIZE - 2 * SLOT_SIZE - 12
        );
        assert!(page.get(2).is_err());
        assert_eq!(page.insert(b""), None);
    }

    #[test]
    fn test_contents_survive_rewrap() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        {
            let mut page = HeapPage::from_buffer(&mut buffer[..]).unwrap();
            page.insert(b"one1").unwrap();
            page.insert(b"two2").unwrap();
        }

        let page = HeapPage::from_buffer(&buffer[..]).unwrap();
        let tuples: Vec<&[u8]> = page.tuples().collect();
        assert_eq!(tuples, vec![&b"one1"[..], &b"two2"[..]]);
    }

    #[test]
    fn test_page_full() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = HeapPage::from_buffer(&mut buffer[..]).unwrap();

        let tuple = [7u8; 100];
        let mut inserted = 0;
        while page.insert(&tuple).is_some() {
            inserted += 1;
        }
        assert_eq!(inserted, (PAGE_SIZE - HEADER_SIZE) / (100 + SLOT_SIZE));
        assert!(!page.can_fit(100));
        assert!(page.tuples().all(|t| t == tuple));
    }

    #[test]
    fn test_max_tuple_fits_empty_page() {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut page = HeapPage::from_buffer(&mut buffer[..]).unwrap();
        let big = vec![1u8; MAX_TUPLE_SIZE];
        assert_eq!(page.insert(&big), Some(0));
        assert_eq!(page.free_space(), 0);
    }

    fn damaged(edit: impl FnOnce(&mut [u8])) -> Vec<u8> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        {
            let mut page = HeapPage::from_buffer(&mut buffer[..]).unwrap();
            page.insert(b"abcd").unwrap();
            page.insert(b"efgh").unwrap();
        }
        edit(&mut buffer);
        buffer
    }

    #[test]
    fn test_damaged_pages_are_rejected() {
        // slot directory running past the end of the page
        let buffer = damaged(|b| {
            write_u16(b, 0, 0xFFFF);
            write_u16(b, 4, 0xFFFF);
        });
        assert!(matches!(
            HeapPage::from_buffer(&buffer[..]),
            Err(RecordError::CorruptPage(_))
        ));

        // tuple area starting inside the header
        let buffer = damaged(|b| write_u16(b, 2, 4));
        assert!(matches!(
            HeapPage::from_buffer(&buffer[..]),
            Err(RecordError::CorruptPage(_))
        ));

        // slot length reaching beyond the page
        let buffer = damaged(|b| write_u16(b, HEADER_SIZE + 2, 0xFFFF));
        assert!(matches!(
            HeapPage::from_buffer(&buffer[..]),
            Err(RecordError::CorruptPage(_))
        ));

        // slot pointing into the slot directory
        let buffer = damaged(|b| write_u16(b, HEADER_SIZE + SLOT_SIZE, 2));
        assert!(matches!(
            HeapPage::from_buffer(&buffer[..]),
            Err(RecordError::CorruptPage(_))
        ));

        // tuple count disagreeing with the slot count
        let buffer = damaged(|b| write_u16(b, 4, 7));
        assert!(matches!(
            HeapPage::from_buffer(&buffer[..]),
            Err(RecordError::CorruptPage(_))
        ));

        let intact = damaged(|_| {});
        assert_eq!(HeapPage::from_buffer(&intact[..]).unwrap().tuple_count(), 2);
    }
}
