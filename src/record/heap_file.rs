use std::path::Path;

use tracing::trace;

use super::error::{RecordError, RecordResult};
use super::page::{HeapPage, MAX_TUPLE_SIZE, SlotId};
use crate::file::{BufferManager, FileHandle, PageId};

/// Physical identifier for a tuple (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

/// Heap file of variable-length tuples, accessed through the buffer pool
pub struct HeapFile;

impl HeapFile {
    /// Create an empty heap file and open it
    pub fn create<P: AsRef<Path>>(buffer_mgr: &mut BufferManager, path: P) -> RecordResult<FileHandle> {
        buffer_mgr.file_manager_mut().create_file(&path)?;
        Ok(buffer_mgr.file_manager_mut().open_file(&path)?)
    }

    /// Append a tuple to the file's last page, allocating a new page when it
    /// is full. Every page touched is pinned only for the write.
    pub fn insert_tuple(
        buffer_mgr: &mut BufferManager,
        file: FileHandle,
        tuple: &[u8],
    ) -> RecordResult<RecordId> {
        if tuple.is_empty() || tuple.len() > MAX_TUPLE_SIZE {
            return Err(RecordError::TupleTooLarge(tuple.len()));
        }

        if let Some(page_id) = buffer_mgr.file_manager().last_page_id(file)? {
            let pin = buffer_mgr.fetch_page(file, page_id)?;
            let slot = {
                let mut page = HeapPage::from_buffer(buffer_mgr.page_mut(&pin)?)?;
                page.insert(tuple)
            };
            buffer_mgr.release(pin, slot.is_some())?;

            if let Some(slot_id) = slot {
                return Ok(RecordId::new(page_id, slot_id));
            }
        }

        let pin = buffer_mgr.allocate_page(file)?;
        let page_id = pin.page_id();
        trace!(file = file.as_usize(), page_id, "heap file grew");
        let slot = {
            let mut page = HeapPage::from_buffer(buffer_mgr.page_mut(&pin)?)?;
            page.insert(tuple)
        };
        buffer_mgr.release(pin, true)?;

        slot.map(|slot_id| RecordId::new(page_id, slot_id))
            .ok_or(RecordError::PageFull(page_id))
    }

    /// Copy out every tuple of one page, leaving the page unpinned
    pub fn page_tuples(
        buffer_mgr: &mut BufferManager,
        file: FileHandle,
        page_id: PageId,
    ) -> RecordResult<Vec<Vec<u8>>> {
        let pin = buffer_mgr.fetch_page(file, page_id)?;
        let tuples = buffer_mgr
            .page(&pin)
            .map_err(RecordError::from)
            .and_then(HeapPage::from_buffer)
            .map(|page| page.tuples().map(<[u8]>::to_vec).collect());
        buffer_mgr.release(pin, false)?;
        tuples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PagedFileManager;
    use tempfile::TempDir;

    fn setup_test_env(capacity: usize) -> (TempDir, BufferManager, FileHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_manager = PagedFileManager::new();
        let mut buffer_mgr = BufferManager::with_capacity(file_manager, capacity);
        let file = HeapFile::create(&mut buffer_mgr, temp_dir.path().join("heap.tbl")).unwrap();
        (temp_dir, buffer_mgr, file)
    }

    #[test]
    fn test_insert_into_empty_file() {
        let (_temp_dir, mut bm, file) = setup_test_env(4);

        let rid = HeapFile::insert_tuple(&mut bm, file, b"tuple-01").unwrap();
        assert_eq!(rid, RecordId::new(1, 0));
        let rid = HeapFile::insert_tuple(&mut bm, file, b"tuple-02").unwrap();
        assert_eq!(rid, RecordId::new(1, 1));

        assert_eq!(bm.pinned_frame_count(), 0);
        let tuples = HeapFile::page_tuples(&mut bm, file, 1).unwrap();
        assert_eq!(tuples, vec![b"tuple-01".to_vec(), b"tuple-02".to_vec()]);
    }

    #[test]
    fn test_insert_spills_to_new_page() {
        let (_temp_dir, mut bm, file) = setup_test_env(2);

        let tuple = vec![9u8; 1000];
        let mut rids = Vec::new();
        for _ in 0..20 {
            rids.push(HeapFile::insert_tuple(&mut bm, file, &tuple).unwrap());
        }

        let pages = bm.file_manager().page_count(file).unwrap();
        assert!(pages >= 3);
        assert_eq!(bm.pinned_frame_count(), 0);

        let mut total = 0;
        for page_id in bm.file_manager().page_ids(file).unwrap() {
            total += HeapFile::page_tuples(&mut bm, file, page_id).unwrap().len();
        }
        assert_eq!(total, 20);
        assert_eq!(rids.last().unwrap().page_id, pages);
    }

    #[test]
    fn test_insert_survives_flush() {
        let (_temp_dir, mut bm, file) = setup_test_env(2);
        HeapFile::insert_tuple(&mut bm, file, b"persist!").unwrap();
        bm.flush_file(file).unwrap();
        assert!(!bm.is_page_cached(file, 1));

        let tuples = HeapFile::page_tuples(&mut bm, file, 1).unwrap();
        assert_eq!(tuples, vec![b"persist!".to_vec()]);
    }

    #[test]
    fn test_reject_oversized_tuple() {
        let (_temp_dir, mut bm, file) = setup_test_env(2);
        let huge = vec![0u8; MAX_TUPLE_SIZE + 1];
        assert!(matches!(
            HeapFile::insert_tuple(&mut bm, file, &huge),
            Err(RecordError::TupleTooLarge(_))
        ));
        assert!(matches!(
            HeapFile::insert_tuple(&mut bm, file, &[]),
            Err(RecordError::TupleTooLarge(0))
        ));
    }
}
