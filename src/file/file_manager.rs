use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageId};

/// Magic bytes at the start of every header page
const HEADER_MAGIC: &[u8; 8] = b"CLKJPGF1";

/// Byte offset of the live-page bitmap inside the header page
const BITMAP_OFFSET: usize = 16;

/// Largest number of page ids a single file can track (header page included)
const MAX_PAGES: usize = (PAGE_SIZE - BITMAP_OFFSET) * 8;

/// Handle to an open file. Two handles are equal iff they refer to the
/// same open file, which is how the buffer pool tells files apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: usize) -> Self {
        Self(raw)
    }
}

/// Paged files on disk, addressed by [`FileHandle`].
///
/// Page 0 of every file is a header holding a bitmap of live pages; data
/// pages are numbered from 1. Deleted page ids are reused by later
/// allocations.
#[derive(Default)]
pub struct PagedFileManager {
    files: HashMap<FileHandle, FileEntry>,
    /// Canonical path -> handle, so a path is only ever opened once
    handles: HashMap<PathBuf, FileHandle>,
    next_handle: usize,
}

struct FileEntry {
    file: File,
    path: PathBuf,
    /// In-memory copy of page 0, written through on every change
    header: Vec<u8>,
}

impl FileEntry {
    fn is_live(&self, page_id: PageId) -> bool {
        page_id != 0 && page_id < MAX_PAGES && bit_is_set(&self.header, page_id)
    }

    fn write_header(&mut self) -> FileResult<()> {
        write_at(&mut self.file, 0, &self.header)
    }
}

fn bit_is_set(header: &[u8], page_id: PageId) -> bool {
    let byte = header[BITMAP_OFFSET + page_id / 8];
    byte & (1 << (page_id % 8)) != 0
}

fn set_bit(header: &mut [u8], page_id: PageId, live: bool) {
    let byte = &mut header[BITMAP_OFFSET + page_id / 8];
    if live {
        *byte |= 1 << (page_id % 8);
    } else {
        *byte &= !(1 << (page_id % 8));
    }
}

fn empty_header() -> Vec<u8> {
    let mut header = vec![0u8; PAGE_SIZE];
    header[..HEADER_MAGIC.len()].copy_from_slice(HEADER_MAGIC);
    header
}

/// Forward iterator over the live page ids of a file, in ascending order.
///
/// Works on a snapshot of the header taken when it was created, so the file
/// can be modified while iterating.
pub struct PageIds {
    header: Vec<u8>,
    next: PageId,
}

impl Iterator for PageIds {
    type Item = PageId;

    fn next(&mut self) -> Option<PageId> {
        while self.next < MAX_PAGES {
            let page_id = self.next;
            self.next += 1;
            // skip whole empty bytes
            if page_id % 8 == 0 && self.header[BITMAP_OFFSET + page_id / 8] == 0 {
                self.next = page_id + 8;
                continue;
            }
            if bit_is_set(&self.header, page_id) {
                return Some(page_id);
            }
        }
        None
    }
}

impl PagedFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a file holding only its header page. Missing parent
    /// directories are created.
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        File::create(path)?.write_all(&empty_header())?;
        Ok(())
    }

    /// Open a paged file. Opening the same path again returns the same handle.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let requested = path.as_ref();
        let path = requested
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(requested.display().to_string()))?;
        if let Some(&handle) = self.handles.get(&path) {
            return Ok(handle);
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut header = vec![0u8; PAGE_SIZE];
        let header_len = read_full(&mut file, &mut header)?;
        if header_len < PAGE_SIZE || header[..HEADER_MAGIC.len()] != HEADER_MAGIC[..] {
            return Err(FileError::BadHeader(path.display().to_string()));
        }

        let handle = FileHandle(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(path.clone(), handle);
        self.files.insert(handle, FileEntry { file, path, header });
        Ok(handle)
    }

    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        let entry = self
            .files
            .remove(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))?;
        self.handles.remove(&entry.path);
        Ok(())
    }

    /// Delete a file from disk, closing it first if it is open
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if let Ok(canonical) = path.canonicalize()
            && let Some(&handle) = self.handles.get(&canonical)
        {
            self.close_file(handle)?;
        }

        fs::remove_file(path)?;
        Ok(())
    }

    pub fn is_file_open(&self, handle: FileHandle) -> bool {
        self.files.contains_key(&handle)
    }

    /// Read a live page into `buffer`
    pub fn read_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        check_buffer_len(buffer.len())?;

        let entry = self.live_entry(handle, page_id)?;
        entry.file.seek(SeekFrom::Start(page_offset(page_id)))?;
        let len = read_full(&mut entry.file, buffer)?;
        // a page allocated at the end of a file may be short on disk
        buffer[len..].fill(0);
        Ok(())
    }

    /// Overwrite a live page
    pub fn write_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &[u8],
    ) -> FileResult<()> {
        check_buffer_len(buffer.len())?;

        let entry = self.live_entry(handle, page_id)?;
        write_at(&mut entry.file, page_id, buffer)
    }

    /// Materialize a zeroed page under the lowest free id
    pub fn allocate_page(&mut self, handle: FileHandle) -> FileResult<(PageId, Vec<u8>)> {
        let entry = self.entry_mut(handle)?;
        let page_id = (1..MAX_PAGES)
            .find(|&id| !bit_is_set(&entry.header, id))
            .ok_or(FileError::FileFull)?;

        let data = vec![0u8; PAGE_SIZE];
        write_at(&mut entry.file, page_id, &data)?;
        set_bit(&mut entry.header, page_id, true);
        entry.write_header()?;

        Ok((page_id, data))
    }

    /// Delete a live page. Its id becomes available for reuse.
    pub fn delete_page(&mut self, handle: FileHandle, page_id: PageId) -> FileResult<()> {
        let entry = self.live_entry(handle, page_id)?;
        set_bit(&mut entry.header, page_id, false);
        entry.write_header()
    }

    /// Live page ids of a file, ascending
    pub fn page_ids(&self, handle: FileHandle) -> FileResult<PageIds> {
        Ok(PageIds {
            header: self.entry(handle)?.header.clone(),
            next: 1,
        })
    }

    /// Number of live data pages
    pub fn page_count(&self, handle: FileHandle) -> FileResult<usize> {
        let header = &self.entry(handle)?.header;
        Ok(header[BITMAP_OFFSET..]
            .iter()
            .map(|b| b.count_ones() as usize)
            .sum())
    }

    /// Highest live page id, if the file has any data pages
    pub fn last_page_id(&self, handle: FileHandle) -> FileResult<Option<PageId>> {
        let header = &self.entry(handle)?.header;
        Ok((1..MAX_PAGES).rev().find(|&id| bit_is_set(header, id)))
    }

    /// fsync every open file
    pub fn sync_all(&mut self) -> FileResult<()> {
        for entry in self.files.values_mut() {
            entry.file.sync_data()?;
        }
        Ok(())
    }

    fn entry(&self, handle: FileHandle) -> FileResult<&FileEntry> {
        self.files
            .get(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    fn entry_mut(&mut self, handle: FileHandle) -> FileResult<&mut FileEntry> {
        self.files
            .get_mut(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    fn live_entry(&mut self, handle: FileHandle, page_id: PageId) -> FileResult<&mut FileEntry> {
        let entry = self.entry_mut(handle)?;
        if !entry.is_live(page_id) {
            return Err(FileError::PageNotFound(page_id));
        }
        Ok(entry)
    }
}

fn page_offset(page_id: PageId) -> u64 {
    (page_id * PAGE_SIZE) as u64
}

fn check_buffer_len(len: usize) -> FileResult<()> {
    if len != PAGE_SIZE {
        return Err(FileError::InvalidPageSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

/// Positioned write, not synced; `sync_all` makes it durable
fn write_at(file: &mut File, page_id: PageId, buffer: &[u8]) -> FileResult<()> {
    file.seek(SeekFrom::Start(page_offset(page_id)))?;
    file.write_all(buffer)?;
    Ok(())
}

/// Read until the buffer is full or EOF, returning the byte count
fn read_full(file: &mut File, buffer: &mut [u8]) -> FileResult<usize> {
    let mut total = 0;
    while total < buffer.len() {
        let n = file.read(&mut buffer[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_new(manager: &mut PagedFileManager, dir: &TempDir, name: &str) -> FileHandle {
        let path = dir.path().join(name);
        manager.create_file(&path).unwrap();
        manager.open_file(&path).unwrap()
    }

    #[test]
    fn test_new_file_is_header_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("t.tbl");
        let mut manager = PagedFileManager::new();

        manager.create_file(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), PAGE_SIZE as u64);
        assert!(matches!(
            manager.create_file(&path),
            Err(FileError::FileAlreadyExists(_))
        ));

        let handle = manager.open_file(&path).unwrap();
        assert_eq!(manager.page_count(handle).unwrap(), 0);
        assert_eq!(manager.page_ids(handle).unwrap().next(), None);
        assert_eq!(manager.last_page_id(handle).unwrap(), None);
    }

    #[test]
    fn test_open_rules() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = PagedFileManager::new();

        assert!(matches!(
            manager.open_file(temp_dir.path().join("missing.tbl")),
            Err(FileError::FileNotFound(_))
        ));

        let plain = temp_dir.path().join("plain.txt");
        fs::write(&plain, b"not a paged file").unwrap();
        assert!(matches!(
            manager.open_file(&plain),
            Err(FileError::BadHeader(_))
        ));

        // Same file through two spellings of its path
        let path = temp_dir.path().join("t.tbl");
        manager.create_file(&path).unwrap();
        let first = manager.open_file(&path).unwrap();
        let second = manager
            .open_file(temp_dir.path().join(".").join("t.tbl"))
            .unwrap();
        assert_eq!(first, second);

        manager.close_file(first).unwrap();
        assert!(!manager.is_file_open(first));
        assert!(matches!(
            manager.close_file(first),
            Err(FileError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_allocate_write_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = PagedFileManager::new();
        let handle = open_new(&mut manager, &temp_dir, "t.tbl");

        let (page_id, data) = manager.allocate_page(handle).unwrap();
        assert_eq!(page_id, 1);
        assert_eq!(data, vec![0u8; PAGE_SIZE]);

        let mut page = vec![0u8; PAGE_SIZE];
        page[0] = 0xAB;
        page[PAGE_SIZE - 1] = 0xCD;
        manager.write_page(handle, page_id, &page).unwrap();

        let mut read_back = vec![1u8; PAGE_SIZE];
        manager.read_page(handle, page_id, &mut read_back).unwrap();
        assert_eq!(read_back, page);

        assert!(matches!(
            manager.read_page(handle, page_id, &mut [0u8; 16]),
            Err(FileError::InvalidPageSize { .. })
        ));
    }

    #[test]
    fn test_only_live_pages_are_accessible() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = PagedFileManager::new();
        let handle = open_new(&mut manager, &temp_dir, "t.tbl");
        let mut buffer = vec![0u8; PAGE_SIZE];

        assert!(matches!(
            manager.read_page(handle, 3, &mut buffer),
            Err(FileError::PageNotFound(3))
        ));
        // the header is not a data page
        assert!(matches!(
            manager.write_page(handle, 0, &buffer),
            Err(FileError::PageNotFound(0))
        ));
    }

    #[test]
    fn test_deleted_ids_are_reused_lowest_first() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = PagedFileManager::new();
        let handle = open_new(&mut manager, &temp_dir, "t.tbl");

        for expected in 1..=20 {
            assert_eq!(manager.allocate_page(handle).unwrap().0, expected);
        }
        manager.delete_page(handle, 9).unwrap();
        manager.delete_page(handle, 5).unwrap();
        assert!(matches!(
            manager.delete_page(handle, 5),
            Err(FileError::PageNotFound(5))
        ));

        let ids: Vec<PageId> = manager.page_ids(handle).unwrap().collect();
        let expected: Vec<PageId> = (1..=20).filter(|&id| id != 5 && id != 9).collect();
        assert_eq!(ids, expected);
        assert_eq!(manager.page_count(handle).unwrap(), 18);
        assert_eq!(manager.last_page_id(handle).unwrap(), Some(20));

        assert_eq!(manager.allocate_page(handle).unwrap().0, 5);
        assert_eq!(manager.allocate_page(handle).unwrap().0, 9);
        assert_eq!(manager.allocate_page(handle).unwrap().0, 21);
    }

    #[test]
    fn test_page_ids_is_a_snapshot() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut manager = PagedFileManager::new();
        let handle = open_new(&mut manager, &temp_dir, "t.tbl");
        manager.allocate_page(handle).unwrap();
        manager.allocate_page(handle).unwrap();

        let ids = manager.page_ids(handle).unwrap();
        manager.allocate_page(handle).unwrap();
        manager.delete_page(handle, 1).unwrap();
        assert_eq!(ids.collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_pages_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.tbl");

        {
            let mut manager = PagedFileManager::new();
            manager.create_file(&path).unwrap();
            let handle = manager.open_file(&path).unwrap();
            for _ in 0..3 {
                manager.allocate_page(handle).unwrap();
            }
            let mut page = vec![0u8; PAGE_SIZE];
            page[10] = 7;
            manager.write_page(handle, 3, &page).unwrap();
            manager.delete_page(handle, 2).unwrap();
            manager.sync_all().unwrap();
        }

        let mut manager = PagedFileManager::new();
        let handle = manager.open_file(&path).unwrap();
        assert_eq!(manager.page_ids(handle).unwrap().collect::<Vec<_>>(), vec![1, 3]);

        let mut page = vec![0u8; PAGE_SIZE];
        manager.read_page(handle, 3, &mut page).unwrap();
        assert_eq!(page[10], 7);
    }

    #[test]
    fn test_remove_open_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.tbl");
        let mut manager = PagedFileManager::new();
        manager.create_file(&path).unwrap();
        let handle = manager.open_file(&path).unwrap();

        manager.remove_file(&path).unwrap();
        assert!(!path.exists());
        assert!(!manager.is_file_open(handle));
        assert!(matches!(
            manager.allocate_page(handle),
            Err(FileError::InvalidHandle(_))
        ));
    }
}
