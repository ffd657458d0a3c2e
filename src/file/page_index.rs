use ahash::AHashMap;

use super::{FileHandle, FrameId, PageId};

/// Maps a resident (file, page) pair to the frame holding it.
/// Owned and mutated only by the buffer manager.
#[derive(Debug, Default)]
pub struct PageIndex {
    entries: AHashMap<(FileHandle, PageId), FrameId>,
}

impl PageIndex {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: AHashMap::with_capacity(capacity),
        }
    }

    /// Add a mapping. The caller makes sure the key is not already mapped.
    pub fn insert(&mut self, file: FileHandle, page_id: PageId, frame: FrameId) {
        self.entries.insert((file, page_id), frame);
    }

    /// `Some(frame)` on a hit, `None` when the page is not resident
    pub fn lookup(&self, file: FileHandle, page_id: PageId) -> Option<FrameId> {
        self.entries.get(&(file, page_id)).copied()
    }

    /// Drop a mapping, returning the frame it pointed at
    pub fn remove(&mut self, file: FileHandle, page_id: PageId) -> Option<FrameId> {
        self.entries.remove(&(file, page_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All current mappings, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (FileHandle, PageId, FrameId)> + '_ {
        self.entries
            .iter()
            .map(|(&(file, page_id), &frame)| (file, page_id, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup_remove() {
        let mut index = PageIndex::with_capacity(4);
        let a = FileHandle::from_raw(0);
        let b = FileHandle::from_raw(1);

        assert_eq!(index.lookup(a, 1), None);

        index.insert(a, 1, 0);
        index.insert(b, 1, 1);
        assert_eq!(index.lookup(a, 1), Some(0));
        assert_eq!(index.lookup(b, 1), Some(1));
        assert_eq!(index.len(), 2);

        assert_eq!(index.remove(a, 1), Some(0));
        assert_eq!(index.lookup(a, 1), None);
        assert_eq!(index.remove(a, 1), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_same_page_id_different_files() {
        let mut index = PageIndex::default();
        for raw in 0..3 {
            index.insert(FileHandle::from_raw(raw), 5, raw);
        }
        for raw in 0..3 {
            assert_eq!(index.lookup(FileHandle::from_raw(raw), 5), Some(raw));
        }
        assert!(!index.is_empty());
    }
}
