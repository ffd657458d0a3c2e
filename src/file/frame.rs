use std::fmt;

use super::{FileHandle, PageId};

/// Index of a frame in the buffer pool, in `0..capacity`
pub type FrameId = usize;

/// Bookkeeping for one buffer frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// File owning the page held in this frame
    pub file: Option<FileHandle>,
    pub page_id: PageId,
    pub pin_count: u32,
    pub dirty: bool,
    /// Reference bit for the clock sweep
    pub referenced: bool,
    pub valid: bool,
    /// Bumped every time the frame is (re)assigned or cleared, so stale
    /// page handles can be detected
    pub generation: u64,
}

impl FrameDescriptor {
    /// Install a freshly loaded page: pinned once, referenced, clean.
    pub(crate) fn set(&mut self, file: FileHandle, page_id: PageId) {
        self.file = Some(file);
        self.page_id = page_id;
        self.pin_count = 1;
        self.dirty = false;
        self.referenced = true;
        self.valid = true;
        self.generation += 1;
    }

    /// Reset to the invalid state. The generation keeps counting.
    pub(crate) fn clear(&mut self) {
        self.file = None;
        self.page_id = 0;
        self.pin_count = 0;
        self.dirty = false;
        self.referenced = false;
        self.valid = false;
        self.generation += 1;
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    pub(crate) fn belongs_to(&self, file: FileHandle) -> bool {
        self.file == Some(file)
    }
}

impl fmt::Display for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file {
            Some(file) => write!(f, "file:{} pageNo:{}", file.as_usize(), self.page_id)?,
            None => write!(f, "file:- pageNo:-")?,
        }
        write!(
            f,
            " valid:{} pinCnt:{} dirty:{} refbit:{}",
            self.valid, self.pin_count, self.dirty, self.referenced
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut desc = FrameDescriptor::default();
        assert!(!desc.valid);

        desc.set(FileHandle::from_raw(3), 7);
        assert!(desc.valid);
        assert!(desc.referenced);
        assert_eq!(desc.pin_count, 1);
        assert_eq!(desc.page_id, 7);
        assert!(desc.belongs_to(FileHandle::from_raw(3)));
        assert_eq!(desc.generation, 1);

        desc.dirty = true;
        desc.clear();
        assert!(!desc.valid);
        assert!(!desc.dirty);
        assert_eq!(desc.pin_count, 0);
        assert_eq!(desc.file, None);
        assert_eq!(desc.generation, 2);
    }

    #[test]
    fn test_display() {
        let mut desc = FrameDescriptor::default();
        assert_eq!(
            desc.to_string(),
            "file:- pageNo:- valid:false pinCnt:0 dirty:false refbit:false"
        );
        desc.set(FileHandle::from_raw(0), 2);
        assert_eq!(
            desc.to_string(),
            "file:0 pageNo:2 valid:true pinCnt:1 dirty:false refbit:true"
        );
    }
}
