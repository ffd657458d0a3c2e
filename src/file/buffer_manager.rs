use std::fmt;

use tracing::{debug, trace, warn};

use super::error::{FileError, FileResult};
use super::file_manager::{FileHandle, PagedFileManager};
use super::frame::{FrameDescriptor, FrameId};
use super::page_index::PageIndex;
use super::{BUFFER_POOL_SIZE, PAGE_SIZE, PageId};

/// Proof that a page is pinned in a frame.
///
/// Page bytes are only reachable through [`BufferManager::page`] and
/// [`BufferManager::page_mut`], which reject the handle once the frame has
/// been given to another page. Not `Clone`: one handle per pin.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a pinned page must be released"]
pub struct PinnedPage {
    file: FileHandle,
    page_id: PageId,
    frame: FrameId,
    generation: u64,
}

impl PinnedPage {
    pub fn file(&self) -> FileHandle {
        self.file
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }
}

/// Fixed-capacity buffer pool with clock (second-chance) replacement.
///
/// Single-threaded: callers needing shared access must serialize externally.
pub struct BufferManager {
    /// Underlying file manager
    file_manager: PagedFileManager,
    /// Page contents, one PAGE_SIZE buffer per frame
    frames: Vec<Vec<u8>>,
    /// Metadata for each frame, same indexing as `frames`
    descriptors: Vec<FrameDescriptor>,
    /// Residency index: (file, page) -> frame, one entry per valid frame
    page_index: PageIndex,
    /// Clock hand, starts at capacity - 1 so the first advance lands on 0
    clock_hand: FrameId,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(file_manager: PagedFileManager) -> Self {
        Self::with_capacity(file_manager, BUFFER_POOL_SIZE)
    }

    /// Create a new buffer manager with specified capacity (at least one frame)
    pub fn with_capacity(file_manager: PagedFileManager, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            file_manager,
            frames: vec![vec![0u8; PAGE_SIZE]; capacity],
            descriptors: vec![FrameDescriptor::default(); capacity],
            page_index: PageIndex::with_capacity(capacity),
            clock_hand: capacity - 1,
        }
    }

    /// Get a reference to the file manager
    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    /// Get a mutable reference to the file manager
    pub fn file_manager_mut(&mut self) -> &mut PagedFileManager {
        &mut self.file_manager
    }

    /// Pin a page, reading it from its file on a miss
    pub fn fetch_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<PinnedPage> {
        if let Some(frame) = self.page_index.lookup(file, page_id) {
            let desc = &mut self.descriptors[frame];
            desc.referenced = true;
            desc.pin_count += 1;
            trace!(file = file.as_usize(), page_id, frame, "buffer hit");
            return Ok(self.handle(frame, file, page_id));
        }

        let frame = self.alloc_frame()?;
        debug!(file = file.as_usize(), page_id, frame, "buffer miss");

        self.file_manager
            .read_page(file, page_id, &mut self.frames[frame])?;
        self.install(frame, file, page_id);

        Ok(self.handle(frame, file, page_id))
    }

    /// Drop one pin on a page. `dirty = true` marks it for write-back; a
    /// clean unpin never clears an earlier dirty mark. Unpinning a page that
    /// is not resident is ignored.
    pub fn unpin_page(&mut self, file: FileHandle, page_id: PageId, dirty: bool) -> FileResult<()> {
        let Some(frame) = self.page_index.lookup(file, page_id) else {
            debug!(
                file = file.as_usize(),
                page_id, "unpin of non-resident page ignored"
            );
            return Ok(());
        };

        let desc = &mut self.descriptors[frame];
        if desc.pin_count == 0 {
            return Err(FileError::PageNotPinned { page_id, frame });
        }

        desc.pin_count -= 1;
        if dirty {
            desc.dirty = true;
        }
        Ok(())
    }

    /// Unpin through a handle, consuming it
    pub fn release(&mut self, pin: PinnedPage, dirty: bool) -> FileResult<()> {
        self.check_handle(&pin)?;
        self.unpin_page(pin.file, pin.page_id, dirty)
    }

    /// Read access to a pinned page
    pub fn page(&self, pin: &PinnedPage) -> FileResult<&[u8]> {
        self.check_handle(pin)?;
        Ok(&self.frames[pin.frame])
    }

    /// Write access to a pinned page. Release it with `dirty = true` afterwards.
    pub fn page_mut(&mut self, pin: &PinnedPage) -> FileResult<&mut [u8]> {
        self.check_handle(pin)?;
        Ok(&mut self.frames[pin.frame])
    }

    /// Create a new page in `file` and pin it, ready for writing
    pub fn allocate_page(&mut self, file: FileHandle) -> FileResult<PinnedPage> {
        // Take the frame first so a full pool does not leak a page in the file
        let frame = self.alloc_frame()?;
        let (page_id, data) = self.file_manager.allocate_page(file)?;
        debug!(file = file.as_usize(), page_id, frame, "allocated page");

        self.frames[frame].copy_from_slice(&data);
        self.install(frame, file, page_id);

        Ok(self.handle(frame, file, page_id))
    }

    /// Delete a page from its file, dropping any buffered copy without
    /// writing it back. Fails with `PagePinned` if the page is in use.
    pub fn dispose_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        if let Some(frame) = self.page_index.lookup(file, page_id) {
            let desc = &mut self.descriptors[frame];
            if desc.is_pinned() {
                return Err(FileError::PagePinned { page_id, frame });
            }
            desc.clear();
            self.page_index.remove(file, page_id);
        }

        self.file_manager.delete_page(file, page_id)
    }

    /// Write back and evict every page of `file`. Must be called before the
    /// file is closed.
    pub fn flush_file(&mut self, file: FileHandle) -> FileResult<()> {
        for frame in 0..self.descriptors.len() {
            let desc = &self.descriptors[frame];
            if !desc.belongs_to(file) {
                continue;
            }

            if desc.is_pinned() {
                return Err(FileError::PagePinned {
                    page_id: desc.page_id,
                    frame,
                });
            }
            if !desc.valid {
                return Err(FileError::InvalidFrame {
                    frame,
                    dirty: desc.dirty,
                    referenced: desc.referenced,
                });
            }

            let page_id = desc.page_id;
            if desc.dirty {
                self.file_manager
                    .write_page(file, page_id, &self.frames[frame])?;
                self.descriptors[frame].dirty = false;
            }

            self.page_index.remove(file, page_id);
            self.descriptors[frame].clear();
        }

        Ok(())
    }

    /// Write back every dirty frame, whatever its file, keeping pages resident
    pub fn flush_all(&mut self) -> FileResult<()> {
        for (frame, desc) in self.descriptors.iter_mut().enumerate() {
            if !(desc.valid && desc.dirty) {
                continue;
            }
            let Some(file) = desc.file else {
                continue;
            };
            self.file_manager
                .write_page(file, desc.page_id, &self.frames[frame])?;
            desc.dirty = false;
        }

        // Sync all files to ensure data is persisted to disk
        self.file_manager.sync_all()?;

        Ok(())
    }

    /// Number of frames in the pool
    pub fn capacity(&self) -> usize {
        self.descriptors.len()
    }

    /// Current clock hand position
    pub fn clock_hand(&self) -> FrameId {
        self.clock_hand
    }

    pub fn frame_descriptor(&self, frame: FrameId) -> Option<&FrameDescriptor> {
        self.descriptors.get(frame)
    }

    /// Frame holding a page, if it is resident
    pub fn frame_of(&self, file: FileHandle, page_id: PageId) -> Option<FrameId> {
        self.page_index.lookup(file, page_id)
    }

    /// Check if a page is in the buffer pool
    pub fn is_page_cached(&self, file: FileHandle, page_id: PageId) -> bool {
        self.page_index.lookup(file, page_id).is_some()
    }

    /// Number of frames currently holding a page
    pub fn valid_frame_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.valid).count()
    }

    /// Number of frames currently pinned
    pub fn pinned_frame_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.is_pinned()).count()
    }

    /// Get the number of dirty pages in the buffer pool
    pub fn dirty_page_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.dirty).count()
    }

    /// Pick a frame for a new page with the clock algorithm, writing back and
    /// unmapping the victim. The returned frame is invalid and unpinned.
    ///
    /// Fails with `BufferExceeded` once the hand has passed every frame in a
    /// row without meeting an unpinned one.
    fn alloc_frame(&mut self) -> FileResult<FrameId> {
        let capacity = self.descriptors.len();
        let mut pinned_streak = 0;

        loop {
            self.advance_clock();
            let frame = self.clock_hand;
            let desc = &mut self.descriptors[frame];

            if !desc.valid {
                desc.clear();
                return Ok(frame);
            }

            if desc.is_pinned() {
                desc.referenced = false;
                pinned_streak += 1;
                if pinned_streak >= capacity {
                    warn!(capacity, "buffer pool exhausted, every frame is pinned");
                    return Err(FileError::BufferExceeded);
                }
                continue;
            }
            pinned_streak = 0;

            if desc.referenced {
                desc.referenced = false;
                continue;
            }

            let Some(file) = desc.file else {
                desc.clear();
                return Ok(frame);
            };
            let page_id = desc.page_id;
            if desc.dirty {
                self.file_manager
                    .write_page(file, page_id, &self.frames[frame])?;
            }

            trace!(file = file.as_usize(), page_id, frame, "evicted page");
            self.page_index.remove(file, page_id);
            self.descriptors[frame].clear();
            return Ok(frame);
        }
    }

    fn advance_clock(&mut self) {
        self.clock_hand = (self.clock_hand + 1) % self.descriptors.len();
    }

    fn install(&mut self, frame: FrameId, file: FileHandle, page_id: PageId) {
        self.page_index.insert(file, page_id, frame);
        self.descriptors[frame].set(file, page_id);
    }

    fn handle(&self, frame: FrameId, file: FileHandle, page_id: PageId) -> PinnedPage {
        PinnedPage {
            file,
            page_id,
            frame,
            generation: self.descriptors[frame].generation,
        }
    }

    fn check_handle(&self, pin: &PinnedPage) -> FileResult<()> {
        let current = self
            .descriptors
            .get(pin.frame)
            .is_some_and(|d| d.valid && d.is_pinned() && d.generation == pin.generation);
        if current {
            Ok(())
        } else {
            Err(FileError::StalePage {
                page_id: pin.page_id,
                frame: pin.frame,
            })
        }
    }
}

impl fmt::Display for BufferManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (frame, desc) in self.descriptors.iter().enumerate() {
            writeln!(f, "FrameNo:{} {}", frame, desc)?;
        }
        write!(f, "Total Number of Valid Frames:{}", self.valid_frame_count())
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        // Flush all dirty pages when the buffer manager is dropped
        let _ = self.flush_all();
    }
}
