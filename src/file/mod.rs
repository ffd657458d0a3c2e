mod buffer_manager;
mod error;
mod file_manager;
mod frame;
mod page_index;

pub use buffer_manager::{BufferManager, PinnedPage};
pub use error::{FileError, FileResult};
pub use file_manager::{FileHandle, PageIds, PagedFileManager};
pub use frame::{FrameDescriptor, FrameId};
pub use page_index::PageIndex;

/// Page size in bytes (8KB)
pub const PAGE_SIZE: usize = 8192;

/// Default number of frames in the buffer pool
pub const BUFFER_POOL_SIZE: usize = 100;

/// Page ID type. Page 0 of every file is its header, data pages start at 1.
pub type PageId = usize;
