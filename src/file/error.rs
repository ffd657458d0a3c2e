use std::io;
use thiserror::Error;

use super::{FrameId, PageId};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(usize),

    #[error("Not a paged file: {0}")]
    BadHeader(String),

    #[error("Page not found: page_id={0}")]
    PageNotFound(PageId),

    #[error("File is full: no page ids left")]
    FileFull,

    #[error("Buffer pool exceeded: no evictable frame available")]
    BufferExceeded,

    #[error("Page not pinned: page_id={page_id}, frame={frame}")]
    PageNotPinned { page_id: PageId, frame: FrameId },

    #[error("Page still pinned: page_id={page_id}, frame={frame}")]
    PagePinned { page_id: PageId, frame: FrameId },

    #[error("Invalid frame {frame}: dirty={dirty}, valid=false, referenced={referenced}")]
    InvalidFrame {
        frame: FrameId,
        dirty: bool,
        referenced: bool,
    },

    #[error("Stale page handle: page_id={page_id}, frame={frame}")]
    StalePage { page_id: PageId, frame: FrameId },

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
