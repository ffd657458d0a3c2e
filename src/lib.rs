pub mod catalog;
pub mod executor;
pub mod file;
pub mod record;

pub use catalog::{Catalog, CatalogError, CatalogResult, TableId};
pub use executor::{JoinAlgorithm, JoinError, JoinOperator, JoinResult, JoinStats, TableScanner};
pub use file::{
    BUFFER_POOL_SIZE, BufferManager, FileError, FileHandle, FileResult, PAGE_SIZE, PageId,
    PagedFileManager, PinnedPage,
};
pub use record::{
    Attribute, DataType, HeapFile, HeapPage, RecordError, RecordId, RecordResult, TableSchema,
    Value,
};
