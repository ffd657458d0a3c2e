use crate::catalog::CatalogError;
use crate::file::FileError;
use crate::record::RecordError;
use thiserror::Error;

use super::JoinAlgorithm;

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("{0} join is not yet supported")]
    NotSupported(JoinAlgorithm),

    #[error("Join needs at least 2 buffer pages, {available} available")]
    InsufficientBuffer { available: usize },
}

pub type JoinResult<T> = Result<T, JoinError>;
