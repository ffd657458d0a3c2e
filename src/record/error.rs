use crate::file::FileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Unknown attribute type: {0}")]
    UnknownType(String),

    #[error("Attribute index {index} out of range for schema with {count} attributes")]
    NoSuchAttribute { index: usize, count: usize },

    #[error("Tuple too short: attribute {attribute} needs bytes up to {needed}, tuple has {len}")]
    TupleTooShort {
        attribute: String,
        needed: usize,
        len: usize,
    },

    #[error("Value {value} for {attribute} cannot be encoded")]
    ValueOutOfRange { attribute: String, value: String },

    #[error("Tuple of {0} bytes does not fit in a page")]
    TupleTooLarge(usize),

    #[error("Invalid slot: page_id={0}, slot_id={1}")]
    InvalidSlot(usize, usize),

    #[error("Page full: page_id={0}")]
    PageFull(usize),

    #[error("Corrupt page: {0}")]
    CorruptPage(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

pub type RecordResult<T> = Result<T, RecordError>;
