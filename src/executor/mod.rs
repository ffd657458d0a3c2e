//! Query operators running on top of the buffer pool

mod error;
mod join;
mod scanner;

pub use error::{JoinError, JoinResult};
pub use join::{JoinAlgorithm, JoinOperator, JoinStats};
pub use scanner::TableScanner;
