mod error;
mod heap_file;
mod page;
mod schema;
pub mod tuple;
mod value;

pub use error::{RecordError, RecordResult};
pub use heap_file::{HeapFile, RecordId};
pub use page::{HeapPage, MAX_TUPLE_SIZE, SlotId};
pub use schema::{Attribute, TableSchema};
pub use tuple::{
    common_attributes, decode_tuple, encode_tuple, extract_join_key_and_remainder, join_key,
    join_result_schema,
};
pub use value::{DataType, Value};
