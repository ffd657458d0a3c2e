//! Byte layout of tuples.
//!
//! A tuple is the concatenation of its attributes in schema order:
//! - `INT`: 4 bytes, one base-128 digit per byte, most significant first
//! - `CHAR(n)`: n bytes, zero filled, padded to a multiple of 4
//! - `VARCHAR(n)`: a length byte `L`, then `L` bytes, padded so that `1 + L`
//!   is a multiple of 4
//!
//! Padding bytes are always zero.

use std::ops::Range;

use super::error::{RecordError, RecordResult};
use super::schema::{Attribute, TableSchema};
use super::value::{DataType, Value};

/// Exclusive upper bound of encodable INT values (four 7-bit digits)
pub const INT_LIMIT: i32 = 1 << 28;

/// Round `len` up to the next multiple of 4
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// Decode the INT stored at `offset`.
///
/// Each byte is weighted by a power of 128, not 256. Data produced by
/// [`encode_tuple`] only uses 7 bits per byte, so this round-trips.
pub fn decode_int(bytes: &[u8], offset: usize) -> RecordResult<i32> {
    let digits = bytes
        .get(offset..offset + 4)
        .ok_or_else(|| RecordError::TupleTooShort {
            attribute: "INT".to_string(),
            needed: offset + 4,
            len: bytes.len(),
        })?;

    Ok(digits
        .iter()
        .fold(0i32, |acc, &digit| acc * 128 + i32::from(digit)))
}

/// Encode an INT in the layout read by [`decode_int`]
pub fn encode_int(value: i32) -> Option<[u8; 4]> {
    if !(0..INT_LIMIT).contains(&value) {
        return None;
    }
    let mut digits = [0u8; 4];
    for (j, digit) in digits.iter_mut().enumerate() {
        *digit = ((value >> (7 * (3 - j))) & 0x7f) as u8;
    }
    Some(digits)
}

/// Length in bytes, padding included, of attribute `index` stored at `offset`
pub fn attribute_span(
    schema: &TableSchema,
    index: usize,
    bytes: &[u8],
    offset: usize,
) -> RecordResult<usize> {
    let attr = schema.attribute(index)?;
    match attr.data_type {
        DataType::Int => Ok(4),
        DataType::Char(n) => Ok(padded_len(n)),
        DataType::Varchar(_) => {
            let len = *bytes.get(offset).ok_or_else(|| RecordError::TupleTooShort {
                attribute: attr.name.clone(),
                needed: offset + 1,
                len: bytes.len(),
            })? as usize;
            Ok(padded_len(1 + len))
        }
    }
}

/// Byte range of every attribute of `tuple`, in schema order
pub fn attribute_ranges(tuple: &[u8], schema: &TableSchema) -> RecordResult<Vec<Range<usize>>> {
    let mut ranges = Vec::with_capacity(schema.attr_count());
    let mut offset = 0;

    for index in 0..schema.attr_count() {
        let span = attribute_span(schema, index, tuple, offset)?;
        let end = offset + span;
        if end > tuple.len() {
            return Err(RecordError::TupleTooShort {
                attribute: schema.attr_name(index)?.to_string(),
                needed: end,
                len: tuple.len(),
            });
        }
        ranges.push(offset..end);
        offset = end;
    }

    Ok(ranges)
}

/// Split `tuple` into its join key and the rest.
///
/// The key is the concatenated bytes of every attribute named in
/// `common_names`, taken in schema order. The remainder is the tuple with
/// those spans removed, the other bytes keeping their order.
pub fn extract_join_key_and_remainder(
    tuple: &[u8],
    common_names: &[&str],
    schema: &TableSchema,
) -> RecordResult<(Vec<u8>, Vec<u8>)> {
    let ranges = attribute_ranges(tuple, schema)?;
    let mut key = Vec::new();
    let mut remainder = Vec::with_capacity(tuple.len());

    for (attr, range) in schema.attributes().iter().zip(ranges) {
        if common_names.contains(&attr.name.as_str()) {
            key.extend_from_slice(&tuple[range]);
        } else {
            remainder.extend_from_slice(&tuple[range]);
        }
    }

    Ok((key, remainder))
}

/// Join key of `tuple` with the attributes concatenated in the order of
/// `common_names` rather than schema order. Names missing from the schema
/// are skipped.
pub fn join_key(tuple: &[u8], common_names: &[&str], schema: &TableSchema) -> RecordResult<Vec<u8>> {
    let ranges = attribute_ranges(tuple, schema)?;
    let mut key = Vec::new();

    for name in common_names {
        if let Some(index) = schema.find_attr(name) {
            key.extend_from_slice(&tuple[ranges[index].clone()]);
        }
    }

    Ok(key)
}

/// Attributes of `right` that also appear (same name and type) in `left`,
/// in right-schema order. Each right attribute is listed at most once, even
/// when `left` repeats the name.
pub fn common_attributes(left: &TableSchema, right: &TableSchema) -> Vec<Attribute> {
    right
        .attributes()
        .iter()
        .filter(|attr| left.contains(attr))
        .cloned()
        .collect()
}

/// Schema of `left ⋈ right`: every left attribute, then the right attributes
/// with no same-named, same-typed counterpart on the left
pub fn join_result_schema(left: &TableSchema, right: &TableSchema) -> TableSchema {
    let mut attributes = left.attributes().to_vec();
    attributes.extend(
        right
            .attributes()
            .iter()
            .filter(|attr| !left.contains(attr))
            .cloned(),
    );
    TableSchema::temporary("TEMP_TABLE", attributes)
}

/// Encode `values` as a tuple of `schema`
pub fn encode_tuple(schema: &TableSchema, values: &[Value]) -> RecordResult<Vec<u8>> {
    if values.len() != schema.attr_count() {
        return Err(RecordError::SchemaMismatch(format!(
            "Expected {} values, got {}",
            schema.attr_count(),
            values.len()
        )));
    }

    let mut tuple = Vec::new();
    for (attr, value) in schema.attributes().iter().zip(values) {
        match (&attr.data_type, value) {
            (DataType::Int, Value::Int(i)) => {
                let digits = encode_int(*i).ok_or_else(|| RecordError::ValueOutOfRange {
                    attribute: attr.name.clone(),
                    value: i.to_string(),
                })?;
                tuple.extend_from_slice(&digits);
            }
            (DataType::Char(n), Value::String(s)) => {
                let bytes = checked_str(attr, s, *n)?;
                let start = tuple.len();
                tuple.extend_from_slice(bytes);
                tuple.resize(start + padded_len(*n), 0);
            }
            (DataType::Varchar(n), Value::String(s)) => {
                let bytes = checked_str(attr, s, *n)?;
                let start = tuple.len();
                tuple.push(bytes.len() as u8);
                tuple.extend_from_slice(bytes);
                tuple.resize(start + padded_len(1 + bytes.len()), 0);
            }
            (dt, val) => {
                return Err(RecordError::TypeMismatch {
                    expected: dt.to_string(),
                    actual: format!("{:?}", val),
                });
            }
        }
    }

    Ok(tuple)
}

/// Decode a tuple of `schema` into values
pub fn decode_tuple(schema: &TableSchema, tuple: &[u8]) -> RecordResult<Vec<Value>> {
    let ranges = attribute_ranges(tuple, schema)?;

    schema
        .attributes()
        .iter()
        .zip(ranges)
        .map(|(attr, range)| match attr.data_type {
            DataType::Int => decode_int(tuple, range.start).map(Value::Int),
            DataType::Char(n) => {
                let raw = &tuple[range.start..range.start + n];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                Ok(Value::String(String::from_utf8_lossy(&raw[..end]).into_owned()))
            }
            DataType::Varchar(_) => {
                let len = tuple[range.start] as usize;
                let raw = &tuple[range.start + 1..range.start + 1 + len];
                Ok(Value::String(String::from_utf8_lossy(raw).into_owned()))
            }
        })
        .collect()
}

fn checked_str<'a>(attr: &Attribute, s: &'a str, max_len: usize) -> RecordResult<&'a [u8]> {
    let bytes = s.as_bytes();
    if bytes.len() > max_len {
        return Err(RecordError::ValueOutOfRange {
            attribute: attr.name.clone(),
            value: s.to_string(),
        });
    }
    Ok(bytes)
}
