use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::RecordError;

/// Attribute type. The size parameter is part of the type, so `CHAR(4)`
/// and `CHAR(8)` are different types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Int,            // 4 bytes
    Char(usize),    // n bytes, padded to a multiple of 4
    Varchar(usize), // 1 length byte + up to n bytes, padded to a multiple of 4
}

impl DataType {
    /// Declared maximum size in bytes, before padding
    pub fn max_size(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Char(n) | DataType::Varchar(n) => *n,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}

impl FromStr for DataType {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "INT" {
            return Ok(DataType::Int);
        }

        let sized = |prefix: &str| -> Option<usize> {
            upper
                .strip_prefix(prefix)?
                .strip_prefix('(')?
                .strip_suffix(')')?
                .trim()
                .parse()
                .ok()
        };

        if let Some(n) = sized("VARCHAR") {
            // the length must fit in the single length byte
            if n == 0 || n > u8::MAX as usize {
                return Err(RecordError::UnknownType(s.to_string()));
            }
            Ok(DataType::Varchar(n))
        } else if let Some(n) = sized("CHAR")
            && n > 0
        {
            Ok(DataType::Char(n))
        } else {
            Err(RecordError::UnknownType(s.to_string()))
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = RecordError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DataType> for String {
    fn from(dt: DataType) -> Self {
        dt.to_string()
    }
}

/// A single decoded attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    String(String),
}

impl Value {
    /// Parse a text field (e.g. from CSV) according to the column's type
    pub fn parse(text: &str, data_type: &DataType) -> Result<Self, RecordError> {
        match data_type {
            DataType::Int => text
                .trim()
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| RecordError::TypeMismatch {
                    expected: data_type.to_string(),
                    actual: text.to_string(),
                }),
            DataType::Char(_) | DataType::Varchar(_) => Ok(Value::String(text.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_type() {
        assert_eq!("INT".parse::<DataType>().unwrap(), DataType::Int);
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int);
        assert_eq!("CHAR(10)".parse::<DataType>().unwrap(), DataType::Char(10));
        assert_eq!(
            "varchar(32)".parse::<DataType>().unwrap(),
            DataType::Varchar(32)
        );
        assert!("VARCHAR(300)".parse::<DataType>().is_err());
        assert!("CHAR()".parse::<DataType>().is_err());
        assert!("FLOAT".parse::<DataType>().is_err());
    }

    #[test]
    fn test_data_type_display() {
        assert_eq!(DataType::Int.to_string(), "INT");
        assert_eq!(DataType::Char(3).to_string(), "CHAR(3)");
        assert_eq!(DataType::Varchar(7).to_string(), "VARCHAR(7)");
    }

    #[test]
    fn test_data_type_json() {
        let json = serde_json::to_string(&DataType::Varchar(12)).unwrap();
        assert_eq!(json, "\"VARCHAR(12)\"");
        let back: DataType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DataType::Varchar(12));
        assert!(serde_json::from_str::<DataType>("\"BLOB\"").is_err());
    }

    #[test]
    fn test_type_equality_includes_size() {
        assert_ne!(DataType::Char(4), DataType::Char(8));
        assert_ne!(DataType::Char(4), DataType::Varchar(4));
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse(" 42 ", &DataType::Int).unwrap(), Value::Int(42));
        assert!(Value::parse("abc", &DataType::Int).is_err());
        assert_eq!(
            Value::parse("abc", &DataType::Char(5)).unwrap(),
            Value::String("abc".to_string())
        );
    }
}
