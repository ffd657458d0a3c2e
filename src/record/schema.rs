use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::{RecordError, RecordResult};
use super::value::DataType;

/// Attribute (column) definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub not_null: bool,
    pub unique: bool,
}

impl Attribute {
    /// Create a new attribute
    pub fn new(name: impl Into<String>, data_type: DataType, not_null: bool, unique: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null,
            unique,
        }
    }

    /// Same name and same type (size included)
    pub fn same_as(&self, other: &Attribute) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}

/// Parses `name:TYPE[:not_null][:unique]`, e.g. `id:INT:not_null`
impl FromStr for Attribute {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default().trim();
        let data_type = parts
            .next()
            .ok_or_else(|| RecordError::UnknownType(s.to_string()))?
            .parse()?;
        if name.is_empty() {
            return Err(RecordError::SchemaMismatch(format!(
                "attribute without a name: {}",
                s
            )));
        }

        let mut attr = Attribute::new(name, data_type, false, false);
        for flag in parts {
            match flag.trim().to_ascii_lowercase().as_str() {
                "not_null" => attr.not_null = true,
                "unique" => attr.unique = true,
                other => {
                    return Err(RecordError::SchemaMismatch(format!(
                        "unknown attribute flag: {}",
                        other
                    )));
                }
            }
        }
        Ok(attr)
    }
}

/// Table schema: a named, ordered list of attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    table_name: String,
    attributes: Vec<Attribute>,
    /// Temporary (result) tables are not meant to be registered permanently
    #[serde(default)]
    is_temp: bool,
}

impl TableSchema {
    /// Create a new table schema
    pub fn new(table_name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            table_name: table_name.into(),
            attributes,
            is_temp: false,
        }
    }

    /// Create a schema for an intermediate result
    pub fn temporary(table_name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            is_temp: true,
            ..Self::new(table_name, attributes)
        }
    }

    /// Get table name
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn is_temp(&self) -> bool {
        self.is_temp
    }

    /// Same attributes under a different table name
    pub fn renamed(&self, table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            attributes: self.attributes.clone(),
            is_temp: false,
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attr_count(&self) -> usize {
        self.attributes.len()
    }

    /// Get a specific attribute
    pub fn attribute(&self, idx: usize) -> RecordResult<&Attribute> {
        self.attributes
            .get(idx)
            .ok_or(RecordError::NoSuchAttribute {
                index: idx,
                count: self.attributes.len(),
            })
    }

    pub fn attr_name(&self, idx: usize) -> RecordResult<&str> {
        Ok(&self.attribute(idx)?.name)
    }

    pub fn attr_type(&self, idx: usize) -> RecordResult<DataType> {
        Ok(self.attribute(idx)?.data_type)
    }

    pub fn attr_max_size(&self, idx: usize) -> RecordResult<usize> {
        Ok(self.attribute(idx)?.data_type.max_size())
    }

    pub fn is_not_null(&self, idx: usize) -> RecordResult<bool> {
        Ok(self.attribute(idx)?.not_null)
    }

    pub fn is_unique(&self, idx: usize) -> RecordResult<bool> {
        Ok(self.attribute(idx)?.unique)
    }

    /// Find attribute index by name
    pub fn find_attr(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// True if an attribute with the same name and type exists
    pub fn contains(&self, attr: &Attribute) -> bool {
        self.attributes.iter().any(|a| a.same_as(attr))
    }

    /// Fail if two attributes share a name
    pub fn check_distinct_names(&self) -> RecordResult<()> {
        for (idx, attr) in self.attributes.iter().enumerate() {
            if self.find_attr(&attr.name) != Some(idx) {
                return Err(RecordError::SchemaMismatch(format!(
                    "attribute {} appears more than once in table {}",
                    attr.name, self.table_name
                )));
            }
        }
        Ok(())
    }
}
