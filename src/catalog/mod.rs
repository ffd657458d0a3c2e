use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::record::TableSchema;

/// Name of the catalog file inside a data directory
pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table id {0} not found")]
    TableIdNotFound(TableId),

    #[error("Table {0} already exists")]
    TableExists(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

pub type TableId = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: TableId,
    pub filename: String,
    pub schema: TableSchema,
}

/// Table registry: names to ids, ids to filenames and schemas
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    tables: HashMap<String, TableMetadata>,
    next_table_id: TableId,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `catalog.json` from `dir`, or start empty if there is none
    pub fn load(dir: &Path) -> CatalogResult<Self> {
        let catalog_path = dir.join(CATALOG_FILE);
        if !catalog_path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(&catalog_path)?;
        let catalog = serde_json::from_str(&content)?;
        Ok(catalog)
    }

    pub fn save(&self, dir: &Path) -> CatalogResult<()> {
        let catalog_path = dir.join(CATALOG_FILE);
        let content = serde_json::to_string_pretty(&self)?;
        fs::write(&catalog_path, content)?;
        Ok(())
    }

    /// Register a table stored in `filename`
    pub fn add_table(
        &mut self,
        schema: TableSchema,
        filename: impl Into<String>,
    ) -> CatalogResult<TableId> {
        let name = schema.table_name().to_string();
        if self.tables.contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }

        let id = self.next_table_id;
        self.next_table_id += 1;
        self.tables.insert(
            name,
            TableMetadata {
                id,
                filename: filename.into(),
                schema,
            },
        );
        Ok(id)
    }

    pub fn remove_table(&mut self, name: &str) -> CatalogResult<TableMetadata> {
        self.tables
            .remove(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn get_table(&self, name: &str) -> CatalogResult<&TableMetadata> {
        self.tables
            .get(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn table_id(&self, name: &str) -> CatalogResult<TableId> {
        Ok(self.get_table(name)?.id)
    }

    pub fn table_filename(&self, id: TableId) -> CatalogResult<&str> {
        self.tables
            .values()
            .find(|meta| meta.id == id)
            .map(|meta| meta.filename.as_str())
            .ok_or(CatalogError::TableIdNotFound(id))
    }

    pub fn table_schema(&self, name: &str) -> CatalogResult<&TableSchema> {
        Ok(&self.get_table(name)?.schema)
    }

    /// Registered tables, sorted by id
    pub fn tables(&self) -> Vec<&TableMetadata> {
        let mut tables: Vec<_> = self.tables.values().collect();
        tables.sort_by_key(|meta| meta.id);
        tables
    }
}
