use prettytable::{Cell, Row, Table};

use crate::file::{BufferManager, FileHandle, PageId};
use crate::record::{HeapPage, RecordError, RecordResult, TableSchema, Value, decode_tuple};

/// Reads a whole table through the buffer pool for display
pub struct TableScanner<'a> {
    schema: &'a TableSchema,
    file: FileHandle,
}

impl<'a> TableScanner<'a> {
    pub fn new(schema: &'a TableSchema, file: FileHandle) -> Self {
        Self { schema, file }
    }

    /// Decode every tuple, page by page. Each page is unpinned as soon as it
    /// has been read, and the file is flushed from the pool at the end.
    pub fn scan(&self, buffer_mgr: &mut BufferManager) -> RecordResult<Vec<Vec<Value>>> {
        let page_ids: Vec<PageId> = buffer_mgr.file_manager().page_ids(self.file)?.collect();
        let mut rows = Vec::new();

        for page_id in page_ids {
            let pin = buffer_mgr.fetch_page(self.file, page_id)?;
            let decoded = buffer_mgr
                .page(&pin)
                .map_err(RecordError::from)
                .and_then(HeapPage::from_buffer)
                .and_then(|page| {
                    page.tuples()
                        .map(|tuple| decode_tuple(self.schema, tuple))
                        .collect::<RecordResult<Vec<_>>>()
                });
            buffer_mgr.release(pin, false)?;
            rows.extend(decoded?);
        }

        buffer_mgr.flush_file(self.file)?;
        Ok(rows)
    }

    /// Render rows under a header of attribute names
    pub fn to_table(&self, rows: &[Vec<Value>]) -> Table {
        let mut table = Table::new();
        table.set_titles(Row::new(
            self.schema
                .attributes()
                .iter()
                .map(|attr| Cell::new(&attr.name))
                .collect(),
        ));
        for row in rows {
            table.add_row(Row::new(
                row.iter().map(|value| Cell::new(&value.to_string())).collect(),
            ));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PagedFileManager;
    use crate::record::{Attribute, DataType, HeapFile, encode_tuple};

    fn schema() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                Attribute::new("id", DataType::Int, true, true),
                Attribute::new("name", DataType::Varchar(12), false, false),
                Attribute::new("code", DataType::Char(3), false, false),
            ],
        )
    }

    fn row(id: i32, name: &str, code: &str) -> Vec<Value> {
        vec![
            Value::Int(id),
            Value::String(name.to_string()),
            Value::String(code.to_string()),
        ]
    }

    #[test]
    fn test_scan_decodes_rows_and_unpins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut bm = BufferManager::with_capacity(PagedFileManager::new(), 2);
        let file = HeapFile::create(&mut bm, temp_dir.path().join("people.tbl")).unwrap();
        let schema = schema();

        let rows = vec![row(1, "ada", "X1"), row(2, "grace", "Y"), row(300, "", "ZZZ")];
        for values in &rows {
            let tuple = encode_tuple(&schema, values).unwrap();
            HeapFile::insert_tuple(&mut bm, file, &tuple).unwrap();
        }

        let scanner = TableScanner::new(&schema, file);
        let scanned = scanner.scan(&mut bm).unwrap();
        assert_eq!(scanned, rows);
        assert_eq!(bm.pinned_frame_count(), 0);
        assert!(!bm.is_page_cached(file, 1));

        let rendered = scanner.to_table(&scanned).to_string();
        assert!(rendered.contains("name"));
        assert!(rendered.contains("grace"));
        assert!(rendered.contains("300"));
    }

    #[test]
    fn test_scan_empty_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut bm = BufferManager::with_capacity(PagedFileManager::new(), 2);
        let file = HeapFile::create(&mut bm, temp_dir.path().join("empty.tbl")).unwrap();
        let schema = schema();

        let scanned = TableScanner::new(&schema, file).scan(&mut bm).unwrap();
        assert!(scanned.is_empty());
    }
}
