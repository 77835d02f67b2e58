//! Cursor over the pages of a table.

use kiln_sql::RecordView;

use crate::error::StorageResult;
use crate::page::{PageModule, PageStore};

/// Iterates every record of a table in page-then-position order.
///
/// Only one page is loaded at a time: when the current page is exhausted it
/// is unloaded and the next compiled page is loaded, until none is left.
pub struct PageCursor<'a> {
    store: &'a PageStore<'a>,
    pages: Vec<usize>,
    slot: usize,
    page: Option<PageModule>,
    page_index: usize,
    position: usize,
    ordinal: usize,
}

impl<'a> PageCursor<'a> {
    /// Creates a cursor positioned on the first record.
    pub fn new(store: &'a PageStore<'a>) -> StorageResult<Self> {
        let mut cursor = Self {
            store,
            pages: store.compiled_pages(),
            slot: 0,
            page: None,
            page_index: 0,
            position: 0,
            ordinal: 0,
        };
        cursor.seek(0)?;
        Ok(cursor)
    }

    /// The record under the cursor, or `None` at the end.
    pub fn current(&self) -> Option<RecordView<'_>> {
        self.page.as_ref()?.read(self.position)
    }

    /// Moves to the next record. Returns false once past the last record.
    pub fn advance(&mut self) -> StorageResult<bool> {
        let Some(ref page) = self.page else {
            return Ok(false);
        };

        self.ordinal += 1;
        self.position += 1;
        if self.position >= page.count() {
            self.seek(self.slot + 1)?;
        }
        Ok(!self.at_end())
    }

    /// Returns to the first record of the first page.
    pub fn reset(&mut self) -> StorageResult<()> {
        self.ordinal = 0;
        self.pages = self.store.compiled_pages();
        self.seek(0)
    }

    /// Returns true once the cursor has moved past the last record.
    pub fn at_end(&self) -> bool {
        self.page.is_none()
    }

    /// `(page, position)` of the current record.
    pub fn location(&self) -> Option<(usize, usize)> {
        self.page.as_ref().map(|_| (self.page_index, self.position))
    }

    /// Global ordinal of the current record across all pages.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Loads the first non-empty page at or after `slot` in the page list.
    fn seek(&mut self, mut slot: usize) -> StorageResult<()> {
        if let Some(page) = self.page.take() {
            page.unload()?;
        }
        self.position = 0;

        while let Some(&n) = self.pages.get(slot) {
            if let Some(page) = self.store.open_page(n)? {
                if page.count() > 0 {
                    self.page = Some(page);
                    self.page_index = n;
                    self.slot = slot;
                    return Ok(());
                }
                page.unload()?;
            }
            slot += 1;
        }
        self.slot = slot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::BuildConfig;
    use kiln_sql::{ColumnDefinition, DataType, TableSchema, Value};
    use tempfile::TempDir;

    use crate::build::BuildPipeline;
    use crate::paths::StoragePaths;

    #[test]
    fn test_cursor_without_pages() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), BuildConfig::default());
        let schema = TableSchema::new("t", vec![ColumnDefinition::new("id", DataType::Int)]);
        let store = PageStore::new(&schema, &pipeline, 2);

        let mut cursor = store.cursor().unwrap();
        assert!(cursor.at_end());
        assert!(cursor.current().is_none());
        assert!(!cursor.advance().unwrap());
    }

    #[test]
    fn test_cursor_crosses_pages() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), BuildConfig::default());
        if !pipeline.compiler_available() {
            eprintln!("Skipping test: C compiler not available");
            return;
        }
        let schema = TableSchema::new("t", vec![ColumnDefinition::new("id", DataType::Int)]);
        let store = PageStore::new(&schema, &pipeline, 2);

        let rows: Vec<_> = (0..5).map(|i| vec![Value::Int(i)]).collect();
        assert_eq!(store.insert_rows(&rows).unwrap(), vec![0, 1, 2]);
        assert_eq!(store.compiled_pages(), vec![0, 1, 2]);

        let mut cursor = store.cursor().unwrap();
        let mut seen = Vec::new();
        while let Some(record) = cursor.current() {
            seen.push((cursor.location().unwrap(), record.int(0).unwrap()));
            cursor.advance().unwrap();
        }
        assert!(cursor.at_end());
        assert_eq!(
            seen,
            vec![((0, 0), 0), ((0, 1), 1), ((1, 0), 2), ((1, 1), 3), ((2, 0), 4)]
        );

        cursor.reset().unwrap();
        assert!(!cursor.at_end());
        assert_eq!(cursor.current().unwrap().int(0), Some(0));
        assert_eq!(cursor.ordinal(), 0);
    }
}
