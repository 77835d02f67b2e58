//! Page storage.
//!
//! A table is a sequence of pages. Each page is a C translation unit
//! holding a static array of records, compiled into its own module:
//!
//! ```c
//! static const kiln_record records[] = {
//! /* @kiln:records:begin */
//!     { 1, "Alice", 1 },
//!     { 2, "Bob", 0 },
//! /* @kiln:records:end */
//!     { 0 }
//! };
//!
//! int count(void);                     // number of records
//! const kiln_record *read(int pos);    // NULL outside [0, count())
//! int record_size(void);               // sizeof(kiln_record)
//! ```
//!
//! The source is the durable copy of the data. Writes edit initializer
//! lines between the markers and then recompile the page; until the
//! recompile, a loaded module keeps serving the old records.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use kiln_sql::codegen::{header_file_name, record_header, render_record, RECORD_TYPE};
use kiln_sql::{RecordLayout, RecordView, TableSchema, Value};

use crate::build::BuildPipeline;
use crate::cursor::PageCursor;
use crate::error::{LoadError, LoadResult, StorageError, StorageResult};
use crate::loader::{open_with, ModuleHandle};
use crate::paths::{ArtifactId, ArtifactKind};

/// Marker line opening the record initializers.
pub const RECORDS_BEGIN: &str = "/* @kiln:records:begin */";

/// Marker line closing the record initializers.
pub const RECORDS_END: &str = "/* @kiln:records:end */";

type CountFn = unsafe extern "C" fn() -> c_int;
type ReadFn = unsafe extern "C" fn(c_int) -> *const u8;
type RecordSizeFn = unsafe extern "C" fn() -> c_int;

// =============================================================================
// Page Module
// =============================================================================

/// A loaded page.
pub struct PageModule {
    handle: ModuleHandle,
    count_fn: CountFn,
    read_fn: ReadFn,
    layout: RecordLayout,
}

impl PageModule {
    /// Loads a page module and checks its record size against `layout`.
    pub fn open(path: &Path, layout: RecordLayout) -> LoadResult<Self> {
        let expected = layout.size();
        let (handle, (count_fn, read_fn)) = open_with(path, |handle| {
            // SAFETY: the signatures match the page source template.
            let (count_fn, read_fn, size_fn) = unsafe {
                (
                    handle.resolve::<CountFn>("count")?,
                    handle.resolve::<ReadFn>("read")?,
                    handle.resolve::<RecordSizeFn>("record_size")?,
                )
            };
            // SAFETY: the library is loaded while `handle` is borrowed.
            let actual = unsafe { size_fn() };
            if usize::try_from(actual).ok() != Some(expected) {
                return Err(LoadError::LayoutMismatch {
                    path: path.to_path_buf(),
                    expected,
                    actual: usize::try_from(actual).unwrap_or(0),
                });
            }
            Ok((count_fn, read_fn))
        })?;

        Ok(Self {
            handle,
            count_fn,
            read_fn,
            layout,
        })
    }

    /// Number of records in the page.
    pub fn count(&self) -> usize {
        // SAFETY: the library stays loaded for the lifetime of `self`.
        let n = unsafe { (self.count_fn)() };
        usize::try_from(n).unwrap_or(0)
    }

    /// Record at `pos`, or `None` outside `[0, count())`.
    pub fn read(&self, pos: usize) -> Option<RecordView<'_>> {
        let ptr = self.record_ptr(pos)?;
        // SAFETY: `read` returns a pointer into the module's static record
        // array; the record is `layout.size()` bytes (checked at open) and
        // lives as long as the module, which outlives the returned view.
        let bytes = unsafe { std::slice::from_raw_parts(ptr, self.layout.size()) };
        RecordView::new(bytes, &self.layout)
    }

    /// Pointer to the first record, or null for an empty page.
    pub fn first_record(&self) -> *const u8 {
        self.record_ptr(0).unwrap_or(std::ptr::null())
    }

    /// Record layout of the page.
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Path of the loaded module.
    pub fn path(&self) -> Option<&Path> {
        self.handle.path()
    }

    /// Unloads the module.
    pub fn unload(mut self) -> LoadResult<()> {
        self.handle.unload()
    }

    fn record_ptr(&self, pos: usize) -> Option<*const u8> {
        let pos = c_int::try_from(pos).ok()?;
        // SAFETY: `read` accepts any int and returns NULL out of range.
        let ptr = unsafe { (self.read_fn)(pos) };
        (!ptr.is_null()).then_some(ptr)
    }
}

// =============================================================================
// Page Source
// =============================================================================

/// The C source backing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSource {
    prologue: Vec<String>,
    records: Vec<String>,
    epilogue: Vec<String>,
}

impl PageSource {
    /// Creates an empty page for `schema`.
    pub fn create(schema: &TableSchema, page: usize) -> Self {
        let prologue = vec![
            format!("/* page {} of table {} */", page, schema.name),
            "#include <stddef.h>".to_string(),
            format!("#include \"{}\"", header_file_name(&schema.name)),
            String::new(),
            format!("static const {} records[] = {{", RECORD_TYPE),
            RECORDS_BEGIN.to_string(),
        ];
        let epilogue = vec![
            RECORDS_END.to_string(),
            "    { 0 }".to_string(),
            "};".to_string(),
            String::new(),
            "int count(void)".to_string(),
            "{".to_string(),
            "    return (int)(sizeof(records) / sizeof(records[0])) - 1;".to_string(),
            "}".to_string(),
            String::new(),
            format!("const {} *read(int pos)", RECORD_TYPE),
            "{".to_string(),
            "    if (pos < 0 || pos >= count()) {".to_string(),
            "        return NULL;".to_string(),
            "    }".to_string(),
            "    return &records[pos];".to_string(),
            "}".to_string(),
            String::new(),
            "int record_size(void)".to_string(),
            "{".to_string(),
            format!("    return (int)sizeof({});", RECORD_TYPE),
            "}".to_string(),
        ];
        Self {
            prologue,
            records: Vec::new(),
            epilogue,
        }
    }

    /// Parses page source text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let lines: Vec<&str> = text.lines().collect();
        let begin = lines
            .iter()
            .position(|l| l.trim() == RECORDS_BEGIN)
            .ok_or("missing records begin marker")?;
        let end = lines
            .iter()
            .position(|l| l.trim() == RECORDS_END)
            .ok_or("missing records end marker")?;
        if end < begin {
            return Err("records end marker precedes begin marker".to_string());
        }

        let own = |ls: &[&str]| ls.iter().map(|l| l.to_string()).collect::<Vec<_>>();
        Ok(Self {
            prologue: own(&lines[..=begin]),
            records: lines[begin + 1..end]
                .iter()
                .map(|l| l.trim().trim_end_matches(',').to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            epilogue: own(&lines[end..]),
        })
    }

    /// Number of record initializers.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Record initializers in order.
    pub fn records(&self) -> &[String] {
        &self.records
    }

    /// Appends one initializer.
    pub fn append(&mut self, line: String) {
        self.records.push(line);
    }

    /// Replaces the initializer at `pos`.
    pub fn replace(&mut self, pos: usize, line: String) -> StorageResult<()> {
        let count = self.records.len();
        let slot = self
            .records
            .get_mut(pos)
            .ok_or(StorageError::PositionOutOfRange {
                position: pos,
                count,
            })?;
        *slot = line;
        Ok(())
    }

    /// Removes the initializers at `positions`. Duplicates are ignored.
    pub fn remove(&mut self, positions: &[usize]) -> StorageResult<usize> {
        let count = self.records.len();
        if let Some(&bad) = positions.iter().find(|&&p| p >= count) {
            return Err(StorageError::PositionOutOfRange {
                position: bad,
                count,
            });
        }

        let mut sorted = positions.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for &pos in sorted.iter().rev() {
            self.records.remove(pos);
        }
        Ok(sorted.len())
    }

    /// Renders the complete source.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.prologue {
            out.push_str(line);
            out.push('\n');
        }
        for record in &self.records {
            out.push_str("    ");
            out.push_str(record);
            out.push_str(",\n");
        }
        for line in &self.epilogue {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

// =============================================================================
// Page Store
// =============================================================================

/// A change to one record of a page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEdit {
    /// Replace the record at a position.
    Replace(usize, Vec<Value>),
    /// Remove the record at a position.
    Remove(usize),
}

/// Pages of one table.
pub struct PageStore<'a> {
    schema: &'a TableSchema,
    pipeline: &'a BuildPipeline,
    page_capacity: usize,
    layout: RecordLayout,
}

impl<'a> PageStore<'a> {
    /// Creates a store for `schema`.
    pub fn new(schema: &'a TableSchema, pipeline: &'a BuildPipeline, page_capacity: usize) -> Self {
        Self {
            schema,
            pipeline,
            page_capacity: page_capacity.max(1),
            layout: schema.layout(),
        }
    }

    /// Table schema.
    pub fn schema(&self) -> &TableSchema {
        self.schema
    }

    /// Record layout of every page.
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Maximum records per page.
    pub fn page_capacity(&self) -> usize {
        self.page_capacity
    }

    /// Writes the record header if it is missing or out of date.
    pub fn ensure_header(&self) -> StorageResult<PathBuf> {
        let paths = self.pipeline.paths();
        paths
            .ensure_table_dirs(&self.schema.name)
            .map_err(|e| StorageError::io(paths.table_dir(&self.schema.name), e))?;

        let path = paths.header_path(&self.schema.name);
        let header = record_header(self.schema);
        if fs::read_to_string(&path).ok().as_deref() != Some(header.as_str()) {
            fs::write(&path, header).map_err(|e| StorageError::io(&path, e))?;
            debug!(table = %self.schema.name, "Wrote record header");
        }
        Ok(path)
    }

    /// Indices of compiled pages. Pages are probed from 0 while a source
    /// or a module exists, so one missing module hides only its own page.
    pub fn compiled_pages(&self) -> Vec<usize> {
        let paths = self.pipeline.paths();
        (0..)
            .map(|n| (n, self.page_id(n)))
            .take_while(|(_, id)| self.pipeline.is_built(id) || paths.source_path(id).is_file())
            .filter(|(_, id)| self.pipeline.is_built(id))
            .map(|(n, _)| n)
            .collect()
    }

    /// Pages with a source but no compiled module.
    pub fn stale_pages(&self) -> Vec<usize> {
        self.source_pages()
            .into_iter()
            .filter(|&n| !self.pipeline.is_built(&self.page_id(n)))
            .collect()
    }

    /// Compiles every stale page and returns the compiled page indices.
    pub fn ensure_compiled(&self) -> StorageResult<Vec<usize>> {
        for n in self.stale_pages() {
            warn!(table = %self.schema.name, page = n, "Page source has no module, recompiling");
            self.recompile(n)?;
        }
        Ok(self.compiled_pages())
    }

    /// Indices of pages with a source file, probed from page 0.
    pub fn source_pages(&self) -> Vec<usize> {
        let paths = self.pipeline.paths();
        (0..)
            .take_while(|&n| paths.source_path(&self.page_id(n)).is_file())
            .collect()
    }

    /// Loads page `n`, or returns `None` if it is not compiled.
    pub fn open_page(&self, n: usize) -> StorageResult<Option<PageModule>> {
        let id = self.page_id(n);
        if !self.pipeline.is_built(&id) {
            return Ok(None);
        }
        let path = self.pipeline.paths().artifact_path(&id);
        let page = PageModule::open(&path, self.layout.clone())?;
        debug!(table = %self.schema.name, page = n, records = page.count(), "Opened page");
        Ok(Some(page))
    }

    /// Reads the source of page `n`.
    pub fn load_source(&self, n: usize) -> StorageResult<PageSource> {
        let path = self.pipeline.paths().source_path(&self.page_id(n));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::PageNotFound {
                    table: self.schema.name.clone(),
                    page: n,
                })
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        PageSource::parse(&text).map_err(|reason| StorageError::corrupted(&path, reason))
    }

    fn save_source(&self, n: usize, source: &PageSource) -> StorageResult<()> {
        let paths = self.pipeline.paths();
        let path = paths.source_path(&self.page_id(n));
        paths
            .ensure_table_dirs(&self.schema.name)
            .map_err(|e| StorageError::io(paths.source_dir(&self.schema.name), e))?;
        fs::write(&path, source.render()).map_err(|e| StorageError::io(&path, e))
    }

    /// Appends rows to page sources and returns the touched page indices.
    ///
    /// Each row goes to the first page under capacity, else to a new page.
    /// Touched pages are not recompiled.
    pub fn append_rows(&self, rows: &[Vec<Value>]) -> StorageResult<Vec<usize>> {
        let pages = self.plan_append(rows)?;
        for (n, source) in &pages {
            self.save_source(*n, source)?;
        }
        Ok(pages.into_iter().map(|(n, _)| n).collect())
    }

    /// Appends rows like [`append_rows`](Self::append_rows) and compiles
    /// every touched page. Nothing changes on disk unless all of them
    /// compile.
    pub fn insert_rows(&self, rows: &[Vec<Value>]) -> StorageResult<Vec<usize>> {
        let pages = self.plan_append(rows)?;
        let touched = pages.iter().map(|(n, _)| *n).collect();
        self.commit_pages(pages)?;
        Ok(touched)
    }

    /// Touched pages, in order, with their new sources.
    fn plan_append(&self, rows: &[Vec<Value>]) -> StorageResult<Vec<(usize, PageSource)>> {
        let mut pages: BTreeMap<usize, PageSource> = BTreeMap::new();
        for n in self.source_pages() {
            pages.insert(n, self.load_source(n)?);
        }
        let mut touched = BTreeSet::new();

        for row in rows {
            let line = render_record(self.schema, row)?;
            let target = pages
                .iter()
                .find(|(_, source)| source.record_count() < self.page_capacity)
                .map(|(&n, _)| n);

            let n = match target {
                Some(n) => n,
                None => {
                    let n = pages.len();
                    info!(table = %self.schema.name, page = n, "Starting new page");
                    pages.insert(n, PageSource::create(self.schema, n));
                    n
                }
            };
            if let Some(source) = pages.get_mut(&n) {
                source.append(line);
            }
            touched.insert(n);
        }

        Ok(pages
            .into_iter()
            .filter(|(n, _)| touched.contains(n))
            .collect())
    }

    /// Compiles every page in `pages`, then moves the new sources and
    /// modules into place. If any page fails to compile, no page changes.
    fn commit_pages(&self, pages: Vec<(usize, PageSource)>) -> StorageResult<()> {
        self.ensure_header()?;

        let mut staged = Vec::with_capacity(pages.len());
        for (n, source) in &pages {
            match self.pipeline.stage(&self.page_id(*n), &source.render()) {
                Ok(build) => staged.push(build),
                Err(e) => {
                    for build in staged {
                        self.pipeline.discard(build);
                    }
                    return Err(e.into());
                }
            }
        }

        let mut builds = staged.into_iter();
        while let Some(build) = builds.next() {
            if let Err(e) = self.pipeline.commit(build) {
                builds.by_ref().for_each(|rest| self.pipeline.discard(rest));
                return Err(e.into());
            }
        }
        debug!(table = %self.schema.name, pages = pages.len(), "Committed pages");
        Ok(())
    }

    /// Recompiles page `n` from its source.
    pub fn recompile(&self, n: usize) -> StorageResult<PathBuf> {
        self.ensure_header()?;
        let source = self.load_source(n)?;
        let path = self.pipeline.rebuild(&self.page_id(n), &source.render())?;
        debug!(table = %self.schema.name, page = n, records = source.record_count(), "Recompiled page");
        Ok(path)
    }

    /// Applies `edits` to page `n` and recompiles it. Returns the new
    /// record count. Any loaded module for the page must be unloaded
    /// first.
    pub fn rewrite_page(&self, n: usize, edits: &[PageEdit]) -> StorageResult<usize> {
        let counts = self.rewrite_pages(&[(n, edits.to_vec())])?;
        Ok(counts.first().copied().unwrap_or(0))
    }

    /// Applies edits to several pages and recompiles them together.
    /// Returns the new record count of each page, in input order. If any
    /// page fails to compile, no page changes.
    pub fn rewrite_pages(&self, edits: &[(usize, Vec<PageEdit>)]) -> StorageResult<Vec<usize>> {
        let mut pages = Vec::with_capacity(edits.len());
        for (n, page_edits) in edits {
            let mut source = self.load_source(*n)?;
            let mut removed = Vec::new();

            for edit in page_edits {
                match edit {
                    PageEdit::Replace(pos, values) => {
                        source.replace(*pos, render_record(self.schema, values)?)?;
                    }
                    PageEdit::Remove(pos) => removed.push(*pos),
                }
            }
            source.remove(&removed)?;
            pages.push((*n, source));
        }

        let counts = pages.iter().map(|(_, source)| source.record_count()).collect();
        self.commit_pages(pages)?;
        Ok(counts)
    }

    /// Cursor over every record of the table.
    pub fn cursor(&self) -> StorageResult<PageCursor<'_>> {
        PageCursor::new(self)
    }

    /// Removes every source, script and artifact of the table.
    pub fn drop_all(&self) -> StorageResult<()> {
        let paths = self.pipeline.paths();
        let table_dir = paths.table_dir(&self.schema.name);
        if table_dir.exists() {
            fs::remove_dir_all(&table_dir).map_err(|e| StorageError::io(&table_dir, e))?;
        }

        for (dir, prefix, suffix) in [
            (paths.compiled_dir(), String::new(), format!(".{}", std::env::consts::DLL_EXTENSION)),
            (paths.scripts_dir(), "compile_".to_string(), ".sh".to_string()),
        ] {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&dir, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| StorageError::io(&dir, e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let stem = name
                    .strip_prefix(prefix.as_str())
                    .and_then(|n| n.strip_suffix(suffix.as_str()));
                if stem.map(|s| self.owns_stem(s)).unwrap_or(false) {
                    let path = entry.path();
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "Failed to remove artifact");
                    }
                }
            }
        }

        info!(table = %self.schema.name, "Dropped table storage");
        Ok(())
    }

    /// Returns true if an artifact stem belongs to this table.
    fn owns_stem(&self, stem: &str) -> bool {
        let Some(rest) = stem
            .strip_prefix(self.schema.name.as_str())
            .and_then(|s| s.strip_prefix('_'))
        else {
            return false;
        };

        if let Some(n) = rest.strip_prefix("page_") {
            return !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit());
        }
        if let Some(column) = rest.strip_prefix("index_") {
            return self.schema.column_index(column).is_some();
        }
        rest.len() == 18
            && rest.starts_with("k_")
            && rest[2..].bytes().all(|b| b.is_ascii_hexdigit())
    }

    fn page_id(&self, n: usize) -> ArtifactId {
        ArtifactId {
            table: self.schema.name.clone(),
            kind: ArtifactKind::Page(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::BuildConfig;
    use kiln_sql::{ColumnDefinition, DataType};
    use tempfile::TempDir;

    use crate::paths::StoragePaths;

    fn schema() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                ColumnDefinition::new("id", DataType::Int),
                ColumnDefinition::new("name", DataType::Varchar(20)),
            ],
        )
    }

    fn row(id: i32, name: &str) -> Vec<Value> {
        vec![Value::Int(id), Value::String(name.to_string())]
    }

    #[test]
    fn test_source_round_trip() {
        let mut source = PageSource::create(&schema(), 0);
        source.append("{ 1, \"a\" }".to_string());
        source.append("{ 2, \"b\" }".to_string());

        let text = source.render();
        assert!(text.contains("    { 1, \"a\" },\n"));
        assert!(text.contains("    { 0 }\n"));
        assert!(text.contains("#include \"people_record.h\""));

        let parsed = PageSource::parse(&text).unwrap();
        assert_eq!(parsed, source);
        assert_eq!(parsed.record_count(), 2);
    }

    #[test]
    fn test_source_edits() {
        let mut source = PageSource::create(&schema(), 0);
        for i in 0..4 {
            source.append(format!("{{ {}, \"x\" }}", i));
        }

        source.replace(1, "{ 10, \"y\" }".to_string()).unwrap();
        assert_eq!(source.remove(&[3, 0, 3]).unwrap(), 2);
        assert_eq!(source.records(), &["{ 10, \"y\" }", "{ 2, \"x\" }"]);

        assert!(source.replace(5, String::new()).is_err());
        assert!(source.remove(&[2]).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_markers() {
        assert!(PageSource::parse("int count(void) { return 0; }").is_err());
    }

    #[test]
    fn test_append_fills_pages_in_order() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), BuildConfig::default());
        let schema = schema();
        let store = PageStore::new(&schema, &pipeline, 3);

        let touched = store
            .append_rows(&(0..5).map(|i| row(i, "n")).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(touched, vec![0, 1]);
        assert_eq!(store.source_pages(), vec![0, 1]);
        assert_eq!(store.load_source(0).unwrap().record_count(), 3);
        assert_eq!(store.load_source(1).unwrap().record_count(), 2);
        // Nothing is compiled until recompile.
        assert!(store.compiled_pages().is_empty());

        // A freed slot on page 0 is reused before page 1.
        let mut first = store.load_source(0).unwrap();
        first.remove(&[0]).unwrap();
        store.save_source(0, &first).unwrap();
        assert_eq!(store.append_rows(&[row(9, "z")]).unwrap(), vec![0]);
        assert_eq!(store.load_source(0).unwrap().record_count(), 3);
    }

    #[test]
    fn test_failed_compile_changes_no_page() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            compiler: "false".to_string(),
            ..BuildConfig::default()
        };
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), config);
        let schema = schema();
        let store = PageStore::new(&schema, &pipeline, 2);

        store.append_rows(&[row(1, "a"), row(2, "b")]).unwrap();
        let before = store.load_source(0).unwrap();

        let err = store.insert_rows(&[row(3, "c"), row(4, "d"), row(5, "e")]);
        assert!(matches!(err, Err(StorageError::Build(_))));
        assert_eq!(store.source_pages(), vec![0]);
        assert_eq!(store.load_source(0).unwrap(), before);

        let err = store.rewrite_pages(&[(0, vec![PageEdit::Remove(0)])]);
        assert!(err.is_err());
        assert_eq!(store.load_source(0).unwrap(), before);
        assert_eq!(store.stale_pages(), vec![0]);
    }

    #[test]
    fn test_missing_module_hides_only_its_page() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), BuildConfig::default());
        if !pipeline.compiler_available() {
            eprintln!("Skipping test: C compiler not available");
            return;
        }
        let schema = schema();
        let store = PageStore::new(&schema, &pipeline, 2);

        let rows: Vec<_> = (0..6).map(|i| row(i, "n")).collect();
        assert_eq!(store.insert_rows(&rows).unwrap(), vec![0, 1, 2]);
        pipeline.invalidate(&store.page_id(1)).unwrap();

        assert_eq!(store.compiled_pages(), vec![0, 2]);
        assert_eq!(store.stale_pages(), vec![1]);

        let mut ids = Vec::new();
        let mut cursor = store.cursor().unwrap();
        while let Some(record) = cursor.current() {
            ids.push(record.int(0).unwrap());
            cursor.advance().unwrap();
        }
        assert_eq!(ids, vec![0, 1, 4, 5]);
        drop(cursor);

        assert_eq!(store.ensure_compiled().unwrap(), vec![0, 1, 2]);
        assert!(store.stale_pages().is_empty());
    }

    #[test]
    fn test_missing_page_source() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), BuildConfig::default());
        let schema = schema();
        let store = PageStore::new(&schema, &pipeline, 3);

        assert!(matches!(
            store.load_source(0),
            Err(StorageError::PageNotFound { page: 0, .. })
        ));
        assert!(store.open_page(0).unwrap().is_none());
    }

    #[test]
    fn test_owns_stem() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), BuildConfig::default());
        let schema = schema();
        let store = PageStore::new(&schema, &pipeline, 3);

        assert!(store.owns_stem("people_page_0"));
        assert!(store.owns_stem("people_index_name"));
        assert!(store.owns_stem("people_k_0123456789abcdef"));
        assert!(!store.owns_stem("people_index_salary"));
        assert!(!store.owns_stem("people_extra_page_0"));
        assert!(!store.owns_stem("peoplex_page_0"));
    }

    #[test]
    fn test_compiled_page_reads() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), BuildConfig::default());
        if !pipeline.compiler_available() {
            eprintln!("Skipping test: C compiler not available");
            return;
        }
        let schema = schema();
        let store = PageStore::new(&schema, &pipeline, 10);

        store.append_rows(&[row(1, "Ann"), row(2, "Ben")]).unwrap();
        store.recompile(0).unwrap();
        assert_eq!(store.compiled_pages(), vec![0]);

        let page = store.open_page(0).unwrap().unwrap();
        assert_eq!(page.count(), 2);
        assert_eq!(page.read(1).unwrap().to_row().values(), &row(2, "Ben")[..]);
        assert!(page.read(2).is_none());
        assert!(!page.first_record().is_null());
        page.unload().unwrap();

        let remaining = store
            .rewrite_page(0, &[PageEdit::Remove(0), PageEdit::Replace(1, row(2, "Bo"))])
            .unwrap();
        assert_eq!(remaining, 1);
        let page = store.open_page(0).unwrap().unwrap();
        assert_eq!(page.count(), 1);
        assert_eq!(page.read(0).unwrap().value(1), Some(Value::String("Bo".into())));
        page.unload().unwrap();

        store.drop_all().unwrap();
        assert!(store.compiled_pages().is_empty());
        assert!(store.source_pages().is_empty());
    }
}
