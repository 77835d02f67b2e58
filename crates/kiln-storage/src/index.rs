//! Column index modules.
//!
//! An index is generated as C from `(key, position)` pairs, where the
//! position is the record's global ordinal in page-then-position order,
//! and compiled through the same build pipeline as pages and kernels.
//!
//! Ordered indices hold the entries sorted by key and answer exact and
//! range probes by binary search. Hash indices group the entries into
//! buckets by FNV-1a of the key bytes (little-endian `int64_t` for integer
//! keys); the Rust side computes the same hash to lay out the buckets.

use std::ffi::CString;
use std::fmt::Write;
use std::os::raw::{c_char, c_int};
use std::path::Path;

use tracing::debug;

use kiln_sql::codegen::c::{c_int_literal, c_string_literal, comment_safe};
use kiln_sql::parser::IndexKind;
use kiln_sql::value::DATE_FORMAT;
use kiln_sql::{CodegenError, DataType, TableSchema, Value};

use crate::error::{LoadResult, StorageError, StorageResult};
use crate::loader::{open_with, ModuleHandle};

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |h, &b| (h ^ u32::from(b)).wrapping_mul(FNV_PRIME))
}

/// A probe or entry key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    /// Integer key (`int64_t` in C).
    Int(i64),
    /// String or date key (`const char *` in C).
    Str(String),
}

impl IndexKey {
    /// Converts a value, if it can be an index key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(IndexKey::Int(i64::from(*i))),
            Value::String(s) => Some(IndexKey::Str(s.clone())),
            Value::Date(d) => Some(IndexKey::Str(d.format(DATE_FORMAT).to_string())),
            _ => None,
        }
    }

    /// Bytes the hash is computed over.
    pub fn hash_bytes(&self) -> Vec<u8> {
        match self {
            IndexKey::Int(i) => i.to_le_bytes().to_vec(),
            IndexKey::Str(s) => s.as_bytes().to_vec(),
        }
    }

    fn c_literal(&self) -> String {
        match self {
            IndexKey::Int(i) => c_int_literal(*i),
            IndexKey::Str(s) => c_string_literal(s),
        }
    }
}

fn key_is_int(data_type: &DataType) -> Result<bool, CodegenError> {
    match data_type {
        DataType::Int => Ok(true),
        DataType::Varchar(_) | DataType::Text | DataType::Date => Ok(false),
        other => Err(CodegenError::UnsupportedExpression(format!(
            "index on {} column",
            other
        ))),
    }
}

// =============================================================================
// Source Generation
// =============================================================================

/// Generates the C source of an index over one column.
pub struct IndexBuilder {
    table: String,
    column: String,
    int_keys: bool,
    kind: IndexKind,
}

impl IndexBuilder {
    /// Creates a builder for `column` of `schema`.
    pub fn new(schema: &TableSchema, column: &str, kind: IndexKind) -> Result<Self, CodegenError> {
        let definition = schema
            .column(column)
            .ok_or_else(|| CodegenError::UnknownColumn(column.to_string()))?;
        Ok(Self {
            table: schema.name.clone(),
            column: definition.name.clone(),
            int_keys: key_is_int(&definition.data_type)?,
            kind,
        })
    }

    /// Exported symbol names.
    pub fn symbols(&self) -> Vec<String> {
        symbol_names(&self.column, self.kind)
    }

    /// Renders the index for `entries` of `(key, global position)`.
    pub fn render(&self, mut entries: Vec<(IndexKey, i32)>) -> Result<String, CodegenError> {
        if let Some((key, _)) = entries
            .iter()
            .find(|(k, _)| matches!(k, IndexKey::Int(_)) != self.int_keys)
        {
            return Err(CodegenError::InvalidLiteral(format!(
                "key {:?} does not match column {}",
                key, self.column
            )));
        }

        let key_type = if self.int_keys { "int64_t" } else { "const char *" };
        let mut src = String::new();
        let _ = writeln!(
            src,
            "/* {} index on {}.{} ({} entries) */",
            self.kind.as_str(),
            comment_safe(&self.table),
            comment_safe(&self.column),
            entries.len()
        );
        src.push_str("#include <stddef.h>\n#include <stdint.h>\n#include <string.h>\n\n");
        let _ = writeln!(
            src,
            "typedef struct {{\n    {} key;\n    int32_t pos;\n}} kiln_index_entry;\n",
            key_type
        );

        // Entry order: by key for ordered indices, by bucket for hash ones.
        let buckets = entries.len().max(1).next_power_of_two();
        match self.kind {
            IndexKind::Ordered => entries.sort(),
            IndexKind::Hash => entries.sort_by_key(|(key, pos)| {
                (fnv1a32(&key.hash_bytes()) as usize % buckets, *pos)
            }),
        }

        src.push_str("static const kiln_index_entry entries[] = {\n");
        for (key, pos) in &entries {
            let _ = writeln!(src, "    {{ {}, {} }},", key.c_literal(), pos);
        }
        let sentinel = if self.int_keys { "0" } else { "\"\"" };
        let _ = writeln!(src, "    {{ {}, -1 }}\n}};\n", sentinel);
        let _ = writeln!(src, "static const int n_entries = {};\n", entries.len());

        if self.int_keys {
            src.push_str(
                "static int compare_key(int64_t a, int64_t b)\n{\n    return (a > b) - (a < b);\n}\n\n",
            );
        } else {
            src.push_str(
                "static int compare_key(const char *a, const char *b)\n{\n    return strcmp(a, b);\n}\n\n",
            );
        }

        match self.kind {
            IndexKind::Ordered => self.render_ordered(&mut src, key_type),
            IndexKind::Hash => self.render_hash(&mut src, key_type, &entries, buckets),
        }
        Ok(src)
    }

    fn render_ordered(&self, src: &mut String, key_type: &str) {
        for (name, test) in [("lower_bound", "< 0"), ("upper_bound", "<= 0")] {
            let _ = writeln!(
                src,
                "static int {name}({key_type} key)\n{{\n    int lo = 0;\n    int hi = n_entries;\n    while (lo < hi) {{\n        int mid = lo + (hi - lo) / 2;\n        if (compare_key(entries[mid].key, key) {test}) {{\n            lo = mid + 1;\n        }} else {{\n            hi = mid;\n        }}\n    }}\n    return lo;\n}}\n"
            );
        }

        src.push_str(
            "static int collect(int start, int end, int32_t positions[], int max)\n{\n    int total = 0;\n    for (int i = start; i < end; i++) {\n        if (total < max) {\n            positions[total] = entries[i].pos;\n        }\n        total++;\n    }\n    return total;\n}\n\n",
        );

        let column = &self.column;
        let _ = writeln!(
            src,
            "int find_by_{column}_exact({key_type} key, int32_t positions[], int max)\n{{\n    return collect(lower_bound(key), upper_bound(key), positions, max);\n}}\n"
        );

        let (bound_type, deref) = if self.int_keys {
            ("const int64_t *", "*")
        } else {
            ("const char *", "")
        };
        let _ = writeln!(
            src,
            "int find_by_{column}_range({bound_type}low, {bound_type}high, int32_t positions[], int max)\n{{\n    int start = low ? lower_bound({deref}low) : 0;\n    int end = high ? upper_bound({deref}high) : n_entries;\n    if (end < start) {{\n        end = start;\n    }}\n    return collect(start, end, positions, max);\n}}"
        );
    }

    fn render_hash(
        &self,
        src: &mut String,
        key_type: &str,
        entries: &[(IndexKey, i32)],
        buckets: usize,
    ) {
        let mut starts = vec![0usize; buckets + 1];
        for (key, _) in entries {
            starts[fnv1a32(&key.hash_bytes()) as usize % buckets + 1] += 1;
        }
        for b in 0..buckets {
            starts[b + 1] += starts[b];
        }

        src.push_str(
            "static uint32_t fnv1a(const unsigned char *bytes, size_t n)\n{\n    uint32_t h = 2166136261u;\n    for (size_t i = 0; i < n; i++) {\n        h ^= bytes[i];\n        h *= 16777619u;\n    }\n    return h;\n}\n\n",
        );
        let _ = writeln!(
            src,
            "static const int32_t bucket_start[{}] = {{ {} }};\n",
            buckets + 1,
            starts
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let hash = if self.int_keys {
            "    unsigned char bytes[8];\n    uint64_t bits = (uint64_t)key;\n    for (int i = 0; i < 8; i++) {\n        bytes[i] = (unsigned char)(bits >> (8 * i));\n    }\n    uint32_t h = fnv1a(bytes, 8);\n"
        } else {
            "    uint32_t h = fnv1a((const unsigned char *)key, strlen(key));\n"
        };
        let _ = writeln!(
            src,
            "int find_by_{}({} key, int32_t positions[], int max)\n{{\n{}    uint32_t b = h % {}u;\n    int total = 0;\n    for (int i = bucket_start[b]; i < bucket_start[b + 1]; i++) {{\n        if (compare_key(entries[i].key, key) == 0) {{\n            if (total < max) {{\n                positions[total] = entries[i].pos;\n            }}\n            total++;\n        }}\n    }}\n    return total;\n}}",
            self.column, key_type, hash, buckets
        );
    }
}

fn symbol_names(column: &str, kind: IndexKind) -> Vec<String> {
    match kind {
        IndexKind::Ordered => vec![
            format!("find_by_{}_exact", column),
            format!("find_by_{}_range", column),
        ],
        IndexKind::Hash => vec![format!("find_by_{}", column)],
    }
}

// =============================================================================
// Index Module
// =============================================================================

type IntFindFn = unsafe extern "C" fn(i64, *mut i32, c_int) -> c_int;
type StrFindFn = unsafe extern "C" fn(*const c_char, *mut i32, c_int) -> c_int;
type IntRangeFn = unsafe extern "C" fn(*const i64, *const i64, *mut i32, c_int) -> c_int;
type StrRangeFn = unsafe extern "C" fn(*const c_char, *const c_char, *mut i32, c_int) -> c_int;

enum Entry {
    OrderedInt { exact: IntFindFn, range: IntRangeFn },
    OrderedStr { exact: StrFindFn, range: StrRangeFn },
    HashInt(IntFindFn),
    HashStr(StrFindFn),
}

/// A loaded index.
pub struct IndexModule {
    handle: ModuleHandle,
    entry: Entry,
    column: String,
}

impl IndexModule {
    /// Loads the index over `column` (of type `data_type`) at `path`.
    pub fn open(path: &Path, column: &str, data_type: &DataType, kind: IndexKind) -> LoadResult<Self> {
        let int_keys = matches!(data_type, DataType::Int);
        let names = symbol_names(column, kind);

        let (handle, entry) = open_with(path, |handle| {
            // SAFETY: the signatures match the generated index source for
            // this key type and kind.
            unsafe {
                Ok(match (kind, int_keys) {
                    (IndexKind::Ordered, true) => Entry::OrderedInt {
                        exact: handle.resolve(&names[0])?,
                        range: handle.resolve(&names[1])?,
                    },
                    (IndexKind::Ordered, false) => Entry::OrderedStr {
                        exact: handle.resolve(&names[0])?,
                        range: handle.resolve(&names[1])?,
                    },
                    (IndexKind::Hash, true) => Entry::HashInt(handle.resolve(&names[0])?),
                    (IndexKind::Hash, false) => Entry::HashStr(handle.resolve(&names[0])?),
                })
            }
        })?;

        debug!(path = %path.display(), column, kind = kind.as_str(), "Opened index");
        Ok(Self {
            handle,
            entry,
            column: column.to_string(),
        })
    }

    /// Indexed column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Positions of records whose key equals `key`.
    pub fn find_exact(&self, key: &IndexKey) -> StorageResult<Vec<usize>> {
        match (&self.entry, key) {
            (Entry::OrderedInt { exact, .. }, IndexKey::Int(k))
            | (Entry::HashInt(exact), IndexKey::Int(k)) => {
                // SAFETY: the module is loaded; the callee writes at most
                // `max` positions.
                Ok(collect(|out, max| unsafe { (*exact)(*k, out, max) }))
            }
            (Entry::OrderedStr { exact, .. }, IndexKey::Str(s))
            | (Entry::HashStr(exact), IndexKey::Str(s)) => {
                let key = c_key(s)?;
                // SAFETY: as above; `key` is NUL terminated and outlives the call.
                Ok(collect(|out, max| unsafe { (*exact)(key.as_ptr(), out, max) }))
            }
            _ => Err(self.mismatch(key)),
        }
    }

    /// Hash lookup; identical to [`IndexModule::find_exact`].
    pub fn find(&self, key: &IndexKey) -> StorageResult<Vec<usize>> {
        self.find_exact(key)
    }

    /// Positions of records with `low <= key <= high`; `None` is unbounded.
    /// Results are in key order.
    pub fn find_range(
        &self,
        low: Option<&IndexKey>,
        high: Option<&IndexKey>,
    ) -> StorageResult<Vec<usize>> {
        match &self.entry {
            Entry::OrderedInt { range, .. } => {
                let bound = |k: Option<&IndexKey>| match k {
                    None => Ok(None),
                    Some(IndexKey::Int(i)) => Ok(Some(*i)),
                    Some(other) => Err(self.mismatch(other)),
                };
                let (low, high) = (bound(low)?, bound(high)?);
                let low_ptr = low.as_ref().map_or(std::ptr::null(), |v| v as *const i64);
                let high_ptr = high.as_ref().map_or(std::ptr::null(), |v| v as *const i64);
                // SAFETY: bounds are null or point at live locals.
                Ok(collect(|out, max| unsafe { (*range)(low_ptr, high_ptr, out, max) }))
            }
            Entry::OrderedStr { range, .. } => {
                let bound = |k: Option<&IndexKey>| match k {
                    None => Ok(None),
                    Some(IndexKey::Str(s)) => c_key(s).map(Some),
                    Some(other) => Err(self.mismatch(other)),
                };
                let (low, high) = (bound(low)?, bound(high)?);
                let low_ptr = low.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());
                let high_ptr = high.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());
                // SAFETY: bounds are null or NUL-terminated strings that
                // outlive the call.
                Ok(collect(|out, max| unsafe { (*range)(low_ptr, high_ptr, out, max) }))
            }
            Entry::HashInt(_) | Entry::HashStr(_) => Err(StorageError::InvalidKey(format!(
                "hash index on '{}' does not support range lookups",
                self.column
            ))),
        }
    }

    /// Unloads the module.
    pub fn unload(mut self) -> LoadResult<()> {
        self.handle.unload()
    }

    fn mismatch(&self, key: &IndexKey) -> StorageError {
        StorageError::InvalidKey(format!("{:?} for index on '{}'", key, self.column))
    }
}

fn c_key(s: &str) -> StorageResult<CString> {
    CString::new(s).map_err(|_| StorageError::InvalidKey("key contains a NUL byte".to_string()))
}

/// Calls `probe` with a growing buffer until every position fits.
fn collect<F>(probe: F) -> Vec<usize>
where
    F: Fn(*mut i32, c_int) -> c_int,
{
    let mut buf = vec![0i32; 64];
    loop {
        let max = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
        let total = usize::try_from(probe(buf.as_mut_ptr(), max)).unwrap_or(0);
        if total <= buf.len() {
            buf.truncate(total);
            return buf
                .into_iter()
                .filter_map(|p| usize::try_from(p).ok())
                .collect();
        }
        buf.resize(total, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::BuildConfig;
    use kiln_sql::ColumnDefinition;
    use tempfile::TempDir;

    use crate::build::BuildPipeline;
    use crate::paths::{ArtifactId, StoragePaths};

    fn schema() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                ColumnDefinition::new("id", DataType::Int),
                ColumnDefinition::new("name", DataType::Varchar(20)),
                ColumnDefinition::new("score", DataType::Float),
            ],
        )
    }

    #[test]
    fn test_fnv1a_vectors() {
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_key_conversion() {
        assert_eq!(IndexKey::from_value(&Value::Int(-1)), Some(IndexKey::Int(-1)));
        assert_eq!(IndexKey::Int(1).hash_bytes(), vec![1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(IndexKey::from_value(&Value::Float(1.0)), None);
    }

    #[test]
    fn test_builder_rejects_bad_columns() {
        let schema = schema();
        assert!(matches!(
            IndexBuilder::new(&schema, "missing", IndexKind::Ordered),
            Err(CodegenError::UnknownColumn(_))
        ));
        assert!(matches!(
            IndexBuilder::new(&schema, "score", IndexKind::Hash),
            Err(CodegenError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_ordered_source() {
        let schema = schema();
        let builder = IndexBuilder::new(&schema, "id", IndexKind::Ordered).unwrap();
        let src = builder
            .render(vec![(IndexKey::Int(5), 0), (IndexKey::Int(2), 1)])
            .unwrap();

        assert!(src.find("{ 2, 1 }").unwrap() < src.find("{ 5, 0 }").unwrap());
        assert!(src.contains("int find_by_id_exact(int64_t key, int32_t positions[], int max)"));
        assert!(src.contains("int find_by_id_range(const int64_t *low, const int64_t *high,"));
        assert_eq!(builder.symbols(), vec!["find_by_id_exact", "find_by_id_range"]);

        assert!(builder.render(vec![(IndexKey::Str("x".into()), 0)]).is_err());
    }

    #[test]
    fn test_hash_source() {
        let schema = schema();
        let builder = IndexBuilder::new(&schema, "name", IndexKind::Hash).unwrap();
        let src = builder
            .render(vec![(IndexKey::Str("a".into()), 0), (IndexKey::Str("b".into()), 1)])
            .unwrap();
        assert!(src.contains("int find_by_name(const char * key, int32_t positions[], int max)"));
        assert!(src.contains("static const int32_t bucket_start[3]"));
        assert!(src.contains("strlen(key)"));
    }

    #[test]
    fn test_compiled_indices() {
        let dir = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(StoragePaths::new(dir.path()), BuildConfig::default());
        if !pipeline.compiler_available() {
            eprintln!("Skipping test: C compiler not available");
            return;
        }
        let schema = schema();
        std::fs::create_dir_all(pipeline.paths().include_dir("people")).unwrap();

        let ids = vec![
            (IndexKey::Int(30), 0),
            (IndexKey::Int(10), 1),
            (IndexKey::Int(20), 2),
            (IndexKey::Int(10), 3),
        ];
        let source = IndexBuilder::new(&schema, "id", IndexKind::Ordered)
            .unwrap()
            .render(ids)
            .unwrap();
        let path = pipeline.build(&ArtifactId::index("people", "id"), &source).unwrap();
        let index = IndexModule::open(&path, "id", &DataType::Int, IndexKind::Ordered).unwrap();

        assert_eq!(index.find_exact(&IndexKey::Int(10)).unwrap(), vec![1, 3]);
        assert!(index.find_exact(&IndexKey::Int(11)).unwrap().is_empty());
        assert_eq!(
            index
                .find_range(Some(&IndexKey::Int(15)), None)
                .unwrap(),
            vec![2, 0]
        );
        assert_eq!(index.find_range(None, None).unwrap().len(), 4);
        assert!(index.find_exact(&IndexKey::Str("x".into())).is_err());
        index.unload().unwrap();

        let names: Vec<_> = (0..100)
            .map(|i| (IndexKey::Str(format!("n{}", i % 10)), i))
            .collect();
        let source = IndexBuilder::new(&schema, "name", IndexKind::Hash)
            .unwrap()
            .render(names)
            .unwrap();
        let path = pipeline.build(&ArtifactId::index("people", "name"), &source).unwrap();
        let index =
            IndexModule::open(&path, "name", &DataType::Varchar(20), IndexKind::Hash).unwrap();

        let hits = index.find(&IndexKey::Str("n3".into())).unwrap();
        assert_eq!(hits, (0..10).map(|i| i * 10 + 3).collect::<Vec<_>>());
        assert!(index.find_range(None, None).is_err());
        index.unload().unwrap();
    }
}
