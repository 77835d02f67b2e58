//! Data directory layout.
//!
//! ```text
//! <root>/
//! ├── catalog.json
//! ├── compiled/                      native modules
//! │   ├── <table>_page_<n>.so
//! │   ├── <table>_<kernel>.so
//! │   └── <table>_index_<col>.so
//! ├── scripts/compile_<stem>.sh      one build script per artifact
//! └── tables/<table>/
//!     ├── include/<table>_record.h
//!     └── src/
//!         ├── <table>Data_<n>.c
//!         ├── <kernel>_<table>.c
//!         └── index_<col>_<table>.c
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_common::{
    CATALOG_FILE, COMPILED_DIR, INCLUDE_SUBDIR, SCRIPTS_DIR, SOURCE_SUBDIR, TABLES_DIR,
};
use kiln_sql::codegen::header_file_name;

/// What an artifact contains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Page `n` of a table.
    Page(usize),
    /// A query kernel, by kernel name.
    Kernel(String),
    /// An index over the named column.
    Index(String),
}

/// Identity of one compiled artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId {
    /// Owning table.
    pub table: String,
    /// Artifact kind.
    pub kind: ArtifactKind,
}

impl ArtifactId {
    /// Page `n` of `table`.
    pub fn page(table: impl Into<String>, n: usize) -> Self {
        Self {
            table: table.into(),
            kind: ArtifactKind::Page(n),
        }
    }

    /// Kernel `name` scanning `table`.
    pub fn kernel(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: ArtifactKind::Kernel(name.into()),
        }
    }

    /// Index over `column` of `table`.
    pub fn index(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: ArtifactKind::Index(column.into()),
        }
    }

    /// File stem shared by the artifact and its build script.
    pub fn stem(&self) -> String {
        match &self.kind {
            ArtifactKind::Page(n) => format!("{}_page_{}", self.table, n),
            ArtifactKind::Kernel(name) => format!("{}_{}", self.table, name),
            ArtifactKind::Index(column) => format!("{}_index_{}", self.table, column),
        }
    }

    /// File name of the generated C source.
    pub fn source_file_name(&self) -> String {
        match &self.kind {
            ArtifactKind::Page(n) => format!("{}Data_{}.c", self.table, n),
            ArtifactKind::Kernel(name) => format!("{}_{}.c", name, self.table),
            ArtifactKind::Index(column) => format!("index_{}_{}.c", column, self.table),
        }
    }

    /// File name of the build script.
    pub fn script_file_name(&self) -> String {
        format!("compile_{}.sh", self.stem())
    }

    /// File name of the compiled module.
    pub fn artifact_file_name(&self) -> String {
        format!("{}.{}", self.stem(), std::env::consts::DLL_EXTENSION)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Resolves every path under one data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    /// Creates a resolver rooted at `root`. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of compiled modules.
    pub fn compiled_dir(&self) -> PathBuf {
        self.root.join(COMPILED_DIR)
    }

    /// Directory of build scripts.
    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(SCRIPTS_DIR)
    }

    /// Directory of a table's generated files.
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(TABLES_DIR).join(table)
    }

    /// Directory of a table's C sources.
    pub fn source_dir(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(SOURCE_SUBDIR)
    }

    /// Include directory passed to the compiler for a table.
    pub fn include_dir(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(INCLUDE_SUBDIR)
    }

    /// Path of a table's record header.
    pub fn header_path(&self, table: &str) -> PathBuf {
        self.include_dir(table).join(header_file_name(table))
    }

    /// Path of the persisted catalog.
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(CATALOG_FILE)
    }

    /// Path of a compiled module.
    pub fn artifact_path(&self, id: &ArtifactId) -> PathBuf {
        self.compiled_dir().join(id.artifact_file_name())
    }

    /// Path of an artifact's generated source.
    pub fn source_path(&self, id: &ArtifactId) -> PathBuf {
        self.source_dir(&id.table).join(id.source_file_name())
    }

    /// Where [`BuildPipeline::stage`](crate::BuildPipeline::stage) writes
    /// the next source of an artifact.
    pub fn staged_source_path(&self, id: &ArtifactId) -> PathBuf {
        let name = id.source_file_name();
        let stem = name.strip_suffix(".c").unwrap_or(&name);
        self.source_dir(&id.table).join(format!("{}.staged.c", stem))
    }

    /// Where a staged module waits before it replaces the artifact.
    pub fn staged_artifact_path(&self, id: &ArtifactId) -> PathBuf {
        self.compiled_dir()
            .join(format!(".{}.staged", id.artifact_file_name()))
    }

    /// Path of an artifact's build script.
    pub fn script_path(&self, id: &ArtifactId) -> PathBuf {
        self.scripts_dir().join(id.script_file_name())
    }

    /// Creates the top-level directories.
    pub fn ensure_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.compiled_dir())?;
        fs::create_dir_all(self.scripts_dir())?;
        fs::create_dir_all(self.root.join(TABLES_DIR))?;
        Ok(())
    }

    /// Creates a table's source and include directories.
    pub fn ensure_table_dirs(&self, table: &str) -> io::Result<()> {
        fs::create_dir_all(self.source_dir(table))?;
        fs::create_dir_all(self.include_dir(table))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_naming() {
        let page = ArtifactId::page("Customers", 2);
        assert_eq!(page.stem(), "Customers_page_2");
        assert_eq!(page.source_file_name(), "CustomersData_2.c");
        assert_eq!(page.script_file_name(), "compile_Customers_page_2.sh");

        let kernel = ArtifactId::kernel("Customers", "k_00000000000000ff");
        assert_eq!(kernel.stem(), "Customers_k_00000000000000ff");
        assert_eq!(kernel.source_file_name(), "k_00000000000000ff_Customers.c");

        let index = ArtifactId::index("Customers", "email");
        assert_eq!(index.stem(), "Customers_index_email");
        assert_eq!(index.source_file_name(), "index_email_Customers.c");
        assert_eq!(index.to_string(), "Customers_index_email");
    }

    #[test]
    fn test_paths() {
        let paths = StoragePaths::new("/data");
        let id = ArtifactId::page("t", 0);

        assert_eq!(paths.catalog_path(), PathBuf::from("/data/catalog.json"));
        assert_eq!(paths.source_path(&id), PathBuf::from("/data/tables/t/src/tData_0.c"));
        assert_eq!(
            paths.header_path("t"),
            PathBuf::from("/data/tables/t/include/t_record.h")
        );
        assert_eq!(
            paths.script_path(&id),
            PathBuf::from("/data/scripts/compile_t_page_0.sh")
        );
        assert!(paths
            .artifact_path(&id)
            .starts_with(PathBuf::from("/data/compiled")));
        assert_eq!(
            paths.staged_source_path(&id),
            PathBuf::from("/data/tables/t/src/tData_0.staged.c")
        );
        assert_ne!(paths.staged_artifact_path(&id), paths.artifact_path(&id));
    }

    #[test]
    fn test_ensure_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StoragePaths::new(dir.path());
        paths.ensure_layout().unwrap();
        paths.ensure_table_dirs("t").unwrap();

        assert!(paths.compiled_dir().is_dir());
        assert!(paths.scripts_dir().is_dir());
        assert!(paths.source_dir("t").is_dir());
        assert!(paths.include_dir("t").is_dir());
    }
}
