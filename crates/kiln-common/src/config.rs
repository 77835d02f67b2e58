//! Engine configuration.
//!
//! Configuration is plain data: serde structures that round-trip through
//! TOML, with defaults for every field so partial files are accepted.
//!
//! ```toml
//! data_dir = "./kiln-data"
//! page_capacity = 65535
//! max_result_rows = 10000
//!
//! [build]
//! compiler = "cc"
//! opt_level = "2"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_MAX_RESULT_ROWS, DEFAULT_PAGE_CAPACITY, MAX_PAGE_CAPACITY};

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the configuration file failed.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this structure.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML.
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for catalog, sources, scripts and compiled modules.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Records per page before a new page is started.
    #[serde(default = "default_page_capacity")]
    pub page_capacity: usize,

    /// Upper bound on rows materialized for one query.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,

    /// External toolchain settings.
    #[serde(default)]
    pub build: BuildConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./kiln-data")
}

fn default_page_capacity() -> usize {
    DEFAULT_PAGE_CAPACITY
}

fn default_max_result_rows() -> usize {
    DEFAULT_MAX_RESULT_ROWS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            page_capacity: default_page_capacity(),
            max_result_rows: default_max_result_rows(),
            build: BuildConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with the specified data directory.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Creates a small configuration for tests: tiny pages so multi-page
    /// behaviour shows up with a handful of rows.
    #[must_use]
    pub fn for_testing(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            page_capacity: 5,
            max_result_rows: 1_000,
            build: BuildConfig::default(),
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_capacity == 0 {
            return Err(ConfigError::Invalid(
                "page_capacity must be at least 1".to_string(),
            ));
        }

        if self.page_capacity > MAX_PAGE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "page_capacity must not exceed {}",
                MAX_PAGE_CAPACITY
            )));
        }

        if self.max_result_rows == 0 {
            return Err(ConfigError::Invalid(
                "max_result_rows must be at least 1".to_string(),
            ));
        }

        if self.max_result_rows > i32::MAX as usize {
            return Err(ConfigError::Invalid(
                "max_result_rows must fit in a C int".to_string(),
            ));
        }

        self.build.validate()
    }

    /// Creates a builder for configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

/// External compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// C compiler executable.
    #[serde(default = "default_compiler")]
    pub compiler: String,

    /// Optimization level passed as `-O<level>`.
    #[serde(default = "default_opt_level")]
    pub opt_level: String,

    /// Shell used to run generated build scripts.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Additional flags appended after the fixed ones.
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

fn default_compiler() -> String {
    "cc".to_string()
}

fn default_opt_level() -> String {
    "2".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
            opt_level: default_opt_level(),
            shell: default_shell(),
            extra_flags: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Validates the build settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compiler.trim().is_empty() {
            return Err(ConfigError::Invalid("build.compiler is empty".to_string()));
        }
        if self.shell.trim().is_empty() {
            return Err(ConfigError::Invalid("build.shell is empty".to_string()));
        }
        if !matches!(self.opt_level.as_str(), "0" | "1" | "2" | "3" | "s" | "z" | "fast" | "g") {
            return Err(ConfigError::Invalid(format!(
                "build.opt_level '{}' is not a recognised optimization level",
                self.opt_level
            )));
        }
        Ok(())
    }
}

/// Builder for engine configuration.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data directory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Sets the page capacity.
    pub fn page_capacity(mut self, capacity: usize) -> Self {
        self.config.page_capacity = capacity;
        self
    }

    /// Sets the per-query row cap.
    pub fn max_result_rows(mut self, rows: usize) -> Self {
        self.config.max_result_rows = rows;
        self
    }

    /// Sets the C compiler.
    pub fn compiler(mut self, compiler: impl Into<String>) -> Self {
        self.config.build.compiler = compiler.into();
        self
    }

    /// Sets the optimization level.
    pub fn opt_level(mut self, level: impl Into<String>) -> Self {
        self.config.build.opt_level = level.into();
        self
    }

    /// Adds an extra compiler flag.
    pub fn extra_flag(mut self, flag: impl Into<String>) -> Self {
        self.config.build.extra_flags.push(flag.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.page_capacity, DEFAULT_PAGE_CAPACITY);
        assert_eq!(config.max_result_rows, DEFAULT_MAX_RESULT_ROWS);
        assert_eq!(config.build.compiler, "cc");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .data_dir("/data/kiln")
            .page_capacity(5)
            .max_result_rows(3)
            .compiler("clang")
            .extra_flag("-g")
            .build();

        assert_eq!(config.data_dir, PathBuf::from("/data/kiln"));
        assert_eq!(config.page_capacity, 5);
        assert_eq!(config.max_result_rows, 3);
        assert_eq!(config.build.compiler, "clang");
        assert_eq!(config.build.extra_flags, vec!["-g".to_string()]);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = EngineConfig::builder().page_capacity(0).build();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig::builder().max_result_rows(0).build();
        assert!(config.validate().is_err());

        let config = EngineConfig::builder().opt_level("9").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("kiln.toml");

        let config = EngineConfig::builder()
            .data_dir(temp_dir.path())
            .page_capacity(42)
            .build();
        config.save(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: EngineConfig = toml::from_str("page_capacity = 7\n").unwrap();
        assert_eq!(config.page_capacity, 7);
        assert_eq!(config.max_result_rows, DEFAULT_MAX_RESULT_ROWS);
        assert_eq!(config.build, BuildConfig::default());
    }

    #[test]
    fn test_for_testing() {
        let config = EngineConfig::for_testing("/tmp/kiln_test");
        assert_eq!(config.page_capacity, 5);
        assert!(config.validate().is_ok());
    }
}
