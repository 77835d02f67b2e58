//! Build pipeline.
//!
//! Every native artifact (pages, kernels, indices) goes through the same
//! routine:
//!
//! 1. Resolve the deterministic artifact path for the [`ArtifactId`].
//! 2. If a module already exists there, return it.
//! 3. Otherwise write the source and a build script, run the script with
//!    the configured shell, and rename the temporary output into place.
//!
//! The rename makes the artifact appear atomically: a module path either
//! does not exist or holds a complete library.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use kiln_common::BuildConfig;

use crate::error::{BuildError, BuildResult};
use crate::paths::{ArtifactId, StoragePaths};

/// Counters for build outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Compiler invocations that produced an artifact.
    pub builds: u64,
    /// Requests satisfied by an existing artifact.
    pub cache_hits: u64,
    /// Compiler invocations that failed.
    pub failures: u64,
}

/// A module compiled by [`BuildPipeline::stage`], not yet in place.
#[derive(Debug)]
#[must_use = "a staged build must be committed or discarded"]
pub struct StagedBuild {
    id: ArtifactId,
    source: PathBuf,
    module: PathBuf,
}

impl StagedBuild {
    /// Artifact this build replaces.
    pub fn id(&self) -> &ArtifactId {
        &self.id
    }
}

/// Compiles generated C into loadable modules.
pub struct BuildPipeline {
    paths: StoragePaths,
    config: BuildConfig,
    builds: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

impl BuildPipeline {
    /// Creates a pipeline writing under `paths`.
    pub fn new(paths: StoragePaths, config: BuildConfig) -> Self {
        Self {
            paths,
            config,
            builds: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Path resolver for the data directory.
    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Build configuration.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Returns true if the artifact is already compiled.
    pub fn is_built(&self, id: &ArtifactId) -> bool {
        self.paths.artifact_path(id).is_file()
    }

    /// Returns the artifact for `id`, compiling `source` only if no
    /// artifact exists yet.
    pub fn build(&self, id: &ArtifactId, source: &str) -> BuildResult<PathBuf> {
        let artifact = self.paths.artifact_path(id);
        if artifact.is_file() {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(artifact = %id, "Build cache hit");
            return Ok(artifact);
        }
        let source_path = self.paths.source_path(id);
        self.compile(id, source, &source_path, &artifact)?;
        Ok(artifact)
    }

    /// Compiles `source` and replaces any existing artifact for `id`.
    ///
    /// The current source and module stay in place until the new module
    /// has compiled, so a failed rebuild leaves the last good build.
    pub fn rebuild(&self, id: &ArtifactId, source: &str) -> BuildResult<PathBuf> {
        let staged = self.stage(id, source)?;
        self.commit(staged)
    }

    /// Compiles `source` into side files next to the artifact of `id`
    /// without touching the current source or module.
    ///
    /// On failure the staged source and the script are left on disk.
    pub fn stage(&self, id: &ArtifactId, source: &str) -> BuildResult<StagedBuild> {
        let staged = StagedBuild {
            id: id.clone(),
            source: self.paths.staged_source_path(id),
            module: self.paths.staged_artifact_path(id),
        };
        self.compile(id, source, &staged.source, &staged.module)?;
        debug!(artifact = %id, "Staged build");
        Ok(staged)
    }

    /// Moves a staged source and module into place and returns the
    /// artifact path.
    pub fn commit(&self, staged: StagedBuild) -> BuildResult<PathBuf> {
        let source = self.paths.source_path(&staged.id);
        let artifact = self.paths.artifact_path(&staged.id);
        fs::rename(&staged.source, &source).map_err(|e| BuildError::io(&source, e))?;
        fs::rename(&staged.module, &artifact).map_err(|e| BuildError::io(&artifact, e))?;
        debug!(artifact = %staged.id, "Committed build");
        Ok(artifact)
    }

    /// Removes the side files of a staged build that will not be committed.
    pub fn discard(&self, staged: StagedBuild) {
        for path in [&staged.source, &staged.module] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to discard staged file");
                }
            }
        }
    }

    /// Removes the artifact for `id`. Returns true if one existed.
    pub fn invalidate(&self, id: &ArtifactId) -> BuildResult<bool> {
        let artifact = self.paths.artifact_path(id);
        match fs::remove_file(&artifact) {
            Ok(()) => {
                debug!(artifact = %id, "Invalidated artifact");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BuildError::io(artifact, e)),
        }
    }

    /// Snapshot of the build counters.
    pub fn stats(&self) -> BuildStats {
        BuildStats {
            builds: self.builds.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Returns true if the configured compiler can be started.
    pub fn compiler_available(&self) -> bool {
        Command::new(&self.config.compiler)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Renders the build script for one artifact.
    pub fn script(&self, id: &ArtifactId, source: &Path, output: &Path) -> String {
        let mut command = vec![
            shell_quote(&self.config.compiler),
            "-shared".to_string(),
            "-fPIC".to_string(),
            format!("-O{}", self.config.opt_level),
            "-std=c11".to_string(),
            "-I".to_string(),
            shell_quote(&self.paths.include_dir(&id.table).to_string_lossy()),
        ];
        command.extend(self.config.extra_flags.iter().map(|f| shell_quote(f)));
        command.push("-o".to_string());
        command.push(shell_quote(&output.to_string_lossy()));
        command.push(shell_quote(&source.to_string_lossy()));

        format!(
            "#!/bin/sh\n# build {}\nset -e\n{}\n",
            id,
            command.join(" ")
        )
    }

    fn compile(
        &self,
        id: &ArtifactId,
        source: &str,
        source_path: &Path,
        artifact: &Path,
    ) -> BuildResult<()> {
        let script_path = self.paths.script_path(id);
        let compiled_dir = self.paths.compiled_dir();

        for dir in [
            self.paths.source_dir(&id.table),
            self.paths.scripts_dir(),
            compiled_dir.clone(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| BuildError::io(dir, e))?;
        }

        fs::write(source_path, source).map_err(|e| BuildError::io(source_path, e))?;

        let temp = compiled_dir.join(format!(
            ".{}.{}.tmp",
            id.artifact_file_name(),
            std::process::id()
        ));
        let script = self.script(id, source_path, &temp);
        fs::write(&script_path, script).map_err(|e| BuildError::io(&script_path, e))?;

        info!(artifact = %id, source = %source_path.display(), "Compiling");

        let output = Command::new(&self.config.shell)
            .arg(&script_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BuildError::CompilerUnavailable {
                compiler: self.config.shell.clone(),
                source,
            })?;

        if !output.status.success() {
            self.failures.fetch_add(1, Ordering::Relaxed);
            let _ = fs::remove_file(&temp);
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(artifact = %id, status = %output.status, "Compilation failed");
            return Err(BuildError::CompilerFailed {
                artifact: id.to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }

        fs::rename(&temp, artifact).map_err(|e| BuildError::io(artifact, e))?;
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(artifact = %id, path = %artifact.display(), "Compiled");
        Ok(())
    }
}

/// Quotes a word for a POSIX shell.
fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=+,:".contains(&b))
    {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, config: BuildConfig) -> BuildPipeline {
        BuildPipeline::new(StoragePaths::new(dir.path()), config)
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("cc"), "cc");
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_script_contents() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BuildConfig::default());
        let id = ArtifactId::page("t", 0);
        let script = pipeline.script(&id, Path::new("/src/tData_0.c"), Path::new("/out/x.tmp"));

        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("cc -shared -fPIC -O2 -std=c11 -I "));
        assert!(script.contains("-o /out/x.tmp /src/tData_0.c"));
    }

    #[test]
    fn test_existing_artifact_is_a_cache_hit() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BuildConfig::default());
        let id = ArtifactId::kernel("t", "k_0000000000000001");

        let artifact = pipeline.paths().artifact_path(&id);
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, b"module").unwrap();

        assert_eq!(pipeline.build(&id, "int x;").unwrap(), artifact);
        assert_eq!(
            pipeline.stats(),
            BuildStats {
                builds: 0,
                cache_hits: 1,
                failures: 0
            }
        );
        // Nothing was written for a cache hit.
        assert!(!pipeline.paths().source_path(&id).exists());
    }

    #[test]
    fn test_invalidate() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BuildConfig::default());
        let id = ArtifactId::page("t", 3);

        assert!(!pipeline.invalidate(&id).unwrap());
        let artifact = pipeline.paths().artifact_path(&id);
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, b"module").unwrap();
        assert!(pipeline.is_built(&id));
        assert!(pipeline.invalidate(&id).unwrap());
        assert!(!pipeline.is_built(&id));
    }

    #[test]
    fn test_failed_compile_leaves_source_and_script() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            compiler: "false".to_string(),
            ..BuildConfig::default()
        };
        let pipeline = pipeline(&dir, config);
        let id = ArtifactId::page("t", 0);

        let err = pipeline.build(&id, "this is not C").unwrap_err();
        assert!(matches!(err, BuildError::CompilerFailed { .. }));
        assert!(pipeline.paths().source_path(&id).is_file());
        assert!(pipeline.paths().script_path(&id).is_file());
        assert!(!pipeline.is_built(&id));
        assert_eq!(pipeline.stats().failures, 1);
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_build() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            compiler: "false".to_string(),
            ..BuildConfig::default()
        };
        let pipeline = pipeline(&dir, config);
        let id = ArtifactId::page("t", 0);

        let artifact = pipeline.paths().artifact_path(&id);
        let source = pipeline.paths().source_path(&id);
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&artifact, b"module").unwrap();
        fs::write(&source, "old source").unwrap();

        let err = pipeline.rebuild(&id, "new source").unwrap_err();
        assert!(matches!(err, BuildError::CompilerFailed { .. }));

        assert_eq!(fs::read(&artifact).unwrap(), b"module");
        assert_eq!(fs::read_to_string(&source).unwrap(), "old source");
        // The failed input stays on disk next to the live source.
        assert_eq!(
            fs::read_to_string(pipeline.paths().staged_source_path(&id)).unwrap(),
            "new source"
        );
        assert!(pipeline.paths().script_path(&id).is_file());
        assert!(!pipeline.paths().staged_artifact_path(&id).exists());
    }

    #[test]
    fn test_missing_shell() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            shell: "kiln-no-such-shell".to_string(),
            ..BuildConfig::default()
        };
        let pipeline = pipeline(&dir, config);

        let err = pipeline.build(&ArtifactId::page("t", 0), "").unwrap_err();
        assert!(matches!(err, BuildError::CompilerUnavailable { .. }));
    }

    #[test]
    fn test_compile_once() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, BuildConfig::default());
        if !pipeline.compiler_available() {
            eprintln!("Skipping test: C compiler not available");
            return;
        }

        let id = ArtifactId::kernel("t", "k_00000000000000aa");
        fs::create_dir_all(pipeline.paths().include_dir("t")).unwrap();
        let source = "int answer(void) { return 42; }\n";

        let first = pipeline.build(&id, source).unwrap();
        let second = pipeline.build(&id, source).unwrap();
        assert_eq!(first, second);
        assert!(first.is_file());
        assert_eq!(pipeline.stats().builds, 1);
        assert_eq!(pipeline.stats().cache_hits, 1);

        pipeline.rebuild(&id, source).unwrap();
        assert_eq!(pipeline.stats().builds, 2);
    }
}
