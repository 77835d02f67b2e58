//! Dynamic module loading.
//!
//! [`ModuleHandle`] is the single load/resolve/unload primitive. Page,
//! kernel and index modules each layer their own symbol set on top of it
//! with [`open_with`], which releases the handle again if any required
//! symbol is missing.

use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{debug, warn};

use crate::error::{LoadError, LoadResult};

/// Holds at most one loaded library.
#[derive(Debug, Default)]
pub struct ModuleHandle {
    library: Option<Library>,
    path: Option<PathBuf>,
}

impl ModuleHandle {
    /// Creates an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path`.
    ///
    /// Loading the path already held is a no-op; loading a different path
    /// unloads the current library first.
    pub fn load(&mut self, path: &Path) -> LoadResult<()> {
        if self.library.is_some() && self.path.as_deref() == Some(path) {
            return Ok(());
        }
        self.unload()?;

        // SAFETY: modules are generated by this crate and have no
        // initialization routines.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Loaded module");
        self.library = Some(library);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Resolves `symbol` to a value of type `T` (normally a function
    /// pointer).
    ///
    /// # Safety
    ///
    /// `T` must match the type of the symbol in the library, and the value
    /// must not be used after the library is unloaded.
    pub unsafe fn resolve<T: Copy>(&self, symbol: &str) -> LoadResult<T> {
        let library = self.library.as_ref().ok_or(LoadError::NotLoaded)?;

        let mut name = Vec::with_capacity(symbol.len() + 1);
        name.extend_from_slice(symbol.as_bytes());
        name.push(0);

        let resolved = library
            .get::<T>(&name)
            .map_err(|_| LoadError::MissingSymbol {
                path: self.path.clone().unwrap_or_default(),
                symbol: symbol.to_string(),
            })?;
        Ok(*resolved)
    }

    /// Unloads the library, if any.
    pub fn unload(&mut self) -> LoadResult<()> {
        let path = self.path.take();
        if let Some(library) = self.library.take() {
            library.close().map_err(|source| LoadError::Library {
                path: path.clone().unwrap_or_default(),
                source,
            })?;
            if let Some(ref path) = path {
                debug!(path = %path.display(), "Unloaded module");
            }
        }
        Ok(())
    }

    /// Returns true if a library is loaded.
    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }

    /// Path of the loaded library.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Loads `path` and binds symbols with `bind`.
///
/// If `bind` fails the freshly loaded library is unloaded before the error
/// is returned.
pub fn open_with<T, F>(path: &Path, bind: F) -> LoadResult<(ModuleHandle, T)>
where
    F: FnOnce(&ModuleHandle) -> LoadResult<T>,
{
    let mut handle = ModuleHandle::new();
    handle.load(path)?;

    match bind(&handle) {
        Ok(bound) => Ok((handle, bound)),
        Err(e) => {
            if let Err(close) = handle.unload() {
                warn!(path = %path.display(), error = %close, "Failed to unload module");
            }
            Err(e)
        }
    }
}
