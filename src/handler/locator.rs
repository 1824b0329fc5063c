use super::entry::{ExportedHandler, HandlerEntry};
use super::reference::HandlerReference;
use super::search_path;
use crate::error::ServerError;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A loaded unit of user code
///
/// Implementations must keep the unit's code mapped for as long as the value
/// lives: bound handlers hold their unit to keep their function pointers valid.
pub trait CodeUnit: Send + Sync {
    /// The handler exported under `symbol`, if any
    fn entry(&self, symbol: &str) -> Option<HandlerEntry>;
}

/// Turns a unit file into a [`CodeUnit`]
pub trait UnitLoader: Send + Sync {
    /// File name of the unit for `module_name` inside a code directory
    fn file_name(&self, module_name: &str) -> OsString {
        libloading::library_filename(module_name)
    }

    /// Load the unit at `path`. Errors are loader diagnostics.
    fn load(&self, path: &Path, module_name: &str) -> Result<Arc<dyn CodeUnit>, String>;
}

/// Loads native shared libraries (`lib<module>.so`, `lib<module>.dylib`, `<module>.dll`)
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

struct NativeUnit {
    library: libloading::Library,
}

impl CodeUnit for NativeUnit {
    fn entry(&self, symbol: &str) -> Option<HandlerEntry> {
        // SAFETY: handler units export `ExportedHandler` statics through
        // `export_handler!`. The header is checked before the entry is used, so a
        // symbol of another kind is reported as missing. The library outlives the
        // returned entry because `BoundHandler` keeps this unit alive.
        unsafe {
            let symbol: libloading::Symbol<*const ExportedHandler> =
                self.library.get(symbol.as_bytes()).ok()?;
            let exported = *symbol;
            if exported.is_null() {
                return None;
            }
            (*exported).checked_entry()
        }
    }
}

impl UnitLoader for NativeLoader {
    fn load(&self, path: &Path, _module_name: &str) -> Result<Arc<dyn CodeUnit>, String> {
        // SAFETY: loading runs the unit's initializers. The unit is user code the
        // operator chose to serve; it is trusted the same way the binary is.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| e.to_string())?;
        Ok(Arc::new(NativeUnit { library }))
    }
}

/// A handler bound to its unit, immutable for the process lifetime
#[derive(Clone)]
pub struct BoundHandler {
    reference: HandlerReference,
    entry: HandlerEntry,
    // Keeps the unit's code mapped while the entry is reachable
    _unit: Option<Arc<dyn CodeUnit>>,
}

impl BoundHandler {
    /// Bind a handler that is linked into the current binary
    #[must_use]
    pub fn linked(reference: HandlerReference, entry: HandlerEntry) -> Self {
        Self {
            reference,
            entry,
            _unit: None,
        }
    }

    #[must_use]
    pub fn reference(&self) -> &HandlerReference {
        &self.reference
    }

    #[must_use]
    pub fn entry(&self) -> HandlerEntry {
        self.entry
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("reference", &self.reference)
            .field("entry", &self.entry)
            .field("linked", &self._unit.is_none())
            .finish()
    }
}

/// Resolves handler references against a code directory
pub struct CodeLocator {
    loader: Box<dyn UnitLoader>,
}

impl Default for CodeLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeLocator {
    /// Locator for native shared library units
    #[must_use]
    pub fn new() -> Self {
        Self::with_loader(NativeLoader)
    }

    #[must_use]
    pub fn with_loader(loader: impl UnitLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
        }
    }

    /// Parse `reference` and locate it in `directory`.
    ///
    /// A malformed reference fails with `InvalidReference` before any file access.
    pub fn locate_reference(
        &self,
        directory: &Path,
        reference: &str,
    ) -> Result<BoundHandler, ServerError> {
        let reference = HandlerReference::parse(reference)?;
        self.locate(directory, &reference)
    }

    /// Load the unit for `reference.module_name` from `directory` and bind
    /// `reference.symbol_name` from it.
    ///
    /// Registers `directory` in the code search path (once) before loading.
    pub fn locate(
        &self,
        directory: &Path,
        reference: &HandlerReference,
    ) -> Result<BoundHandler, ServerError> {
        info!(
            handler = %reference,
            directory = %directory.display(),
            "Loading inference handler"
        );

        let unit_path: PathBuf = directory.join(self.loader.file_name(&reference.module_name));
        if !unit_path.is_file() {
            return Err(ServerError::CodeNotFound {
                path: unit_path,
                reason: None,
            });
        }

        search_path::register(directory);

        let unit = self
            .loader
            .load(&unit_path, &reference.module_name)
            .map_err(|reason| ServerError::CodeNotFound {
                path: unit_path.clone(),
                reason: Some(reason),
            })?;

        let entry =
            unit.entry(&reference.symbol_name)
                .ok_or_else(|| ServerError::SymbolNotFound {
                    symbol: reference.symbol_name.clone(),
                    module: reference.module_name.clone(),
                })?;

        debug!(
            handler = %reference,
            unit = %unit_path.display(),
            entry = ?entry,
            "Loaded handler `{}` from module `{}`",
            reference.symbol_name,
            reference.module_name
        );

        Ok(BoundHandler {
            reference: reference.clone(),
            entry,
            _unit: Some(unit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
    }

    impl UnitLoader for CountingLoader {
        fn load(&self, _path: &Path, _module_name: &str) -> Result<Arc<dyn CodeUnit>, String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Err("not a shared library".to_string())
        }
    }

    #[test]
    fn test_malformed_reference_never_touches_loader() {
        let loads = Arc::new(AtomicUsize::new(0));
        let locator = CodeLocator::with_loader(CountingLoader {
            loads: Arc::clone(&loads),
        });
        let err = locator
            .locate_reference(Path::new("/nonexistent"), "no_separator")
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidReference { .. }));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_unit_is_code_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = CodeLocator::new()
            .locate_reference(dir.path(), "inference.handler")
            .unwrap_err();
        match err {
            ServerError::CodeNotFound { path, reason } => {
                assert_eq!(path, dir.path().join(libloading::library_filename("inference")));
                assert!(reason.is_none());
            }
            other => panic!("expected CodeNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_unloadable_unit_is_code_not_found_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(libloading::library_filename("broken")),
            b"definitely not an object file",
        )
        .unwrap();

        let err = CodeLocator::new()
            .locate_reference(dir.path(), "broken.handler")
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::CodeNotFound {
                reason: Some(_),
                ..
            }
        ));
        assert!(search_path::contains(dir.path()));
    }
}
