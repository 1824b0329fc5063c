//! Process-wide code search path.
//!
//! Directories are registered by the [`CodeLocator`](super::CodeLocator) when
//! it loads a unit from them, so that code inside a unit can open its sibling
//! units by module name with [`locate_unit`]. Registration is additive: a
//! directory is never removed and never registered twice. The most recently
//! registered directory is searched first.

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

static SEARCH_PATH: Lazy<RwLock<Vec<PathBuf>>> = Lazy::new(|| RwLock::new(Vec::new()));

fn normalize(directory: &Path) -> PathBuf {
    directory
        .canonicalize()
        .unwrap_or_else(|_| directory.to_path_buf())
}

/// Register `directory`; returns `false` if it was already registered.
pub fn register(directory: &Path) -> bool {
    let directory = normalize(directory);
    let mut paths = SEARCH_PATH.write().unwrap_or_else(PoisonError::into_inner);
    if paths.contains(&directory) {
        return false;
    }
    debug!(directory = %directory.display(), "Registered code search path");
    paths.insert(0, directory);
    true
}

/// Whether `directory` has been registered
#[must_use]
pub fn contains(directory: &Path) -> bool {
    let directory = normalize(directory);
    SEARCH_PATH
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&directory)
}

/// Snapshot of the registered directories, in search order
#[must_use]
pub fn registered() -> Vec<PathBuf> {
    SEARCH_PATH
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Find the unit file for `module_name` in the registered directories.
#[must_use]
pub fn locate_unit(module_name: &str) -> Option<PathBuf> {
    let file_name = libloading::library_filename(module_name);
    SEARCH_PATH
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}
