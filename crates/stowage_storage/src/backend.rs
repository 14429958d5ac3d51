//! Filesystem trait definition.

use crate::error::{StorageError, StorageResult};
use std::path::{Component, Path};

/// A tree of byte files addressed by relative paths.
///
/// Filesystems are **opaque byte stores**. The stowage filesystem adapter
/// owns the layout (one directory per aggregate, one file per property);
/// implementations only move bytes.
///
/// # Invariants
///
/// - `read` returns exactly the bytes last passed to `write` for that path
/// - `write` creates missing parent directories
/// - `remove` deletes a file or a whole directory and never fails on a
///   missing path
/// - `list` returns the sorted names of the immediate children of a
///   directory, or an empty list when it does not exist
///
/// # Implementors
///
/// - [`super::InMemoryFilesystem`] - For testing
/// - [`super::LocalFilesystem`] - For persistent storage
pub trait Filesystem: Send + Sync {
    /// Reads the whole file at `path`.
    ///
    /// Returns `None` if no file exists at that path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn read(&self, path: &Path) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `data` as the whole content of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()>;

    /// Removes the file or directory at `path`, recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn remove(&self, path: &Path) -> StorageResult<()>;

    /// Lists the names of the immediate children of the directory `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn list(&self, path: &Path) -> StorageResult<Vec<String>>;

    /// Checks whether a file or a non-empty directory exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or an I/O error occurs.
    fn exists(&self, path: &Path) -> StorageResult<bool> {
        if self.read(path)?.is_some() {
            return Ok(true);
        }
        Ok(!self.list(path)?.is_empty())
    }
}

/// Rejects absolute paths and paths escaping the root through `..`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPath`] when the path is not a plain
/// relative path.
pub fn validate_path(path: &Path) -> StorageResult<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(path.display().to_string())),
        }
    }
    Ok(())
}
