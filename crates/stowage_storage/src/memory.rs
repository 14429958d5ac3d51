//! In-memory filesystem for testing.

use crate::backend::{validate_path, Filesystem};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

/// An in-memory filesystem.
///
/// Files are kept in a sorted map keyed by their normalized path;
/// directories only exist through the files underneath them. Suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Example
///
/// ```rust
/// use stowage_storage::{Filesystem, InMemoryFilesystem};
/// use std::path::Path;
///
/// let fs = InMemoryFilesystem::new();
/// fs.write(Path::new("a/b"), b"data").unwrap();
/// assert_eq!(fs.read(Path::new("a/b")).unwrap(), Some(b"data".to_vec()));
/// fs.remove(Path::new("a")).unwrap();
/// assert_eq!(fs.read(Path::new("a/b")).unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryFilesystem {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl InMemoryFilesystem {
    /// Creates a new empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of files stored.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Returns every stored file path, sorted.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.read().keys().cloned().collect()
    }

    fn normalize(path: &Path) -> StorageResult<PathBuf> {
        validate_path(path)?;
        Ok(path
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .collect())
    }
}

impl Filesystem for InMemoryFilesystem {
    fn read(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        let path = Self::normalize(path)?;
        Ok(self.files.read().get(&path).cloned())
    }

    fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let path = Self::normalize(path)?;
        if path.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath(String::new()));
        }

        let mut files = self.files.write();

        // A file cannot live under another file, nor replace a directory.
        if path.ancestors().skip(1).any(|parent| files.contains_key(parent)) {
            return Err(StorageError::Conflict(path.display().to_string()));
        }
        if files
            .keys()
            .any(|existing| existing != &path && existing.starts_with(&path))
        {
            return Err(StorageError::Conflict(path.display().to_string()));
        }

        files.insert(path, data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        let path = Self::normalize(path)?;
        self.files
            .write()
            .retain(|existing, _| !existing.starts_with(&path));
        Ok(())
    }

    fn list(&self, path: &Path) -> StorageResult<Vec<String>> {
        let path = Self::normalize(path)?;
        let files = self.files.read();

        let names: BTreeSet<String> = files
            .keys()
            .filter_map(|existing| existing.strip_prefix(&path).ok())
            .filter_map(|rest| rest.components().next())
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();

        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let fs = InMemoryFilesystem::new();
        assert_eq!(fs.file_count(), 0);
        assert!(fs.list(Path::new("")).unwrap().is_empty());
    }

    #[test]
    fn memory_write_then_read() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("users/1/name"), b"alice").unwrap();

        assert_eq!(
            fs.read(Path::new("users/1/name")).unwrap(),
            Some(b"alice".to_vec())
        );
        assert_eq!(fs.read(Path::new("users/1/age")).unwrap(), None);
    }

    #[test]
    fn memory_write_overwrites() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("a"), b"1").unwrap();
        fs.write(Path::new("a"), b"2").unwrap();

        assert_eq!(fs.read(Path::new("a")).unwrap(), Some(b"2".to_vec()));
        assert_eq!(fs.file_count(), 1);
    }

    #[test]
    fn memory_list_immediate_children() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("users/1/properties/name"), b"").unwrap();
        fs.write(Path::new("users/1/properties/age"), b"").unwrap();
        fs.write(Path::new("users/2/properties/name"), b"").unwrap();

        assert_eq!(
            fs.list(Path::new("users")).unwrap(),
            vec!["1".to_string(), "2".to_string()]
        );
        assert_eq!(
            fs.list(Path::new("users/1/properties")).unwrap(),
            vec!["age".to_string(), "name".to_string()]
        );
        assert!(fs.list(Path::new("teams")).unwrap().is_empty());
    }

    #[test]
    fn memory_remove_is_recursive() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("users/1/a"), b"").unwrap();
        fs.write(Path::new("users/1/b/c"), b"").unwrap();
        fs.write(Path::new("users/10/a"), b"").unwrap();

        fs.remove(Path::new("users/1")).unwrap();

        assert_eq!(fs.list(Path::new("users")).unwrap(), vec!["10".to_string()]);
    }

    #[test]
    fn memory_remove_missing_is_noop() {
        let fs = InMemoryFilesystem::new();
        assert!(fs.remove(Path::new("nothing/here")).is_ok());
    }

    #[test]
    fn memory_exists_for_files_and_directories() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("a/b"), b"").unwrap();

        assert!(fs.exists(Path::new("a")).unwrap());
        assert!(fs.exists(Path::new("a/b")).unwrap());
        assert!(!fs.exists(Path::new("a/c")).unwrap());
    }

    #[test]
    fn memory_file_under_file_conflicts() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("a"), b"").unwrap();

        let result = fs.write(Path::new("a/b"), b"");
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn memory_file_over_directory_conflicts() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("a/b"), b"").unwrap();

        assert!(fs.write(Path::new("a"), b"").is_err());
    }

    #[test]
    fn memory_current_dir_components_are_ignored() {
        let fs = InMemoryFilesystem::new();
        fs.write(Path::new("./a/./b"), b"x").unwrap();
        assert_eq!(fs.read(Path::new("a/b")).unwrap(), Some(b"x".to_vec()));
    }
}
