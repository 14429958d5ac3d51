//! Filesystem rooted at a directory of the OS filesystem.

use crate::backend::{validate_path, Filesystem};
use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A filesystem rooted at a local directory.
///
/// Every path handed to this filesystem is resolved relative to `root`;
/// absolute paths and `..` components are rejected so the store can never
/// escape its root.
///
/// # Durability
///
/// - `write` goes through a temporary sibling file that is synced and then
///   renamed over the destination, so readers never observe a torn file
///
/// # Example
///
/// ```no_run
/// use stowage_storage::{Filesystem, LocalFilesystem};
/// use std::path::Path;
///
/// let fs = LocalFilesystem::open(Path::new("data")).unwrap();
/// fs.write(Path::new("users/1/properties/name"), b"\"alice\"").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    /// Opens a filesystem rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> StorageResult<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

impl Filesystem for LocalFilesystem {
    fn read(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        let path = self.resolve(path)?;
        if path.is_dir() {
            return Ok(None);
        }
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            return Err(StorageError::Conflict(path.display().to_string()));
        }
        let parent = target
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
        fs::create_dir_all(parent)?;

        let file_name = target
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
        let mut temporary = file_name.to_os_string();
        temporary.push(".tmp");
        let temporary = parent.join(temporary);

        let mut file = fs::File::create(&temporary)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temporary, &target)?;

        Ok(())
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        let path = self.resolve(path)?;
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self, path: &Path) -> StorageResult<Vec<String>> {
        let path = self.resolve(path)?;
        if !path.is_dir() {
            return Ok(Vec::new());
        }

        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".tmp") {
                names.push(name);
            }
        }
        names.sort();

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_open_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let fs = LocalFilesystem::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(fs.root(), root.as_path());
    }

    #[test]
    fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let fs = LocalFilesystem::open(dir.path()).unwrap();

        fs.write(Path::new("users/1/name"), b"alice").unwrap();

        assert_eq!(
            fs.read(Path::new("users/1/name")).unwrap(),
            Some(b"alice".to_vec())
        );
        assert!(dir.path().join("users/1/name").is_file());
    }

    #[test]
    fn file_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let fs = LocalFilesystem::open(dir.path()).unwrap();

        assert_eq!(fs.read(Path::new("missing")).unwrap(), None);
        assert_eq!(fs.read(Path::new("missing/deeper")).unwrap(), None);
    }

    #[test]
    fn file_list_is_sorted() {
        let dir = tempdir().unwrap();
        let fs = LocalFilesystem::open(dir.path()).unwrap();

        fs.write(Path::new("users/b/x"), b"").unwrap();
        fs.write(Path::new("users/a/x"), b"").unwrap();

        assert_eq!(
            fs.list(Path::new("users")).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(fs.list(Path::new("nothing")).unwrap().is_empty());
    }

    #[test]
    fn file_remove_directory() {
        let dir = tempdir().unwrap();
        let fs = LocalFilesystem::open(dir.path()).unwrap();

        fs.write(Path::new("users/1/a"), b"").unwrap();
        fs.write(Path::new("users/1/b/c"), b"").unwrap();
        fs.remove(Path::new("users/1")).unwrap();

        assert!(!fs.exists(Path::new("users/1")).unwrap());
        assert!(fs.remove(Path::new("users/1")).is_ok());
    }

    #[test]
    fn file_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let fs = LocalFilesystem::open(dir.path()).unwrap();

        assert!(matches!(
            fs.write(Path::new("../outside"), b""),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn file_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let fs = LocalFilesystem::open(dir.path()).unwrap();
            fs.write(Path::new("persistent"), b"data").unwrap();
        }

        let fs = LocalFilesystem::open(dir.path()).unwrap();
        assert_eq!(
            fs.read(Path::new("persistent")).unwrap(),
            Some(b"data".to_vec())
        );
    }
}
