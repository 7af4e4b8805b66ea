//! Storage directory management.
//!
//! On-disk backends live in a directory guarded by an advisory lock:
//!
//! ```text
//! <storage_path>/
//! ├─ ers.lock          # Advisory lock, held while the storage is open
//! └─ ...               # Engine files (ers.sqlite, data.mdb, data.redb, ...)
//! ```

use crate::error::{ErsError, ErsResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const LOCK_FILE: &str = "ers.lock";

/// An opened storage directory holding an exclusive lock.
///
/// Only one `StorageDir` can exist per directory at a time, across
/// processes.
#[derive(Debug)]
pub struct StorageDir {
    path: PathBuf,
    _lock_file: File,
}

impl StorageDir {
    /// Opens or creates a storage directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns [`ErsError::StorageLocked`] if another handle holds the lock.
    pub fn open(path: &Path) -> ErsResult<Self> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(ErsError::invalid_settings(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(ErsError::StorageLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of a file inside the directory.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Writes `data` to `path` crash-safely.
///
/// Writes a sibling temporary file, syncs it, renames it over `path` and
/// syncs the parent directory.
pub fn write_atomically(path: &Path, data: &[u8]) -> ErsResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    // Unique per writer: two processes may freeze the same storage id.
    temp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let temp_path = parent.join(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    sync_directory(parent)
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> ErsResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> ErsResult<()> {
    // NTFS journals metadata; directory handles cannot be fsynced.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_open_is_locked() {
        let temp = tempfile::tempdir().unwrap();
        let first = StorageDir::open(temp.path()).unwrap();
        assert!(matches!(StorageDir::open(temp.path()), Err(ErsError::StorageLocked)));
        drop(first);
        assert!(StorageDir::open(temp.path()).is_ok());
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("nested").join("snapshot");
        write_atomically(&target, b"one").unwrap();
        write_atomically(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
        assert!(!temp.path().join("nested").join("snapshot.tmp").exists());
    }
}
