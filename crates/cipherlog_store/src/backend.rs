//! Persistence backend trait and implementations.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Where encrypted snapshot blobs are kept.
///
/// Backends are **opaque blob stores**: they hold exactly one blob (the
/// latest snapshot) and know nothing about the snapshot format, the map
/// layout, or encryption.
///
/// # Invariants
///
/// - `load` returns exactly the bytes passed to the most recent `save`,
///   or `None` if nothing was ever saved
/// - `save` replaces the previous blob atomically; a crash mid-save must
///   leave either the old or the new blob readable, never a mix
/// - Backends must be `Send + Sync` for concurrent access
pub trait PersistenceBackend: Send + Sync {
    /// Loads the current snapshot blob, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Atomically replaces the snapshot blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written durably.
    fn save(&self, blob: &[u8]) -> StoreResult<()>;
}

/// An in-memory backend.
///
/// Holds the snapshot blob in memory. Suitable for unit tests and for
/// ephemeral stores that don't need persistence.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-loaded with an existing blob.
    ///
    /// Useful for testing reopen and tamper scenarios.
    #[must_use]
    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self {
            blob: Mutex::new(Some(blob)),
        }
    }

    /// Returns a copy of the current blob, if any.
    #[must_use]
    pub fn blob(&self) -> Option<Vec<u8>> {
        self.blob.lock().clone()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blob.lock().clone())
    }

    fn save(&self, blob: &[u8]) -> StoreResult<()> {
        *self.blob.lock() = Some(blob.to_vec());
        Ok(())
    }
}

/// A file-backed persistence backend.
///
/// The snapshot lives in a single file. Saves go through a temporary file
/// in the same directory followed by an atomic rename, so a crash mid-save
/// leaves the previous snapshot intact.
///
/// An exclusive advisory lock is held on a `<path>.lock` sidecar for the
/// lifetime of the backend, so two processes cannot open the same
/// persistence file.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    // Held for the lifetime of the backend; dropping releases the lock.
    _lock: File,
}

impl FileBackend {
    /// Opens a file backend, acquiring the exclusive lock.
    ///
    /// The persistence file itself is created lazily by the first `save`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the lock,
    /// or an I/O error if the lock file cannot be created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = lock_path(path);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Returns the path to the persistence file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

impl PersistenceBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut blob = Vec::new();
        file.read_to_end(&mut blob)?;

        if blob.is_empty() {
            Ok(None)
        } else {
            Ok(Some(blob))
        }
    }

    fn save(&self, blob: &[u8]) -> StoreResult<()> {
        let tmp_path = {
            let mut name = self.path.as_os_str().to_os_string();
            name.push(".tmp");
            PathBuf::from(name)
        };

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(blob)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;

        // Sync the directory so the rename itself is durable.
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                File::open(parent)?.sync_all()?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_load_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn memory_save_then_load() {
        let backend = MemoryBackend::new();
        backend.save(b"snapshot").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"snapshot");
    }

    #[test]
    fn memory_save_replaces() {
        let backend = MemoryBackend::new();
        backend.save(b"one").unwrap();
        backend.save(b"two").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"two");
    }

    #[test]
    fn file_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("store.db")).unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn file_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let backend = FileBackend::open(&path).unwrap();
        backend.save(b"persisted blob").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"persisted blob");

        // Survives reopen.
        drop(backend);
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"persisted blob");
    }

    #[test]
    fn file_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let first = FileBackend::open(&path).unwrap();
        let second = FileBackend::open(&path);
        assert!(matches!(second, Err(StoreError::Locked { .. })));

        drop(first);
        assert!(FileBackend::open(&path).is_ok());
    }
}
