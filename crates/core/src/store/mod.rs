//! Entry store access.
//!
//! The merge path reads versioned metadata through [`EntryStore`] and writes
//! conflict records only through a [`WcAccess`] handle, which carries the
//! directory lock acquired by the caller.

pub mod memory;
pub mod schema;
pub mod sqlite;

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use sqlite::EntryDb;

use crate::errors::{MergeError, StoreError};
use crate::models::{ConflictRecord, Entry, PropertySnapshot};

/// Proof of a held directory lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirLock {
    pub dir: PathBuf,
    pub token: Uuid,
}

/// Read/write contract for versioned-file metadata.
pub trait EntryStore {
    /// The entry for `path`, or `None` when the file is not versioned.
    fn entry(&self, path: &Path) -> Result<Option<Entry>, StoreError>;

    /// Register or overwrite the entry for `path`.
    fn put_entry(&self, path: &Path, entry: &Entry) -> Result<(), StoreError>;

    /// Replace the conflict record of `path`. `lock` must be the live lock of
    /// the file's directory.
    fn set_conflict(
        &self,
        lock: &DirLock,
        path: &Path,
        record: &ConflictRecord,
    ) -> Result<(), StoreError>;

    /// Acquire the advisory lock of `dir`.
    fn lock_dir(&self, dir: &Path) -> Result<DirLock, StoreError>;

    /// Release a lock returned by [`lock_dir`](Self::lock_dir).
    fn unlock_dir(&self, lock: &DirLock) -> Result<(), StoreError>;
}

/// Split `path` into the directory an entry lives in and its basename.
pub fn entry_location(path: &Path) -> Result<(PathBuf, String), StoreError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::EntryNotFound {
            path: path.to_path_buf(),
        })?;
    Ok((entry_dir(path), name.to_string()))
}

/// The directory holding `path`, `.` for bare names.
pub fn entry_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether any backup recorded on `entry` exists next to `path`.
pub fn conflict_files_present(path: &Path, entry: &Entry) -> bool {
    let dir = entry_dir(path);
    entry
        .conflict
        .basenames()
        .any(|name| dir.join(name).symlink_metadata().is_ok())
}

/// Store handle used by a merge: the store plus the directory lock the
/// caller holds for the target's directory.
pub struct WcAccess<'s, S: EntryStore + ?Sized> {
    store: &'s S,
    lock: DirLock,
}

impl<'s, S: EntryStore + ?Sized> WcAccess<'s, S> {
    pub fn new(store: &'s S, lock: DirLock) -> Self {
        Self { store, lock }
    }

    /// Lock `dir` and wrap the lock in a handle.
    pub fn open(store: &'s S, dir: &Path) -> Result<Self, StoreError> {
        let lock = store.lock_dir(dir)?;
        Ok(Self::new(store, lock))
    }

    /// Release the directory lock.
    pub fn close(self) -> Result<(), StoreError> {
        self.store.unlock_dir(&self.lock)
    }

    pub fn entry(&self, path: &Path) -> Result<Option<Entry>, StoreError> {
        self.store.entry(path)
    }

    /// The property snapshot of a versioned file.
    pub fn properties(&self, path: &Path) -> Result<Option<PropertySnapshot>, MergeError> {
        match self.entry(path)? {
            Some(entry) => Ok(Some(PropertySnapshot::from_entry(path, &entry)?)),
            None => Ok(None),
        }
    }

    /// Record conflict backup basenames on `path`'s entry.
    pub fn record_conflict(&self, path: &Path, record: &ConflictRecord) -> Result<(), StoreError> {
        if entry_dir(path) != self.lock.dir {
            return Err(StoreError::NotLocked { dir: entry_dir(path) });
        }
        debug!(path = %path.display(), "recording conflict");
        self.store.set_conflict(&self.lock, path, record)
    }

    /// Whether any recorded backup of `path` still exists next to it.
    pub fn is_text_conflicted(&self, path: &Path) -> Result<bool, StoreError> {
        Ok(self
            .entry(path)?
            .is_some_and(|entry| conflict_files_present(path, &entry)))
    }
}
