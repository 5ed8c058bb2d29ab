//! In-process entry store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::{entry_location, DirLock, EntryStore};
use crate::errors::StoreError;
use crate::models::{ConflictRecord, Entry};

#[derive(Debug, Default)]
struct State {
    entries: HashMap<PathBuf, Entry>,
    locks: HashMap<PathBuf, Uuid>,
}

/// Entry store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn key(path: &Path) -> Result<PathBuf, StoreError> {
    let (dir, name) = entry_location(path)?;
    Ok(dir.join(name))
}

impl EntryStore for MemoryStore {
    fn entry(&self, path: &Path) -> Result<Option<Entry>, StoreError> {
        Ok(self.state().entries.get(&key(path)?).cloned())
    }

    fn put_entry(&self, path: &Path, entry: &Entry) -> Result<(), StoreError> {
        self.state().entries.insert(key(path)?, entry.clone());
        Ok(())
    }

    fn set_conflict(
        &self,
        lock: &DirLock,
        path: &Path,
        record: &ConflictRecord,
    ) -> Result<(), StoreError> {
        let key = key(path)?;
        let mut state = self.state();
        if state.locks.get(&lock.dir) != Some(&lock.token) {
            return Err(StoreError::NotLocked {
                dir: lock.dir.clone(),
            });
        }
        let entry = state
            .entries
            .get_mut(&key)
            .ok_or_else(|| StoreError::EntryNotFound {
                path: path.to_path_buf(),
            })?;
        entry.conflict = record.clone();
        Ok(())
    }

    fn lock_dir(&self, dir: &Path) -> Result<DirLock, StoreError> {
        let mut state = self.state();
        if state.locks.contains_key(dir) {
            return Err(StoreError::AlreadyLocked {
                dir: dir.to_path_buf(),
            });
        }
        let token = Uuid::new_v4();
        state.locks.insert(dir.to_path_buf(), token);
        Ok(DirLock {
            dir: dir.to_path_buf(),
            token,
        })
    }

    fn unlock_dir(&self, lock: &DirLock) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.locks.get(&lock.dir) != Some(&lock.token) {
            return Err(StoreError::NotLocked {
                dir: lock.dir.clone(),
            });
        }
        state.locks.remove(&lock.dir);
        Ok(())
    }
}
