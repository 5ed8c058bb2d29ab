//! SQLite-backed entry store.
//!
//! Entries are keyed by `(dir, name)`, with their properties in a side table
//! and directory locks in `dir_locks`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use super::{entry_location, schema, DirLock, EntryStore};
use crate::errors::StoreError;
use crate::models::{ConflictRecord, Entry};

/// A row of `dir_locks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub token: Uuid,
    pub locked_at: DateTime<Utc>,
}

/// Entry store in a SQLite database.
///
/// The connection runs in WAL mode with foreign keys enforced and sits
/// behind a `Mutex` so the handle is `Send + Sync`.
pub struct EntryDb {
    conn: Mutex<Connection>,
}

impl EntryDb {
    /// Open (or create) the database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening entry store");

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Bring the schema up to date.
    pub fn initialize(&self) -> Result<(), StoreError> {
        schema::run_migrations(&self.conn())?;
        debug!("entry store schema is up to date");
        Ok(())
    }

    /// Lock the underlying connection, recovering from poisoning.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("entry store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `f` in a transaction, committing on `Ok`.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// The current lock on `dir`, if any.
    pub fn lock_info(&self, dir: &Path) -> Result<Option<LockInfo>, StoreError> {
        let dir = dir.to_string_lossy();
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT token, locked_at FROM dir_locks WHERE dir = ?1",
                params![dir],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((token, locked_at)) = row else {
            return Ok(None);
        };
        Ok(Some(LockInfo {
            token: parse_token(&token)?,
            locked_at: DateTime::parse_from_rfc3339(&locked_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| text_error(2, e))?,
        }))
    }
}

fn location(path: &Path) -> Result<(String, String), StoreError> {
    let (dir, name) = entry_location(path)?;
    Ok((dir.to_string_lossy().into_owned(), name))
}

fn text_error(column: usize, e: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)).into()
}

fn parse_token(token: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(token).map_err(|e| text_error(0, e))
}

/// Check that `lock` is the live lock of its directory.
fn check_lock(conn: &Connection, lock: &DirLock) -> Result<(), StoreError> {
    let token: Option<String> = conn
        .query_row(
            "SELECT token FROM dir_locks WHERE dir = ?1",
            params![lock.dir.to_string_lossy()],
            |row| row.get(0),
        )
        .optional()?;
    if token.as_deref() != Some(lock.token.to_string().as_str()) {
        return Err(StoreError::NotLocked {
            dir: lock.dir.clone(),
        });
    }
    Ok(())
}

impl EntryStore for EntryDb {
    fn entry(&self, path: &Path) -> Result<Option<Entry>, StoreError> {
        let (dir, name) = location(path)?;
        let conn = self.conn();
        let entry = conn
            .query_row(
                "SELECT revision, last_author, changed_date, url, lock_token,
                        conflict_old, conflict_new, conflict_wrk
                 FROM entries WHERE dir = ?1 AND name = ?2",
                params![dir, name],
                |row| {
                    Ok(Entry {
                        name: name.clone(),
                        revision: row.get(0)?,
                        last_author: row.get(1)?,
                        changed_date: row.get(2)?,
                        url: row.get(3)?,
                        lock_token: row.get(4)?,
                        props: BTreeMap::new(),
                        conflict: ConflictRecord {
                            conflict_old: row.get(5)?,
                            conflict_new: row.get(6)?,
                            conflict_wrk: row.get(7)?,
                        },
                    })
                },
            )
            .optional()?;
        let Some(mut entry) = entry else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT prop, value FROM properties WHERE dir = ?1 AND name = ?2")?;
        entry.props = stmt
            .query_map(params![dir, name], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<_, _>>()?;
        Ok(Some(entry))
    }

    fn put_entry(&self, path: &Path, entry: &Entry) -> Result<(), StoreError> {
        let (dir, name) = location(path)?;
        self.transaction(|conn| {
            conn.execute(
                "INSERT INTO entries (dir, name, revision, last_author, changed_date, url,
                                      lock_token, conflict_old, conflict_new, conflict_wrk)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (dir, name) DO UPDATE SET
                    revision = excluded.revision,
                    last_author = excluded.last_author,
                    changed_date = excluded.changed_date,
                    url = excluded.url,
                    lock_token = excluded.lock_token,
                    conflict_old = excluded.conflict_old,
                    conflict_new = excluded.conflict_new,
                    conflict_wrk = excluded.conflict_wrk",
                params![
                    dir,
                    name,
                    entry.revision,
                    entry.last_author,
                    entry.changed_date,
                    entry.url,
                    entry.lock_token,
                    entry.conflict.conflict_old,
                    entry.conflict.conflict_new,
                    entry.conflict.conflict_wrk,
                ],
            )?;
            conn.execute(
                "DELETE FROM properties WHERE dir = ?1 AND name = ?2",
                params![dir, name],
            )?;
            for (prop, value) in &entry.props {
                conn.execute(
                    "INSERT INTO properties (dir, name, prop, value) VALUES (?1, ?2, ?3, ?4)",
                    params![dir, name, prop, value],
                )?;
            }
            Ok(())
        })?;
        debug!(path = %path.display(), revision = entry.revision, "entry stored");
        Ok(())
    }

    fn set_conflict(
        &self,
        lock: &DirLock,
        path: &Path,
        record: &ConflictRecord,
    ) -> Result<(), StoreError> {
        let (dir, name) = location(path)?;
        self.transaction(|conn| {
            check_lock(conn, lock)?;
            let updated = conn.execute(
                "UPDATE entries SET conflict_old = ?3, conflict_new = ?4, conflict_wrk = ?5
                 WHERE dir = ?1 AND name = ?2",
                params![
                    dir,
                    name,
                    record.conflict_old,
                    record.conflict_new,
                    record.conflict_wrk
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::EntryNotFound {
                    path: path.to_path_buf(),
                });
            }
            Ok(())
        })
    }

    fn lock_dir(&self, dir: &Path) -> Result<DirLock, StoreError> {
        let token = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn().execute(
            "INSERT INTO dir_locks (dir, token, locked_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (dir) DO NOTHING",
            params![dir.to_string_lossy(), token.to_string(), now],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyLocked {
                dir: dir.to_path_buf(),
            });
        }
        info!(dir = %dir.display(), %token, "directory locked");
        Ok(DirLock {
            dir: PathBuf::from(dir),
            token,
        })
    }

    fn unlock_dir(&self, lock: &DirLock) -> Result<(), StoreError> {
        let removed = self.conn().execute(
            "DELETE FROM dir_locks WHERE dir = ?1 AND token = ?2",
            params![lock.dir.to_string_lossy(), lock.token.to_string()],
        )?;
        if removed == 0 {
            return Err(StoreError::NotLocked {
                dir: lock.dir.clone(),
            });
        }
        info!(dir = %lock.dir.display(), "directory unlocked");
        Ok(())
    }
}
