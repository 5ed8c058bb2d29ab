//! Entry database schema and migration runner.
//!
//! Migrations are applied in order; the SQLite `user_version` pragma records
//! the last one applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::StoreError;

/// All migrations, in order, as `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "entries and properties",
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            dir           TEXT    NOT NULL,
            name          TEXT    NOT NULL,
            revision      INTEGER NOT NULL,
            last_author   TEXT,
            changed_date  TEXT,
            url           TEXT,
            lock_token    TEXT,
            conflict_old  TEXT,
            conflict_new  TEXT,
            conflict_wrk  TEXT,
            PRIMARY KEY (dir, name)
        );

        CREATE TABLE IF NOT EXISTS properties (
            dir    TEXT NOT NULL,
            name   TEXT NOT NULL,
            prop   TEXT NOT NULL,
            value  TEXT NOT NULL,
            PRIMARY KEY (dir, name, prop),
            FOREIGN KEY (dir, name) REFERENCES entries (dir, name) ON DELETE CASCADE
        );
        "#,
    ),
    (
        2,
        "directory locks",
        r#"
        CREATE TABLE IF NOT EXISTS dir_locks (
            dir        TEXT PRIMARY KEY,
            token      TEXT NOT NULL,
            locked_at  TEXT NOT NULL
        );
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking entry store migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| StoreError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied");
        }
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, StoreError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<(), StoreError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
