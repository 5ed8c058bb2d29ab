//! Error types for the WcMerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Hard failures of a merge attempt.
///
/// A target that is not under version control is *not* an error; it yields
/// [`MergeOutcome::NoMerge`](crate::models::MergeOutcome::NoMerge). Neither is
/// a conflict.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A filesystem operation failed.
    #[error("{op} failed for '{}': {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external diff3 command could not be run or exited with a code
    /// other than 0 (clean) or 1 (conflicts).
    #[error("external diff3 '{command}' failed (exit {}): {stderr}", .exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    ExternalTool {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Keyword, line-ending or special-file data could not be translated.
    #[error(transparent)]
    Translation(#[from] TranslateError),

    /// The entry store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An option passed to the internal diff engine was not recognised.
    #[error("invalid diff option '{0}'")]
    InvalidDiffOption(String),
}

impl MergeError {
    /// Build a `map_err` adapter that tags an I/O error with its operation
    /// and path.
    pub fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }
}

// ---------------------------------------------------------------------------
// Translation errors
// ---------------------------------------------------------------------------

/// Errors from converting between normal form and working form.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// A file with `native` eol-style mixes line-ending styles.
    #[error("inconsistent line ending style in '{}'", .path.display())]
    InconsistentEol { path: PathBuf },

    /// The `svn:eol-style` property holds an unrecognised value.
    #[error("unrecognized line ending style '{value}' for '{}'", .path.display())]
    UnknownEolStyle { value: String, path: PathBuf },

    /// A special file's normal form is not `link <target>`.
    #[error("malformed special file '{}': {detail}", .path.display())]
    MalformedSpecial { path: PathBuf, detail: String },

    /// Special files can only be materialized on platforms with symlinks.
    #[error("special files are not supported on this platform: '{}'", .path.display())]
    SpecialUnsupported { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors from the entry store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying rusqlite error.
    #[error("entry store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("entry store migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// The entry to modify does not exist.
    #[error("'{}' is not under version control", .path.display())]
    EntryNotFound { path: PathBuf },

    /// A write was attempted outside the scope of the held directory lock.
    #[error("directory '{}' is not locked by this handle", .dir.display())]
    NotLocked { dir: PathBuf },

    /// Another handle already holds the directory lock.
    #[error("directory '{}' is already locked", .dir.display())]
    AlreadyLocked { dir: PathBuf },

    /// Generic I/O error (e.g. file permissions on the database file).
    #[error("entry store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
