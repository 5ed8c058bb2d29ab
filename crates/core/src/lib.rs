//! WcMerge core library.
//!
//! Three-way merge of a locally modified working-copy file against an
//! incoming revision: content normalization (keywords, line endings, special
//! files), internal or external diff3, conflict backups recorded in the entry
//! store, and restoration of executable/read-only bits.

pub mod attributes;
pub mod config;
pub mod conflict;
pub mod diff;
pub mod errors;
pub mod fs;
pub mod merge;
pub mod models;
pub mod store;
pub mod translate;

// Re-exports for convenience.
pub use config::MergeConfig;
pub use errors::{CoreError, MergeError};
pub use fs::{OsFs, WorkingFs};
pub use merge::{merge_file, MergeOrchestrator};
pub use models::{MergeOutcome, MergeRequest};
pub use store::{EntryDb, EntryStore, MemoryStore, WcAccess};
