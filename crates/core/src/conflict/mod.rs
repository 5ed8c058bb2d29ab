//! Conflict archiving: backup files for the inputs of a conflicted merge and
//! the entry record pointing at them.

pub mod archiver;

pub use archiver::{label_suffix, ArchiveInputs, ArchiveKind, ConflictArchiver};
