//! Merging a single versioned file.
//!
//! [`MergeOrchestrator`] classifies the target and hands it to the text or
//! binary pipeline; [`merge_file`] is the one-call form with default
//! settings.

mod binary;
mod orchestrator;
mod text;

use std::path::Path;

pub use orchestrator::{merge_file, MergeOrchestrator};

use crate::fs::WorkingFs;
use crate::models::{MergeRequest, PropertySnapshot};

/// Everything the text pipeline needs for one request.
struct Pipeline<'a, F: WorkingFs + ?Sized> {
    fs: &'a F,
    scratch_dir: &'a Path,
    request: &'a MergeRequest,
    props: &'a PropertySnapshot,
    options: &'a [String],
}
