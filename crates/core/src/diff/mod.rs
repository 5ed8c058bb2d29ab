//! Three-way text merge engines.
//!
//! The merge path talks to a [`DiffEngine`]: either the in-process
//! [`InternalDiff3`] or an [`ExternalDiff3`] tool invoked in diff3 `-E -m`
//! mode. Both write the merged text, with conflict markers where needed, to
//! an output file.

pub mod external;
pub mod hunks;
pub mod internal;

use std::path::Path;

pub use external::ExternalDiff3;
pub use internal::{DiffOptions, InternalDiff3};

use crate::errors::MergeError;
use crate::models::MergeLabels;

/// The three inputs of a merge, all in normal form.
#[derive(Debug, Clone, Copy)]
pub struct Diff3Inputs<'a> {
    /// The locally modified file.
    pub mine: &'a Path,
    /// The common ancestor.
    pub older: &'a Path,
    /// The incoming revision.
    pub yours: &'a Path,
    pub labels: &'a MergeLabels,
    pub options: &'a [String],
}

/// Result of a successful engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diff3Status {
    Clean,
    Conflicted,
}

impl Diff3Status {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, Self::Conflicted)
    }
}

/// A three-way merge engine.
pub trait DiffEngine {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Merge `inputs` and write the result to `output`.
    fn merge(&self, inputs: &Diff3Inputs<'_>, output: &Path) -> Result<Diff3Status, MergeError>;

    /// Whether the older and yours inputs must be copied next to mine
    /// before the engine runs.
    fn wants_colocated_inputs(&self) -> bool {
        false
    }
}

/// Pick the engine for a request: the external tool when a command is
/// configured, the internal engine otherwise.
pub fn select_engine(
    diff3_cmd: Option<&Path>,
    options: &[String],
    display_original: bool,
) -> Result<Box<dyn DiffEngine>, MergeError> {
    match diff3_cmd {
        Some(command) => Ok(Box::new(ExternalDiff3::new(command))),
        None => {
            let parsed = DiffOptions::parse(options)?;
            Ok(Box::new(InternalDiff3::new(parsed).with_original(display_original)))
        }
    }
}
