//! The merge state machine.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use super::{binary, text, Pipeline};
use crate::attributes::AttributeRestorer;
use crate::config::MergeConfig;
use crate::diff::{self, DiffEngine};
use crate::errors::MergeError;
use crate::fs::{OsFs, WorkingFs};
use crate::models::{MergeOutcome, MergeRequest, PropertySnapshot};
use crate::store::{EntryStore, WcAccess};

/// Where a merge is in its lifecycle.
#[derive(Debug)]
enum Stage {
    Classify,
    Text(PropertySnapshot),
    Binary(PropertySnapshot),
    Finish {
        outcome: MergeOutcome,
        props: PropertySnapshot,
    },
    Done(MergeOutcome),
}

/// Configurable entry point for merging a file.
///
/// The filesystem is injected; the diff engine is chosen per request unless
/// one is supplied with [`with_engine`](Self::with_engine).
pub struct MergeOrchestrator<'f, F: WorkingFs + ?Sized = OsFs> {
    fs: &'f F,
    engine: Option<Box<dyn DiffEngine + 'f>>,
    scratch_dir: PathBuf,
    display_original: bool,
    default_diff3_cmd: Option<PathBuf>,
    default_options: Vec<String>,
}

impl<'f, F: WorkingFs + ?Sized> MergeOrchestrator<'f, F> {
    pub fn new(fs: &'f F) -> Self {
        Self {
            fs,
            engine: None,
            scratch_dir: std::env::temp_dir(),
            display_original: false,
            default_diff3_cmd: None,
            default_options: Vec::new(),
        }
    }

    /// Build from the `[merge]` section of a config.
    pub fn from_config(fs: &'f F, config: &MergeConfig) -> Self {
        let settings = &config.merge;
        Self {
            fs,
            engine: None,
            scratch_dir: settings.scratch_dir(),
            display_original: settings.display_original,
            default_diff3_cmd: settings.diff3_cmd.clone(),
            default_options: settings.diff3_options.clone(),
        }
    }

    /// Use `engine` for every text merge instead of selecting one.
    pub fn with_engine(mut self, engine: Box<dyn DiffEngine + 'f>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_display_original(mut self, display_original: bool) -> Self {
        self.display_original = display_original;
        self
    }

    /// Merge the changes between `request.left` and `request.right` into
    /// `request.target`.
    #[instrument(skip_all, fields(target = %request.target.display(), dry_run = request.dry_run))]
    pub fn merge<S: EntryStore + ?Sized>(
        &self,
        request: &MergeRequest,
        access: &WcAccess<'_, S>,
    ) -> Result<MergeOutcome, MergeError> {
        let mut stage = Stage::Classify;
        loop {
            debug!(?stage, "merge stage");
            stage = match stage {
                Stage::Classify => self.classify(request, access)?,
                Stage::Text(props) => {
                    let outcome = self.merge_text(request, &props, access)?;
                    Stage::Finish { outcome, props }
                }
                Stage::Binary(props) => {
                    let outcome = binary::run(self.fs, request, access)?;
                    Stage::Finish { outcome, props }
                }
                Stage::Finish { outcome, props } => {
                    if outcome != MergeOutcome::Unchanged && !request.dry_run {
                        AttributeRestorer::new(self.fs).restore(&request.target, &props)?;
                    }
                    Stage::Done(outcome)
                }
                Stage::Done(outcome) => {
                    info!(%outcome, "merge finished");
                    return Ok(outcome);
                }
            };
        }
    }

    fn classify<S: EntryStore + ?Sized>(
        &self,
        request: &MergeRequest,
        access: &WcAccess<'_, S>,
    ) -> Result<Stage, MergeError> {
        let Some(props) = access.properties(&request.target)? else {
            debug!("target is not versioned");
            return Ok(Stage::Done(MergeOutcome::NoMerge));
        };
        Ok(if props.binary {
            Stage::Binary(props)
        } else {
            Stage::Text(props)
        })
    }

    fn merge_text<S: EntryStore + ?Sized>(
        &self,
        request: &MergeRequest,
        props: &PropertySnapshot,
        access: &WcAccess<'_, S>,
    ) -> Result<MergeOutcome, MergeError> {
        let options = if request.merge_options.is_empty() {
            &self.default_options
        } else {
            &request.merge_options
        };
        let pipeline = Pipeline {
            fs: self.fs,
            scratch_dir: &self.scratch_dir,
            request,
            props,
            options,
        };

        match &self.engine {
            Some(engine) => text::run(&pipeline, engine.as_ref(), access),
            None => {
                let cmd = request
                    .diff3_cmd
                    .as_deref()
                    .or(self.default_diff3_cmd.as_deref());
                let engine = diff::select_engine(cmd, options, self.display_original)?;
                text::run(&pipeline, engine.as_ref(), access)
            }
        }
    }
}

/// Merge with default settings on the real filesystem.
///
/// Labels fall back to `.old`, `.new` and `.working`; `diff3_cmd` selects an
/// external tool, otherwise the internal engine runs with `merge_options`.
#[allow(clippy::too_many_arguments)]
pub fn merge_file<S: EntryStore + ?Sized>(
    left: &Path,
    right: &Path,
    target: &Path,
    access: &WcAccess<'_, S>,
    left_label: Option<&str>,
    right_label: Option<&str>,
    target_label: Option<&str>,
    dry_run: bool,
    diff3_cmd: Option<&Path>,
    merge_options: &[String],
) -> Result<MergeOutcome, MergeError> {
    let mut request = MergeRequest::new(left, right, target)
        .with_labels(left_label, right_label, target_label)
        .dry_run(dry_run)
        .with_options(merge_options.iter().cloned());
    if let Some(cmd) = diff3_cmd {
        request = request.with_diff3_cmd(cmd);
    }
    MergeOrchestrator::new(&OsFs).merge(&request, access)
}
