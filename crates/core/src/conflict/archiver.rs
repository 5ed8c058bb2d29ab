//! Conflict backup files.
//!
//! On a conflict the merge inputs are preserved next to the target under
//! collision-free names derived from the merge labels, and their basenames
//! are recorded on the target's entry.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::errors::MergeError;
use crate::fs::WorkingFs;
use crate::models::{ConflictRecord, MergeLabels, PropertySnapshot};
use crate::store::{EntryStore, WcAccess};
use crate::translate::FileTranslator;

/// What gets archived for a conflict.
#[derive(Debug, Clone, Copy)]
pub enum ArchiveKind<'p> {
    /// Working-form copies of left and right plus the pre-merge target.
    Text(&'p PropertySnapshot),
    /// Verbatim copies of left and right only.
    Binary,
}

/// The three merge inputs.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveInputs<'a> {
    pub left: &'a Path,
    pub right: &'a Path,
    pub target: &'a Path,
}

/// Turn a merge label into a backup filename suffix.
pub fn label_suffix(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect();
    if cleaned.starts_with('.') {
        cleaned
    } else {
        format!(".{cleaned}")
    }
}

fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

pub struct ConflictArchiver<'a, F: WorkingFs + ?Sized> {
    fs: &'a F,
}

impl<'a, F: WorkingFs + ?Sized> ConflictArchiver<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Reserve `<target><label>` and fill it with `write`. A reserved name
    /// whose write fails is removed again.
    fn backup(
        &self,
        target: &Path,
        label: &str,
        write: impl FnOnce(&Path) -> Result<(), MergeError>,
    ) -> Result<PathBuf, MergeError> {
        let path = self
            .fs
            .reserve_unique(target, &label_suffix(label))
            .map_err(MergeError::io("reserve backup name", target))?;
        if let Err(e) = write(&path) {
            self.discard(&path);
            return Err(e);
        }
        Ok(path)
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = self.fs.remove(path) {
            warn!(path = %path.display(), error = %e, "failed to remove partial backup");
        }
    }

    /// Write the backup files and record them on the target's entry.
    ///
    /// If writing any backup fails, the ones already written are removed.
    /// Backups stay on disk if only recording fails.
    #[instrument(skip_all, fields(target = %inputs.target.display()))]
    pub fn archive<S: EntryStore + ?Sized>(
        &self,
        access: &WcAccess<'_, S>,
        inputs: ArchiveInputs<'_>,
        labels: &MergeLabels,
        kind: ArchiveKind<'_>,
    ) -> Result<ConflictRecord, MergeError> {
        let mut written: Vec<PathBuf> = Vec::with_capacity(3);
        let result = self.write_backups(inputs, labels, kind, &mut written);
        let (old_path, new_path, wrk_path) = match result {
            Ok(paths) => paths,
            Err(e) => {
                for path in &written {
                    self.discard(path);
                }
                return Err(e);
            }
        };

        let record = ConflictRecord {
            conflict_old: basename(&old_path),
            conflict_new: basename(&new_path),
            conflict_wrk: wrk_path.as_deref().and_then(basename),
        };

        if let Err(e) = access.record_conflict(inputs.target, &record) {
            warn!(
                target = %inputs.target.display(),
                backups = ?record.basenames().collect::<Vec<_>>(),
                error = %e,
                "conflict backups written but not recorded"
            );
            return Err(e.into());
        }

        info!(
            old = ?record.conflict_old,
            new = ?record.conflict_new,
            wrk = ?record.conflict_wrk,
            "conflict archived"
        );
        Ok(record)
    }

    /// Text: working-form left and right plus the pre-merge target.
    /// Binary: verbatim left and right. Each finished backup is pushed to
    /// `written`.
    fn write_backups(
        &self,
        inputs: ArchiveInputs<'_>,
        labels: &MergeLabels,
        kind: ArchiveKind<'_>,
        written: &mut Vec<PathBuf>,
    ) -> Result<(PathBuf, PathBuf, Option<PathBuf>), MergeError> {
        let target = inputs.target;
        match kind {
            ArchiveKind::Text(props) => {
                let translator = FileTranslator::new(self.fs, props);
                let old_path = self.backup(target, labels.left_or_default(), |dest| {
                    translator.copy_to_working(inputs.left, dest)
                })?;
                written.push(old_path.clone());
                let new_path = self.backup(target, labels.right_or_default(), |dest| {
                    translator.copy_to_working(inputs.right, dest)
                })?;
                written.push(new_path.clone());
                let wrk_path = self.backup(target, labels.target_or_default(), |dest| {
                    if props.special {
                        let normal = translator.read_normal(target)?;
                        self.fs
                            .write(dest, &normal)
                            .map_err(MergeError::io("write", dest))
                    } else {
                        self.fs
                            .copy(target, dest)
                            .map_err(MergeError::io("copy", target))
                    }
                })?;
                Ok((old_path, new_path, Some(wrk_path)))
            }
            ArchiveKind::Binary => {
                let old_path = self.backup(target, labels.left_or_default(), |dest| {
                    self.fs
                        .copy(inputs.left, dest)
                        .map_err(MergeError::io("copy", inputs.left))
                })?;
                written.push(old_path.clone());
                let new_path = self.backup(target, labels.right_or_default(), |dest| {
                    self.fs
                        .copy(inputs.right, dest)
                        .map_err(MergeError::io("copy", inputs.right))
                })?;
                Ok((old_path, new_path, None))
            }
        }
    }
}
