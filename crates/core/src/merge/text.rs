//! Text merge: normalize, diff3, then install or archive.

use tempfile::TempPath;
use tracing::{debug, info};

use super::Pipeline;
use crate::conflict::{ArchiveInputs, ArchiveKind, ConflictArchiver};
use crate::diff::{Diff3Inputs, DiffEngine};
use crate::errors::MergeError;
use crate::fs::WorkingFs;
use crate::models::MergeOutcome;
use crate::store::{EntryStore, WcAccess};
use crate::translate::FileTranslator;

pub(super) fn run<F, S>(
    p: &Pipeline<'_, F>,
    engine: &dyn DiffEngine,
    access: &WcAccess<'_, S>,
) -> Result<MergeOutcome, MergeError>
where
    F: WorkingFs + ?Sized,
    S: EntryStore + ?Sized,
{
    let request = p.request;
    let translator = FileTranslator::new(p.fs, p.props);
    let colocate = engine.wants_colocated_inputs();

    let mine = translator.materialize_normal(&request.target, p.scratch_dir, colocate)?;

    // External tools get private copies of left and right beside mine.
    let (older_copy, yours_copy): (Option<TempPath>, Option<TempPath>) = if colocate {
        (
            Some(scoped_copy(p, &request.left, "left")?),
            Some(scoped_copy(p, &request.right, "right")?),
        )
    } else {
        (None, None)
    };
    let older = older_copy.as_deref().unwrap_or(request.left.as_path());
    let yours = yours_copy.as_deref().unwrap_or(request.right.as_path());

    let result = p
        .fs
        .scoped_temp(p.scratch_dir, "result", b"")
        .map_err(MergeError::io("create temporary", p.scratch_dir))?;

    let inputs = Diff3Inputs {
        mine: mine.path(),
        older,
        yours,
        labels: &request.labels,
        options: p.options,
    };
    debug!(engine = engine.name(), mine = %mine.path().display(), "running diff3");
    let status = engine.merge(&inputs, &result)?;

    if status.is_conflicted() {
        if request.dry_run {
            return Ok(MergeOutcome::Conflicted);
        }
        ConflictArchiver::new(p.fs).archive(
            access,
            ArchiveInputs {
                left: &request.left,
                right: &request.right,
                target: &request.target,
            },
            &request.labels,
            ArchiveKind::Text(p.props),
        )?;
        // Marker text cannot be turned back into a symlink; the backups
        // carry all three versions.
        if !p.props.special {
            let merged = p.fs.read(&result).map_err(MergeError::io("read", &*result))?;
            translator.install_working(&merged, &request.target)?;
        }
        info!(target = %request.target.display(), "merge conflicted");
        return Ok(MergeOutcome::Conflicted);
    }

    let unchanged = p
        .fs
        .contents_same(&result, mine.path())
        .map_err(MergeError::io("compare", &*result))?;
    if unchanged {
        return Ok(MergeOutcome::Unchanged);
    }

    if !request.dry_run {
        let merged = p.fs.read(&result).map_err(MergeError::io("read", &*result))?;
        translator.install_working(&merged, &request.target)?;
        info!(target = %request.target.display(), "merged cleanly");
    }
    Ok(MergeOutcome::Merged)
}

fn scoped_copy<F: WorkingFs + ?Sized>(
    p: &Pipeline<'_, F>,
    src: &std::path::Path,
    stem: &str,
) -> Result<TempPath, MergeError> {
    let contents = p.fs.read(src).map_err(MergeError::io("read", src))?;
    p.fs
        .scoped_temp(p.scratch_dir, stem, &contents)
        .map_err(MergeError::io("create temporary", p.scratch_dir))
}
