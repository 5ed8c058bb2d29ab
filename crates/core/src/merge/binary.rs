//! Binary targets are never merged: both incoming versions are archived and
//! the target is left alone.

use tracing::info;

use crate::conflict::{ArchiveInputs, ArchiveKind, ConflictArchiver};
use crate::errors::MergeError;
use crate::fs::WorkingFs;
use crate::models::{MergeOutcome, MergeRequest};
use crate::store::{EntryStore, WcAccess};

pub(super) fn run<F, S>(
    fs: &F,
    request: &MergeRequest,
    access: &WcAccess<'_, S>,
) -> Result<MergeOutcome, MergeError>
where
    F: WorkingFs + ?Sized,
    S: EntryStore + ?Sized,
{
    if request.dry_run {
        return Ok(MergeOutcome::Conflicted);
    }

    ConflictArchiver::new(fs).archive(
        access,
        ArchiveInputs {
            left: &request.left,
            right: &request.right,
            target: &request.target,
        },
        &request.labels,
        ArchiveKind::Binary,
    )?;
    info!(target = %request.target.display(), "binary conflict recorded");
    Ok(MergeOutcome::Conflicted)
}
