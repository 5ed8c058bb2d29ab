//! Executable and read-only bits derived from versioned properties.

use std::path::Path;

use tracing::debug;

use crate::errors::MergeError;
use crate::fs::WorkingFs;
use crate::models::PropertySnapshot;

pub struct AttributeRestorer<'a, F: WorkingFs + ?Sized> {
    fs: &'a F,
}

impl<'a, F: WorkingFs + ?Sized> AttributeRestorer<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Bring the target's executable and read-only bits in line with its
    /// properties. The executable bit follows `svn:executable`; the file is
    /// read-only when it needs a lock and none is held.
    pub fn restore(&self, target: &Path, props: &PropertySnapshot) -> Result<(), MergeError> {
        if props.special {
            return Ok(());
        }

        let want_exec = props.executable;
        let is_exec = self
            .fs
            .is_executable(target)
            .map_err(MergeError::io("stat", target))?;
        if want_exec != is_exec {
            debug!(path = %target.display(), executable = want_exec, "setting executable bit");
            self.fs
                .set_executable(target, want_exec)
                .map_err(MergeError::io("set executable", target))?;
        }

        let want_ro = props.needs_lock && !props.locked;
        let is_ro = self
            .fs
            .is_read_only(target)
            .map_err(MergeError::io("stat", target))?;
        if want_ro != is_ro {
            debug!(path = %target.display(), read_only = want_ro, "setting read-only bit");
            self.fs
                .set_read_only(target, want_ro)
                .map_err(MergeError::io("set read-only", target))?;
        }
        Ok(())
    }
}
