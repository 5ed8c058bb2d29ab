//! Translation between normal form and working form.
//!
//! Normal form is what the diff engine sees: LF line endings, contracted
//! keywords, and symlinks encoded as `link <target>`. Working form is what
//! lives on disk. Which translations apply is decided by the target's
//! [`PropertySnapshot`].

pub mod eol;
pub mod keywords;
pub mod special;

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::debug;

use crate::errors::{MergeError, TranslateError};
use crate::fs::WorkingFs;
use crate::models::PropertySnapshot;

/// A file's normal form, either the file itself or a scoped copy.
#[derive(Debug)]
pub enum NormalForm {
    /// No translation was needed; the original file is used in place.
    InPlace(PathBuf),
    /// A translated copy, deleted when dropped.
    Scoped(TempPath),
}

impl NormalForm {
    pub fn path(&self) -> &Path {
        match self {
            Self::InPlace(path) => path,
            Self::Scoped(tmp) => tmp,
        }
    }
}

/// Converts files of one target between normal and working form.
pub struct FileTranslator<'a, F: WorkingFs + ?Sized> {
    fs: &'a F,
    props: &'a PropertySnapshot,
}

impl<'a, F: WorkingFs + ?Sized> FileTranslator<'a, F> {
    pub fn new(fs: &'a F, props: &'a PropertySnapshot) -> Self {
        Self { fs, props }
    }

    /// Translate working-form bytes to normal form.
    pub fn to_normal_bytes(&self, working: &[u8], path: &Path) -> Result<Vec<u8>, TranslateError> {
        let lf = eol::to_normal(working, self.props.eol, path)?;
        Ok(keywords::contract(&lf, &self.props.keywords))
    }

    /// Translate normal-form bytes to working form (special encoding aside).
    pub fn to_working_bytes(&self, normal: &[u8]) -> Vec<u8> {
        let expanded = keywords::expand(normal, &self.props.keywords);
        eol::to_working(&expanded, self.props.eol)
    }

    /// Read `path` and return its normal form.
    pub fn read_normal(&self, path: &Path) -> Result<Vec<u8>, MergeError> {
        if self.props.special {
            if let Some(link) = self.fs.read_link(path).map_err(MergeError::io("read link", path))? {
                return Ok(special::encode_link(&link));
            }
            // A special file checked out without symlink support already
            // holds its normal form.
            return self.fs.read(path).map_err(MergeError::io("read", path));
        }
        let working = self.fs.read(path).map_err(MergeError::io("read", path))?;
        Ok(self.to_normal_bytes(&working, path)?)
    }

    /// Make the normal form of `path` available as a file.
    ///
    /// With `force_copy` a scoped copy in `scratch_dir` is produced even when
    /// no translation applies.
    pub fn materialize_normal(
        &self,
        path: &Path,
        scratch_dir: &Path,
        force_copy: bool,
    ) -> Result<NormalForm, MergeError> {
        if self.props.is_identity() && !force_copy {
            debug!(path = %path.display(), "normal form is the working file itself");
            return Ok(NormalForm::InPlace(path.to_path_buf()));
        }

        let normal = self.read_normal(path)?;
        let tmp = self
            .fs
            .scoped_temp(scratch_dir, "normal-mine", &normal)
            .map_err(MergeError::io("create temporary", scratch_dir))?;
        debug!(path = %path.display(), tmp = %tmp.display(), "materialized normal form");
        Ok(NormalForm::Scoped(tmp))
    }

    /// Atomically install normal-form `normal` at `dest` in working form.
    pub fn install_working(&self, normal: &[u8], dest: &Path) -> Result<(), MergeError> {
        if self.props.special {
            let link = special::decode_link(normal, dest)?;
            if cfg!(not(unix)) {
                return Err(TranslateError::SpecialUnsupported {
                    path: dest.to_path_buf(),
                }
                .into());
            }
            return self
                .fs
                .replace_with_symlink(dest, &link)
                .map_err(MergeError::io("install symlink", dest));
        }
        let working = self.to_working_bytes(normal);
        self.fs
            .replace(dest, &working)
            .map_err(MergeError::io("replace", dest))
    }

    /// Copy the normal-form file `src` to `dest` in working form.
    ///
    /// Special files are copied as their normal-form text so backups never
    /// become dangling symlinks.
    pub fn copy_to_working(&self, src: &Path, dest: &Path) -> Result<(), MergeError> {
        let normal = self.fs.read(src).map_err(MergeError::io("read", src))?;
        let contents = if self.props.special {
            normal
        } else {
            self.to_working_bytes(&normal)
        };
        self.fs
            .write(dest, &contents)
            .map_err(MergeError::io("write", dest))
    }
}
