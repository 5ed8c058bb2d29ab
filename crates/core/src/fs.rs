//! Filesystem services used by the merge path.
//!
//! [`WorkingFs`] is the seam between the merge logic and the operating
//! system; [`OsFs`] is the real implementation. Tests wrap it to inject
//! failures.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::debug;

/// How many numbered candidates [`WorkingFs::reserve_unique`] tries.
const MAX_UNIQUE_ATTEMPTS: u32 = 99_999;

/// Filesystem capabilities required by the merge orchestrator.
pub trait WorkingFs {
    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// The link target if `path` is a symlink, `None` for anything else.
    fn read_link(&self, path: &Path) -> io::Result<Option<PathBuf>>;

    /// Create a scoped temporary in `dir` holding `contents`. The file is
    /// deleted when the returned guard is dropped.
    fn scoped_temp(&self, dir: &Path, stem: &str, contents: &[u8]) -> io::Result<TempPath>;

    /// Create an empty file named `<base><suffix>`, or `<base>.N<suffix>` for
    /// the first free `N >= 2`. The file persists.
    fn reserve_unique(&self, base: &Path, suffix: &str) -> io::Result<PathBuf>;

    /// Copy `from` to `to`, overwriting `to`.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Overwrite `path` with `contents`.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Delete a file.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Atomically replace `target` with a regular file holding `contents`.
    fn replace(&self, target: &Path, contents: &[u8]) -> io::Result<()>;

    /// Atomically replace `target` with a symlink pointing at `link`.
    fn replace_with_symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Byte-for-byte equality of two files.
    fn contents_same(&self, a: &Path, b: &Path) -> io::Result<bool>;

    fn is_executable(&self, path: &Path) -> io::Result<bool>;
    fn set_executable(&self, path: &Path, executable: bool) -> io::Result<()>;
    fn is_read_only(&self, path: &Path) -> io::Result<bool>;
    fn set_read_only(&self, path: &Path, read_only: bool) -> io::Result<()>;
}

/// Candidate name for attempt `n` of [`WorkingFs::reserve_unique`].
pub fn unique_candidate(base: &Path, suffix: &str, attempt: u32) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    if attempt > 1 {
        name.push(format!(".{attempt}"));
    }
    name.push(suffix);
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn temp_prefix(target: &Path) -> String {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(".{name}.")
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl WorkingFs for OsFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<Option<PathBuf>> {
        if fs::symlink_metadata(path)?.file_type().is_symlink() {
            Ok(Some(fs::read_link(path)?))
        } else {
            Ok(None)
        }
    }

    fn scoped_temp(&self, dir: &Path, stem: &str, contents: &[u8]) -> io::Result<TempPath> {
        let mut file = tempfile::Builder::new()
            .prefix(stem)
            .suffix(".tmp")
            .tempfile_in(dir)?;
        file.write_all(contents)?;
        file.flush()?;
        Ok(file.into_temp_path())
    }

    fn reserve_unique(&self, base: &Path, suffix: &str) -> io::Result<PathBuf> {
        for attempt in 1..=MAX_UNIQUE_ATTEMPTS {
            let candidate = unique_candidate(base, suffix, attempt);
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(_) => {
                    debug!(path = %candidate.display(), "reserved unique file");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("unable to make unique name for '{}{suffix}'", base.display()),
        ))
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn replace(&self, target: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix(&temp_prefix(target))
            .suffix(".tmp")
            .tempfile_in(parent_dir(target))?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;

        // Keep the existing file's mode; attribute restoration adjusts it later.
        if let Ok(meta) = fs::symlink_metadata(target) {
            if meta.file_type().is_file() {
                file.as_file().set_permissions(meta.permissions())?;
            }
        }

        file.persist(target).map_err(|e| e.error)?;
        Ok(())
    }

    #[cfg(unix)]
    fn replace_with_symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let tmp = parent_dir(target).join(format!(
            "{}{}.tmp",
            temp_prefix(target),
            uuid::Uuid::new_v4().simple()
        ));
        std::os::unix::fs::symlink(link, &tmp)?;
        if let Err(e) = fs::rename(&tmp, target) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn replace_with_symlink(&self, target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot create symlink '{}'", target.display()),
        ))
    }

    fn contents_same(&self, a: &Path, b: &Path) -> io::Result<bool> {
        let (meta_a, meta_b) = (fs::metadata(a)?, fs::metadata(b)?);
        if meta_a.len() != meta_b.len() {
            return Ok(false);
        }

        let (mut file_a, mut file_b) = (File::open(a)?, File::open(b)?);
        let mut buf_a = vec![0u8; 64 * 1024];
        let mut buf_b = vec![0u8; 64 * 1024];
        loop {
            let n = read_full(&mut file_a, &mut buf_a)?;
            let m = read_full(&mut file_b, &mut buf_b)?;
            if n != m || buf_a[..n] != buf_b[..m] {
                return Ok(false);
            }
            if n == 0 {
                return Ok(true);
            }
        }
    }

    #[cfg(unix)]
    fn is_executable(&self, path: &Path) -> io::Result<bool> {
        use std::os::unix::fs::PermissionsExt;
        Ok(fs::metadata(path)?.permissions().mode() & 0o111 != 0)
    }

    #[cfg(not(unix))]
    fn is_executable(&self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }

    #[cfg(unix)]
    fn set_executable(&self, path: &Path, executable: bool) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        let mode = perms.mode();
        // Grant execute to whoever may read.
        let new_mode = if executable {
            mode | ((mode & 0o444) >> 2)
        } else {
            mode & !0o111
        };
        if new_mode != mode {
            perms.set_mode(new_mode);
            fs::set_permissions(path, perms)?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn set_executable(&self, _path: &Path, _executable: bool) -> io::Result<()> {
        Ok(())
    }

    fn is_read_only(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::metadata(path)?.permissions().readonly())
    }

    #[cfg(unix)]
    fn set_read_only(&self, path: &Path, read_only: bool) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        let mode = perms.mode();
        let new_mode = if read_only { mode & !0o222 } else { mode | 0o200 };
        if new_mode != mode {
            perms.set_mode(new_mode);
            fs::set_permissions(path, perms)?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    fn set_read_only(&self, path: &Path, read_only: bool) -> io::Result<()> {
        let mut perms = fs::metadata(path)?.permissions();
        if perms.readonly() != read_only {
            perms.set_readonly(read_only);
            fs::set_permissions(path, perms)?;
        }
        Ok(())
    }
}

/// Fill `buf` as far as the reader allows; returns the byte count.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
