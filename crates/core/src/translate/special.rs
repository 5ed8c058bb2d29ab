//! Special-file (symlink) encoding.
//!
//! In normal form a symlink is the text `link <target>` with no trailing
//! newline.

use std::path::{Path, PathBuf};

use crate::errors::TranslateError;

const LINK_PREFIX: &str = "link ";

/// Encode a symlink target in normal form.
pub fn encode_link(target: &Path) -> Vec<u8> {
    format!("{LINK_PREFIX}{}", target.to_string_lossy()).into_bytes()
}

/// Decode the symlink target from normal-form bytes.
pub fn decode_link(normal: &[u8], path: &Path) -> Result<PathBuf, TranslateError> {
    let malformed = |detail: &str| TranslateError::MalformedSpecial {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    };

    let text = std::str::from_utf8(normal).map_err(|_| malformed("link target is not UTF-8"))?;
    let target = text
        .strip_prefix(LINK_PREFIX)
        .ok_or_else(|| malformed("expected 'link <target>'"))?;
    let target = target.trim_end_matches(['\n', '\r']);
    if target.is_empty() {
        return Err(malformed("empty link target"));
    }
    Ok(PathBuf::from(target))
}
