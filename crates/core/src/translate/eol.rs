//! Line-ending translation.

use std::path::Path;

use crate::errors::TranslateError;
use crate::models::EolStyle;

/// Convert working-form line endings to LF.
///
/// Fixed styles repair mixed endings; `native` refuses them.
pub fn to_normal(input: &[u8], style: EolStyle, path: &Path) -> Result<Vec<u8>, TranslateError> {
    if style == EolStyle::None {
        return Ok(input.to_vec());
    }
    if !style.is_fixed() && !is_consistent(input) {
        return Err(TranslateError::InconsistentEol {
            path: path.to_path_buf(),
        });
    }
    Ok(repair(input, b"\n"))
}

/// Convert normal-form line endings to the style's working line ending.
pub fn to_working(input: &[u8], style: EolStyle) -> Vec<u8> {
    match style.working_eol() {
        Some(eol) => repair(input, eol),
        None => input.to_vec(),
    }
}

/// Length of the line ending starting at `i`, if any.
fn eol_len(input: &[u8], i: usize) -> Option<usize> {
    match input[i] {
        b'\n' => Some(1),
        b'\r' if input.get(i + 1) == Some(&b'\n') => Some(2),
        b'\r' => Some(1),
        _ => None,
    }
}

/// Rewrite every line ending in `input` to `eol`.
fn repair(input: &[u8], eol: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match eol_len(input, i) {
            Some(len) => {
                out.extend_from_slice(eol);
                i += len;
            }
            None => {
                out.push(input[i]);
                i += 1;
            }
        }
    }
    out
}

/// `true` if every line ending in `input` is the same sequence.
fn is_consistent(input: &[u8]) -> bool {
    let mut seen: Option<&[u8]> = None;
    let mut i = 0;
    while i < input.len() {
        match eol_len(input, i) {
            Some(len) => {
                let current = &input[i..i + len];
                match seen {
                    Some(first) if first != current => return false,
                    Some(_) => {}
                    None => seen = Some(current),
                }
                i += len;
            }
            None => i += 1,
        }
    }
    true
}
