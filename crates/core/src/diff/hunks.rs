//! Two-way line diff, reduced to replaced regions.
//!
//! Uses the `similar` crate (Myers with linear-space refinement) over
//! interned line keys.

use std::hash::Hash;
use std::ops::Range;

use similar::{capture_diff_slices, Algorithm, DiffTag};

/// A replaced region: `old` lines of the original became `new` lines.
///
/// Either range may be empty (pure insertion or pure deletion) but not both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old: Range<usize>,
    pub new: Range<usize>,
}

/// Compute the hunks turning `a` into `b`, ordered by position.
///
/// Touching delete/insert operations are coalesced into one hunk.
pub fn diff<T: Eq + Hash + Ord>(a: &[T], b: &[T]) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, a, b) {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        match hunks.last_mut() {
            Some(last) if last.old.end == old.start && last.new.end == new.start => {
                last.old.end = old.end;
                last.new.end = new.end;
            }
            _ => hunks.push(Hunk { old, new }),
        }
    }
    hunks
}
