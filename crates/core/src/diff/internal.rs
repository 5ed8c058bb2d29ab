//! In-process three-way merge.
//!
//! Both sides are diffed against the older file; overlapping change regions
//! from different sides become conflicts unless both sides made the same
//! change.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, instrument};

use super::hunks::{self, Hunk};
use super::{Diff3Inputs, Diff3Status, DiffEngine};
use crate::errors::MergeError;

const SEPARATOR: &[u8] = b"=======";

/// Line-comparison options for the internal engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// `-b`: treat runs of whitespace as equal.
    pub ignore_space_change: bool,
    /// `-w`: ignore whitespace entirely.
    pub ignore_all_space: bool,
    /// `--ignore-eol-style`: treat all line endings as equal.
    pub ignore_eol_style: bool,
}

impl DiffOptions {
    /// Parse the option words accepted by the internal engine.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, MergeError> {
        let mut options = Self::default();
        for arg in args {
            match arg.as_ref() {
                "-b" | "--ignore-space-change" => options.ignore_space_change = true,
                "-w" | "--ignore-all-space" => options.ignore_all_space = true,
                "--ignore-eol-style" => options.ignore_eol_style = true,
                // Accepted for compatibility with diff3 invocations.
                "-u" | "--unified" => {}
                other => return Err(MergeError::InvalidDiffOption(other.to_string())),
            }
        }
        Ok(options)
    }

    /// The comparison key of a line.
    fn key<'l>(&self, line: &'l [u8]) -> Cow<'l, [u8]> {
        if !self.ignore_space_change && !self.ignore_all_space && !self.ignore_eol_style {
            return Cow::Borrowed(line);
        }

        let (body, eol) = split_eol(line);
        let mut key = Vec::with_capacity(line.len());
        let mut in_space = false;
        for &b in body {
            if b == b' ' || b == b'\t' {
                in_space = true;
                continue;
            }
            if in_space && self.ignore_space_change && !self.ignore_all_space && !key.is_empty() {
                key.push(b' ');
            }
            in_space = false;
            key.push(b);
        }
        if !self.ignore_eol_style {
            key.extend_from_slice(eol);
        } else if !eol.is_empty() {
            key.push(b'\n');
        }
        Cow::Owned(key)
    }
}

fn split_eol(line: &[u8]) -> (&[u8], &[u8]) {
    let body_len = line
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |p| p + 1);
    line.split_at(body_len)
}

fn intern<'l>(
    interner: &mut HashMap<Cow<'l, [u8]>, u32>,
    options: &DiffOptions,
    lines: &[&'l [u8]],
) -> Vec<u32> {
    lines
        .iter()
        .map(|line| {
            let next = interner.len() as u32;
            *interner.entry(options.key(*line)).or_insert(next)
        })
        .collect()
}

/// Split into lines, keeping terminators.
fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    data.split_inclusive(|&b| b == b'\n').collect()
}

/// The in-process diff3 engine.
#[derive(Debug, Clone, Default)]
pub struct InternalDiff3 {
    options: DiffOptions,
    display_original: bool,
}

impl InternalDiff3 {
    pub fn new(options: DiffOptions) -> Self {
        Self {
            options,
            display_original: false,
        }
    }

    /// Also print the older file's lines (`|||||||` section) in conflicts.
    pub fn with_original(mut self, display_original: bool) -> Self {
        self.display_original = display_original;
        self
    }

    /// Merge in memory. Returns the merged bytes and whether any conflict
    /// hunk was emitted.
    pub fn merge_bytes(
        &self,
        older: &[u8],
        mine: &[u8],
        yours: &[u8],
        markers: &Markers<'_>,
    ) -> (Vec<u8>, Diff3Status) {
        let older_lines = split_lines(older);
        let mine_lines = split_lines(mine);
        let yours_lines = split_lines(yours);

        // Intern comparison keys so the two-way diffs compare integers.
        let mut interner = HashMap::new();
        let older_ids = intern(&mut interner, &self.options, &older_lines);
        let mine_ids = intern(&mut interner, &self.options, &mine_lines);
        let yours_ids = intern(&mut interner, &self.options, &yours_lines);

        let mine_hunks = hunks::diff(&older_ids, &mine_ids);
        let yours_hunks = hunks::diff(&older_ids, &yours_ids);

        let mut out = Vec::with_capacity(mine.len().max(yours.len()));
        let mut status = Diff3Status::Clean;

        let (mut pos, mut mine_delta, mut yours_delta) = (0usize, 0isize, 0isize);
        for region in regions(&mine_hunks, &yours_hunks) {
            // Unchanged stretch before the region, taken from mine.
            let from = shift(pos, mine_delta);
            let to = shift(region.start, mine_delta);
            extend_lines(&mut out, &mine_lines[from..to]);

            let mine_span = side_span(&region, &region.mine, mine_delta);
            let yours_span = side_span(&region, &region.yours, yours_delta);
            let mine_part = &mine_lines[mine_span.clone()];
            let yours_part = &yours_lines[yours_span.clone()];

            if region.yours.is_empty() {
                extend_lines(&mut out, mine_part);
            } else if region.mine.is_empty() {
                extend_lines(&mut out, yours_part);
            } else if mine_ids[mine_span.clone()] == yours_ids[yours_span.clone()] {
                extend_lines(&mut out, mine_part);
            } else {
                status = Diff3Status::Conflicted;
                let original = &older_lines[region.start..region.end];
                write_conflict(&mut out, markers, mine_part, original, yours_part, self.display_original);
            }

            mine_delta += span_delta(&region.mine);
            yours_delta += span_delta(&region.yours);
            pos = region.end;
        }
        extend_lines(&mut out, &mine_lines[shift(pos, mine_delta)..]);

        debug!(conflicted = status.is_conflicted(), "internal diff3 finished");
        (out, status)
    }
}

impl DiffEngine for InternalDiff3 {
    fn name(&self) -> &str {
        "internal"
    }

    #[instrument(skip_all, fields(mine = %inputs.mine.display()))]
    fn merge(&self, inputs: &Diff3Inputs<'_>, output: &Path) -> Result<Diff3Status, MergeError> {
        let read = |path: &Path| std::fs::read(path).map_err(MergeError::io("read", path));
        let older = read(inputs.older)?;
        let mine = read(inputs.mine)?;
        let yours = read(inputs.yours)?;

        let markers = Markers {
            mine: inputs.labels.target_or_default(),
            older: inputs.labels.left_or_default(),
            yours: inputs.labels.right_or_default(),
        };
        let (merged, status) = self.merge_bytes(&older, &mine, &yours, &markers);
        std::fs::write(output, merged).map_err(MergeError::io("write", output))?;
        Ok(status)
    }
}

/// Labels printed after the conflict markers.
#[derive(Debug, Clone, Copy)]
pub struct Markers<'a> {
    pub mine: &'a str,
    pub older: &'a str,
    pub yours: &'a str,
}

/// A span of the older file touched by one or both sides.
#[derive(Debug)]
struct Region<'h> {
    start: usize,
    end: usize,
    mine: Vec<&'h Hunk>,
    yours: Vec<&'h Hunk>,
}

fn overlaps(a: &std::ops::Range<usize>, b: &std::ops::Range<usize>) -> bool {
    if a.is_empty() || b.is_empty() {
        a.start <= b.end && b.start <= a.end
    } else {
        a.start < b.end && b.start < a.end
    }
}

/// Group hunks of both sides into maximal overlapping regions.
fn regions<'h>(mine: &'h [Hunk], yours: &'h [Hunk]) -> Vec<Region<'h>> {
    let mut all: Vec<(bool, &Hunk)> = mine
        .iter()
        .map(|h| (true, h))
        .chain(yours.iter().map(|h| (false, h)))
        .collect();
    all.sort_by_key(|(_, h)| (h.old.start, h.old.end));

    let mut regions: Vec<Region<'h>> = Vec::new();
    for (is_mine, hunk) in all {
        let joins = regions
            .last()
            .is_some_and(|r| overlaps(&(r.start..r.end), &hunk.old));
        if !joins {
            regions.push(Region {
                start: hunk.old.start,
                end: hunk.old.end,
                mine: Vec::new(),
                yours: Vec::new(),
            });
        }
        let Some(region) = regions.last_mut() else {
            continue;
        };
        region.end = region.end.max(hunk.old.end);
        if is_mine {
            region.mine.push(hunk);
        } else {
            region.yours.push(hunk);
        }
    }
    regions
}

fn shift(index: usize, delta: isize) -> usize {
    (index as isize + delta) as usize
}

fn span_delta(hunks: &[&Hunk]) -> isize {
    hunks
        .iter()
        .map(|h| h.new.len() as isize - h.old.len() as isize)
        .sum()
}

/// The lines of one side covering `region`, given that side's accumulated
/// offset before the region.
fn side_span(region: &Region<'_>, hunks: &[&Hunk], delta: isize) -> std::ops::Range<usize> {
    let start = shift(region.start, delta);
    let end = shift(region.end, delta + span_delta(hunks));
    start..end
}

fn extend_lines(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
}

/// Append `lines`, making sure the result ends in a newline so the next
/// marker starts on its own line.
fn extend_section(out: &mut Vec<u8>, lines: &[&[u8]]) {
    extend_lines(out, lines);
    if lines.last().is_some_and(|l| !l.ends_with(b"\n")) {
        out.push(b'\n');
    }
}

fn write_marker(out: &mut Vec<u8>, marker: &[u8], label: &str) {
    out.extend_from_slice(marker);
    out.push(b' ');
    out.extend_from_slice(label.as_bytes());
    out.push(b'\n');
}

fn write_conflict(
    out: &mut Vec<u8>,
    markers: &Markers<'_>,
    mine: &[&[u8]],
    original: &[&[u8]],
    yours: &[&[u8]],
    display_original: bool,
) {
    write_marker(out, b"<<<<<<<", markers.mine);
    extend_section(out, mine);
    if display_original {
        write_marker(out, b"|||||||", markers.older);
        extend_section(out, original);
    }
    out.extend_from_slice(SEPARATOR);
    out.push(b'\n');
    extend_section(out, yours);
    write_marker(out, b">>>>>>>", markers.yours);
}
