//! Domain model types used throughout WcMerge.
//!
//! These types bridge the merge orchestrator, the entry store, and the CLI.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::TranslateError;
use crate::translate::keywords;

// ---------------------------------------------------------------------------
// Versioned property names
// ---------------------------------------------------------------------------

pub const PROP_KEYWORDS: &str = "svn:keywords";
pub const PROP_EOL_STYLE: &str = "svn:eol-style";
pub const PROP_SPECIAL: &str = "svn:special";
pub const PROP_EXECUTABLE: &str = "svn:executable";
pub const PROP_MIME_TYPE: &str = "svn:mime-type";
pub const PROP_NEEDS_LOCK: &str = "svn:needs-lock";

// ---------------------------------------------------------------------------
// Merge outcome
// ---------------------------------------------------------------------------

/// Terminal state of a merge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// The target is not under version control; nothing was touched.
    NoMerge,
    /// The merge result equals the target's pre-merge content.
    Unchanged,
    /// Changes were merged cleanly.
    Merged,
    /// The merge produced conflicts.
    Conflicted,
}

impl MergeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMerge => "no_merge",
            Self::Unchanged => "unchanged",
            Self::Merged => "merged",
            Self::Conflicted => "conflicted",
        }
    }
}

impl std::fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Merge request
// ---------------------------------------------------------------------------

pub const DEFAULT_TARGET_LABEL: &str = ".working";
pub const DEFAULT_LEFT_LABEL: &str = ".old";
pub const DEFAULT_RIGHT_LABEL: &str = ".new";

/// Display labels for the three merge inputs.
///
/// Labels double as conflict-marker text and as suffixes for conflict
/// backup files. Missing labels fall back to `.old` / `.new` / `.working`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeLabels {
    pub left: Option<String>,
    pub right: Option<String>,
    pub target: Option<String>,
}

impl MergeLabels {
    pub fn left_or_default(&self) -> &str {
        self.left.as_deref().unwrap_or(DEFAULT_LEFT_LABEL)
    }

    pub fn right_or_default(&self) -> &str {
        self.right.as_deref().unwrap_or(DEFAULT_RIGHT_LABEL)
    }

    pub fn target_or_default(&self) -> &str {
        self.target.as_deref().unwrap_or(DEFAULT_TARGET_LABEL)
    }
}

/// Everything a single merge call needs besides the store handle.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    /// The older (base) revision of the file.
    pub left: PathBuf,
    /// The newer (incoming) revision of the file.
    pub right: PathBuf,
    /// The locally modified working file to merge into.
    pub target: PathBuf,
    pub labels: MergeLabels,
    /// Compute the outcome without touching the filesystem or metadata.
    pub dry_run: bool,
    /// External diff3 command; `None` selects the internal engine.
    pub diff3_cmd: Option<PathBuf>,
    /// Extra options for the diff engine.
    pub merge_options: Vec<String>,
}

impl MergeRequest {
    pub fn new(
        left: impl Into<PathBuf>,
        right: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            target: target.into(),
            labels: MergeLabels::default(),
            dry_run: false,
            diff3_cmd: None,
            merge_options: Vec::new(),
        }
    }

    pub fn with_labels(
        mut self,
        left: Option<&str>,
        right: Option<&str>,
        target: Option<&str>,
    ) -> Self {
        self.labels = MergeLabels {
            left: left.map(str::to_owned),
            right: right.map(str::to_owned),
            target: target.map(str::to_owned),
        };
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_diff3_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.diff3_cmd = Some(cmd.into());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.merge_options = options.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Basenames of the conflict backup files, held on the target's entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub conflict_old: Option<String>,
    pub conflict_new: Option<String>,
    pub conflict_wrk: Option<String>,
}

impl ConflictRecord {
    pub fn is_empty(&self) -> bool {
        self.conflict_old.is_none() && self.conflict_new.is_none() && self.conflict_wrk.is_none()
    }

    /// Iterate over the recorded basenames.
    pub fn basenames(&self) -> impl Iterator<Item = &str> {
        [&self.conflict_old, &self.conflict_new, &self.conflict_wrk]
            .into_iter()
            .filter_map(|b| b.as_deref())
    }
}

/// The slice of versioned metadata the merge path reads or writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Basename of the versioned file.
    pub name: String,
    /// Last-changed revision.
    pub revision: i64,
    pub last_author: Option<String>,
    /// Last-changed date, already formatted for keyword expansion.
    pub changed_date: Option<String>,
    pub url: Option<String>,
    /// Token of a repository lock held on this file, if any.
    pub lock_token: Option<String>,
    pub props: BTreeMap<String, String>,
    pub conflict: ConflictRecord,
}

impl Entry {
    pub fn new(name: impl Into<String>, revision: i64) -> Self {
        Self {
            name: name.into(),
            revision,
            ..Self::default()
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn has_prop(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Property snapshot
// ---------------------------------------------------------------------------

/// Line-ending style from `svn:eol-style`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EolStyle {
    /// No translation.
    #[default]
    None,
    /// The platform's line ending.
    Native,
    Lf,
    CrLf,
    Cr,
}

impl EolStyle {
    /// Parse an `svn:eol-style` value. `None` for unrecognised values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "native" => Some(Self::Native),
            "LF" => Some(Self::Lf),
            "CRLF" => Some(Self::CrLf),
            "CR" => Some(Self::Cr),
            _ => None,
        }
    }

    /// Line ending written in working form, or `None` when untranslated.
    pub fn working_eol(&self) -> Option<&'static [u8]> {
        match self {
            Self::None => None,
            Self::Native if cfg!(windows) => Some(b"\r\n"),
            Self::Native => Some(b"\n"),
            Self::Lf => Some(b"\n"),
            Self::CrLf => Some(b"\r\n"),
            Self::Cr => Some(b"\r"),
        }
    }

    /// Fixed styles repair mixed line endings silently; `native` rejects them.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Lf | Self::CrLf | Self::Cr)
    }
}

/// Translation and attribute properties of a target, read once per merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySnapshot {
    /// Enabled keyword names mapped to their expanded values.
    pub keywords: BTreeMap<String, String>,
    pub eol: EolStyle,
    pub special: bool,
    pub executable: bool,
    pub binary: bool,
    pub needs_lock: bool,
    /// A repository lock token is held for the file.
    pub locked: bool,
}

impl PropertySnapshot {
    /// Derive the snapshot for the file at `path` from its entry.
    ///
    /// Binary files are never translated, so their eol-style and keyword
    /// properties are not read.
    pub fn from_entry(path: &Path, entry: &Entry) -> Result<Self, TranslateError> {
        let binary = entry
            .props
            .get(PROP_MIME_TYPE)
            .is_some_and(|mime| is_binary_mime_type(mime));
        if binary {
            return Ok(Self {
                binary,
                special: entry.has_prop(PROP_SPECIAL),
                executable: entry.has_prop(PROP_EXECUTABLE),
                needs_lock: entry.has_prop(PROP_NEEDS_LOCK),
                locked: entry.lock_token.is_some(),
                ..Self::default()
            });
        }

        let eol = match entry.props.get(PROP_EOL_STYLE) {
            None => EolStyle::None,
            Some(value) => EolStyle::parse(value).ok_or_else(|| TranslateError::UnknownEolStyle {
                value: value.clone(),
                path: path.to_path_buf(),
            })?,
        };

        let keywords = match entry.props.get(PROP_KEYWORDS) {
            Some(list) => keywords::build_keywords(list, entry),
            None => BTreeMap::new(),
        };

        Ok(Self {
            keywords,
            eol,
            special: entry.has_prop(PROP_SPECIAL),
            executable: entry.has_prop(PROP_EXECUTABLE),
            binary,
            needs_lock: entry.has_prop(PROP_NEEDS_LOCK),
            locked: entry.lock_token.is_some(),
        })
    }

    /// `true` when normal form and working form are byte-identical.
    pub fn is_identity(&self) -> bool {
        self.keywords.is_empty() && self.eol == EolStyle::None && !self.special
    }
}

/// A mime type is binary unless it is `text/*` or one of the X bitmap and
/// pixmap image types, which are plain text.
pub fn is_binary_mime_type(mime: &str) -> bool {
    let mime = mime.trim();
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    !(essence.starts_with("text/")
        || essence == "image/x-xbitmap"
        || essence == "image/x-xpixmap")
}
