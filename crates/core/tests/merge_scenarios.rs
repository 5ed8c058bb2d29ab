//! End-to-end merge scenarios against real working-copy directories.
//!
//! Each test builds a working directory and a separate pristine directory
//! (holding the left/right revisions) under `tempfile`, registers entries in
//! an in-memory store, and runs the orchestrator with its own scratch
//! directory so leftover temporaries can be detected.
//!
//! Tests that need `/bin/sh` skip gracefully when it is missing.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::{TempDir, TempPath};

use wcmerge_core::diff::{Diff3Inputs, Diff3Status, DiffEngine};
use wcmerge_core::models::{ConflictRecord, Entry};
use wcmerge_core::{
    EntryStore, MemoryStore, MergeError, MergeOrchestrator, MergeOutcome, MergeRequest, OsFs,
    WcAccess, WorkingFs,
};

// ===========================================================================
// Helpers
// ===========================================================================

struct Wc {
    dir: TempDir,
    pristine: TempDir,
    scratch: TempDir,
    store: MemoryStore,
}

impl Wc {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            pristine: tempfile::tempdir().unwrap(),
            scratch: tempfile::tempdir().unwrap(),
            store: MemoryStore::new(),
        }
    }

    /// Write a working file and register its entry.
    fn versioned(&self, name: &str, contents: &[u8], entry: Entry) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        self.store.put_entry(&path, &entry).unwrap();
        path
    }

    /// Write left and right revisions into the pristine area.
    fn revisions(&self, left: &[u8], right: &[u8]) -> (PathBuf, PathBuf) {
        let l = self.pristine.path().join("left");
        let r = self.pristine.path().join("right");
        std::fs::write(&l, left).unwrap();
        std::fs::write(&r, right).unwrap();
        (l, r)
    }

    fn orchestrator(&self) -> MergeOrchestrator<'static, OsFs> {
        MergeOrchestrator::new(&OsFs).with_scratch_dir(self.scratch.path())
    }

    fn run_with<F: WorkingFs + ?Sized>(
        &self,
        orchestrator: &MergeOrchestrator<'_, F>,
        request: &MergeRequest,
    ) -> Result<MergeOutcome, MergeError> {
        let access = WcAccess::open(&self.store, self.dir.path()).unwrap();
        let result = orchestrator.merge(request, &access);
        access.close().unwrap();
        result
    }

    fn run(&self, request: &MergeRequest) -> Result<MergeOutcome, MergeError> {
        self.run_with(&self.orchestrator(), request)
    }

    fn wc_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
    }

    fn read(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.dir.path().join(name)).unwrap()
    }

    fn conflict(&self, target: &Path) -> ConflictRecord {
        self.store.entry(target).unwrap().unwrap().conflict
    }
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap()
}

// Writing a script while another thread forks can leave it "text file busy".
static SPAWN: Mutex<()> = Mutex::new(());

/// Write an executable shell script, or `None` without `/bin/sh`.
#[cfg(unix)]
fn shell_tool(dir: &Path, body: &str) -> Option<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    if !Path::new("/bin/sh").exists() {
        eprintln!("skipping: /bin/sh not available");
        return None;
    }
    let path = dir.join("diff3-tool");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    Some(path)
}

// ===========================================================================
// Outcomes
// ===========================================================================

#[test]
fn unversioned_target_is_not_merged() {
    let wc = Wc::new();
    let target = wc.dir.path().join("loose.txt");
    std::fs::write(&target, b"a\n").unwrap();
    let (left, right) = wc.revisions(b"a\n", b"b\n");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::NoMerge);
    assert_eq!(wc.read("loose.txt"), b"a\n");
    assert_eq!(wc.wc_files(), vec!["loose.txt"]);
    assert!(wc.store.entry(&target).unwrap().is_none());
}

#[test]
fn identical_inputs_are_unchanged() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"same\n", Entry::new("f.txt", 1));
    let (left, right) = wc.revisions(b"same\n", b"same\n");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert_eq!(wc.read("f.txt"), b"same\n");
    assert_eq!(wc.wc_files(), vec!["f.txt"]);
    assert!(wc.scratch_is_empty());
}

#[test]
fn adjacent_edits_merge_cleanly() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"A\nX\nC\n", Entry::new("f.txt", 3));
    let (left, right) = wc.revisions(b"A\nB\nC\n", b"A\nB\nY\n");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::Merged);
    assert_eq!(text(wc.read("f.txt")), "A\nX\nY\n");
    assert_eq!(wc.wc_files(), vec!["f.txt"]);
    assert!(wc.conflict(&target).is_empty());
    assert!(wc.scratch_is_empty());
}

#[test]
fn overlapping_edits_conflict_with_default_markers() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"a\nX\nc\n", Entry::new("f.txt", 3));
    let (left, right) = wc.revisions(b"a\nb\nc\n", b"a\nY\nc\n");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::Conflicted);
    assert_eq!(
        text(wc.read("f.txt")),
        "a\n<<<<<<< .working\nX\n=======\nY\n>>>>>>> .new\nc\n"
    );
}

#[test]
fn display_original_adds_base_section() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"a\nX\nc\n", Entry::new("f.txt", 3));
    let (left, right) = wc.revisions(b"a\nb\nc\n", b"a\nY\nc\n");

    let orchestrator = wc.orchestrator().with_display_original(true);
    let outcome = wc
        .run_with(&orchestrator, &MergeRequest::new(&left, &right, &target))
        .unwrap();

    assert_eq!(outcome, MergeOutcome::Conflicted);
    assert_eq!(
        text(wc.read("f.txt")),
        "a\n<<<<<<< .working\nX\n||||||| .old\nb\n=======\nY\n>>>>>>> .new\nc\n"
    );
}

// ===========================================================================
// Conflict archiving
// ===========================================================================

#[test]
fn text_conflict_writes_three_backups_and_records_them() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"a\nX\nc\n", Entry::new("f.txt", 3));
    let (left, right) = wc.revisions(b"a\nb\nc\n", b"a\nY\nc\n");

    let request = MergeRequest::new(&left, &right, &target).with_labels(
        Some(".r3"),
        Some("r4"),
        Some(".mine"),
    );
    let outcome = wc.run(&request).unwrap();

    assert_eq!(outcome, MergeOutcome::Conflicted);
    assert_eq!(
        wc.wc_files(),
        vec!["f.txt", "f.txt.mine", "f.txt.r3", "f.txt.r4"]
    );
    assert_eq!(wc.read("f.txt.r3"), b"a\nb\nc\n");
    assert_eq!(wc.read("f.txt.r4"), b"a\nY\nc\n");
    assert_eq!(wc.read("f.txt.mine"), b"a\nX\nc\n");
    assert!(text(wc.read("f.txt")).contains("<<<<<<< .mine\n"));
    assert!(text(wc.read("f.txt")).contains(">>>>>>> r4\n"));

    assert_eq!(
        wc.conflict(&target),
        ConflictRecord {
            conflict_old: Some("f.txt.r3".into()),
            conflict_new: Some("f.txt.r4".into()),
            conflict_wrk: Some("f.txt.mine".into()),
        }
    );

    let access = WcAccess::open(&wc.store, wc.dir.path()).unwrap();
    assert!(access.is_text_conflicted(&target).unwrap());
    access.close().unwrap();
    assert!(wc.scratch_is_empty());
}

#[test]
fn repeated_conflicts_get_fresh_backup_names() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"a\nX\nc\n", Entry::new("f.txt", 3));
    let (left, right) = wc.revisions(b"a\nb\nc\n", b"a\nY\nc\n");
    std::fs::write(wc.dir.path().join("f.txt.old"), b"someone else's").unwrap();

    wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(wc.conflict(&target).conflict_old.as_deref(), Some("f.txt.2.old"));
    assert_eq!(wc.read("f.txt.old"), b"someone else's");
}

#[test]
fn binary_conflict_archives_left_and_right_only() {
    let wc = Wc::new();
    let entry = Entry::new("img.png", 8).with_prop("svn:mime-type", "application/octet-stream");
    let target = wc.versioned("img.png", b"\x89PNG mine", entry);
    let (left, right) = wc.revisions(b"\x89PNG base", b"\x89PNG theirs");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::Conflicted);
    assert_eq!(wc.wc_files(), vec!["img.png", "img.png.new", "img.png.old"]);
    assert_eq!(wc.read("img.png"), b"\x89PNG mine");
    assert_eq!(wc.read("img.png.old"), b"\x89PNG base");
    assert_eq!(wc.read("img.png.new"), b"\x89PNG theirs");

    let record = wc.conflict(&target);
    assert_eq!(record.conflict_old.as_deref(), Some("img.png.old"));
    assert_eq!(record.conflict_new.as_deref(), Some("img.png.new"));
    assert_eq!(record.conflict_wrk, None);
}

#[test]
fn binary_target_ignores_translation_properties() {
    let wc = Wc::new();
    let entry = Entry::new("blob.bin", 2)
        .with_prop("svn:mime-type", "application/octet-stream")
        .with_prop("svn:eol-style", "bogus")
        .with_prop("svn:keywords", "Rev");
    let target = wc.versioned("blob.bin", b"\0mine $Rev: 2 $\r\n", entry);
    let (left, right) = wc.revisions(b"\0base\n", b"\0theirs\n");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::Conflicted);
    assert_eq!(wc.read("blob.bin"), b"\0mine $Rev: 2 $\r\n");
    assert_eq!(wc.read("blob.bin.old"), b"\0base\n");
    assert_eq!(wc.read("blob.bin.new"), b"\0theirs\n");
}

// ===========================================================================
// Dry run
// ===========================================================================

#[test]
fn dry_run_has_no_side_effects() {
    let wc = Wc::new();
    let clean = wc.versioned("clean.txt", b"A\nX\nC\n", Entry::new("clean.txt", 1));
    let conflicted = wc.versioned("conf.txt", b"a\nX\nc\n", Entry::new("conf.txt", 1));
    let binary = wc.versioned(
        "bin.dat",
        b"\0mine",
        Entry::new("bin.dat", 1).with_prop("svn:mime-type", "application/x-foo"),
    );

    let (left, right) = wc.revisions(b"A\nB\nC\n", b"A\nB\nY\n");
    let outcome = wc
        .run(&MergeRequest::new(&left, &right, &clean).dry_run(true))
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Merged);

    let (left, right) = wc.revisions(b"a\nb\nc\n", b"a\nY\nc\n");
    let outcome = wc
        .run(&MergeRequest::new(&left, &right, &conflicted).dry_run(true))
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Conflicted);

    let outcome = wc
        .run(&MergeRequest::new(&left, &right, &binary).dry_run(true))
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Conflicted);

    assert_eq!(wc.wc_files(), vec!["bin.dat", "clean.txt", "conf.txt"]);
    assert_eq!(wc.read("clean.txt"), b"A\nX\nC\n");
    assert_eq!(wc.read("conf.txt"), b"a\nX\nc\n");
    assert_eq!(wc.read("bin.dat"), b"\0mine");
    for path in [&clean, &conflicted, &binary] {
        assert!(wc.conflict(path).is_empty());
    }
    assert!(wc.scratch_is_empty());
}

#[test]
fn dry_run_unchanged_has_no_side_effects() {
    let wc = Wc::new();
    let entry = Entry::new("same.sh", 1).with_prop("svn:executable", "*");
    let target = wc.versioned("same.sh", b"s\n", entry);
    let (left, right) = wc.revisions(b"s\n", b"s\n");

    let outcome = wc
        .run(&MergeRequest::new(&left, &right, &target).dry_run(true))
        .unwrap();

    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert_eq!(wc.wc_files(), vec!["same.sh"]);
    assert_eq!(wc.read("same.sh"), b"s\n");
    assert!(wc.conflict(&target).is_empty());
    assert!(wc.scratch_is_empty());
}

#[cfg(unix)]
#[test]
fn dry_run_through_external_tool_has_no_side_effects() {
    let _guard = SPAWN.lock().unwrap_or_else(|e| e.into_inner());
    let wc = Wc::new();
    let tools = tempfile::tempdir().unwrap();
    let Some(conflicting) = shell_tool(tools.path(), "echo '<<<<<<< mine'; exit 1") else {
        return;
    };

    let entry = Entry::new("f.txt", 1).with_prop("svn:eol-style", "CRLF");
    let target = wc.versioned("f.txt", b"x\r\n", entry);
    let (left, right) = wc.revisions(b"y\n", b"z\n");

    let request = MergeRequest::new(&left, &right, &target)
        .with_diff3_cmd(&conflicting)
        .dry_run(true);
    assert_eq!(wc.run(&request).unwrap(), MergeOutcome::Conflicted);

    let clean = tools.path().join("clean-tool");
    std::fs::write(&clean, "#!/bin/sh\necho merged\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&clean, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    let request = MergeRequest::new(&left, &right, &target)
        .with_diff3_cmd(&clean)
        .dry_run(true);
    assert_eq!(wc.run(&request).unwrap(), MergeOutcome::Merged);

    assert_eq!(wc.wc_files(), vec!["f.txt"]);
    assert_eq!(wc.read("f.txt"), b"x\r\n");
    assert!(wc.conflict(&target).is_empty());
    assert!(wc.scratch_is_empty());
}

// ===========================================================================
// Translation
// ===========================================================================

#[test]
fn keywords_and_line_endings_survive_a_merge() {
    let wc = Wc::new();
    let entry = Entry::new("main.c", 7)
        .with_prop("svn:keywords", "Rev")
        .with_prop("svn:eol-style", "CRLF");
    let target = wc.versioned("main.c", b"/* $Rev: 7 $ */\r\nA\r\nX\r\nC\r\n", entry);
    let (left, right) = wc.revisions(b"/* $Rev$ */\nA\nB\nC\n", b"/* $Rev$ */\nA\nB\nY\n");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::Merged);
    assert_eq!(wc.read("main.c"), b"/* $Rev: 7 $ */\r\nA\r\nX\r\nY\r\n");
}

#[test]
fn expanded_keywords_alone_are_not_a_change() {
    let wc = Wc::new();
    let entry = Entry::new("main.c", 7).with_prop("svn:keywords", "Revision");
    let target = wc.versioned("main.c", b"$Revision: 7 $\nbody\n", entry);
    let (left, right) = wc.revisions(b"$Revision$\nbody\n", b"$Revision$\nbody\n");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();
    assert_eq!(outcome, MergeOutcome::Unchanged);
}

#[test]
fn text_conflict_backups_are_in_working_form() {
    let wc = Wc::new();
    let entry = Entry::new("f.txt", 2).with_prop("svn:eol-style", "CRLF");
    let target = wc.versioned("f.txt", b"a\r\nX\r\nc\r\n", entry);
    let (left, right) = wc.revisions(b"a\nb\nc\n", b"a\nY\nc\n");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::Conflicted);
    assert_eq!(wc.read("f.txt.old"), b"a\r\nb\r\nc\r\n");
    assert_eq!(wc.read("f.txt.new"), b"a\r\nY\r\nc\r\n");
    assert_eq!(wc.read("f.txt.working"), b"a\r\nX\r\nc\r\n");
    assert_eq!(
        wc.read("f.txt"),
        b"a\r\n<<<<<<< .working\r\nX\r\n=======\r\nY\r\n>>>>>>> .new\r\nc\r\n"
    );
}

#[test]
fn mixed_line_endings_under_native_style_fail() {
    let wc = Wc::new();
    let entry = Entry::new("f.txt", 2).with_prop("svn:eol-style", "native");
    let target = wc.versioned("f.txt", b"a\r\nb\nc\n", entry);
    let (left, right) = wc.revisions(b"a\nb\nc\n", b"a\nb\nd\n");

    let err = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap_err();

    assert!(matches!(err, MergeError::Translation(_)));
    assert_eq!(wc.read("f.txt"), b"a\r\nb\nc\n");
    assert!(wc.scratch_is_empty());
}

#[cfg(unix)]
#[test]
fn special_file_merges_as_symlink() {
    let wc = Wc::new();
    let target = wc.dir.path().join("link");
    std::os::unix::fs::symlink("old-target", &target).unwrap();
    wc.store
        .put_entry(&target, &Entry::new("link", 5).with_prop("svn:special", "*"))
        .unwrap();
    let (left, right) = wc.revisions(b"link old-target", b"link new-target");

    let outcome = wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();

    assert_eq!(outcome, MergeOutcome::Merged);
    assert_eq!(std::fs::read_link(&target).unwrap(), PathBuf::from("new-target"));
}

// ===========================================================================
// Attributes
// ===========================================================================

#[cfg(unix)]
#[test]
fn attributes_restored_after_merge_but_not_when_unchanged() {
    let wc = Wc::new();
    let entry = Entry::new("run.sh", 4)
        .with_prop("svn:executable", "*")
        .with_prop("svn:needs-lock", "*");

    let target = wc.versioned("run.sh", b"A\nX\nC\n", entry.clone());
    let (left, right) = wc.revisions(b"A\nB\nC\n", b"A\nB\nY\n");
    assert_eq!(
        wc.run(&MergeRequest::new(&left, &right, &target)).unwrap(),
        MergeOutcome::Merged
    );
    assert!(OsFs.is_executable(&target).unwrap());
    assert!(OsFs.is_read_only(&target).unwrap());

    let same = wc.versioned("same.sh", b"s\n", Entry { name: "same.sh".into(), ..entry });
    let (left, right) = wc.revisions(b"s\n", b"s\n");
    assert_eq!(
        wc.run(&MergeRequest::new(&left, &right, &same)).unwrap(),
        MergeOutcome::Unchanged
    );
    assert!(!OsFs.is_executable(&same).unwrap());
    assert!(!OsFs.is_read_only(&same).unwrap());
}

#[test]
fn held_lock_keeps_file_writable() {
    let wc = Wc::new();
    let mut entry = Entry::new("doc.txt", 4).with_prop("svn:needs-lock", "*");
    entry.lock_token = Some("opaquelocktoken:1234".into());
    let target = wc.versioned("doc.txt", b"A\nX\nC\n", entry);
    let (left, right) = wc.revisions(b"A\nB\nC\n", b"A\nB\nY\n");

    wc.run(&MergeRequest::new(&left, &right, &target)).unwrap();
    assert!(!OsFs.is_read_only(&target).unwrap());
}

// ===========================================================================
// Engines
// ===========================================================================

/// Engine that always reports a conflict with fixed output.
struct CannedEngine;

impl DiffEngine for CannedEngine {
    fn name(&self) -> &str {
        "canned"
    }

    fn merge(&self, _inputs: &Diff3Inputs<'_>, output: &Path) -> Result<Diff3Status, MergeError> {
        std::fs::write(output, b"canned\n").map_err(MergeError::io("write", output))?;
        Ok(Diff3Status::Conflicted)
    }
}

#[test]
fn injected_engine_is_used() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"mine\n", Entry::new("f.txt", 1));
    let (left, right) = wc.revisions(b"base\n", b"theirs\n");

    let orchestrator = wc.orchestrator().with_engine(Box::new(CannedEngine));
    let outcome = wc
        .run_with(&orchestrator, &MergeRequest::new(&left, &right, &target))
        .unwrap();

    assert_eq!(outcome, MergeOutcome::Conflicted);
    assert_eq!(wc.read("f.txt"), b"canned\n");
    assert_eq!(wc.read("f.txt.working"), b"mine\n");
}

#[test]
fn unknown_internal_option_is_rejected() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"a\n", Entry::new("f.txt", 1));
    let (left, right) = wc.revisions(b"a\n", b"b\n");

    let request = MergeRequest::new(&left, &right, &target).with_options(["--bogus"]);
    let err = wc.run(&request).unwrap_err();
    assert!(matches!(err, MergeError::InvalidDiffOption(ref o) if o == "--bogus"));
    assert_eq!(wc.read("f.txt"), b"a\n");
}

#[test]
fn internal_whitespace_option_applies() {
    let wc = Wc::new();
    let target = wc.versioned("f.txt", b"a\nb  b\nc\n", Entry::new("f.txt", 1));
    let (left, right) = wc.revisions(b"a\nb b\nc\n", b"a\nb b\nd\n");

    let request = MergeRequest::new(&left, &right, &target).with_options(["-b"]);
    assert_eq!(wc.run(&request).unwrap(), MergeOutcome::Merged);
    assert_eq!(wc.read("f.txt"), b"a\nb  b\nd\n");
}

#[cfg(unix)]
#[test]
fn external_tool_runs_on_scratch_copies() {
    let _guard = SPAWN.lock().unwrap_or_else(|e| e.into_inner());
    let wc = Wc::new();
    let tools = tempfile::tempdir().unwrap();
    let seen = tools.path().join("seen");
    // $9 mine, $10 older, $11 yours; emit yours as the merge result.
    let body = format!(
        r#"for f in "$9" "${{10}}" "${{11}}"; do dirname "$f"; done > "{}"; cat "${{11}}""#,
        seen.display()
    );
    let Some(tool) = shell_tool(tools.path(), &body) else {
        return;
    };

    let target = wc.versioned("f.txt", b"A\nB\nC\n", Entry::new("f.txt", 1));
    let (left, right) = wc.revisions(b"A\nB\nC\n", b"A\nB\nZ\n");

    let request = MergeRequest::new(&left, &right, &target).with_diff3_cmd(&tool);
    let outcome = wc.run(&request).unwrap();

    assert_eq!(outcome, MergeOutcome::Merged);
    assert_eq!(wc.read("f.txt"), b"A\nB\nZ\n");
    let scratch = wc.scratch.path().to_string_lossy().into_owned();
    let dirs = std::fs::read_to_string(&seen).unwrap();
    assert_eq!(dirs.lines().collect::<Vec<_>>(), vec![scratch.as_str(); 3]);
    assert!(wc.scratch_is_empty());
}

#[cfg(unix)]
#[test]
fn external_tool_conflict_exit_code() {
    let _guard = SPAWN.lock().unwrap_or_else(|e| e.into_inner());
    let wc = Wc::new();
    let tools = tempfile::tempdir().unwrap();
    let Some(tool) = shell_tool(tools.path(), "echo '<<<<<<< mine'; exit 1") else {
        return;
    };

    let target = wc.versioned("f.txt", b"x\n", Entry::new("f.txt", 1));
    let (left, right) = wc.revisions(b"y\n", b"z\n");

    let request = MergeRequest::new(&left, &right, &target).with_diff3_cmd(&tool);
    assert_eq!(wc.run(&request).unwrap(), MergeOutcome::Conflicted);
    assert_eq!(wc.read("f.txt"), b"<<<<<<< mine\n");
    assert_eq!(wc.wc_files(), vec!["f.txt", "f.txt.new", "f.txt.old", "f.txt.working"]);
}

#[cfg(unix)]
#[test]
fn external_tool_failure_aborts_cleanly() {
    let _guard = SPAWN.lock().unwrap_or_else(|e| e.into_inner());
    let wc = Wc::new();
    let tools = tempfile::tempdir().unwrap();
    let Some(tool) = shell_tool(tools.path(), "echo 'diff3: bad input' >&2; exit 2") else {
        return;
    };

    let target = wc.versioned("f.txt", b"x\n", Entry::new("f.txt", 1));
    let (left, right) = wc.revisions(b"y\n", b"z\n");

    let request = MergeRequest::new(&left, &right, &target).with_diff3_cmd(&tool);
    let err = wc.run(&request).unwrap_err();

    match err {
        MergeError::ExternalTool { exit_code, stderr, .. } => {
            assert_eq!(exit_code, Some(2));
            assert_eq!(stderr, "diff3: bad input");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(wc.read("f.txt"), b"x\n");
    assert_eq!(wc.wc_files(), vec!["f.txt"]);
    assert!(wc.conflict(&target).is_empty());
    assert!(wc.scratch_is_empty());
}

// ===========================================================================
// Filesystem failures
// ===========================================================================

/// The real filesystem, except that atomic replacement always fails.
struct NoReplaceFs;

impl WorkingFs for NoReplaceFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        OsFs.read(path)
    }
    fn read_link(&self, path: &Path) -> io::Result<Option<PathBuf>> {
        OsFs.read_link(path)
    }
    fn scoped_temp(&self, dir: &Path, stem: &str, contents: &[u8]) -> io::Result<TempPath> {
        OsFs.scoped_temp(dir, stem, contents)
    }
    fn reserve_unique(&self, base: &Path, suffix: &str) -> io::Result<PathBuf> {
        OsFs.reserve_unique(base, suffix)
    }
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        OsFs.copy(from, to)
    }
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        OsFs.write(path, contents)
    }
    fn remove(&self, path: &Path) -> io::Result<()> {
        OsFs.remove(path)
    }
    fn replace(&self, _target: &Path, _contents: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "replace refused"))
    }
    fn replace_with_symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        OsFs.replace_with_symlink(target, link)
    }
    fn contents_same(&self, a: &Path, b: &Path) -> io::Result<bool> {
        OsFs.contents_same(a, b)
    }
    fn is_executable(&self, path: &Path) -> io::Result<bool> {
        OsFs.is_executable(path)
    }
    fn set_executable(&self, path: &Path, executable: bool) -> io::Result<()> {
        OsFs.set_executable(path, executable)
    }
    fn is_read_only(&self, path: &Path) -> io::Result<bool> {
        OsFs.is_read_only(path)
    }
    fn set_read_only(&self, path: &Path, read_only: bool) -> io::Result<()> {
        OsFs.set_read_only(path, read_only)
    }
}

#[test]
fn io_failure_propagates_and_cleans_temporaries() {
    let wc = Wc::new();
    let entry = Entry::new("f.txt", 1).with_prop("svn:eol-style", "LF");
    let target = wc.versioned("f.txt", b"A\nX\nC\n", entry);
    let (left, right) = wc.revisions(b"A\nB\nC\n", b"A\nB\nY\n");

    let orchestrator = MergeOrchestrator::new(&NoReplaceFs).with_scratch_dir(wc.scratch.path());
    let err = wc
        .run_with(&orchestrator, &MergeRequest::new(&left, &right, &target))
        .unwrap_err();

    match err {
        MergeError::Io { op, path, .. } => {
            assert_eq!(op, "replace");
            assert_eq!(path, target);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(wc.read("f.txt"), b"A\nX\nC\n");
    assert!(wc.scratch_is_empty());
}
