//! Terminal styling for command output.

use console::Style;

use wcmerge_core::MergeOutcome;

/// Green check mark followed by `msg`.
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Red cross followed by `msg`.
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Yellow warning sign followed by `msg`.
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// One-line summary of a merge outcome.
pub fn outcome(outcome: MergeOutcome, target: &str) -> String {
    match outcome {
        MergeOutcome::Merged => success(&format!("{target}: merged")),
        MergeOutcome::Unchanged => dim(&format!("{target}: unchanged")),
        MergeOutcome::Conflicted => error(&format!("{target}: conflicts")),
        MergeOutcome::NoMerge => warn(&format!("{target}: not under version control")),
    }
}
