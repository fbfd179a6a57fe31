//! Output formatting for the maiar CLI.
//!
//! Progress and summaries go to stderr as plain lines so stdout stays free
//! for scripting.

use crate::archive::packaging::ArchiveOutcome;
use crate::pipeline::BatchSummary;
use crate::repository::TransferOutcome;
use std::fmt::Display;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

fn packages(count: usize) -> String {
    let noun = if count == 1 { "package" } else { "packages" };
    format!("{count} {noun}")
}

/// Summarise a `pack` run.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use maiar::archive::packaging::ArchiveOutcome;
/// use maiar::output::pack_summary;
///
/// let outcomes = vec![ArchiveOutcome::Created {
///     archive_path: Utf8PathBuf::from("/srv/packages/foo.1.0.tar.bz2"),
/// }];
/// assert!(pack_summary(&outcomes).starts_with("Packed 1 package"));
/// ```
#[must_use]
pub fn pack_summary(outcomes: &[ArchiveOutcome]) -> String {
    let dry_run = outcomes
        .iter()
        .any(|outcome| matches!(outcome, ArchiveOutcome::DryRun { .. }));
    let verb = if dry_run { "Dry run - would pack" } else { "Packed" };
    let mut lines = vec![format!("{verb} {}:", packages(outcomes.len()))];
    lines.extend(
        outcomes
            .iter()
            .map(|outcome| format!("  - {}", outcome.archive_path())),
    );
    lines.join("\n")
}

/// Summarise a `push` run.
#[must_use]
pub fn push_summary(bucket: &str, outcomes: &[TransferOutcome]) -> String {
    let dry_run = outcomes
        .iter()
        .any(|outcome| matches!(outcome, TransferOutcome::DryRun { .. }));
    let verb = if dry_run { "Dry run - would push" } else { "Pushed" };
    let mut lines = vec![format!("{verb} {} to {bucket}:", packages(outcomes.len()))];
    lines.extend(outcomes.iter().map(|outcome| {
        let (TransferOutcome::DryRun { key } | TransferOutcome::Transferred { key }) = outcome;
        format!("  - {key}")
    }));
    lines.join("\n")
}

/// Summarise a download, build or install batch.
///
/// # Example
///
/// ```
/// use maiar::output::batch_summary;
/// use maiar::pipeline::{BatchSummary, Goal};
///
/// let summary = BatchSummary {
///     goal: Goal::Install,
///     completed: vec!["foo.1.0".parse()?],
///     dry_run: false,
/// };
/// assert_eq!(batch_summary(&summary), "1 package installed:\n  - foo.1.0");
/// # Ok::<(), maiar::error::MaiarError>(())
/// ```
#[must_use]
pub fn batch_summary(summary: &BatchSummary) -> String {
    let count = packages(summary.completed.len());
    let header = if summary.dry_run {
        format!("Dry run - would {} {count}:", summary.goal)
    } else {
        format!("{count} {}:", summary.goal.target_state())
    };
    let mut lines = vec![header];
    lines.extend(
        summary
            .completed
            .iter()
            .map(|identity| format!("  - {identity}")),
    );
    lines.join("\n")
}
