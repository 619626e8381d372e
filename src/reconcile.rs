//! Turning raw execution results into formatting outcomes.

use crate::digest::Snapshot;
use crate::sandbox::ExecutionResult;

/// Files a formatter rewrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFiles {
    /// Content of every declared output after the run.
    pub snapshot: Snapshot,
    /// Paths whose content differs from the input, sorted.
    pub changed_paths: Vec<String>,
}

/// A formatter that exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRun {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Whatever the tool rewrote before failing, for debugging only.
    pub partial: Option<ChangedFiles>,
}

impl FailedRun {
    /// Captured output, stderr first.
    pub fn diagnostics(&self) -> String {
        match (self.stderr.trim(), self.stdout.trim()) {
            ("", "") => String::new(),
            (err, "") => err.to_string(),
            ("", out) => out.to_string(),
            (err, out) => format!("{err}\n{out}"),
        }
    }
}

/// Terminal state of one formatter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    /// The formatter was switched off or had nothing to do.
    Skipped,
    Unchanged,
    Changed(ChangedFiles),
    Failed(FailedRun),
}

impl FormatOutcome {
    pub fn did_change(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Short label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Unchanged => "unchanged",
            Self::Changed(_) => "changed",
            Self::Failed(_) => "failed",
        }
    }
}

/// Compare a run's output against its input.
///
/// A non-zero exit always wins over whatever happened to the files.
pub fn reconcile(input: &Snapshot, result: &ExecutionResult, output: Snapshot) -> FormatOutcome {
    let changes = (output.digest() != input.digest()).then(|| ChangedFiles {
        changed_paths: input.changed_paths(&output),
        snapshot: output,
    });

    if !result.success() {
        return FormatOutcome::Failed(FailedRun {
            exit_code: result.exit_code,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            partial: changes,
        });
    }

    match changes {
        Some(changed) => FormatOutcome::Changed(changed),
        None => FormatOutcome::Unchanged,
    }
}
