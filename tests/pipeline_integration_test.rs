//! End-to-end formatter runs through the local sandbox.
//!
//! The built-in `pyupgrade` formatter is pointed at fake scripts found on a
//! private search path, so nothing here needs Python installed.
#![cfg(unix)]

mod common;

use common::{APPEND_MARKER, PYUPGRADE_LIKE, SYNTAX_ERROR, fake_formatter, provisioner};
use pretty_assertions::assert_eq;
use sandfmt_lib::config::{Config, FormatterSettings};
use sandfmt_lib::digest::ContentStore;
use sandfmt_lib::eligibility;
use sandfmt_lib::error::{FmtError, ToolResolutionError};
use sandfmt_lib::formatter::FormatterRegistry;
use sandfmt_lib::goal::{FmtGoal, FormatterStatus};
use sandfmt_lib::memo::Memoized;
use sandfmt_lib::pipeline::{FmtRequest, Pipeline};
use sandfmt_lib::reconcile::FormatOutcome;
use sandfmt_lib::sandbox::{ExecutionEngine, LocalSandbox, ResultSource};
use sandfmt_lib::tool::{PathProvisioner, ToolProvisioner};
use sandfmt_lib::unit::SourceUnit;
use sandfmt_lib::{Formatter, exit_codes};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn pyupgrade() -> Arc<dyn Formatter> {
    FormatterRegistry::builtin().get("pyupgrade").unwrap()
}

fn pipeline(bin: &TempDir) -> Pipeline<Memoized<LocalSandbox>, PathProvisioner> {
    Pipeline::new(Memoized::new(LocalSandbox::new(ContentStore::new())), provisioner(bin.path()))
}

fn bin_with(body: &str) -> TempDir {
    let bin = tempfile::tempdir().unwrap();
    fake_formatter(bin.path(), "pyupgrade", body);
    bin
}

#[tokio::test]
async fn test_rewrites_file_and_reports_change() {
    let bin = bin_with(PYUPGRADE_LIKE);
    let pipeline = pipeline(&bin);
    let units = vec![SourceUnit::new("a.py", "x = set([1, 2])\n")];

    let outcome = pipeline
        .run(
            FmtRequest::new(pyupgrade(), &units, FormatterSettings::default()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let FormatOutcome::Changed(changed) = outcome else {
        panic!("expected a change");
    };
    assert_eq!(changed.changed_paths, vec!["a.py"]);
    assert_eq!(changed.snapshot.get("a.py"), Some(&b"x = {1, 2}\n"[..]));
}

#[tokio::test]
async fn test_already_formatted_input_is_unchanged() {
    let bin = bin_with(PYUPGRADE_LIKE);
    let pipeline = pipeline(&bin);
    let units = vec![SourceUnit::new("a.py", "x = {1, 2}\n")];

    let outcome = pipeline
        .run(
            FmtRequest::new(pyupgrade(), &units, FormatterSettings::default()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, FormatOutcome::Unchanged);
}

#[tokio::test]
async fn test_formatting_is_idempotent() {
    let bin = bin_with(PYUPGRADE_LIKE);
    let pipeline = pipeline(&bin);
    let units = vec![SourceUnit::new("a.py", "x = set([1, 2])\n")];
    let cancel = CancellationToken::new();

    let first = pipeline
        .run(FmtRequest::new(pyupgrade(), &units, FormatterSettings::default()), &cancel)
        .await
        .unwrap();
    let FormatOutcome::Changed(changed) = first else {
        panic!("expected a change");
    };

    let rerun: Vec<SourceUnit> = units
        .iter()
        .map(|unit| unit.with_content(changed.snapshot.get_shared(&unit.path).unwrap()))
        .collect();
    let second = pipeline
        .run(FmtRequest::new(pyupgrade(), &rerun, FormatterSettings::default()), &cancel)
        .await
        .unwrap();
    assert_eq!(second, FormatOutcome::Unchanged);
}

#[tokio::test]
async fn test_syntax_error_is_failed_outcome() {
    let bin = bin_with(SYNTAX_ERROR);
    let pipeline = pipeline(&bin);
    let units = vec![SourceUnit::new("broken.py", "def (:\n")];

    let outcome = pipeline
        .run(
            FmtRequest::new(pyupgrade(), &units, FormatterSettings::default()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let FormatOutcome::Failed(failed) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failed.exit_code, 2);
    assert!(failed.diagnostics().contains("SyntaxError"));
    assert!(failed.partial.is_none());
}

#[tokio::test]
async fn test_opted_out_unit_is_untouched() {
    let bin = bin_with(APPEND_MARKER);
    let pipeline = pipeline(&bin);
    let units = vec![
        SourceUnit::new("keep.py", "a = 1\n"),
        SourceUnit::new("legacy.py", "b = 2\n").skipping("pyupgrade"),
    ];

    let outcome = pipeline
        .run(
            FmtRequest::new(pyupgrade(), &units, FormatterSettings::default()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let FormatOutcome::Changed(changed) = outcome else {
        panic!("expected a change");
    };
    assert_eq!(changed.changed_paths, vec!["keep.py"]);
    assert!(!changed.snapshot.contains("legacy.py"));
}

#[tokio::test]
async fn test_identical_runs_are_memoized() {
    let bin = bin_with(APPEND_MARKER);
    let pipeline = pipeline(&bin);
    let units = vec![SourceUnit::new("a.py", "a = 1\n")];
    let cancel = CancellationToken::new();

    let first = pipeline
        .run(FmtRequest::new(pyupgrade(), &units, FormatterSettings::default()), &cancel)
        .await
        .unwrap();
    let second = pipeline
        .run(FmtRequest::new(pyupgrade(), &units, FormatterSettings::default()), &cancel)
        .await
        .unwrap();

    assert_eq!(first, second);
    let stats = pipeline.engine().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_rerun_without_memo_is_deterministic() {
    let bin = bin_with(PYUPGRADE_LIKE);
    let formatter = pyupgrade();
    let settings = FormatterSettings::default();
    let units = vec![SourceUnit::new("a.py", "x = set([1, 2])\n"), SourceUnit::new("b.py", "y = 1\n")];

    let eligible = eligibility::filter(&units, formatter.name(), formatter.sources());
    let executable = provisioner(bin.path()).resolve(&formatter.tool(&settings)).await.unwrap();
    let spec = formatter.build_process(&eligible, executable, &settings);

    let sandbox = LocalSandbox::new(ContentStore::new());
    sandbox.store().put(eligible.snapshot().clone());

    let first = sandbox.execute(spec.clone()).await.unwrap();
    let second = sandbox.execute(spec).await.unwrap();

    assert_eq!(first.source, ResultSource::Executed);
    assert_eq!(second.source, ResultSource::Executed);
    assert_eq!(first.exit_code, 0);
    assert_eq!(first.output_digest, second.output_digest);
    assert_ne!(first.output_digest, eligible.digest());
}

#[tokio::test]
async fn test_missing_tool_is_resolution_error() {
    let bin = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&bin);
    let units = vec![SourceUnit::new("a.py", "a = 1\n")];

    let err = pipeline
        .run(
            FmtRequest::new(pyupgrade(), &units, FormatterSettings::default()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FmtError::ToolResolution(ToolResolutionError::NotFound { ref tool, .. }) if tool == "pyupgrade"
    ));
}

#[tokio::test]
async fn test_goal_chains_formatters_through_sandbox() {
    let bin = tempfile::tempdir().unwrap();
    fake_formatter(bin.path(), "pyupgrade", PYUPGRADE_LIKE);
    fake_formatter(bin.path(), "marker", APPEND_MARKER);
    fake_formatter(bin.path(), "broken", SYNTAX_ERROR);

    let config = Config::from_toml(
        r#"
[fmt]
enabled = ["pyupgrade", "broken", "marker"]
batch-size = 1

[tools.marker]
command = ["marker"]

[tools.broken]
command = ["broken"]
"#,
    )
    .unwrap();
    let registry = FormatterRegistry::from_config(&config).unwrap();
    let pipeline = pipeline(&bin);
    let units = vec![
        SourceUnit::new("a.py", "x = set([1, 2])\n"),
        SourceUnit::new("b.py", "y = 2\n"),
    ];

    let report = FmtGoal::new(&registry, &config)
        .run(&pipeline, units, &CancellationToken::new())
        .await
        .unwrap();

    let statuses: Vec<FormatterStatus> = report.formatters.iter().map(|f| f.status()).collect();
    assert_eq!(
        statuses,
        vec![FormatterStatus::Changed, FormatterStatus::Failed, FormatterStatus::Changed]
    );
    assert_eq!(report.formatters[0].batches.len(), 2);
    assert_eq!(report.changes.get("a.py"), Some(&b"x = {1, 2}\n# formatted\n"[..]));
    assert_eq!(report.changes.get("b.py"), Some(&b"y = 2\n# formatted\n"[..]));
    assert_eq!(report.exit_code(), exit_codes::FORMAT_FAILED);
    assert!(pipeline.store().len() > 0);
    assert!(pipeline.engine().inner().store().len() > 0);
}
