//! The `fmt` goal: every enabled formatter over the workspace.
//!
//! Formatters run one after another in configured order, each seeing the
//! content left by the previous one. Within a formatter, units are split into
//! partitions of at most `batch-size` files that run concurrently. A formatter
//! that fails or errors is recorded in its report and the goal moves on to
//! the next one; only cancellation aborts the goal as a whole.

use crate::config::Config;
use crate::digest::Snapshot;
use crate::error::FmtError;
use crate::exit_codes;
use crate::formatter::{Formatter, FormatterRegistry};
use crate::pipeline::{FmtRequest, Pipeline};
use crate::reconcile::{ChangedFiles, FailedRun, FormatOutcome};
use crate::sandbox::ExecutionEngine;
use crate::tool::ToolProvisioner;
use crate::unit::SourceUnit;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Overall verdict for one formatter across its partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatterStatus {
    Skipped,
    Unchanged,
    Changed,
    /// The tool itself reported an error.
    Failed,
    /// The tool could not be run.
    Errored,
}

/// Results of one formatter, one entry per partition.
#[derive(Debug)]
pub struct FormatterReport {
    pub name: String,
    pub batches: Vec<Result<FormatOutcome, FmtError>>,
}

impl FormatterReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &FormatOutcome> {
        self.batches.iter().filter_map(|batch| batch.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = &FmtError> {
        self.batches.iter().filter_map(|batch| batch.as_ref().err())
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailedRun> {
        self.outcomes().filter_map(|outcome| match outcome {
            FormatOutcome::Failed(failed) => Some(failed),
            _ => None,
        })
    }

    /// Paths this formatter rewrote, sorted.
    pub fn changed_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .outcomes()
            .filter_map(|outcome| match outcome {
                FormatOutcome::Changed(changed) => Some(changed.changed_paths.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();
        paths.sort();
        paths
    }

    pub fn status(&self) -> FormatterStatus {
        if self.errors().next().is_some() {
            FormatterStatus::Errored
        } else if self.failures().next().is_some() {
            FormatterStatus::Failed
        } else if self.outcomes().any(FormatOutcome::did_change) {
            FormatterStatus::Changed
        } else if self.outcomes().all(|outcome| *outcome == FormatOutcome::Skipped) {
            FormatterStatus::Skipped
        } else {
            FormatterStatus::Unchanged
        }
    }
}

/// Result of the whole goal.
#[derive(Debug)]
pub struct FmtReport {
    pub check: bool,
    pub formatters: Vec<FormatterReport>,
    /// Final content of every file that differs from the workspace.
    pub changes: Snapshot,
    /// Workspace files a formatter deleted from its declared outputs, sorted.
    /// They are never deleted from disk.
    pub removed: Vec<String>,
}

impl FmtReport {
    pub fn changed_paths(&self) -> Vec<String> {
        self.changes.paths().map(str::to_string).collect()
    }

    pub fn exit_code(&self) -> i32 {
        let statuses: Vec<FormatterStatus> = self.formatters.iter().map(FormatterReport::status).collect();
        if statuses.contains(&FormatterStatus::Errored) {
            exit_codes::TOOL_ERROR
        } else if statuses.contains(&FormatterStatus::Failed)
            || !self.removed.is_empty()
            || (self.check && !self.changes.is_empty())
        {
            exit_codes::FORMAT_FAILED
        } else {
            exit_codes::SUCCESS
        }
    }
}

/// Configured run of several formatters.
#[derive(Debug)]
pub struct FmtGoal<'a> {
    registry: &'a FormatterRegistry,
    config: &'a Config,
    only: Option<Vec<String>>,
    check: bool,
}

impl<'a> FmtGoal<'a> {
    pub fn new(registry: &'a FormatterRegistry, config: &'a Config) -> Self {
        Self {
            registry,
            config,
            only: None,
            check: false,
        }
    }

    /// Run just these formatters, in this order, instead of `fmt.enabled`.
    pub fn only(mut self, names: Vec<String>) -> Self {
        self.only = Some(names);
        self
    }

    /// Report changes without expecting them to be written.
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    fn selected(&self) -> Result<Vec<Arc<dyn Formatter>>, FmtError> {
        let names = self.only.as_ref().unwrap_or(&self.config.fmt.enabled);
        names
            .iter()
            .map(|name| {
                self.registry
                    .get(name)
                    .ok_or_else(|| FmtError::UnknownFormatter(name.clone()))
            })
            .collect()
    }

    pub async fn run<E, P>(
        &self,
        pipeline: &Pipeline<E, P>,
        units: Vec<SourceUnit>,
        cancel: &CancellationToken,
    ) -> Result<FmtReport, FmtError>
    where
        E: ExecutionEngine,
        P: ToolProvisioner,
    {
        let formatters = self.selected()?;
        let original = snapshot_of(&units);
        let mut working = units;
        let mut reports = Vec::with_capacity(formatters.len());
        let batch_size = self.config.fmt.batch_size.max(1);

        for formatter in formatters {
            let name = formatter.name().to_string();
            let settings = self.config.settings(&name);

            let mut candidates: Vec<SourceUnit> = working
                .iter()
                .filter(|unit| formatter.sources().matches(&unit.path))
                .cloned()
                .collect();
            candidates.sort_by(|a, b| a.path.cmp(&b.path));

            let partitions: Vec<&[SourceUnit]> = if candidates.is_empty() {
                vec![&candidates[..]]
            } else {
                candidates.chunks(batch_size).collect()
            };
            log::debug!("{name}: {} unit(s) in {} partition(s)", candidates.len(), partitions.len());

            let batches = join_all(partitions.into_iter().map(|partition| {
                pipeline.run(FmtRequest::new(formatter.clone(), partition, settings.clone()), cancel)
            }))
            .await;

            if batches.iter().any(|batch| matches!(batch, Err(FmtError::Cancelled))) {
                return Err(FmtError::Cancelled);
            }

            for batch in &batches {
                match batch {
                    Ok(FormatOutcome::Changed(changed)) => apply(&mut working, changed),
                    Ok(FormatOutcome::Failed(failed)) => {
                        log::warn!("{name} exited with code {}", failed.exit_code);
                    }
                    Err(e) => log::warn!("{name}: {e}"),
                    Ok(_) => {}
                }
            }

            reports.push(FormatterReport { name, batches });
        }

        let current = snapshot_of(&working);
        let changes = Snapshot::from_shared(
            original
                .changed_paths(&current)
                .into_iter()
                .filter_map(|path| current.get_shared(&path).map(|content| (path, content))),
        );

        let removed: Vec<String> = original
            .paths()
            .filter(|path| !current.contains(path))
            .map(str::to_string)
            .collect();
        if !removed.is_empty() {
            log::warn!("{} file(s) deleted by formatters: {}", removed.len(), removed.join(", "));
        }

        Ok(FmtReport {
            check: self.check,
            formatters: reports,
            changes,
            removed,
        })
    }
}

fn snapshot_of(units: &[SourceUnit]) -> Snapshot {
    Snapshot::from_shared(units.iter().map(|unit| (unit.path.clone(), unit.content.clone())))
}

/// Carry rewritten content into the working set for the next formatter.
/// Changed paths missing from the output were deleted by the tool.
fn apply(units: &mut Vec<SourceUnit>, changed: &ChangedFiles) {
    units.retain(|unit| {
        changed.snapshot.contains(&unit.path) || changed.changed_paths.binary_search(&unit.path).is_err()
    });
    for unit in units.iter_mut() {
        if let Some(content) = changed.snapshot.get_shared(&unit.path) {
            *unit = unit.with_content(content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatterSettings;
    use crate::digest::ContentStore;
    use crate::error::{ExecutionInfraError, ToolResolutionError};
    use crate::process::ProcessSpec;
    use crate::sandbox::{ExecutionResult, ResultSource};
    use crate::tool::{ExecutableRef, ToolIdentity};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct Provisioner;

    impl ToolProvisioner for Provisioner {
        async fn resolve(&self, tool: &ToolIdentity) -> Result<ExecutableRef, ToolResolutionError> {
            if tool.binary == "missing" {
                return Err(ToolResolutionError::NotFound {
                    tool: tool.binary.clone(),
                    searched: String::new(),
                });
            }
            Ok(ExecutableRef {
                name: tool.binary.clone(),
                path: PathBuf::from(&tool.binary),
                version: None,
                env: BTreeMap::new(),
            })
        }
    }

    /// Engine whose behavior is chosen by the tool binary name:
    /// `upper` uppercases, `suffix` appends `!`, `crash` exits 3, `noop` does nothing,
    /// `delete` removes every `b*` file.
    #[derive(Default)]
    struct ScriptedEngine {
        store: ContentStore,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl ExecutionEngine for ScriptedEngine {
        async fn execute(&self, spec: ProcessSpec) -> Result<ExecutionResult, ExecutionInfraError> {
            self.batches.lock().unwrap().push(spec.output_files.clone());
            let input = self
                .store
                .get(&spec.input_digest)
                .ok_or(ExecutionInfraError::MissingDigest(spec.input_digest))?;
            let tool = spec.executable.name.as_str();
            let kept = input.iter().filter(|(path, _)| tool != "delete" || !path.starts_with('b'));
            let output = Snapshot::new(kept.map(|(path, content)| {
                let text = String::from_utf8_lossy(content);
                let rewritten = match tool {
                    "upper" => text.to_uppercase(),
                    "suffix" if !text.ends_with('!') => format!("{text}!"),
                    _ => text.into_owned(),
                };
                (path.to_string(), rewritten)
            }));
            Ok(ExecutionResult {
                exit_code: if tool == "crash" { 3 } else { 0 },
                stdout: String::new(),
                stderr: if tool == "crash" { "boom".to_string() } else { String::new() },
                output_digest: self.store.put(output),
                source: ResultSource::Executed,
            })
        }

        fn store(&self) -> &ContentStore {
            &self.store
        }
    }

    fn registry() -> FormatterRegistry {
        let config = Config::from_toml(
            r#"
[tools.upper]
command = ["upper"]
[tools.suffix]
command = ["suffix"]
[tools.crash]
command = ["crash"]
[tools.missing]
command = ["missing"]
[tools.noop]
command = ["noop"]
[tools.delete]
command = ["delete"]
"#,
        )
        .unwrap();
        FormatterRegistry::from_config(&config).unwrap()
    }

    fn config(enabled: &[&str]) -> Config {
        let mut config = Config::default();
        config.fmt.enabled = enabled.iter().map(|s| s.to_string()).collect();
        config
    }

    fn units() -> Vec<SourceUnit> {
        vec![SourceUnit::new("a.py", "a"), SourceUnit::new("b.py", "b"), SourceUnit::new("notes.txt", "n")]
    }

    fn pipeline() -> Pipeline<ScriptedEngine, Provisioner> {
        Pipeline::new(ScriptedEngine::default(), Provisioner)
    }

    #[tokio::test]
    async fn test_formatters_chain_in_order() {
        let registry = registry();
        let config = config(&["upper", "suffix"]);
        let report = FmtGoal::new(&registry, &config)
            .run(&pipeline(), units(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.formatters.len(), 2);
        assert_eq!(report.changed_paths(), vec!["a.py", "b.py"]);
        assert_eq!(report.changes.get("a.py"), Some(&b"A!"[..]));
        assert_eq!(report.formatters[0].status(), FormatterStatus::Changed);
        assert_eq!(report.formatters[1].changed_paths(), vec!["a.py", "b.py"]);
        assert_eq!(report.exit_code(), exit_codes::SUCCESS);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_siblings() {
        let registry = registry();
        let config = config(&["crash", "missing", "upper"]);
        let report = FmtGoal::new(&registry, &config)
            .run(&pipeline(), units(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.formatters[0].status(), FormatterStatus::Failed);
        assert_eq!(report.formatters[1].status(), FormatterStatus::Errored);
        assert_eq!(report.formatters[2].status(), FormatterStatus::Changed);
        assert_eq!(report.changes.get("b.py"), Some(&b"B"[..]));
        assert_eq!(report.exit_code(), exit_codes::TOOL_ERROR);
    }

    #[tokio::test]
    async fn test_failed_formatter_exit_code() {
        let registry = registry();
        let config = config(&["crash"]);
        let report = FmtGoal::new(&registry, &config)
            .run(&pipeline(), units(), &CancellationToken::new())
            .await
            .unwrap();
        let failure = report.formatters[0].failures().next().unwrap();
        assert_eq!(failure.diagnostics(), "boom");
        assert_eq!(report.exit_code(), exit_codes::FORMAT_FAILED);
    }

    #[tokio::test]
    async fn test_check_mode_flags_changes() {
        let registry = registry();
        let config = config(&["upper"]);
        let goal = FmtGoal::new(&registry, &config).check(true);

        let report = goal.run(&pipeline(), units(), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.exit_code(), exit_codes::FORMAT_FAILED);

        let clean = vec![SourceUnit::new("a.py", "A")];
        let report = goal.run(&pipeline(), clean, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.formatters[0].status(), FormatterStatus::Unchanged);
        assert_eq!(report.exit_code(), exit_codes::SUCCESS);
    }

    #[tokio::test]
    async fn test_deleted_outputs_are_reported() {
        let registry = registry();
        let cfg = config(&["delete", "upper"]);

        let report = FmtGoal::new(&registry, &cfg)
            .check(true)
            .run(&pipeline(), units(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.formatters[0].status(), FormatterStatus::Changed);
        assert_eq!(report.formatters[0].changed_paths(), vec!["b.py"]);
        assert_eq!(report.formatters[1].changed_paths(), vec!["a.py"]);
        assert_eq!(report.removed, vec!["b.py"]);
        assert_eq!(report.changed_paths(), vec!["a.py"]);
        assert_eq!(report.exit_code(), exit_codes::FORMAT_FAILED);

        let only_b = vec![SourceUnit::new("b.py", "b")];
        let report = FmtGoal::new(&registry, &config(&["delete"]))
            .check(true)
            .run(&pipeline(), only_b, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.changes.is_empty());
        assert_eq!(report.removed, vec!["b.py"]);
        assert_eq!(report.exit_code(), exit_codes::FORMAT_FAILED);
    }

    #[tokio::test]
    async fn test_partitions_respect_batch_size() {
        let registry = registry();
        let mut config = config(&["noop"]);
        config.fmt.batch_size = 2;
        let units: Vec<SourceUnit> = (0..5).map(|i| SourceUnit::new(format!("m{i}.py"), "x")).collect();
        let pipeline = pipeline();

        let report = FmtGoal::new(&registry, &config)
            .run(&pipeline, units, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.formatters[0].batches.len(), 3);
        let mut batches = pipeline.engine().batches.lock().unwrap().clone();
        batches.sort();
        assert_eq!(
            batches,
            vec![vec!["m0.py", "m1.py"], vec!["m2.py", "m3.py"], vec!["m4.py"]]
        );
    }

    #[tokio::test]
    async fn test_skipped_and_empty_formatters() {
        let registry = registry();
        let mut skipping = config(&["upper"]);
        skipping.formatters.insert(
            "upper".to_string(),
            FormatterSettings {
                skip: true,
                ..FormatterSettings::default()
            },
        );
        let report = FmtGoal::new(&registry, &skipping)
            .run(&pipeline(), units(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.formatters[0].status(), FormatterStatus::Skipped);
        assert!(report.changes.is_empty());

        let no_python = vec![SourceUnit::new("notes.txt", "n")];
        let report = FmtGoal::new(&registry, &config(&["upper"]))
            .run(&pipeline(), no_python, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.formatters[0].status(), FormatterStatus::Skipped);
    }

    #[tokio::test]
    async fn test_only_overrides_enabled() {
        let registry = registry();
        let config = config(&["upper"]);
        let report = FmtGoal::new(&registry, &config)
            .only(vec!["suffix".to_string()])
            .run(&pipeline(), units(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.formatters[0].name, "suffix");
        assert_eq!(report.changes.get("a.py"), Some(&b"a!"[..]));
    }

    #[tokio::test]
    async fn test_unknown_formatter() {
        let registry = registry();
        let config = config(&["gofmt"]);
        let result = FmtGoal::new(&registry, &config)
            .run(&pipeline(), units(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(FmtError::UnknownFormatter(name)) if name == "gofmt"));
    }

    #[tokio::test]
    async fn test_cancelled_goal_has_no_report() {
        let registry = registry();
        let config = config(&["upper"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = FmtGoal::new(&registry, &config).run(&pipeline(), units(), &cancel).await;
        assert!(matches!(result, Err(FmtError::Cancelled)));
    }
}
