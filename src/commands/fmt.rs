//! Handler for the `fmt` command.

use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use sandfmt_lib::digest::ContentStore;
use sandfmt_lib::error::FmtError;
use sandfmt_lib::exit_codes;
use sandfmt_lib::formatter::{Formatter, FormatterRegistry};
use sandfmt_lib::goal::{FmtGoal, FmtReport, FormatterStatus};
use sandfmt_lib::memo::Memoized;
use sandfmt_lib::pipeline::Pipeline;
use sandfmt_lib::sandbox::LocalSandbox;
use sandfmt_lib::tool::PathProvisioner;
use sandfmt_lib::utils::pluralize;
use sandfmt_lib::workspace::{self, OverrideRules};

use crate::FmtArgs;

/// Handle the fmt command: format files and write the results back.
pub async fn handle_fmt(args: FmtArgs, config_path: Option<&Path>, quiet: bool) -> i32 {
    match run(args, config_path, quiet).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {e:#}", "Error".red().bold());
            exit_codes::TOOL_ERROR
        }
    }
}

async fn run(args: FmtArgs, config_path: Option<&Path>, quiet: bool) -> anyhow::Result<i32> {
    let start = Instant::now();
    let cwd = std::env::current_dir()?;
    let (config, root) = super::load_config(config_path, &cwd)?;
    let registry = FormatterRegistry::from_config(&config)?;
    let overrides = OverrideRules::new(&config.overrides)?;

    let names = if args.only.is_empty() {
        config.fmt.enabled.clone()
    } else {
        args.only.clone()
    };
    if names.is_empty() {
        if !quiet {
            println!("No formatters enabled. Add some to [fmt] enabled or pass --only.");
        }
        return Ok(exit_codes::SUCCESS);
    }

    let mut goal = FmtGoal::new(&registry, &config).check(args.check);
    if !args.only.is_empty() {
        goal = goal.only(args.only.clone());
    }

    let formatters = names
        .iter()
        .map(|name| registry.get(name).ok_or_else(|| FmtError::UnknownFormatter(name.clone())))
        .collect::<Result<Vec<Arc<dyn Formatter>>, _>>()?;
    let paths: Vec<PathBuf> = args.paths.iter().map(|path| cwd.join(path)).collect();
    let units = workspace::load_units(&root, &paths, &overrides, |path| {
        formatters.iter().any(|formatter| formatter.sources().matches(path))
    })?;
    if units.is_empty() {
        if !quiet {
            println!("No files to format.");
        }
        return Ok(exit_codes::SUCCESS);
    }
    let file_count = units.len();

    let mut sandbox_config = config.sandbox.clone();
    sandbox_config.keep_sandboxes |= args.keep_sandboxes;
    let engine = Memoized::new(LocalSandbox::from_config(ContentStore::new(), &sandbox_config));
    let pipeline = Pipeline::new(engine, PathProvisioner::from_env(&config.sandbox.env))
        .with_timeout(config.sandbox.timeout_ms());

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = goal.run(&pipeline, units, &cancel).await;
    interrupt.abort();

    let report = match result {
        Err(FmtError::Cancelled) => {
            eprintln!("{}: Interrupted, no files were written", "Error".red().bold());
            return Ok(exit_codes::TOOL_ERROR);
        }
        other => other?,
    };

    print_report(&report, quiet);

    if !args.check {
        workspace::write_back(&root, &report.changes)?;
    }

    let stats = pipeline.engine().stats();
    log::debug!(
        "Memo: {} hits, {} misses ({:.1}% hit rate)",
        stats.hits,
        stats.misses,
        stats.hit_rate()
    );

    if !quiet {
        let changed = pluralize(report.changes.len(), "file");
        let verb = if args.check { "would be reformatted" } else { "reformatted" };
        println!(
            "{} {changed} {verb}, {} checked in {:.2?}",
            "Done:".green().bold(),
            pluralize(file_count, "file"),
            start.elapsed()
        );
    }

    Ok(report.exit_code())
}

fn print_report(report: &FmtReport, quiet: bool) {
    for formatter in &report.formatters {
        match formatter.status() {
            FormatterStatus::Errored => {
                for error in formatter.errors() {
                    eprintln!("{} {}: {error}", "error".red().bold(), formatter.name.bold());
                }
            }
            FormatterStatus::Failed => {
                for failure in formatter.failures() {
                    eprintln!(
                        "{} {} exited with code {}",
                        "failed".red().bold(),
                        formatter.name.bold(),
                        failure.exit_code
                    );
                    let diagnostics = failure.diagnostics();
                    if !diagnostics.trim().is_empty() {
                        eprintln!("{}", diagnostics.trim_end());
                    }
                }
            }
            status if !quiet => {
                let label = match status {
                    FormatterStatus::Changed => "changed".yellow(),
                    FormatterStatus::Skipped => "skipped".dimmed(),
                    _ => "unchanged".green(),
                };
                println!("{} {label}", formatter.name.bold());
            }
            _ => {}
        }
    }

    for path in &report.removed {
        eprintln!("{} {path} was deleted by a formatter and left in place", "warning:".yellow().bold());
    }

    if quiet {
        return;
    }
    let prefix = if report.check { "Would reformat:" } else { "Reformatted:" };
    for path in report.changed_paths() {
        println!("{} {path}", prefix.yellow());
    }
}
