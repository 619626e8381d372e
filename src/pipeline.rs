//! One formatter run: eligibility, process construction, sandboxed
//! execution, reconciliation.
//!
//! [`Pipeline::run`] is the entry point the aggregation goal calls once per
//! formatter and partition. It holds no per-run state, so any number of runs
//! may share one pipeline concurrently; everything a run needs travels in its
//! [`FmtRequest`].

use crate::config::FormatterSettings;
use crate::digest::ContentStore;
use crate::eligibility;
use crate::error::{ExecutionInfraError, FmtError};
use crate::formatter::Formatter;
use crate::process::ProcessSpec;
use crate::reconcile::{FormatOutcome, reconcile};
use crate::sandbox::ExecutionEngine;
use crate::tool::ToolProvisioner;
use crate::unit::Formattable;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Input to one formatter run.
pub struct FmtRequest<'a, U> {
    pub formatter: Arc<dyn Formatter>,
    pub units: &'a [U],
    pub settings: FormatterSettings,
}

impl<'a, U> FmtRequest<'a, U> {
    pub fn new(formatter: Arc<dyn Formatter>, units: &'a [U], settings: FormatterSettings) -> Self {
        Self {
            formatter,
            units,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        self.formatter.name()
    }
}

/// Runs formatters against an execution engine.
#[derive(Debug)]
pub struct Pipeline<E, P> {
    engine: E,
    provisioner: P,
    timeout_ms: Option<u64>,
}

impl<E: ExecutionEngine, P: ToolProvisioner> Pipeline<E, P> {
    pub fn new(engine: E, provisioner: P) -> Self {
        Self {
            engine,
            provisioner,
            timeout_ms: None,
        }
    }

    /// Limit every process this pipeline starts.
    pub fn with_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn store(&self) -> &ContentStore {
        self.engine.store()
    }

    /// Run one formatter over the request's units.
    ///
    /// Returns [`FmtError::Cancelled`] if `cancel` fires before the outcome
    /// is known; a cancelled run never yields a partial outcome.
    pub async fn run<U>(&self, request: FmtRequest<'_, U>, cancel: &CancellationToken) -> Result<FormatOutcome, FmtError>
    where
        U: Formattable + Sync,
    {
        let name = request.name();

        if request.settings.skip {
            log::debug!("{name}: skipped by configuration");
            return Ok(FormatOutcome::Skipped);
        }

        let eligible = eligibility::filter(request.units, name, request.formatter.sources());
        if eligible.is_empty() {
            log::debug!("{name}: no eligible files");
            return Ok(FormatOutcome::Skipped);
        }

        if cancel.is_cancelled() {
            return Err(FmtError::Cancelled);
        }

        let store = self.engine.store();
        store.put(eligible.snapshot().clone());

        let tool = request.formatter.tool(&request.settings);
        let executable = until_cancelled(cancel, self.provisioner.resolve(&tool)).await??;

        let spec = ProcessSpec {
            timeout_ms: self.timeout_ms,
            ..request.formatter.build_process(&eligible, executable, &request.settings)
        };

        let result = until_cancelled(cancel, self.engine.execute(spec)).await??;

        let output = store
            .get(&result.output_digest)
            .ok_or(ExecutionInfraError::MissingDigest(result.output_digest))?;
        let outcome = reconcile(eligible.snapshot(), &result, output);

        log::debug!("{name}: {} ({:?})", outcome.label(), result.source);
        Ok(outcome)
    }
}

/// Race `future` against `cancel`. The future is dropped if cancellation wins.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output, FmtError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FmtError::Cancelled),
        output = future => Ok(output),
    }
}
