//! In-memory memoization of process executions.
//!
//! Keyed by [`ProcessSpec::fingerprint`]. Only successful results are kept:
//! a failing formatter is re-run every time so its diagnostics stay current.
//! A run that is cancelled or hits an infrastructure error never produces an
//! entry.

use crate::digest::{ContentStore, Digest};
use crate::error::ExecutionInfraError;
use crate::process::ProcessSpec;
use crate::sandbox::{ExecutionEngine, ExecutionResult, ResultSource};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Memo statistics for reporting
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoStats {
    pub hits: usize,
    pub misses: usize,
    pub writes: usize,
}

impl MemoStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Wraps an engine and returns remembered results for identical specs.
#[derive(Debug)]
pub struct Memoized<E> {
    inner: E,
    results: Mutex<HashMap<Digest, ExecutionResult>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    writes: AtomicUsize,
}

impl<E: ExecutionEngine> Memoized<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            results: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, key: &Digest) -> Option<ExecutionResult> {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results.get(key).cloned()
    }

    fn remember(&self, key: Digest, result: &ExecutionResult) {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        if let Entry::Vacant(slot) = results.entry(key) {
            slot.insert(result.clone());
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<E: ExecutionEngine> ExecutionEngine for Memoized<E> {
    async fn execute(&self, spec: ProcessSpec) -> Result<ExecutionResult, ExecutionInfraError> {
        let key = spec.fingerprint();

        if let Some(hit) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Memoized: {} ({})", spec.description, key.short());
            return Ok(ExecutionResult {
                source: ResultSource::Memoized,
                ..hit
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.execute(spec).await?;
        if result.success() {
            self.remember(key, &result);
        }
        Ok(result)
    }

    fn store(&self) -> &ContentStore {
        self.inner.store()
    }
}
