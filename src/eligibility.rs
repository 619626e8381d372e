//! Selection of the units a formatter runs on.
//!
//! A unit is eligible when its path carries the formatter's required
//! capability (matches one of its source globs) and it has not opted out of
//! that formatter.

use crate::digest::{Digest, Snapshot};
use crate::unit::Formattable;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled source globs describing which paths a formatter understands.
#[derive(Debug, Clone)]
pub struct SourceMatcher {
    patterns: Vec<String>,
    set: GlobSet,
}

impl SourceMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self, globset::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            patterns,
            set: builder.build()?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// The deduplicated, sorted set of files one formatter run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleSet {
    snapshot: Snapshot,
    opted_out: Vec<String>,
}

impl EligibleSet {
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn digest(&self) -> Digest {
        self.snapshot.digest()
    }

    /// Eligible paths in the stable order they are handed to the tool.
    pub fn paths(&self) -> Vec<String> {
        self.snapshot.paths().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Paths that matched the formatter but opted out of it.
    pub fn opted_out(&self) -> &[String] {
        &self.opted_out
    }
}

/// Select the units `formatter` should run on.
pub fn filter<U: Formattable>(units: &[U], formatter: &str, sources: &SourceMatcher) -> EligibleSet {
    let mut opted_out = Vec::new();
    let mut files = Vec::with_capacity(units.len());

    for unit in units {
        let path = unit.source_path();
        if !sources.matches(path) {
            continue;
        }
        if unit.skips_formatter(formatter) {
            opted_out.push(path.to_string());
            continue;
        }
        files.push((path.to_string(), unit.source_content()));
    }

    opted_out.sort();
    opted_out.dedup();

    if !opted_out.is_empty() {
        log::debug!("{formatter}: {} file(s) opted out: {}", opted_out.len(), opted_out.join(", "));
    }

    EligibleSet {
        snapshot: Snapshot::from_shared(files),
        opted_out,
    }
}
