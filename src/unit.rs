//! Formattable units handed to the pipeline by the build graph.

use std::collections::BTreeSet;
use std::sync::Arc;

/// A source artifact that can be formatted.
///
/// Implemented by whatever the build graph resolves: a file on disk, an
/// in-memory buffer, a generated source. The opt-out accessor replaces
/// per-target "skip this tool" fields with an explicit capability check.
pub trait Formattable {
    /// Relative, `/`-separated path that uniquely identifies the unit.
    fn source_path(&self) -> &str;

    /// Current content of the unit.
    fn source_content(&self) -> Arc<[u8]>;

    /// Whether this unit opts out of the named formatter.
    fn skips_formatter(&self, _formatter: &str) -> bool {
        false
    }
}

/// A source file together with its per-unit overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: String,
    pub content: Arc<[u8]>,
    /// Formatters this unit opts out of.
    pub skip: BTreeSet<String>,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        Self {
            path: path.into(),
            content: Arc::from(content.as_ref()),
            skip: BTreeSet::new(),
        }
    }

    /// Opt this unit out of `formatter`.
    pub fn skipping(mut self, formatter: impl Into<String>) -> Self {
        self.skip.insert(formatter.into());
        self
    }

    /// Same unit with new content and the same overrides.
    pub fn with_content(&self, content: Arc<[u8]>) -> Self {
        Self {
            path: self.path.clone(),
            content,
            skip: self.skip.clone(),
        }
    }
}

impl Formattable for SourceUnit {
    fn source_path(&self) -> &str {
        &self.path
    }

    fn source_content(&self) -> Arc<[u8]> {
        self.content.clone()
    }

    fn skips_formatter(&self, formatter: &str) -> bool {
        self.skip.contains(formatter)
    }
}
