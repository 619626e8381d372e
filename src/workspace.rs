//! Loading source units from disk and writing formatted content back.

use crate::config::OverrideConfig;
use crate::digest::Snapshot;
use crate::unit::SourceUnit;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk workspace: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Invalid glob '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("{path} is outside the workspace root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// Compiled `[[overrides]]` tables.
#[derive(Debug, Clone, Default)]
pub struct OverrideRules {
    rules: Vec<(GlobSet, Vec<String>)>,
}

impl OverrideRules {
    pub fn new(overrides: &[OverrideConfig]) -> Result<Self, WorkspaceError> {
        let mut rules = Vec::with_capacity(overrides.len());
        for table in overrides {
            let mut builder = GlobSetBuilder::new();
            for pattern in &table.files {
                let glob = Glob::new(pattern).map_err(|e| WorkspaceError::InvalidGlob {
                    pattern: pattern.clone(),
                    message: e.kind().to_string(),
                })?;
                builder.add(glob);
            }
            let set = builder.build().map_err(|e| WorkspaceError::InvalidGlob {
                pattern: table.files.join(", "),
                message: e.kind().to_string(),
            })?;
            rules.push((set, table.skip.clone()));
        }
        Ok(Self { rules })
    }

    /// Every formatter `path` opts out of.
    pub fn skipped_by(&self, path: &str) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|(set, _)| set.is_match(path))
            .flat_map(|(_, skip)| skip.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Workspace-relative path with `/` separators.
fn relative_path(root: &Path, path: &Path) -> Result<String, WorkspaceError> {
    let relative = path.strip_prefix(root).map_err(|_| WorkspaceError::OutsideRoot {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Discover files under `paths` (or all of `root` when empty), honoring
/// ignore files, and load those `wanted` accepts as source units.
///
/// Units come back sorted by path with their `[[overrides]]` applied.
pub fn load_units<F>(
    root: &Path,
    paths: &[PathBuf],
    overrides: &OverrideRules,
    wanted: F,
) -> Result<Vec<SourceUnit>, WorkspaceError>
where
    F: Fn(&str) -> bool,
{
    let root = root.canonicalize().map_err(|source| WorkspaceError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let starts: Vec<PathBuf> = if paths.is_empty() {
        vec![root.clone()]
    } else {
        paths
            .iter()
            .map(|path| {
                let joined = if path.is_absolute() { path.clone() } else { root.join(path) };
                joined
                    .canonicalize()
                    .map_err(|source| WorkspaceError::Io { path: joined, source })
            })
            .collect::<Result<_, _>>()?
    };

    let mut walk_builder = WalkBuilder::new(&starts[0]);
    for start in &starts[1..] {
        walk_builder.add(start);
    }
    walk_builder.require_git(false);

    let mut found = BTreeSet::new();
    for entry in walk_builder.build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let relative = relative_path(&root, entry.path())?;
        if wanted(&relative) {
            found.insert(relative);
        }
    }
    log::debug!("Discovered {} file(s) under {}", found.len(), root.display());

    let found: Vec<String> = found.into_iter().collect();

    #[cfg(feature = "parallel")]
    let iter = found.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = found.iter();

    iter.map(|relative| {
        let path = root.join(relative);
        let content = fs::read(&path).map_err(|source| WorkspaceError::Io { path, source })?;
        let mut unit = SourceUnit::new(relative.clone(), content);
        unit.skip = overrides.skipped_by(relative);
        Ok(unit)
    })
    .collect()
}

/// Write every file in `changes` under `root`. Returns the number written.
pub fn write_back(root: &Path, changes: &Snapshot) -> Result<usize, WorkspaceError> {
    for (relative, content) in changes.iter() {
        let path = root.join(relative);
        fs::write(&path, content).map_err(|source| WorkspaceError::Io { path, source })?;
        log::debug!("Wrote {relative}");
    }
    Ok(changes.len())
}
