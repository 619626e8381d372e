//! Command handlers for the sandfmt CLI.
//!
//! Each subcommand has its own module with a public handler function
//! that `main()` dispatches to. Handlers return the process exit code.

pub mod fmt;
pub mod list;
pub mod schema;

use anyhow::Context;
use sandfmt_lib::config::Config;
use std::path::{Path, PathBuf};

/// Locate the configuration file: an explicit path wins over discovery.
fn config_path(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(cwd.join(path)),
        None => Config::discover(cwd),
    }
}

/// Directory holding the configuration file, or `cwd` when there is none.
pub fn workspace_root(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    config_path(explicit, cwd)
        .as_deref()
        .and_then(Path::parent)
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf)
}

/// Load the configuration and the workspace root it applies to.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<(Config, PathBuf)> {
    let Some(path) = config_path(explicit, cwd) else {
        log::debug!("No configuration file found, using defaults");
        return Ok((Config::default(), cwd.to_path_buf()));
    };

    let config = Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    let root = workspace_root(Some(&path), cwd);
    log::debug!("Using configuration {} (root {})", path.display(), root.display());
    Ok((config, root))
}
