//! Configuration for sandfmt.
//!
//! Loaded from `.sandfmt.toml`, `sandfmt.toml`, or the `[tool.sandfmt]` table
//! of a `pyproject.toml`. The pipeline itself only ever reads two fields per
//! formatter (`skip` and `args`); everything else configures the collaborators
//! around it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const CONFIG_FILES: &[&str] = &[".sandfmt.toml", "sandfmt.toml", "pyproject.toml"];
const MAX_DEPTH: usize = 100;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Goal-level options
    #[serde(default)]
    pub fmt: FmtConfig,

    /// Sandbox execution options
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Per-formatter options, keyed by formatter name
    #[serde(default)]
    pub formatters: BTreeMap<String, FormatterSettings>,

    /// Custom formatter definitions (override built-ins of the same name)
    #[serde(default)]
    pub tools: BTreeMap<String, FormatterDefinition>,

    /// Per-path opt-outs
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,
}

/// Options for the `fmt` goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct FmtConfig {
    /// Formatters to run, in order
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Maximum number of files per formatter process (default: 128)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    128
}

impl Default for FmtConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            batch_size: default_batch_size(),
        }
    }
}

/// Options for the local sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SandboxConfig {
    /// Timeout per process in milliseconds, 0 disables (default: 30000)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Leave sandbox directories on disk for debugging
    #[serde(default)]
    pub keep_sandboxes: bool,

    /// Environment variables forwarded from the ambient environment
    #[serde(default)]
    pub env: Vec<String>,

    /// Directory sandboxes are created in (default: system temp dir)
    #[serde(default)]
    pub root: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30_000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            keep_sandboxes: false,
            env: Vec::new(),
            root: None,
        }
    }
}

impl SandboxConfig {
    pub fn timeout_ms(&self) -> Option<u64> {
        (self.timeout > 0).then_some(self.timeout)
    }
}

/// Options for one formatter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct FormatterSettings {
    /// Don't run this formatter
    #[serde(default)]
    pub skip: bool,

    /// Extra arguments, appended verbatim after the tool's own arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Version constraint checked against `<tool> --version`
    #[serde(default)]
    pub version: Option<String>,

    /// Explicit executable path instead of a PATH lookup
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

/// Definition of an external formatter that rewrites files in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct FormatterDefinition {
    /// Command to run (first element is the binary, rest are fixed arguments)
    pub command: Vec<String>,

    /// Globs selecting the files this formatter understands
    #[serde(default = "default_include")]
    pub include: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec!["*.py".to_string(), "*.pyi".to_string()]
}

/// Opt matching files out of specific formatters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct OverrideConfig {
    /// Globs of affected files
    pub files: Vec<String>,

    /// Formatters these files opt out of
    #[serde(default)]
    pub skip: Vec<String>,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file at {path}: {source}")]
    IoError { source: io::Error, path: String },

    /// Failed to parse the configuration content
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// A formatter name that is neither built in nor defined under [tools]
    #[error("Unknown formatter '{0}'")]
    UnknownFormatter(String),

    /// A glob in [tools] or [[overrides]] failed to compile
    #[error("Invalid glob '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
}

impl Config {
    /// Settings for `formatter`, or the defaults if none are configured.
    pub fn settings(&self, formatter: &str) -> FormatterSettings {
        self.formatters.get(formatter).cloned().unwrap_or_default()
    }

    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            source,
            path: path.display().to_string(),
        })?;

        if path.file_name().is_some_and(|name| name == "pyproject.toml") {
            Self::from_pyproject(&content)?.ok_or_else(|| {
                ConfigError::ParseError(format!("{} has no [tool.sandfmt] section", path.display()))
            })
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse the `[tool.sandfmt]` table, if there is one.
    pub fn from_pyproject(content: &str) -> Result<Option<Self>, ConfigError> {
        let document: toml::Table = toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let Some(section) = document.get("tool").and_then(|tool| tool.get("sandfmt")) else {
            return Ok(None);
        };
        section
            .clone()
            .try_into()
            .map(Some)
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))
    }

    /// Find a configuration file by walking up from `start`.
    ///
    /// Stops at the first directory containing `.git`. A `pyproject.toml`
    /// only counts if it has a `[tool.sandfmt]` section.
    pub fn discover(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        for _ in 0..MAX_DEPTH {
            log::debug!("[sandfmt-config] Searching for config in: {}", current.display());

            for name in CONFIG_FILES {
                let candidate = current.join(name);
                if !candidate.is_file() {
                    continue;
                }
                if *name == "pyproject.toml" {
                    let has_section = fs::read_to_string(&candidate)
                        .is_ok_and(|content| content.contains("tool.sandfmt"));
                    if !has_section {
                        log::debug!("[sandfmt-config] Found pyproject.toml but no [tool.sandfmt] section");
                        continue;
                    }
                }
                log::debug!("[sandfmt-config] Found config file: {}", candidate.display());
                return Some(candidate);
            }

            if current.join(".git").exists() {
                log::debug!("[sandfmt-config] Stopping at .git directory");
                return None;
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return None,
            }
        }

        log::debug!("[sandfmt-config] Maximum traversal depth reached");
        None
    }
}
