//! Resolution of formatter tools to runnable executables.
//!
//! The pipeline never runs a bare command name: every process names an
//! [`ExecutableRef`] with an absolute path, a detected version and the exact
//! environment it may see. That keeps process descriptors reproducible and
//! lets them serve as cache keys.

use crate::error::ToolResolutionError;
use regex::Regex;
use semver::{Version, VersionReq};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{LazyLock, Mutex, PoisonError};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+").unwrap());

/// What a formatter asks for: a tool name, optionally pinned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ToolIdentity {
    /// Binary name looked up on the search path.
    pub binary: String,
    /// Version requirement (`==1.2.3`, `>=1.2`, `3.15`, or any semver requirement).
    pub version: Option<String>,
    /// Explicit executable, bypassing the search path.
    pub executable: Option<PathBuf>,
}

impl ToolIdentity {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            version: None,
            executable: None,
        }
    }
}

/// A resolved tool, ready to be embedded in a process descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExecutableRef {
    pub name: String,
    pub path: PathBuf,
    pub version: Option<String>,
    /// Environment the tool runs with; nothing else is inherited.
    pub env: BTreeMap<String, String>,
}

/// Turns a [`ToolIdentity`] into an [`ExecutableRef`].
pub trait ToolProvisioner: Send + Sync {
    fn resolve(
        &self,
        tool: &ToolIdentity,
    ) -> impl Future<Output = Result<ExecutableRef, ToolResolutionError>> + Send;
}

/// Provisioner that finds tools on a search path.
///
/// Successful resolutions are cached per identity for the lifetime of the
/// provisioner.
#[derive(Debug)]
pub struct PathProvisioner {
    search_path: Vec<PathBuf>,
    env: BTreeMap<String, String>,
    cache: Mutex<HashMap<ToolIdentity, ExecutableRef>>,
}

impl PathProvisioner {
    /// Search the ambient `PATH`, forwarding the named variables to tools.
    pub fn from_env(passthrough: &[String]) -> Self {
        let search_path = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect())
            .unwrap_or_default();
        let env = passthrough
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
            .collect();
        Self::new(search_path, env)
    }

    pub fn new(search_path: Vec<PathBuf>, env: BTreeMap<String, String>) -> Self {
        Self {
            search_path,
            env,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, tool: &ToolIdentity) -> Option<ExecutableRef> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(tool).cloned()
    }

    fn locate(&self, tool: &ToolIdentity) -> Result<PathBuf, ToolResolutionError> {
        if let Some(explicit) = &tool.executable {
            return if is_executable(explicit) {
                Ok(explicit.clone())
            } else {
                Err(ToolResolutionError::NotExecutable {
                    tool: tool.binary.clone(),
                    path: explicit.clone(),
                })
            };
        }

        for dir in &self.search_path {
            for name in candidate_names(&tool.binary) {
                let candidate = dir.join(&name);
                if is_executable(&candidate) {
                    return Ok(candidate);
                }
            }
        }

        Err(ToolResolutionError::NotFound {
            tool: tool.binary.clone(),
            searched: std::env::join_paths(&self.search_path)
                .map(|joined| joined.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }

    async fn probe_version(&self, tool: &ToolIdentity, path: &Path) -> Result<String, ToolResolutionError> {
        let output = tokio::process::Command::new(path)
            .arg("--version")
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ToolResolutionError::VersionProbe {
                tool: tool.binary.clone(),
                message: e.to_string(),
            })?;

        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        VERSION_RE
            .find(&text)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ToolResolutionError::VersionProbe {
                tool: tool.binary.clone(),
                message: format!("no version number in output: {}", text.trim()),
            })
    }
}

impl ToolProvisioner for PathProvisioner {
    async fn resolve(&self, tool: &ToolIdentity) -> Result<ExecutableRef, ToolResolutionError> {
        if let Some(hit) = self.cached(tool) {
            return Ok(hit);
        }

        let path = self.locate(tool)?;

        let version = match &tool.version {
            Some(constraint) => {
                let parsed = VersionConstraint::parse(constraint).ok_or_else(|| {
                    ToolResolutionError::InvalidConstraint {
                        tool: tool.binary.clone(),
                        constraint: constraint.clone(),
                    }
                })?;
                let found = self.probe_version(tool, &path).await?;
                if !parsed.matches(&found) {
                    return Err(ToolResolutionError::VersionMismatch {
                        tool: tool.binary.clone(),
                        found,
                        constraint: constraint.clone(),
                    });
                }
                Some(found)
            }
            None => None,
        };

        log::debug!("Resolved tool '{}' to {}", tool.binary, path.display());

        let resolved = ExecutableRef {
            name: tool.binary.clone(),
            path,
            version,
            env: self.env.clone(),
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(tool.clone(), resolved.clone());
        Ok(resolved)
    }
}

fn candidate_names(binary: &str) -> Vec<OsString> {
    #[cfg(windows)]
    {
        vec![OsString::from(format!("{binary}.exe")), OsString::from(binary)]
    }

    #[cfg(not(windows))]
    {
        vec![OsString::from(binary)]
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// A version requirement on a resolved tool.
///
/// `==X.Y.Z` and a bare `X.Y` are read as semver `=X.Y.Z` / `=X.Y`, so a bare
/// version pins every component it names. Anything else is handed to
/// [`VersionReq::parse`] unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint(VersionReq);

impl VersionConstraint {
    pub fn parse(constraint: &str) -> Option<Self> {
        let constraint = constraint.trim();
        if constraint.is_empty() {
            return None;
        }
        let requirement = if let Some(rest) = constraint.strip_prefix("==") {
            format!("={}", rest.trim())
        } else if constraint.starts_with(|c: char| c.is_ascii_digit()) {
            format!("={constraint}")
        } else {
            constraint.to_string()
        };
        VersionReq::parse(&requirement).ok().map(Self)
    }

    pub fn matches(&self, version: &str) -> bool {
        tool_version(version).is_some_and(|found| self.0.matches(&found))
    }
}

/// Read a probed tool version as semver, padding `23.1` to `23.1.0` and
/// dropping components past the patch number.
fn tool_version(version: &str) -> Option<Version> {
    let mut components = [0u64; 3];
    let mut parts = version.trim().split('.');
    let first = parts.next().filter(|part| !part.is_empty())?;
    components[0] = first.parse().ok()?;
    for (slot, part) in components.iter_mut().skip(1).zip(parts) {
        *slot = part.parse().ok()?;
    }
    let [major, minor, patch] = components;
    Version::parse(&format!("{major}.{minor}.{patch}")).ok()
}
