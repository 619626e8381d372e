//! Sandboxed process execution.
//!
//! [`ExecutionEngine`] is the boundary between the formatting pipeline and
//! whatever actually runs processes. [`LocalSandbox`] is the local
//! implementation: every run gets a fresh temporary directory containing
//! exactly the declared input files, the tool runs there with a cleared
//! environment, and afterwards only the declared output paths are captured
//! back into the content store. Files the tool creates elsewhere are dropped
//! along with the directory.

use crate::config::SandboxConfig;
use crate::digest::{ContentStore, Digest, Snapshot};
use crate::error::ExecutionInfraError;
use crate::process::ProcessSpec;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;

/// Whether a result was produced by running the process or recalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Executed,
    Memoized,
}

/// Outcome of one process execution. A non-zero exit code is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Digest of the snapshot captured from the declared output paths.
    pub output_digest: Digest,
    pub source: ResultSource,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs process descriptors against content-addressed inputs.
pub trait ExecutionEngine: Send + Sync {
    /// Execute `spec`. Input snapshots are read from, and output snapshots
    /// written to, [`ExecutionEngine::store`].
    ///
    /// Dropping the returned future before completion must abandon the run
    /// without recording anything.
    fn execute(&self, spec: ProcessSpec)
    -> impl Future<Output = Result<ExecutionResult, ExecutionInfraError>> + Send;

    fn store(&self) -> &ContentStore;
}

/// Executes processes in throwaway local directories.
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    store: ContentStore,
    root: Option<PathBuf>,
    keep_sandboxes: bool,
}

impl LocalSandbox {
    pub fn new(store: ContentStore) -> Self {
        Self {
            store,
            root: None,
            keep_sandboxes: false,
        }
    }

    pub fn from_config(store: ContentStore, config: &SandboxConfig) -> Self {
        Self {
            store,
            root: config.root.clone(),
            keep_sandboxes: config.keep_sandboxes,
        }
    }

    fn create_root(&self) -> Result<TempDir, ExecutionInfraError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sandfmt-");
        let created = match &self.root {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        };
        created.map_err(|source| ExecutionInfraError::Sandbox {
            path: self.root.clone().unwrap_or_else(std::env::temp_dir),
            source,
        })
    }
}

impl ExecutionEngine for LocalSandbox {
    async fn execute(&self, spec: ProcessSpec) -> Result<ExecutionResult, ExecutionInfraError> {
        let input = self
            .store
            .get(&spec.input_digest)
            .ok_or(ExecutionInfraError::MissingDigest(spec.input_digest))?;

        let sandbox = self.create_root()?;
        materialize(sandbox.path(), &input).await?;

        log::log!(spec.level, "{}", spec.description);
        log::trace!("Running in {}: {}", sandbox.path().display(), spec.command_line());

        let child = tokio::process::Command::new(&spec.executable.path)
            .args(&spec.argv)
            .current_dir(sandbox.path())
            .env_clear()
            .envs(&spec.executable.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionInfraError::Spawn {
                program: spec.executable.path.display().to_string(),
                source,
            })?;

        let waited = match spec.timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
                .await
                .map_err(|_| ExecutionInfraError::Timeout {
                    description: spec.description.clone(),
                    timeout_ms,
                })?,
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| ExecutionInfraError::Sandbox {
            path: sandbox.path().to_path_buf(),
            source,
        })?;

        let captured = capture(sandbox.path(), &spec.output_files).await?;
        let output_digest = self.store.put(captured);

        if self.keep_sandboxes {
            let kept = sandbox.keep();
            log::info!("Preserving sandbox for '{}' at {}", spec.description, kept.display());
        }

        Ok(ExecutionResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            output_digest,
            source: ResultSource::Executed,
        })
    }

    fn store(&self) -> &ContentStore {
        &self.store
    }
}

/// Resolve a snapshot path inside `root`, rejecting anything that could escape it.
fn sandbox_path(root: &Path, relative: &str) -> Result<PathBuf, ExecutionInfraError> {
    let candidate = Path::new(relative);
    let escapes = relative.is_empty()
        || candidate
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(ExecutionInfraError::UnsafePath {
            path: relative.to_string(),
        });
    }
    Ok(root.join(candidate))
}

async fn materialize(root: &Path, input: &Snapshot) -> Result<(), ExecutionInfraError> {
    for (relative, content) in input.iter() {
        let path = sandbox_path(root, relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ExecutionInfraError::Sandbox {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| ExecutionInfraError::Sandbox { path, source })?;
    }
    Ok(())
}

/// Snapshot the declared outputs. Declared files the tool removed are absent
/// from the result. An output that is not a regular file, or that is reached
/// through a symlinked directory, is rejected.
async fn capture(root: &Path, outputs: &[String]) -> Result<Snapshot, ExecutionInfraError> {
    let mut files = Vec::with_capacity(outputs.len());
    for relative in outputs {
        let path = sandbox_path(root, relative)?;
        if !is_regular_output(root, relative).await? {
            log::debug!("Declared output {relative} was not produced");
            continue;
        }
        match tokio::fs::read(&path).await {
            Ok(content) => files.push((relative.clone(), content)),
            Err(source) => return Err(ExecutionInfraError::Sandbox { path, source }),
        }
    }
    Ok(Snapshot::new(files))
}

/// `Ok(false)` when the output is missing. Every component is inspected
/// without following symlinks.
async fn is_regular_output(root: &Path, relative: &str) -> Result<bool, ExecutionInfraError> {
    let unsafe_path = || ExecutionInfraError::UnsafePath {
        path: relative.to_string(),
    };
    let components: Vec<Component<'_>> = Path::new(relative).components().collect();
    let mut current = root.to_path_buf();

    for (i, component) in components.iter().enumerate() {
        current.push(component);
        let metadata = match tokio::fs::symlink_metadata(&current).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => return Err(ExecutionInfraError::Sandbox { path: current, source }),
        };
        let file_type = metadata.file_type();
        let last = i + 1 == components.len();
        if file_type.is_symlink() || (last && !file_type.is_file()) || (!last && !file_type.is_dir()) {
            return Err(unsafe_path());
        }
    }
    Ok(true)
}
