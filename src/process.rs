//! Immutable descriptors of one sandboxed tool invocation.

use crate::digest::Digest;
use crate::tool::ExecutableRef;

/// Everything the execution engine needs to run a tool, and nothing else.
///
/// Two specs that compare equal are interchangeable. [`ProcessSpec::fingerprint`]
/// narrows that to the fields that can influence the result, so specs that
/// differ only in their description or log level share a memo entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessSpec {
    pub executable: ExecutableRef,
    /// Arguments after the executable, in invocation order.
    pub argv: Vec<String>,
    /// Snapshot materialized in the sandbox root before the run.
    pub input_digest: Digest,
    /// Relative paths captured from the sandbox after the run.
    pub output_files: Vec<String>,
    /// Wall-clock limit; `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
    pub description: String,
    pub level: log::Level,
}

impl ProcessSpec {
    /// Memoization key over the result-relevant fields.
    pub fn fingerprint(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        let mut field = |bytes: &[u8]| {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };

        field(self.executable.name.as_bytes());
        field(self.executable.path.as_os_str().as_encoded_bytes());
        field(self.executable.version.as_deref().unwrap_or_default().as_bytes());
        for (key, value) in &self.executable.env {
            field(key.as_bytes());
            field(value.as_bytes());
        }
        field(b"argv");
        for arg in &self.argv {
            field(arg.as_bytes());
        }
        field(self.input_digest.as_bytes());
        field(b"outputs");
        for output in &self.output_files {
            field(output.as_bytes());
        }

        hasher.finalize().into()
    }

    /// The command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.path.display().to_string())
            .chain(self.argv.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
