//! Shared helpers for integration tests.
//!
//! Fake formatters are small `/bin/sh` scripts. Sandboxed processes run with
//! an empty environment, so the scripts only use shell builtins.
#![allow(dead_code)]

use sandfmt_lib::tool::PathProvisioner;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Rewrites `x = set([1, 2])` lines to `x = {1, 2}` in every file argument.
pub const PYUPGRADE_LIKE: &str = r#"
for f in "$@"; do
  case "$f" in -*) continue ;; esac
  out=""
  while IFS= read -r line || [ -n "$line" ]; do
    case "$line" in
      "x = set([1, 2])") line="x = {1, 2}" ;;
    esac
    out="$out$line
"
  done < "$f"
  printf '%s' "$out" > "$f"
done
"#;

/// Reports a syntax error for the first file argument and exits 2.
pub const SYNTAX_ERROR: &str = r#"
for f in "$@"; do
  case "$f" in -*) continue ;; esac
  printf 'error: %s: SyntaxError: invalid syntax\n' "$f" >&2
  exit 2
done
"#;

/// Appends a `# formatted` line to every file argument.
pub const APPEND_MARKER: &str = r#"
for f in "$@"; do
  case "$f" in -*) continue ;; esac
  printf '# formatted\n' >> "$f"
done
"#;

/// Write an executable `/bin/sh` script called `name` into `dir`.
pub fn fake_formatter(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Provisioner that only searches `bin_dir`.
pub fn provisioner(bin_dir: &Path) -> PathProvisioner {
    PathProvisioner::new(vec![bin_dir.to_path_buf()], BTreeMap::new())
}
