//! Exit codes for sandfmt, following Ruff's convention
//!
//! These exit codes allow users and CI/CD systems to distinguish between
//! a formatter rejecting a file and sandfmt itself failing.

/// Success - Every formatter ran cleanly (and nothing changed, in check mode)
pub const SUCCESS: i32 = 0;

/// Formatting failed - A formatter exited non-zero, or check mode found files to reformat
pub const FORMAT_FAILED: i32 = 1;

/// Tool error - Configuration error, missing tool, sandbox failure, or internal error
pub const TOOL_ERROR: i32 = 2;
