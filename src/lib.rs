pub mod config;
pub mod digest;
pub mod eligibility;
pub mod error;
pub mod exit_codes;
pub mod formatter;
pub mod goal;
pub mod memo;
pub mod pipeline;
pub mod process;
pub mod reconcile;
pub mod sandbox;
pub mod tool;
pub mod unit;
pub mod utils;
pub mod workspace;

pub use crate::config::{Config, ConfigError, FormatterSettings};
pub use crate::digest::{ContentStore, Digest, Snapshot};
pub use crate::error::{ExecutionInfraError, FmtError, ToolResolutionError};
pub use crate::formatter::{CommandFormatter, Formatter, FormatterRegistry};
pub use crate::goal::{FmtGoal, FmtReport, FormatterReport, FormatterStatus};
pub use crate::memo::Memoized;
pub use crate::pipeline::{FmtRequest, Pipeline};
pub use crate::process::ProcessSpec;
pub use crate::reconcile::{ChangedFiles, FailedRun, FormatOutcome};
pub use crate::sandbox::{ExecutionEngine, ExecutionResult, LocalSandbox};
pub use crate::tool::{ExecutableRef, PathProvisioner, ToolIdentity, ToolProvisioner};
pub use crate::unit::{Formattable, SourceUnit};
