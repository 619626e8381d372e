//! Formatter definitions and the registry the `fmt` goal dispatches through.
//!
//! A [`Formatter`] is the only place that knows a tool's invocation shape.
//! Everything downstream of [`Formatter::build_process`] is tool-agnostic.
//! Formatters are registered by name in a [`FormatterRegistry`]; the goal
//! looks them up there instead of knowing any of them directly.

use crate::config::{Config, ConfigError, FormatterDefinition, FormatterSettings};
use crate::eligibility::{EligibleSet, SourceMatcher};
use crate::process::ProcessSpec;
use crate::tool::{ExecutableRef, ToolIdentity};
use crate::utils::pluralize;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

const PYTHON_SOURCES: &[&str] = &["*.py", "*.pyi"];

/// Built-in formatters: name and command (binary followed by fixed arguments).
///
/// Every entry rewrites the files named on its command line in place and
/// exits zero when it only reformatted.
const BUILTIN_FORMATTERS: &[(&str, &[&str])] = &[
    ("pyupgrade", &["pyupgrade", "--exit-zero-even-if-changed"]),
    ("black", &["black", "--quiet"]),
    ("isort", &["isort", "--quiet"]),
    ("ruff-format", &["ruff", "format"]),
    ("yapf", &["yapf", "--in-place"]),
    ("autoflake", &["autoflake", "--in-place"]),
];

/// A source formatter that can be run by the pipeline.
pub trait Formatter: Send + Sync {
    /// Stable identity used for registration, configuration and opt-outs.
    fn name(&self) -> &str;

    /// Paths this formatter understands.
    fn sources(&self) -> &SourceMatcher;

    /// The tool to provision, given this formatter's settings.
    fn tool(&self, settings: &FormatterSettings) -> ToolIdentity;

    /// Describe one invocation over `eligible`. Does not run anything.
    fn build_process(
        &self,
        eligible: &EligibleSet,
        executable: ExecutableRef,
        settings: &FormatterSettings,
    ) -> ProcessSpec;
}

/// A formatter described by a command line that rewrites files in place.
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    name: String,
    binary: String,
    fixed_args: Vec<String>,
    sources: SourceMatcher,
}

impl CommandFormatter {
    pub fn new(name: impl Into<String>, command: &[String], include: &[String]) -> Result<Self, ConfigError> {
        let name = name.into();
        let Some((binary, fixed_args)) = command.split_first() else {
            return Err(ConfigError::ParseError(format!("Formatter '{name}' has an empty command")));
        };
        let sources = SourceMatcher::new(include.iter().cloned()).map_err(|e| ConfigError::InvalidGlob {
            pattern: e.glob().unwrap_or_default().to_string(),
            message: e.kind().to_string(),
        })?;
        Ok(Self {
            name,
            binary: binary.clone(),
            fixed_args: fixed_args.to_vec(),
            sources,
        })
    }

    pub fn from_definition(name: impl Into<String>, definition: &FormatterDefinition) -> Result<Self, ConfigError> {
        Self::new(name, &definition.command, &definition.include)
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn fixed_args(&self) -> &[String] {
        &self.fixed_args
    }
}

impl Formatter for CommandFormatter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sources(&self) -> &SourceMatcher {
        &self.sources
    }

    fn tool(&self, settings: &FormatterSettings) -> ToolIdentity {
        ToolIdentity {
            binary: self.binary.clone(),
            version: settings.version.clone(),
            executable: settings.executable.clone(),
        }
    }

    fn build_process(
        &self,
        eligible: &EligibleSet,
        executable: ExecutableRef,
        settings: &FormatterSettings,
    ) -> ProcessSpec {
        let files = eligible.paths();
        let argv = self
            .fixed_args
            .iter()
            .chain(&settings.args)
            .chain(&files)
            .cloned()
            .collect();

        ProcessSpec {
            executable,
            argv,
            input_digest: eligible.digest(),
            output_files: files,
            timeout_ms: None,
            description: format!("Run {} on {}.", self.name, pluralize(eligible.len(), "file")),
            level: log::Level::Debug,
        }
    }
}

/// Formatters by name, in registration order.
#[derive(Clone, Default)]
pub struct FormatterRegistry {
    formatters: IndexMap<String, Arc<dyn Formatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in formatters.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (name, command) in BUILTIN_FORMATTERS {
            let command: Vec<String> = command.iter().map(|s| s.to_string()).collect();
            let include: Vec<String> = PYTHON_SOURCES.iter().map(|s| s.to_string()).collect();
            if let Ok(formatter) = CommandFormatter::new(*name, &command, &include) {
                registry.register(Arc::new(formatter));
            }
        }
        registry
    }

    /// Built-ins plus `[tools]`, with every formatter name the configuration
    /// mentions checked against the result.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut registry = Self::builtin();
        for (name, definition) in &config.tools {
            registry.register(Arc::new(CommandFormatter::from_definition(name.clone(), definition)?));
        }

        let mentioned = config
            .fmt
            .enabled
            .iter()
            .chain(config.formatters.keys())
            .chain(config.overrides.iter().flat_map(|o| o.skip.iter()));
        for name in mentioned {
            if !registry.contains(name) {
                return Err(ConfigError::UnknownFormatter(name.clone()));
            }
        }

        Ok(registry)
    }

    /// Register `formatter`, replacing any formatter of the same name.
    pub fn register(&mut self, formatter: Arc<dyn Formatter>) -> Option<Arc<dyn Formatter>> {
        self.formatters.insert(formatter.name().to_string(), formatter)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Formatter>> {
        self.formatters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formatters.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formatters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }
}

impl fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
