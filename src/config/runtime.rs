//! Runtime configuration for a CLI invocation.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the log level chosen by CLI flags.
pub const LOG_LEVEL_ENV: &str = "GARDEN_LOG_LEVEL";

/// Runtime configuration derived from global CLI flags.
///
/// Built once per invocation and passed to commands instead of being written
/// to the process environment, so tests can construct it directly.
///
/// ```rust,ignore
/// let config = CliConfig::new().with_log_level("debug");
/// config.init_logging();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter directive, e.g. `"debug"`. `None` defers to `RUST_LOG`.
    pub log_level: Option<String>,

    /// Explicit project directory or `garden.yml`. `None` searches upwards
    /// from the working directory.
    pub project: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    #[must_use]
    pub fn with_project(mut self, project: impl Into<PathBuf>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// The effective log filter.
    ///
    /// `GARDEN_LOG_LEVEL` wins over the flag-derived level, which wins over
    /// `RUST_LOG`. Without any of them only warnings and errors are logged.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        if let Some(level) = std::env::var(LOG_LEVEL_ENV).ok().filter(|l| !l.is_empty()) {
            return EnvFilter::new(level);
        }
        if let Some(level) = &self.log_level {
            return EnvFilter::new(level);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }

    /// Install the global tracing subscriber. Logs go to stderr so command
    /// output on stdout stays machine-readable.
    pub fn init_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}
