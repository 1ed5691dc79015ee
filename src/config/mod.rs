//! Configuration for Garden
//!
//! - [`ProjectConfig`] - the project's `garden.yml`: name, providers,
//!   variables and plugin manifest paths
//! - [`CliConfig`] - runtime settings derived from global CLI flags
//!
//! Provider configs may contain template strings. They are resolved against
//! the project context (`project.name`, `var.*`, `variables.*`); references to
//! other providers' outputs are left in place and become ordering edges.

mod project;
mod runtime;

pub use project::{PROJECT_CONFIG_FILENAME, ProjectConfig, ProviderConfig, ResolvedProvider};
pub use runtime::{CliConfig, LOG_LEVEL_ENV};
