//! Command-line interface for Garden's configuration compiler.
//!
//! # Available Commands
//!
//! - `template eval` - evaluate a single template string
//! - `template resolve` - resolve every template string in a YAML document
//! - `plugins list` - show the resolved plugins for the project
//! - `plugins module-types` - show the resolved module types
//! - `providers` - show the project's provider configs, resolved and ordered
//!
//! # Global Options
//!
//! - `--verbose` - debug logging
//! - `--quiet` - errors only
//! - `--project` - project directory or `garden.yml` (searched upwards from the
//!   working directory by default)
//!
//! # Example
//!
//! ```bash
//! garden template eval '${var.image}:${var.tag}' --var image=api --var tag=v1
//! garden --project ./demo plugins module-types --format json
//! ```

pub mod common;
mod plugins;
mod providers;
mod template;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliConfig;

/// Garden configuration compiler
#[derive(Parser, Debug)]
#[command(
    name = "garden",
    about = "Resolve Garden template strings and plugin registries",
    version,
    long_about = "Evaluates Garden template expressions against project variables and resolves the \
                  plugins and module types available to a project."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Project directory or path to its garden.yml
    #[arg(long, global = true, value_name = "PATH")]
    project: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate and resolve template strings
    Template(template::TemplateCommand),

    /// Inspect the resolved plugin registry
    Plugins(plugins::PluginsCommand),

    /// Show the project's provider configs in dependency order
    Providers(providers::ProvidersCommand),
}

impl Cli {
    /// Execute the command with configuration derived from the global flags.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Build the runtime configuration from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            project: self.project.clone(),
        }
    }

    /// Execute the command with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();

        match self.command {
            Commands::Template(cmd) => cmd.execute(&config).await,
            Commands::Plugins(cmd) => cmd.execute(&config).await,
            Commands::Providers(cmd) => cmd.execute(&config).await,
        }
    }
}
