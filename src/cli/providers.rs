//! `garden providers` command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::common::{open_session, print_structured, validate_format, variable_overrides};
use crate::config::CliConfig;

#[derive(Args, Debug)]
pub struct ProvidersCommand {
    /// Output format (table, json, yaml)
    #[arg(short = 'f', long, default_value = "table")]
    format: String,

    /// YAML file of variables
    #[arg(long = "vars", value_name = "FILE")]
    vars_file: Option<PathBuf>,

    /// Set a variable, e.g. --var env=prod (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
}

impl ProvidersCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        validate_format(&self.format)?;
        let overrides = variable_overrides(self.vars_file.as_deref(), &self.vars)?;
        let session = open_session(config, overrides).await?;
        let providers = session.resolve_providers()?;

        if self.format != "table" {
            return print_structured(&providers, &self.format);
        }

        if providers.is_empty() {
            println!("No providers configured for project '{}'.", session.project().name);
            return Ok(());
        }
        for provider in &providers {
            println!("{}", provider.name.cyan().bold());
            if !provider.dependencies.is_empty() {
                println!("  {} {}", "depends on:".dimmed(), provider.dependencies.join(", "));
            }
            if !provider.inputs.is_empty() {
                let inputs: Vec<&str> = provider.inputs.iter().map(String::as_str).collect();
                println!("  {} {}", "inputs:".dimmed(), inputs.join(", "));
            }
            for line in serde_yaml::to_string(&provider.config)?.lines() {
                println!("  {line}");
            }
        }
        Ok(())
    }
}
