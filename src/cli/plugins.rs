//! `garden plugins` commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::common::{open_session, print_structured, validate_format};
use crate::config::CliConfig;
use crate::plugins::PluginRegistry;

#[derive(Args, Debug)]
pub struct PluginsCommand {
    #[command(subcommand)]
    command: PluginsSubcommand,
}

#[derive(Subcommand, Debug)]
enum PluginsSubcommand {
    /// List the plugins resolved for the project, bases and dependencies first
    List {
        /// Output format (table, json, yaml)
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },

    /// List the module types available to the project
    ModuleTypes {
        /// Output format (table, json, yaml)
        #[arg(short = 'f', long, default_value = "table")]
        format: String,
    },
}

impl PluginsCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let format = match &self.command {
            PluginsSubcommand::List {
                format,
            }
            | PluginsSubcommand::ModuleTypes {
                format,
            } => format.clone(),
        };
        validate_format(&format)?;

        let session = open_session(config, Default::default()).await?;
        let registry = session.registry();

        match self.command {
            PluginsSubcommand::List {
                ..
            } => {
                if format == "table" {
                    print_plugin_table(&registry);
                } else {
                    print_structured(&registry.summary().plugins, &format)?;
                }
            }
            PluginsSubcommand::ModuleTypes {
                ..
            } => {
                if format == "table" {
                    print_module_type_table(&registry);
                } else {
                    print_structured(&registry.summary().module_types, &format)?;
                }
            }
        }
        Ok(())
    }
}

fn print_plugin_table(registry: &PluginRegistry) {
    if registry.is_empty() {
        println!("No plugins resolved.");
        return;
    }

    println!(
        "{:<20} {:<18} {:<11} {:<30} {}",
        "NAME".bold(),
        "BASE".bold(),
        "CONFIGURED".bold(),
        "DEPENDENCIES".bold(),
        "MODULE TYPES".bold()
    );
    for plugin in registry.plugins() {
        let dependencies: Vec<String> = plugin
            .dependencies
            .iter()
            .map(|d| if d.optional { format!("{}?", d.name) } else { d.name.clone() })
            .collect();
        let module_types: Vec<&str> = plugin.create_module_types.iter().map(|t| t.name.as_str()).collect();
        let configured = if registry.is_configured(&plugin.name) { "yes".green() } else { "no".dimmed() };
        println!(
            "{:<20} {:<18} {:<11} {:<30} {}",
            plugin.name.cyan(),
            plugin.base.as_deref().unwrap_or("-"),
            configured,
            or_dash(&dependencies.join(", ")),
            or_dash(&module_types.join(", "))
        );
    }
}

fn print_module_type_table(registry: &PluginRegistry) {
    if registry.module_types().is_empty() {
        println!("No module types resolved.");
        return;
    }

    println!(
        "{:<20} {:<18} {:<18} {:<7} {}",
        "NAME".bold(),
        "PLUGIN".bold(),
        "BASE".bold(),
        "BUILD".bold(),
        "HANDLERS".bold()
    );
    for (name, entry) in registry.module_types() {
        let handlers: Vec<&str> = entry.definition.handlers.keys().map(String::as_str).collect();
        println!(
            "{:<20} {:<18} {:<18} {:<7} {}",
            name.cyan(),
            entry.plugin_name,
            entry.definition.base.as_deref().unwrap_or("-"),
            if entry.needs_build { "yes" } else { "no" },
            or_dash(&handlers.join(", "))
        );
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
