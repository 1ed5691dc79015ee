//! `garden template` commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use super::common::{find_project, variable_overrides};
use crate::config::CliConfig;
use crate::template::{
    ContextResolveOpts, GenericContext, TemplateValue, resolve_template_string, resolve_template_strings,
};

#[derive(Args, Debug)]
pub struct TemplateCommand {
    #[command(subcommand)]
    command: TemplateSubcommand,
}

#[derive(Subcommand, Debug)]
enum TemplateSubcommand {
    /// Evaluate a single template string and print the result as JSON
    Eval {
        /// The template string, e.g. '${var.image}:${var.tag}'
        template: String,

        #[command(flatten)]
        vars: VariableArgs,

        /// Leave values that aren't available yet unresolved instead of failing
        #[arg(long)]
        partial: bool,

        /// Also print the context keys the value was computed from
        #[arg(long)]
        inputs: bool,
    },

    /// Resolve every template string in a YAML document and print it as YAML
    Resolve {
        /// YAML file to resolve
        file: PathBuf,

        #[command(flatten)]
        vars: VariableArgs,

        /// Leave values that aren't available yet unresolved instead of failing
        #[arg(long)]
        partial: bool,
    },
}

#[derive(Args, Debug, Default)]
struct VariableArgs {
    /// YAML file of variables
    #[arg(long = "vars", value_name = "FILE")]
    vars_file: Option<PathBuf>,

    /// Set a variable, e.g. --var image.tag=v1 (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
}

#[derive(Serialize)]
struct EvalOutput<'a> {
    value: &'a TemplateValue,
    inputs: Vec<&'a str>,
}

impl TemplateCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        match self.command {
            TemplateSubcommand::Eval {
                template,
                vars,
                partial,
                inputs,
            } => {
                let context = build_context(config, &vars)?;
                let resolution = resolve_template_string(&template, &context, &resolve_opts(partial))?;
                if inputs {
                    let output = EvalOutput {
                        value: &resolution.value,
                        inputs: resolution.inputs.iter().map(String::as_str).collect(),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                } else {
                    println!("{}", serde_json::to_string_pretty(&resolution.value)?);
                }
                Ok(())
            }
            TemplateSubcommand::Resolve {
                file,
                vars,
                partial,
            } => {
                let content = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let document: serde_yaml::Value = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", file.display()))?;

                let context = build_context(config, &vars)?;
                let resolution =
                    resolve_template_strings(&TemplateValue::from(document), &context, &resolve_opts(partial))
                        .with_context(|| format!("Failed to resolve template strings in {}", file.display()))?;
                debug!(inputs = resolution.inputs.len(), file = %file.display(), "Resolved document");
                print!("{}", serde_yaml::to_string(&resolution.value)?);
                Ok(())
            }
        }
    }
}

fn resolve_opts(partial: bool) -> ContextResolveOpts {
    if partial { ContextResolveOpts::partial() } else { ContextResolveOpts::default() }
}

/// The project context when a project is found, otherwise only the variables.
fn build_context(config: &CliConfig, vars: &VariableArgs) -> Result<GenericContext> {
    let overrides = variable_overrides(vars.vars_file.as_deref(), &vars.vars)?;
    if let Some(project) = find_project(config)? {
        debug!(project = %project.name, "Evaluating against project context");
        return Ok(project.template_context(&overrides));
    }
    let variables = TemplateValue::from(overrides);
    Ok(GenericContext::from_map(BTreeMap::from([
        ("var".to_string(), variables.clone()),
        ("variables".to_string(), variables),
    ])))
}
