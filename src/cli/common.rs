//! Shared helpers for CLI commands

use anyhow::{Context, Result, anyhow, bail};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{CliConfig, ProjectConfig};
use crate::session::GardenSession;
use crate::template::TemplateValue;

/// Output formats accepted by `--format`.
pub const OUTPUT_FORMATS: &[&str] = &["table", "json", "yaml"];

/// Check a `--format` value.
pub fn validate_format(format: &str) -> Result<()> {
    if OUTPUT_FORMATS.contains(&format) {
        return Ok(());
    }
    bail!("Invalid format '{format}'. Valid formats are: {}", OUTPUT_FORMATS.join(", "))
}

/// Find the project from `--project` or by searching upwards from the working
/// directory. `Ok(None)` when there is no project to find.
pub fn find_project(config: &CliConfig) -> Result<Option<ProjectConfig>> {
    if let Some(path) = &config.project {
        return ProjectConfig::load(path).map(Some);
    }
    let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
    ProjectConfig::find(&cwd).map(|path| ProjectConfig::load(&path)).transpose()
}

/// Like [`find_project`], but a missing project is an error.
pub fn require_project(config: &CliConfig) -> Result<ProjectConfig> {
    find_project(config)?.ok_or_else(|| {
        anyhow!(
            "No garden.yml found in the current directory or any parent directory. \
             Pass --project to point at a project."
        )
    })
}

/// Open a session for the project, applying variable overrides.
pub async fn open_session(config: &CliConfig, overrides: BTreeMap<String, TemplateValue>) -> Result<GardenSession> {
    let project = require_project(config)?;
    Ok(GardenSession::open(project).await?.with_variables(overrides))
}

/// Build variable overrides from a `--vars` file and `--var key=value` flags.
///
/// Flags win over the file. Values are parsed as YAML scalars, so
/// `--var replicas=3` yields a number. Dotted keys set nested values.
pub fn variable_overrides(vars_file: Option<&Path>, vars: &[String]) -> Result<BTreeMap<String, TemplateValue>> {
    let mut overrides = BTreeMap::new();

    if let Some(path) = vars_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read variables file {}", path.display()))?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse variables file {}", path.display()))?;
        match TemplateValue::from(value) {
            TemplateValue::Object(map) => overrides.extend(map),
            TemplateValue::Null => {}
            other => bail!("Variables file {} must contain a mapping, found {}", path.display(), other.type_name()),
        }
    }

    for var in vars {
        let (key, raw) = var.split_once('=').ok_or_else(|| anyhow!("Invalid --var '{var}', expected key=value"))?;
        if key.is_empty() {
            bail!("Invalid --var '{var}', the key is empty");
        }
        let value: serde_yaml::Value = serde_yaml::from_str(raw).unwrap_or_else(|_| serde_yaml::Value::from(raw));
        let value = match TemplateValue::from(value) {
            TemplateValue::Null if raw.is_empty() => TemplateValue::from(""),
            other => other,
        };
        set_nested(&mut overrides, key, value);
    }

    Ok(overrides)
}

fn set_nested(map: &mut BTreeMap<String, TemplateValue>, key: &str, value: TemplateValue) {
    match key.split_once('.') {
        None => {
            map.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map.entry(head.to_string()).or_insert_with(|| TemplateValue::Object(BTreeMap::new()));
            if !matches!(entry, TemplateValue::Object(_)) {
                *entry = TemplateValue::Object(BTreeMap::new());
            }
            if let TemplateValue::Object(inner) = entry {
                set_nested(inner, rest, value);
            }
        }
    }
}

/// Print a serializable value as pretty JSON or YAML.
pub fn print_structured<T: serde::Serialize>(value: &T, format: &str) -> Result<()> {
    if format == "yaml" {
        print!("{}", serde_yaml::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}
