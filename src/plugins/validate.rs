//! Validation of plugin declarations.
//!
//! Runs on each plugin before it is resolved against its base, in dependency
//! order, so every base and dependency has already passed validation.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::core::{GardenError, Result, closest_match, natural_list};

use super::types::GardenPluginSpec;

/// Lowercase alphanumerics separated by single dashes, starting with a letter.
static IDENTIFIER_REGEX: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$"));

/// Handlers a plugin may define at the provider level.
pub const PLUGIN_HANDLER_NAMES: &[&str] = &[
    "augmentGraph",
    "cleanupEnvironment",
    "configureProvider",
    "deleteSecret",
    "getDashboardPage",
    "getDebugInfo",
    "getEnvironmentStatus",
    "getSecret",
    "prepareEnvironment",
    "setSecret",
];

/// Handlers a module type may define.
pub const MODULE_HANDLER_NAMES: &[&str] = &[
    "build",
    "configure",
    "convert",
    "deleteService",
    "deployService",
    "execInService",
    "getBuildStatus",
    "getModuleOutputs",
    "getServiceLogs",
    "getServiceStatus",
    "getTaskResult",
    "getTestResult",
    "publish",
    "runModule",
    "runTask",
    "suggestModules",
    "testModule",
];

/// Whether `name` is a valid plugin, module type or command identifier.
pub fn is_valid_identifier(name: &str) -> Result<bool> {
    let regex = IDENTIFIER_REGEX
        .as_ref()
        .map_err(|e| GardenError::internal(format!("Invalid identifier pattern: {e}")))?;
    Ok(regex.is_match(name))
}

fn check_identifier(plugin: &str, what: &str, name: &str) -> Result<()> {
    if is_valid_identifier(name)? {
        return Ok(());
    }
    Err(GardenError::plugin(format!(
        "Invalid {what} name '{name}' in plugin '{plugin}'. Names must be lowercase alphanumerics separated by \
         single dashes, and must start with a letter."
    )))
}

fn check_handler_name(plugin: &str, owner: &str, name: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&name) {
        return Ok(());
    }
    let mut message = format!("Unknown handler '{name}' in {owner} of plugin '{plugin}'.");
    if let Some(suggestion) = closest_match(name, allowed.iter().copied()) {
        message.push_str(&format!(" Did you mean '{suggestion}'?"));
    }
    Err(GardenError::plugin(message))
}

/// Validate a single plugin's own declarations.
pub fn validate_plugin(plugin: &GardenPluginSpec) -> Result<()> {
    let name = plugin.name.as_str();
    check_identifier(name, "plugin", name)?;

    for handler in plugin.handlers.keys() {
        check_handler_name(name, "the plugin handlers", handler, PLUGIN_HANDLER_NAMES)?;
    }

    let mut seen = BTreeSet::new();
    for definition in &plugin.create_module_types {
        check_identifier(name, "module type", &definition.name)?;
        if !seen.insert(definition.name.as_str()) {
            return Err(GardenError::plugin(format!(
                "Plugin '{name}' declares the '{}' module type more than once.",
                definition.name
            )));
        }
        if definition.base.as_deref() == Some(definition.name.as_str()) {
            return Err(GardenError::plugin(format!(
                "Module type '{}' in plugin '{name}' references itself as a base module type.",
                definition.name
            )));
        }
        let owner = format!("module type '{}'", definition.name);
        for handler in definition.handlers.keys() {
            check_handler_name(name, &owner, handler, MODULE_HANDLER_NAMES)?;
        }
    }

    for extension in &plugin.extend_module_types {
        let owner = format!("the '{}' module type extension", extension.name);
        for handler in extension.handlers.keys() {
            check_handler_name(name, &owner, handler, MODULE_HANDLER_NAMES)?;
        }
    }

    let mut commands = BTreeSet::new();
    for command in &plugin.commands {
        check_identifier(name, "command", &command.name)?;
        if !commands.insert(command.name.as_str()) {
            return Err(GardenError::plugin(format!(
                "Plugin '{name}' declares the '{}' command more than once.",
                command.name
            )));
        }
    }

    let duplicate_tools: Vec<&str> = {
        let mut names = BTreeSet::new();
        plugin.tools.iter().map(|t| t.name.as_str()).filter(|t| !names.insert(*t)).collect()
    };
    if !duplicate_tools.is_empty() {
        return Err(GardenError::plugin(format!(
            "Plugin '{name}' declares duplicate tools: {}.",
            natural_list(&duplicate_tools)
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::handler::Handler;
    use crate::plugins::types::ModuleTypeDefinition;
    use serde_json::json;

    #[test]
    fn test_identifiers() {
        for valid in ["exec", "local-kubernetes", "k8s", "a1-b2"] {
            assert!(is_valid_identifier(valid).unwrap(), "{valid}");
        }
        for invalid in ["Exec", "-exec", "exec-", "double--dash", "1abc", "under_score", ""] {
            assert!(!is_valid_identifier(invalid).unwrap(), "{invalid}");
        }
    }

    #[test]
    fn test_rejects_invalid_plugin_name() {
        let err = validate_plugin(&GardenPluginSpec::new("My_Plugin")).unwrap_err();
        assert!(err.to_string().contains("Invalid plugin name 'My_Plugin'"));
    }

    #[test]
    fn test_rejects_unknown_handlers_with_suggestion() {
        let plugin = GardenPluginSpec::new("exec").with_handler("getEnvironmentStatuz", Handler::constant(json!({})));
        let err = validate_plugin(&plugin).unwrap_err();
        assert!(err.to_string().contains("Did you mean 'getEnvironmentStatus'?"), "{err}");

        let plugin = GardenPluginSpec::new("exec").create_module_type(
            ModuleTypeDefinition::new("exec", "").with_handler("configureProvider", Handler::constant(json!({}))),
        );
        assert!(validate_plugin(&plugin).is_err());
    }

    #[test]
    fn test_rejects_duplicate_module_types() {
        let plugin = GardenPluginSpec::new("exec")
            .create_module_type(ModuleTypeDefinition::new("exec", ""))
            .create_module_type(ModuleTypeDefinition::new("exec", ""));
        assert!(validate_plugin(&plugin).unwrap_err().to_string().contains("more than once"));
    }
}
