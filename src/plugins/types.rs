//! Plugin declarations.
//!
//! A [`GardenPluginSpec`] is what a plugin author declares. Resolution produces
//! values of the same type with base-plugin declarations merged in and handler
//! chains attached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::handler::{Handler, HandlerSummary};

/// A dependency on another plugin.
///
/// Manifests may write a dependency as a plain name or as `{ name, optional }`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "DependencyRepr")]
pub struct PluginDependency {
    pub name: String,
    /// Optional dependencies may be missing from the registered plugins
    #[serde(default)]
    pub optional: bool,
}

impl PluginDependency {
    #[must_use]
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: false,
        }
    }

    #[must_use]
    pub fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            optional: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        optional: bool,
    },
}

impl From<DependencyRepr> for PluginDependency {
    fn from(repr: DependencyRepr) -> Self {
        match repr {
            DependencyRepr::Name(name) => Self {
                name,
                optional: false,
            },
            DependencyRepr::Full {
                name,
                optional,
            } => Self {
                name,
                optional,
            },
        }
    }
}

/// A module type a plugin creates.
#[derive(Debug, Clone, Default)]
pub struct ModuleTypeDefinition {
    pub name: String,
    /// Module type this one inherits schema and handlers from
    pub base: Option<String>,
    pub docs: String,
    /// JSON schema for module configs of this type
    pub schema: Option<serde_json::Value>,
    pub needs_build: bool,
    pub handlers: BTreeMap<String, Handler>,
}

impl ModuleTypeDefinition {
    #[must_use]
    pub fn new(name: &str, docs: &str) -> Self {
        Self {
            name: name.to_string(),
            docs: docs.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub const fn needs_build(mut self, needs_build: bool) -> Self {
        self.needs_build = needs_build;
        self
    }

    #[must_use]
    pub fn with_handler(mut self, name: &str, handler: Handler) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }
}

/// Handlers a plugin contributes to a module type declared elsewhere.
#[derive(Debug, Clone, Default)]
pub struct ModuleTypeExtension {
    pub name: String,
    pub handlers: BTreeMap<String, Handler>,
}

impl ModuleTypeExtension {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handlers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_handler(mut self, name: &str, handler: Handler) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }
}

/// A command a plugin exposes on the CLI.
#[derive(Debug, Clone)]
pub struct PluginCommand {
    pub name: String,
    pub description: String,
    pub handler: Handler,
    /// The base plugin's command of the same name, when overridden
    pub base: Option<Box<PluginCommand>>,
}

impl PluginCommand {
    #[must_use]
    pub fn new(name: &str, description: &str, handler: Handler) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            handler,
            base: None,
        }
    }
}

/// An external tool a plugin needs, e.g. `kubectl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A plugin as declared by its author, or as resolved against its base.
#[derive(Debug, Clone, Default)]
pub struct GardenPluginSpec {
    pub name: String,
    pub base: Option<String>,
    pub docs: Option<String>,
    pub dependencies: Vec<PluginDependency>,
    /// Plugin-level handlers keyed by handler name
    pub handlers: BTreeMap<String, Handler>,
    pub create_module_types: Vec<ModuleTypeDefinition>,
    pub extend_module_types: Vec<ModuleTypeExtension>,
    pub commands: Vec<PluginCommand>,
    pub tools: Vec<PluginToolSpec>,
    pub config_schema: Option<serde_json::Value>,
    pub outputs_schema: Option<serde_json::Value>,
}

impl GardenPluginSpec {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    #[must_use]
    pub fn with_docs(mut self, docs: &str) -> Self {
        self.docs = Some(docs.to_string());
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: PluginDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    #[must_use]
    pub fn with_handler(mut self, name: &str, handler: Handler) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    #[must_use]
    pub fn create_module_type(mut self, definition: ModuleTypeDefinition) -> Self {
        self.create_module_types.push(definition);
        self
    }

    #[must_use]
    pub fn extend_module_type(mut self, extension: ModuleTypeExtension) -> Self {
        self.extend_module_types.push(extension);
        self
    }

    #[must_use]
    pub fn with_command(mut self, command: PluginCommand) -> Self {
        self.commands.push(command);
        self
    }

    #[must_use]
    pub fn with_tool(mut self, tool: PluginToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn with_outputs_schema(mut self, schema: serde_json::Value) -> Self {
        self.outputs_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_config_schema(mut self, schema: serde_json::Value) -> Self {
        self.config_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            base: self.base.clone(),
            docs: self.docs.clone(),
            dependencies: self.dependencies.clone(),
            handlers: self.handlers.iter().map(|(name, h)| (name.clone(), h.summary())).collect(),
            create_module_types: self.create_module_types.iter().map(|d| d.name.clone()).collect(),
            extend_module_types: self
                .extend_module_types
                .iter()
                .map(|ext| (ext.name.clone(), ext.handlers.keys().cloned().collect()))
                .collect(),
            commands: self
                .commands
                .iter()
                .map(|command| CommandSummary {
                    name: command.name.clone(),
                    description: command.description.clone(),
                    overrides_base: command.base.is_some(),
                })
                .collect(),
            tools: self.tools.clone(),
            has_config_schema: self.config_schema.is_some(),
            has_outputs_schema: self.outputs_schema.is_some(),
        }
    }
}

/// A serializable, function-free view of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
    pub dependencies: Vec<PluginDependency>,
    pub handlers: BTreeMap<String, HandlerSummary>,
    pub create_module_types: Vec<String>,
    pub extend_module_types: BTreeMap<String, Vec<String>>,
    pub commands: Vec<CommandSummary>,
    pub tools: Vec<PluginToolSpec>,
    pub has_config_schema: bool,
    pub has_outputs_schema: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSummary {
    pub name: String,
    pub description: String,
    pub overrides_base: bool,
}
