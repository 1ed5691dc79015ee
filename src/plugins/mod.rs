//! Plugin registry builder.
//!
//! Plugins declare provider handlers, module types, extensions of module types
//! declared elsewhere, CLI commands and external tools. Resolution merges each
//! plugin with its base and chains overridden handlers, then resolves module
//! types across all registered plugins. Only configured plugins must declare
//! unique module types.
//!
//! ```
//! use garden_core::plugins::{GardenPluginSpec, ModuleTypeDefinition, resolve_plugins};
//!
//! let plugins = vec![
//!     GardenPluginSpec::new("exec").create_module_type(ModuleTypeDefinition::new("exec", "Run commands")),
//! ];
//! let registry = resolve_plugins(plugins, &["exec".to_string()])?;
//! assert_eq!(registry.module_type("exec").map(|t| t.plugin_name.as_str()), Some("exec"));
//! # Ok::<(), garden_core::core::GardenError>(())
//! ```

pub mod builtin;
pub mod handler;
pub mod loader;
pub mod resolver;
pub mod types;
pub mod validate;

pub use builtin::{DEFAULT_PROVIDERS, builtin_plugin_sources};
pub use handler::{Handler, HandlerMetadata, HandlerParams, HandlerSummary};
pub use loader::{FilePluginLoader, PluginLoader, PluginSource, load_plugin_sources, plugin_sources_from_patterns};
pub use resolver::{
    ModuleTypeEntry, ModuleTypeSummary, PluginRegistry, RegistrySummary, load_plugins, resolve_module_definitions,
    resolve_plugin, resolve_plugins,
};
pub use types::{
    GardenPluginSpec, ModuleTypeDefinition, ModuleTypeExtension, PluginCommand, PluginDependency, PluginSummary,
    PluginToolSpec,
};
pub use validate::validate_plugin;
