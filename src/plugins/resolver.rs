//! Plugin registry resolution.
//!
//! Turns the registered plugin specs plus the project's configured providers
//! into a frozen [`PluginRegistry`]:
//!
//! 1. Order all plugins by their `base` and `dependencies` edges, rejecting
//!    self-references and cycles
//! 2. Check that every configured provider is registered and that every base
//!    and required dependency exists, then validate each registered plugin
//! 3. **Pass one**: resolve each plugin against its (already resolved) base,
//!    in dependency order
//! 4. **Pass two**: resolve module types across all resolved plugins in
//!    base-type order, then attach module-type extensions
//!
//! Each pass stores its results in a map keyed by name that later steps read
//! from, so nothing recurses back into partially built state.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, trace};

use crate::core::{GardenError, Result, closest_match, natural_list};
use crate::graph::DependencyGraph;

use super::handler::{HandlerMetadata, HandlerSummary};
use super::loader::{PluginLoader, PluginSource, load_plugin_sources};
use super::types::{GardenPluginSpec, ModuleTypeDefinition, PluginDependency, PluginSummary};
use super::validate::validate_plugin;

/// A resolved module type and the plugin it was taken from.
#[derive(Debug, Clone)]
pub struct ModuleTypeEntry {
    pub definition: ModuleTypeDefinition,
    pub plugin_name: String,
    pub needs_build: bool,
}

/// The resolved plugins and module types for one project. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, GardenPluginSpec>,
    module_types: BTreeMap<String, ModuleTypeEntry>,
    order: Vec<String>,
    configured: BTreeSet<String>,
}

impl PluginRegistry {
    #[must_use]
    pub fn plugin(&self, name: &str) -> Option<&GardenPluginSpec> {
        self.plugins.get(name)
    }

    /// Resolved plugins in dependency order (bases and dependencies first).
    pub fn plugins(&self) -> impl Iterator<Item = &GardenPluginSpec> {
        self.order.iter().filter_map(|name| self.plugins.get(name))
    }

    #[must_use]
    pub fn module_type(&self, name: &str) -> Option<&ModuleTypeEntry> {
        self.module_types.get(name)
    }

    #[must_use]
    pub const fn module_types(&self) -> &BTreeMap<String, ModuleTypeEntry> {
        &self.module_types
    }

    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn is_configured(&self, name: &str) -> bool {
        self.configured.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// A serializable, function-free view of the registry.
    #[must_use]
    pub fn summary(&self) -> RegistrySummary {
        RegistrySummary {
            plugins: self.plugins().map(GardenPluginSpec::summary).collect(),
            module_types: self
                .module_types
                .iter()
                .map(|(name, entry)| {
                    (
                        name.clone(),
                        ModuleTypeSummary {
                            plugin: entry.plugin_name.clone(),
                            base: entry.definition.base.clone(),
                            docs: entry.definition.docs.clone(),
                            needs_build: entry.needs_build,
                            has_schema: entry.definition.schema.is_some(),
                            handlers: entry
                                .definition
                                .handlers
                                .iter()
                                .map(|(handler, h)| (handler.clone(), h.summary()))
                                .collect(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySummary {
    pub plugins: Vec<PluginSummary>,
    pub module_types: BTreeMap<String, ModuleTypeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleTypeSummary {
    pub plugin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    pub docs: String,
    pub needs_build: bool,
    pub has_schema: bool,
    pub handlers: BTreeMap<String, HandlerSummary>,
}

/// Load plugin sources and resolve them against the configured providers.
pub async fn load_plugins(
    sources: &[PluginSource],
    loader: &dyn PluginLoader,
    configured_providers: &[String],
) -> Result<PluginRegistry> {
    let registered = load_plugin_sources(sources, loader).await?;
    resolve_plugins(registered, configured_providers)
}

/// Resolve registered plugins against the configured providers.
pub fn resolve_plugins(registered: Vec<GardenPluginSpec>, configured_providers: &[String]) -> Result<PluginRegistry> {
    let mut registered_by_name: BTreeMap<String, GardenPluginSpec> = BTreeMap::new();
    for plugin in registered {
        if registered_by_name.contains_key(&plugin.name) {
            return Err(GardenError::plugin(format!("Plugin '{}' is registered more than once.", plugin.name)));
        }
        registered_by_name.insert(plugin.name.clone(), plugin);
    }

    let graph = plugin_graph(&registered_by_name)?;
    let order: Vec<String> = graph
        .overall_order()
        .map_err(|cycle| {
            GardenError::plugin(format!(
                "Found a circular dependency between registered plugins: {}",
                cycle.render()
            ))
        })?
        .into_iter()
        .filter(|name| registered_by_name.contains_key(name))
        .collect();

    let configured: BTreeSet<String> = configured_providers.iter().cloned().collect();
    for provider in configured_providers {
        if !registered_by_name.contains_key(provider) {
            let mut message = format!("Configured provider '{provider}' has not been registered.");
            if let Some(suggestion) = closest_match(provider, registered_by_name.keys().map(String::as_str)) {
                message.push_str(&format!(" Did you mean '{suggestion}'?"));
            }
            return Err(GardenError::configuration(message));
        }
    }

    check_plugin_references(&registered_by_name)?;

    for name in &order {
        trace!(plugin = %name, "Validating plugin");
        validate_plugin(&registered_by_name[name])?;
    }

    // Pass one: plugins against their bases.
    let mut resolved: BTreeMap<String, GardenPluginSpec> = BTreeMap::new();
    for name in &order {
        let plugin = tag_plugin_handlers(&registered_by_name[name]);
        let plugin = resolve_plugin(&plugin, &resolved, &configured)?;
        resolved.insert(name.clone(), plugin);
    }

    // Pass two: module types across plugins.
    let module_types = resolve_module_definitions(&mut resolved, &order, &graph, &configured)?;

    info!(
        plugins = order.len(),
        module_types = module_types.len(),
        configured = configured.len(),
        "Resolved plugin registry"
    );

    Ok(PluginRegistry {
        plugins: resolved,
        module_types,
        order,
        configured,
    })
}

/// Build the plugin graph. Self-referencing bases fail before any ordering.
fn plugin_graph(plugins: &BTreeMap<String, GardenPluginSpec>) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    for plugin in plugins.values() {
        graph.add_node(&plugin.name);

        if let Some(base) = &plugin.base {
            if *base == plugin.name {
                return Err(GardenError::plugin(format!(
                    "Plugin '{}' references itself as a base plugin.",
                    plugin.name
                )));
            }
            graph.add_dependency(&plugin.name, base);
        }

        for dependency in &plugin.dependencies {
            if dependency.optional && !plugins.contains_key(&dependency.name) {
                continue;
            }
            graph.add_dependency(&plugin.name, &dependency.name);
        }
    }
    Ok(graph)
}

/// Every base and required dependency must be registered.
fn check_plugin_references(plugins: &BTreeMap<String, GardenPluginSpec>) -> Result<()> {
    for (name, plugin) in plugins {
        if let Some(base) = &plugin.base
            && !plugins.contains_key(base)
        {
            return Err(GardenError::plugin(format!(
                "Plugin '{name}' specifies plugin '{base}' as a base, but that plugin has not been registered."
            )));
        }
        for dependency in &plugin.dependencies {
            if !dependency.optional && !plugins.contains_key(&dependency.name) {
                return Err(GardenError::plugin(format!(
                    "Plugin '{name}' lists plugin '{}' as a dependency, but that plugin has not been registered.",
                    dependency.name
                )));
            }
        }
    }
    Ok(())
}

/// Fill handler metadata with the declaring plugin's name, where absent.
fn tag_plugin_handlers(plugin: &GardenPluginSpec) -> GardenPluginSpec {
    let mut plugin = plugin.clone();
    let name = plugin.name.clone();
    plugin.handlers = std::mem::take(&mut plugin.handlers)
        .into_iter()
        .map(|(handler_name, handler)| {
            let defaults = HandlerMetadata::new(&handler_name, None, &name);
            (handler_name, handler.with_metadata_defaults(&defaults))
        })
        .collect();
    plugin
}

/// Resolve a plugin against its base.
///
/// `resolved` must already hold the resolved base. The result inherits what
/// the base declares and the plugin doesn't override; overridden handlers and
/// commands get the base's version chained underneath.
pub fn resolve_plugin(
    plugin: &GardenPluginSpec,
    resolved: &BTreeMap<String, GardenPluginSpec>,
    configured: &BTreeSet<String>,
) -> Result<GardenPluginSpec> {
    let Some(base_name) = &plugin.base else {
        return Ok(plugin.clone());
    };
    let Some(base) = resolved.get(base_name) else {
        return Err(GardenError::internal(format!(
            "Base plugin '{base_name}' of plugin '{}' must be resolved before the plugin itself.",
            plugin.name
        )));
    };

    debug!(plugin = %plugin.name, base = %base.name, "Resolving plugin against its base");
    let mut out = plugin.clone();

    if out.config_schema.is_none() {
        out.config_schema.clone_from(&base.config_schema);
    }
    if out.outputs_schema.is_none() {
        out.outputs_schema.clone_from(&base.outputs_schema);
    }
    if out.docs.is_none() {
        out.docs.clone_from(&base.docs);
    }

    out.dependencies = merge_dependencies(&plugin.dependencies, &base.dependencies);

    for (name, base_handler) in &base.handlers {
        let base_handler = base_handler
            .clone()
            .with_metadata_defaults(&HandlerMetadata::new(name, None, &base.name));
        let handler = match out.handlers.get(name) {
            Some(own) => own.with_base(&base_handler),
            None => base_handler,
        };
        out.handlers.insert(name.clone(), handler);
    }

    for base_command in &base.commands {
        match out.commands.iter_mut().find(|c| c.name == base_command.name) {
            Some(own) => own.base = Some(Box::new(base_command.clone())),
            None => out.commands.push(base_command.clone()),
        }
    }

    for base_tool in &base.tools {
        if !out.tools.iter().any(|t| t.name == base_tool.name) {
            out.tools.push(base_tool.clone());
        }
    }

    for definition in &base.create_module_types {
        if plugin.create_module_types.iter().any(|own| own.name == definition.name) {
            return Err(GardenError::plugin(format!(
                "Plugin '{}' redeclares the '{}' module type, already declared by its base.",
                plugin.name, definition.name
            )));
        }
    }

    // An unconfigured base can't contribute its module types on its own.
    if !configured.contains(&base.name) {
        out.create_module_types = base
            .create_module_types
            .iter()
            .cloned()
            .chain(plugin.create_module_types.iter().cloned())
            .collect();

        for base_extension in &base.extend_module_types {
            match out.extend_module_types.iter_mut().find(|e| e.name == base_extension.name) {
                Some(own) => {
                    for (name, handler) in &base_extension.handlers {
                        own.handlers.entry(name.clone()).or_insert_with(|| handler.clone());
                    }
                }
                None => out.extend_module_types.push(base_extension.clone()),
            }
        }
    }

    Ok(out)
}

/// Union two dependency lists, deduplicated by name and sorted.
///
/// A dependency stays optional only if every declaration of it is optional.
fn merge_dependencies(own: &[PluginDependency], base: &[PluginDependency]) -> Vec<PluginDependency> {
    let mut merged: BTreeMap<&str, bool> = BTreeMap::new();
    for dependency in own.iter().chain(base) {
        merged
            .entry(dependency.name.as_str())
            .and_modify(|optional| *optional &= dependency.optional)
            .or_insert(dependency.optional);
    }
    merged
        .into_iter()
        .map(|(name, optional)| PluginDependency {
            name: name.to_string(),
            optional,
        })
        .collect()
}

/// Resolve module types across all resolved plugins, then their extensions.
///
/// Rewrites each plugin's `create_module_types` and `extend_module_types` with
/// the resolved versions and returns the module types by name.
pub fn resolve_module_definitions(
    plugins: &mut BTreeMap<String, GardenPluginSpec>,
    plugin_order: &[String],
    plugin_graph: &DependencyGraph,
    configured: &BTreeSet<String>,
) -> Result<BTreeMap<String, ModuleTypeEntry>> {
    let mut declarations: BTreeMap<&str, Vec<(&str, &ModuleTypeDefinition)>> = BTreeMap::new();
    for plugin_name in plugin_order {
        let Some(plugin) = plugins.get(plugin_name) else {
            continue;
        };
        for definition in &plugin.create_module_types {
            declarations.entry(definition.name.as_str()).or_default().push((plugin_name.as_str(), definition));
        }
    }

    let mut selected: BTreeMap<&str, (&str, &ModuleTypeDefinition)> = BTreeMap::new();
    for (type_name, declared) in &declarations {
        let configured_declarations: Vec<&(&str, &ModuleTypeDefinition)> =
            declared.iter().filter(|(plugin, _)| configured.contains(*plugin)).collect();

        if configured_declarations.len() > 1 {
            let plugin_names: Vec<&str> = configured_declarations.iter().map(|(plugin, _)| *plugin).collect();
            return Err(GardenError::configuration(format!(
                "Module type '{type_name}' is declared in multiple plugins: {}.",
                natural_list(&plugin_names)
            )));
        }

        let chosen = configured_declarations.first().copied().or_else(|| declared.first()).copied();
        if let Some(chosen) = chosen {
            selected.insert(*type_name, chosen);
        }
    }

    let mut type_graph = DependencyGraph::new();
    for (type_name, (_, definition)) in &selected {
        type_graph.add_node(type_name);
        if let Some(base) = &definition.base {
            type_graph.add_dependency(type_name, base);
        }
    }
    let type_order = type_graph.overall_order().map_err(|cycle| {
        GardenError::plugin(format!("Found a circular dependency between module type bases: {}", cycle.render()))
    })?;

    let mut resolved: BTreeMap<String, ModuleTypeEntry> = BTreeMap::new();
    for type_name in &type_order {
        let Some((plugin_name, definition)) = selected.get(type_name.as_str()) else {
            continue;
        };
        let entry = resolve_module_type(plugin_name, definition, &resolved, plugin_graph)?;
        trace!(module_type = %type_name, plugin = %plugin_name, "Resolved module type");
        resolved.insert(type_name.clone(), entry);
    }

    let mut extensions = BTreeMap::new();
    for plugin_name in plugin_order {
        let Some(plugin) = plugins.get(plugin_name) else {
            continue;
        };
        let mut resolved_extensions = Vec::with_capacity(plugin.extend_module_types.len());
        for extension in &plugin.extend_module_types {
            let Some(entry) = resolved.get(&extension.name) else {
                return Err(GardenError::plugin(format!(
                    "Plugin '{plugin_name}' extends module type '{}' but the module type has not been declared. \
                     The '{plugin_name}' plugin is likely missing a dependency declaration. \
                     Please report an issue with the author.",
                    extension.name
                )));
            };

            let mut extension = extension.clone();
            extension.handlers = extension
                .handlers
                .into_iter()
                .map(|(handler_name, handler)| {
                    let defaults = HandlerMetadata::new(&handler_name, Some(entry.definition.name.as_str()), plugin_name);
                    let handler = handler.with_metadata_defaults(&defaults);
                    let handler = match entry.definition.handlers.get(&handler_name) {
                        Some(base) => handler.with_base(base),
                        None => handler,
                    };
                    (handler_name, handler)
                })
                .collect();
            resolved_extensions.push(extension);
        }
        extensions.insert(plugin_name.clone(), resolved_extensions);
    }

    for (plugin_name, plugin) in plugins.iter_mut() {
        for definition in &mut plugin.create_module_types {
            if let Some(entry) = resolved.get(&definition.name)
                && entry.plugin_name == *plugin_name
            {
                *definition = entry.definition.clone();
            }
        }
        if let Some(resolved_extensions) = extensions.remove(plugin_name) {
            plugin.extend_module_types = resolved_extensions;
        }
    }

    Ok(resolved)
}

fn resolve_module_type(
    plugin_name: &str,
    definition: &ModuleTypeDefinition,
    resolved: &BTreeMap<String, ModuleTypeEntry>,
    plugin_graph: &DependencyGraph,
) -> Result<ModuleTypeEntry> {
    let type_name = definition.name.as_str();
    let mut definition = definition.clone();
    definition.handlers = std::mem::take(&mut definition.handlers)
        .into_iter()
        .map(|(handler_name, handler)| {
            let defaults = HandlerMetadata::new(&handler_name, Some(type_name), plugin_name);
            (handler_name, handler.with_metadata_defaults(&defaults))
        })
        .collect();

    if let Some(base_name) = &definition.base {
        let Some(base) = resolved.get(base_name) else {
            return Err(GardenError::plugin(format!(
                "Module type '{type_name}', defined in plugin '{plugin_name}', specifies base module type \
                 '{base_name}' which cannot be found. The plugin is likely missing a dependency declaration. \
                 Please report an issue with the author."
            )));
        };

        let related = base.plugin_name == plugin_name
            || plugin_graph.transitive_dependencies(plugin_name).contains(&base.plugin_name);
        if !related {
            return Err(GardenError::plugin(format!(
                "Module type '{type_name}', defined in plugin '{plugin_name}', specifies base module type \
                 '{base_name}' which is defined by '{}', but '{plugin_name}' does not specify a dependency on \
                 that plugin. Plugins must explicitly declare dependencies on plugins that define module types \
                 they reference. Please report an issue with the author.",
                base.plugin_name
            )));
        }

        if definition.schema.is_none() {
            definition.schema.clone_from(&base.definition.schema);
        }

        for (handler_name, handler) in &mut definition.handlers {
            let mut ancestor = Some(base);
            while let Some(current) = ancestor {
                if let Some(base_handler) = current.definition.handlers.get(handler_name) {
                    *handler = handler.with_base(base_handler);
                    break;
                }
                ancestor = current.definition.base.as_ref().and_then(|name| resolved.get(name));
            }
        }
    }

    let needs_build = definition.needs_build;
    Ok(ModuleTypeEntry {
        definition,
        plugin_name: plugin_name.to_string(),
        needs_build,
    })
}
