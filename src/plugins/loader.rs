//! Loading plugins from their sources.
//!
//! A plugin is registered as a module reference (a manifest path), a factory
//! function, or a ready-made spec. Module references go through a
//! [`PluginLoader`]; [`FilePluginLoader`] reads YAML manifests from disk.
//!
//! All sources are loaded concurrently and collected before any ordering or
//! validation happens, so load order has no effect on the result.
//!
//! # Manifest format
//!
//! ```yaml
//! kind: Plugin
//! name: acme
//! base: exec
//! dependencies:
//!   - container
//!   - name: terraform
//!     optional: true
//! handlers:
//!   getEnvironmentStatus: { ready: true, outputs: {} }
//! createModuleTypes:
//!   - name: acme-service
//!     base: container
//!     docs: An ACME service
//!     needsBuild: true
//!     handlers:
//!       build: { buildLog: "built" }
//! ```
//!
//! Manifest handlers are declarative: each returns the value given in the
//! manifest when called.

use futures::future::{BoxFuture, FutureExt, try_join_all};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::{GardenError, Result};

use super::handler::Handler;
use super::types::{
    GardenPluginSpec, ModuleTypeDefinition, ModuleTypeExtension, PluginCommand, PluginDependency, PluginToolSpec,
};

/// Builds a plugin spec in-process.
pub type PluginFactory = fn() -> GardenPluginSpec;

/// Where a registered plugin comes from.
#[derive(Debug, Clone)]
pub enum PluginSource {
    /// A reference resolved by a [`PluginLoader`], e.g. a manifest path
    Module(String),
    Factory(PluginFactory),
    Spec(Box<GardenPluginSpec>),
}

impl From<GardenPluginSpec> for PluginSource {
    fn from(spec: GardenPluginSpec) -> Self {
        Self::Spec(Box::new(spec))
    }
}

/// Resolves module references to plugin specs.
pub trait PluginLoader: Send + Sync {
    /// Load the plugin referenced by `reference`. Errors name the attempted location.
    fn load_module<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<GardenPluginSpec>>;
}

/// Loads YAML plugin manifests, resolving relative paths against the project root.
#[derive(Debug, Clone)]
pub struct FilePluginLoader {
    project_root: PathBuf,
}

impl FilePluginLoader {
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    fn resolve_path(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() { path.to_path_buf() } else { self.project_root.join(path) }
    }
}

impl PluginLoader for FilePluginLoader {
    fn load_module<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<GardenPluginSpec>> {
        async move {
            let path = self.resolve_path(reference);
            debug!(reference, path = %path.display(), "Loading plugin manifest");

            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                GardenError::configuration(format!(
                    "Unable to load plugin '{reference}' from {}: {e}",
                    path.display()
                ))
            })?;
            parse_manifest(&content, &path)
        }
        .boxed()
    }
}

/// Expand manifest path patterns (relative to `project_root`) into plugin sources.
///
/// Plain paths are kept even when they don't exist so loading reports them.
pub fn plugin_sources_from_patterns(project_root: &Path, patterns: &[String]) -> Result<Vec<PluginSource>> {
    let mut sources = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            sources.push(PluginSource::Module(pattern.clone()));
            continue;
        }

        let absolute = project_root.join(pattern);
        let entries = glob::glob(&absolute.to_string_lossy()).map_err(|e| {
            GardenError::configuration(format!("Invalid plugin path pattern '{pattern}': {e}"))
        })?;
        let mut matched: Vec<PathBuf> = entries.filter_map(std::result::Result::ok).collect();
        matched.sort();
        debug!(pattern, matches = matched.len(), "Expanded plugin path pattern");
        sources.extend(matched.into_iter().map(|p| PluginSource::Module(p.to_string_lossy().into_owned())));
    }
    Ok(sources)
}

/// Load every source concurrently and check that plugin names are unique.
pub async fn load_plugin_sources(
    sources: &[PluginSource],
    loader: &dyn PluginLoader,
) -> Result<Vec<GardenPluginSpec>> {
    let loaded = try_join_all(sources.iter().map(|source| load_source(source, loader))).await?;

    let mut seen = BTreeSet::new();
    for plugin in &loaded {
        if !seen.insert(plugin.name.as_str()) {
            return Err(GardenError::plugin(format!(
                "Plugin '{}' is registered more than once.",
                plugin.name
            )));
        }
    }

    debug!(count = loaded.len(), "Loaded plugin sources");
    Ok(loaded)
}

async fn load_source(source: &PluginSource, loader: &dyn PluginLoader) -> Result<GardenPluginSpec> {
    match source {
        PluginSource::Module(reference) => loader.load_module(reference).await,
        PluginSource::Factory(factory) => Ok(factory()),
        PluginSource::Spec(spec) => Ok((**spec).clone()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PluginManifest {
    kind: String,
    name: String,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    docs: Option<String>,
    #[serde(default)]
    dependencies: Vec<PluginDependency>,
    #[serde(default)]
    handlers: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    create_module_types: Vec<ModuleTypeManifest>,
    #[serde(default)]
    extend_module_types: Vec<ModuleTypeExtensionManifest>,
    #[serde(default)]
    commands: Vec<CommandManifest>,
    #[serde(default)]
    tools: Vec<PluginToolSpec>,
    #[serde(default)]
    config_schema: Option<serde_json::Value>,
    #[serde(default)]
    outputs_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ModuleTypeManifest {
    name: String,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    docs: String,
    #[serde(default)]
    schema: Option<serde_json::Value>,
    #[serde(default)]
    needs_build: bool,
    #[serde(default)]
    handlers: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleTypeExtensionManifest {
    name: String,
    #[serde(default)]
    handlers: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandManifest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    result: serde_json::Value,
}

fn constant_handlers(handlers: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, Handler> {
    handlers.into_iter().map(|(name, value)| (name, Handler::constant(value))).collect()
}

impl From<PluginManifest> for GardenPluginSpec {
    fn from(manifest: PluginManifest) -> Self {
        Self {
            name: manifest.name,
            base: manifest.base,
            docs: manifest.docs,
            dependencies: manifest.dependencies,
            handlers: constant_handlers(manifest.handlers),
            create_module_types: manifest
                .create_module_types
                .into_iter()
                .map(|m| ModuleTypeDefinition {
                    name: m.name,
                    base: m.base,
                    docs: m.docs,
                    schema: m.schema,
                    needs_build: m.needs_build,
                    handlers: constant_handlers(m.handlers),
                })
                .collect(),
            extend_module_types: manifest
                .extend_module_types
                .into_iter()
                .map(|e| ModuleTypeExtension {
                    name: e.name,
                    handlers: constant_handlers(e.handlers),
                })
                .collect(),
            commands: manifest
                .commands
                .into_iter()
                .map(|c| PluginCommand::new(&c.name, &c.description, Handler::constant(c.result)))
                .collect(),
            tools: manifest.tools,
            config_schema: manifest.config_schema,
            outputs_schema: manifest.outputs_schema,
        }
    }
}

/// Parse a YAML plugin manifest read from `origin`.
pub fn parse_manifest(content: &str, origin: &Path) -> Result<GardenPluginSpec> {
    let manifest: PluginManifest = serde_yaml::from_str(content).map_err(|e| {
        GardenError::plugin(format!("Invalid plugin manifest at {}: {e}", origin.display()))
    })?;

    if manifest.kind != "Plugin" {
        return Err(GardenError::plugin(format!(
            "Invalid plugin manifest at {}: expected kind 'Plugin', got '{}'.",
            origin.display(),
            manifest.kind
        )));
    }

    Ok(manifest.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
kind: Plugin
name: acme
base: exec
dependencies:
  - container
  - name: terraform
    optional: true
handlers:
  getEnvironmentStatus: { ready: true }
createModuleTypes:
  - name: acme-service
    base: container
    needsBuild: true
    handlers:
      build: { buildLog: built }
commands:
  - name: cleanup
    description: Remove ACME resources
    result: { removed: 3 }
"#;

    #[test]
    fn test_parse_manifest() {
        let spec = parse_manifest(MANIFEST, Path::new("acme.yml")).unwrap();
        assert_eq!(spec.name, "acme");
        assert_eq!(spec.base.as_deref(), Some("exec"));
        assert_eq!(spec.dependencies.len(), 2);
        assert!(spec.dependencies[1].optional);
        assert_eq!(
            spec.handlers["getEnvironmentStatus"].call(&json!({})).unwrap(),
            json!({"ready": true})
        );
        let module_type = &spec.create_module_types[0];
        assert!(module_type.needs_build);
        assert_eq!(module_type.base.as_deref(), Some("container"));
        assert_eq!(spec.commands[0].handler.call(&json!(null)).unwrap(), json!({"removed": 3}));
    }

    #[test]
    fn test_parse_manifest_rejects_wrong_kind_and_unknown_fields() {
        let err = parse_manifest("kind: Project\nname: x\n", Path::new("x.yml")).unwrap_err();
        assert!(err.to_string().contains("expected kind 'Plugin'"));

        let err = parse_manifest("kind: Plugin\nname: x\nbogus: 1\n", Path::new("x.yml")).unwrap_err();
        assert!(err.to_string().contains("x.yml"));
    }

    #[tokio::test]
    async fn test_load_sources_concurrently() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("acme.yml"), MANIFEST).unwrap();

        let loader = FilePluginLoader::new(temp.path());
        let sources = vec![
            PluginSource::Module("acme.yml".into()),
            PluginSource::Factory(|| GardenPluginSpec::new("exec")),
            GardenPluginSpec::new("container").into(),
        ];
        let loaded = load_plugin_sources(&sources, &loader).await.unwrap();
        let names: Vec<_> = loaded.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["acme", "exec", "container"]);
    }

    #[tokio::test]
    async fn test_missing_manifest_names_location() {
        let temp = TempDir::new().unwrap();
        let loader = FilePluginLoader::new(temp.path());
        let err = load_plugin_sources(&[PluginSource::Module("missing.yml".into())], &loader)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Unable to load plugin 'missing.yml'"), "{message}");
        assert!(message.contains("missing.yml"));
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let loader = FilePluginLoader::new(".");
        let sources = vec![GardenPluginSpec::new("exec").into(), GardenPluginSpec::new("exec").into()];
        let err = load_plugin_sources(&sources, &loader).await.unwrap_err();
        assert!(err.to_string().contains("'exec' is registered more than once"));
    }

    #[test]
    fn test_sources_from_patterns() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("plugins")).unwrap();
        std::fs::write(temp.path().join("plugins/b.yml"), "").unwrap();
        std::fs::write(temp.path().join("plugins/a.yml"), "").unwrap();

        let sources =
            plugin_sources_from_patterns(temp.path(), &["plugins/*.yml".into(), "other.yml".into()]).unwrap();
        let references: Vec<String> = sources
            .iter()
            .map(|s| match s {
                PluginSource::Module(r) => r.clone(),
                other => panic!("unexpected source {other:?}"),
            })
            .collect();
        assert_eq!(references.len(), 3);
        assert!(references[0].ends_with("a.yml"));
        assert!(references[1].ends_with("b.yml"));
        assert_eq!(references[2], "other.yml");
    }
}
