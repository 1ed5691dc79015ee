//! Per-invocation session state.
//!
//! A [`GardenSession`] is created once per CLI invocation and owns everything
//! that must not outlive it: the frozen plugin registry and the legacy-ID map
//! used while converting module-based config to actions. Nothing here is
//! process-global; dropping the session tears it all down.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ProjectConfig, ResolvedProvider};
use crate::plugins::{
    FilePluginLoader, PluginRegistry, PluginSource, builtin_plugin_sources, load_plugins, plugin_sources_from_patterns,
};
use crate::template::{GenericContext, TemplateValue};

/// Maps legacy identifiers (e.g. `build.api` for a module build) to the
/// identifiers that replaced them.
///
/// Safe to share between tasks resolving configs concurrently.
#[derive(Debug, Default)]
pub struct LegacyIdMap {
    ids: DashMap<String, String>,
}

impl LegacyIdMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping, returning the previous replacement if there was one.
    pub fn insert(&self, legacy: impl Into<String>, current: impl Into<String>) -> Option<String> {
        self.ids.insert(legacy.into(), current.into())
    }

    #[must_use]
    pub fn get(&self, legacy: &str) -> Option<String> {
        self.ids.get(legacy).map(|entry| entry.value().clone())
    }

    /// The replacement for `id`, or `id` itself when it isn't a legacy id.
    #[must_use]
    pub fn resolve(&self, id: &str) -> String {
        self.get(id).unwrap_or_else(|| id.to_string())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&self) {
        self.ids.clear();
    }
}

/// State for one Garden invocation.
#[derive(Debug)]
pub struct GardenSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    project: ProjectConfig,
    registry: Arc<PluginRegistry>,
    variables: BTreeMap<String, TemplateValue>,
    legacy_ids: LegacyIdMap,
}

impl GardenSession {
    /// Create a session around an already resolved registry.
    #[must_use]
    pub fn new(project: ProjectConfig, registry: PluginRegistry) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            project,
            registry: Arc::new(registry),
            variables: BTreeMap::new(),
            legacy_ids: LegacyIdMap::new(),
        }
    }

    /// Load the built-in plugins plus the project's plugin manifests and
    /// resolve them against the project's configured providers.
    pub async fn open(project: ProjectConfig) -> Result<Self> {
        let root = project.root().to_path_buf();
        let mut sources: Vec<PluginSource> = builtin_plugin_sources();
        sources.extend(plugin_sources_from_patterns(&root, &project.plugins)?);

        let loader = FilePluginLoader::new(&root);
        let registry = load_plugins(&sources, &loader, &project.configured_providers())
            .await
            .with_context(|| format!("Failed to resolve plugins for project '{}'", project.name))?;

        let session = Self::new(project, registry);
        info!(
            session = %session.id,
            project = %session.project.name,
            plugins = session.registry.len(),
            "Opened session"
        );
        Ok(session)
    }

    /// Apply variable overrides (e.g. from `--var`) for this session.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, TemplateValue>) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// The frozen plugin registry, shareable across tasks.
    #[must_use]
    pub fn registry(&self) -> Arc<PluginRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub const fn legacy_ids(&self) -> &LegacyIdMap {
        &self.legacy_ids
    }

    /// The project template context with this session's variable overrides.
    #[must_use]
    pub fn template_context(&self) -> GenericContext {
        self.project.template_context(&self.variables)
    }

    /// Resolve the project's provider configs in dependency order.
    pub fn resolve_providers(&self) -> Result<Vec<ResolvedProvider>> {
        let providers = self.project.resolve_providers(&self.template_context())?;
        Ok(providers)
    }
}

impl Drop for GardenSession {
    fn drop(&mut self) {
        let elapsed = Utc::now() - self.started_at;
        debug!(
            session = %self.id,
            legacy_ids = self.legacy_ids.len(),
            elapsed_ms = elapsed.num_milliseconds(),
            "Closing session"
        );
        self.legacy_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::resolve_plugins;

    fn project(yaml: &str) -> ProjectConfig {
        ProjectConfig::parse(yaml).unwrap()
    }

    #[test]
    fn test_legacy_id_map() {
        let ids = LegacyIdMap::new();
        assert!(ids.is_empty());
        assert_eq!(ids.insert("build.api", "build.api-image"), None);
        assert_eq!(ids.insert("build.api", "build.api-v2"), Some("build.api-image".to_string()));
        assert_eq!(ids.resolve("build.api"), "build.api-v2");
        assert_eq!(ids.resolve("deploy.web"), "deploy.web");
        ids.clear();
        assert_eq!(ids.len(), 0);
    }

    #[test]
    fn test_sessions_do_not_share_state() {
        let first = GardenSession::new(project("kind: Project\nname: a\n"), PluginRegistry::default());
        let second = GardenSession::new(project("kind: Project\nname: b\n"), PluginRegistry::default());
        first.legacy_ids().insert("build.api", "build.api-image");

        assert_ne!(first.id(), second.id());
        assert!(second.legacy_ids().is_empty());
        assert!(second.started_at() >= first.started_at());
    }

    #[test]
    fn test_variable_overrides_reach_providers() {
        let config = project(
            "kind: Project\nname: demo\nproviders:\n  - name: exec\n    env: ${var.env}\nvariables:\n  env: dev\n",
        );
        let registry = resolve_plugins(vec![crate::plugins::builtin::exec()], &config.configured_providers()).unwrap();
        let session = GardenSession::new(config, registry)
            .with_variables(BTreeMap::from([("env".to_string(), TemplateValue::from("prod"))]));

        let providers = session.resolve_providers().unwrap();
        let TemplateValue::Object(resolved) = &providers[0].config else {
            panic!("expected an object");
        };
        assert_eq!(resolved["env"], TemplateValue::from("prod"));
        assert!(session.registry().plugin("exec").is_some());
    }

    #[tokio::test]
    async fn test_open_loads_builtins_and_project_plugins() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("plugins")).unwrap();
        std::fs::write(
            dir.path().join("plugins/acme.yml"),
            "kind: Plugin\nname: acme\ndependencies: [container]\ncreateModuleTypes:\n  - name: acme-image\n    base: container\n    docs: ACME images\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("garden.yml"),
            "kind: Project\nname: demo\nproviders:\n  - name: acme\nplugins:\n  - plugins/*.yml\n",
        )
        .unwrap();

        let session = GardenSession::open(ProjectConfig::load(dir.path()).unwrap()).await.unwrap();
        let registry = session.registry();
        assert_eq!(registry.module_type("acme-image").unwrap().plugin_name, "acme");
        assert!(registry.module_type("acme-image").unwrap().definition.schema.is_some());
        assert!(registry.is_configured("acme"));
    }
}
