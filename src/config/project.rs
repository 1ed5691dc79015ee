//! Project configuration (`garden.yml`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::{GardenError, natural_list};
use crate::graph::DependencyGraph;
use crate::plugins::DEFAULT_PROVIDERS;
use crate::template::{
    ContextResolveOpts, GenericContext, Inputs, KeySegment, TemplateValue, collect_context_references,
    resolve_template_strings,
};

/// File name of a project configuration.
pub const PROJECT_CONFIG_FILENAME: &str = "garden.yml";

/// A Garden project as declared in `garden.yml`.
///
/// ```yaml
/// kind: Project
/// name: demo
/// providers:
///   - name: local-kubernetes
///     namespace: ${project.name}-${var.env}
/// variables:
///   env: dev
/// plugins:
///   - plugins/*.yml
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,
    /// Paths or glob patterns of plugin manifests, relative to the project root
    #[serde(default)]
    pub plugins: Vec<String>,
    /// Where the config was loaded from
    #[serde(skip)]
    pub path: PathBuf,
}

/// A provider entry. Everything besides `name` is free-form provider config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(flatten)]
    pub config: BTreeMap<String, serde_yaml::Value>,
}

/// A provider config with its template strings resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedProvider {
    pub name: String,
    pub config: TemplateValue,
    /// Context keys the resolved config was computed from
    pub inputs: Inputs,
    /// Providers this one references via `${providers.<name>...}`
    pub dependencies: Vec<String>,
}

impl ProjectConfig {
    /// Load a project config from a file, or from `garden.yml` in a directory.
    pub fn load(path: &Path) -> Result<Self> {
        let path = if path.is_dir() { path.join(PROJECT_CONFIG_FILENAME) } else { path.to_path_buf() };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read project config at {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse project config at {}", path.display()))?;
        config.path = path;
        debug!(project = %config.name, path = %config.path.display(), "Loaded project config");
        Ok(config)
    }

    /// Parse a project config from YAML.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        if config.kind != "Project" {
            return Err(GardenError::configuration(format!(
                "Expected a config of kind 'Project', found '{}'.",
                config.kind
            ))
            .into());
        }
        Ok(config)
    }

    /// Search `start` and its ancestors for a `garden.yml`.
    #[must_use]
    pub fn find(start: &Path) -> Option<PathBuf> {
        start.ancestors().map(|dir| dir.join(PROJECT_CONFIG_FILENAME)).find(|candidate| candidate.is_file())
    }

    /// Directory the project config lives in.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Names of the configured providers, or the defaults when none are listed.
    #[must_use]
    pub fn configured_providers(&self) -> Vec<String> {
        if self.providers.is_empty() {
            return DEFAULT_PROVIDERS.iter().map(ToString::to_string).collect();
        }
        let mut seen = BTreeSet::new();
        self.providers.iter().map(|p| p.name.clone()).filter(|name| seen.insert(name.clone())).collect()
    }

    /// Project variables with `overrides` applied on top.
    #[must_use]
    pub fn variables(&self, overrides: &BTreeMap<String, TemplateValue>) -> BTreeMap<String, TemplateValue> {
        let mut variables: BTreeMap<String, TemplateValue> =
            self.variables.iter().map(|(k, v)| (k.clone(), TemplateValue::from(v.clone()))).collect();
        variables.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        variables
    }

    /// The context provider configs are resolved against.
    ///
    /// Exposes `project.name`, `var.*` and `variables.*`. Provider outputs are
    /// not known yet, so `providers.*` is left for a later pass.
    #[must_use]
    pub fn template_context(&self, overrides: &BTreeMap<String, TemplateValue>) -> GenericContext {
        let variables = TemplateValue::from(self.variables(overrides));
        let project = BTreeMap::from([("name".to_string(), TemplateValue::from(self.name.as_str()))]);
        GenericContext::new()
            .with_value("project", project)
            .with_value("var", variables.clone())
            .with_value("variables", variables)
            .with_pending("providers")
    }

    /// Resolve every provider config and order providers so that the ones
    /// referenced by others come first.
    pub fn resolve_providers(&self, context: &GenericContext) -> crate::core::Result<Vec<ResolvedProvider>> {
        let configured: BTreeSet<&str> = self.providers.iter().map(|p| p.name.as_str()).collect();
        let mut graph = DependencyGraph::new();
        let mut resolved: BTreeMap<String, ResolvedProvider> = BTreeMap::new();

        for provider in &self.providers {
            let mut tree: BTreeMap<String, TemplateValue> =
                provider.config.iter().map(|(k, v)| (k.clone(), TemplateValue::from(v.clone()))).collect();
            tree.insert("name".to_string(), TemplateValue::from(provider.name.as_str()));
            let tree = TemplateValue::from(tree);

            let dependencies = provider_references(&tree)?;
            let unknown: Vec<&String> = dependencies.iter().filter(|d| !configured.contains(d.as_str())).collect();
            if !unknown.is_empty() {
                return Err(GardenError::configuration(format!(
                    "Provider '{}' references {}, which {} not configured in project '{}'.",
                    provider.name,
                    natural_list(&unknown),
                    if unknown.len() == 1 { "is" } else { "are" },
                    self.name
                )));
            }

            graph.add_node(&provider.name);
            for dependency in &dependencies {
                graph.add_dependency(&provider.name, dependency);
            }

            let resolution = resolve_template_strings(&tree, context, &ContextResolveOpts::partial())?;
            resolved.insert(
                provider.name.clone(),
                ResolvedProvider {
                    name: provider.name.clone(),
                    config: resolution.value,
                    inputs: resolution.inputs,
                    dependencies,
                },
            );
        }

        let order = graph.overall_order().map_err(|cycle| {
            GardenError::configuration(format!("Circular reference detected between providers: {}", cycle.render()))
        })?;
        Ok(order.into_iter().filter_map(|name| resolved.remove(&name)).collect())
    }
}

/// Names of providers referenced via `${providers.<name>...}` in a config tree.
fn provider_references(tree: &TemplateValue) -> crate::core::Result<Vec<String>> {
    let names: BTreeSet<String> = collect_context_references(tree)?
        .into_iter()
        .filter_map(|path| match path.as_slice() {
            [KeySegment::Key(root), KeySegment::Key(name), ..] if root == "providers" => Some(name.clone()),
            _ => None,
        })
        .collect();
    Ok(names.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use tempfile::TempDir;

    const PROJECT: &str = r"
kind: Project
name: demo
providers:
  - name: kubernetes
    namespace: ${project.name}-${var.env}
    registry: ${providers.container.outputs.registry}
  - name: container
    build: ${var.builder || 'docker'}
variables:
  env: dev
";

    #[test]
    fn test_parse_rejects_wrong_kind() {
        let err = ProjectConfig::parse("kind: Module\nname: x\n").unwrap_err();
        assert!(err.to_string().contains("Expected a config of kind 'Project', found 'Module'"));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PROJECT_CONFIG_FILENAME), PROJECT).unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.root(), dir.path());
        assert_eq!(config.configured_providers(), vec!["kubernetes", "container"]);

        let nested = dir.path().join("services/api");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(ProjectConfig::find(&nested), Some(dir.path().join(PROJECT_CONFIG_FILENAME)));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = TempDir::new().unwrap();
        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read project config"));
    }

    #[test]
    fn test_default_providers() {
        let config = ProjectConfig::parse("kind: Project\nname: bare\n").unwrap();
        assert_eq!(config.configured_providers(), vec!["exec", "container"]);
    }

    #[test]
    fn test_resolve_providers_in_dependency_order() {
        let config = ProjectConfig::parse(PROJECT).unwrap();
        let overrides = BTreeMap::from([("env".to_string(), TemplateValue::from("ci"))]);
        let providers = config.resolve_providers(&config.template_context(&overrides)).unwrap();

        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["container", "kubernetes"]);

        let kubernetes = &providers[1];
        assert_eq!(kubernetes.dependencies, vec!["container"]);
        let TemplateValue::Object(resolved) = &kubernetes.config else {
            panic!("expected an object");
        };
        assert_eq!(resolved["namespace"], TemplateValue::from("demo-ci"));
        // Provider outputs aren't known yet.
        assert_eq!(resolved["registry"], TemplateValue::from("${providers.container.outputs.registry}"));
        assert!(kubernetes.inputs.contains("var.env"));

        let TemplateValue::Object(container) = &providers[0].config else {
            panic!("expected an object");
        };
        assert_eq!(container["build"], TemplateValue::from("docker"));
    }

    #[test]
    fn test_provider_reference_errors() {
        let config = ProjectConfig::parse(
            "kind: Project\nname: demo\nproviders:\n  - name: a\n    x: ${providers.ghost.outputs.y}\n",
        )
        .unwrap();
        let err = config.resolve_providers(&config.template_context(&BTreeMap::new())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Provider 'a' references 'ghost', which is not configured"));

        let config = ProjectConfig::parse(
            "kind: Project\nname: demo\nproviders:\n  - name: a\n    x: ${providers.b.outputs.y}\n  - name: b\n    y: ${providers.a.outputs.x}\n",
        )
        .unwrap();
        let err = config.resolve_providers(&config.template_context(&BTreeMap::new())).unwrap_err();
        assert!(err.to_string().contains("Circular reference detected between providers"), "{err}");
    }
}
