//! Test fixtures for projects and plugin manifests
//!
//! [`ProjectFixture`] lays out a throwaway project directory with a
//! `garden.yml` and any number of plugin manifests.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture for `garden.yml` contents
#[derive(Clone, Debug)]
pub struct ProjectConfigFixture {
    pub content: String,
}

impl ProjectConfigFixture {
    /// A project configuring `local-kubernetes` with templated provider config
    pub fn basic() -> Self {
        Self {
            content: r"
kind: Project
name: demo
providers:
  - name: local-kubernetes
    namespace: ${project.name}-${var.env}
    context: ${var.context || 'docker-desktop'}
  - name: container
variables:
  env: dev
"
            .trim_start()
            .to_string(),
        }
    }

    /// A project loading plugin manifests from `plugins/`
    pub fn with_plugins(providers: &[&str]) -> Self {
        let providers: String = providers.iter().map(|p| format!("  - name: {p}\n")).collect();
        Self {
            content: format!("kind: Project\nname: demo\nproviders:\n{providers}plugins:\n  - plugins/*.yml\n"),
        }
    }
}

/// Test fixture for YAML plugin manifests
#[derive(Clone, Debug)]
pub struct PluginManifestFixture {
    pub name: String,
    pub content: String,
}

impl PluginManifestFixture {
    /// A plugin extending `container` with a derived module type
    pub fn acme() -> Self {
        Self {
            name: "acme".to_string(),
            content: r"
kind: Plugin
name: acme
dependencies:
  - container
handlers:
  getEnvironmentStatus: { ready: true, outputs: {} }
createModuleTypes:
  - name: acme-image
    base: container
    docs: Container images built by ACME
    needsBuild: true
    handlers:
      build: { buildLog: built by acme }
extendModuleTypes:
  - name: container
    handlers:
      publish: { published: true }
"
            .trim_start()
            .to_string(),
        }
    }

    /// A plugin whose base is itself
    pub fn self_based() -> Self {
        Self {
            name: "ouroboros".to_string(),
            content: "kind: Plugin\nname: ouroboros\nbase: ouroboros\n".to_string(),
        }
    }

    /// A plugin creating a module type that `container` already creates
    pub fn duplicate_container() -> Self {
        Self {
            name: "other-container".to_string(),
            content: "kind: Plugin\nname: other-container\ncreateModuleTypes:\n  - name: container\n".to_string(),
        }
    }
}

/// A temporary project directory.
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    /// Create a project with the given `garden.yml` contents.
    pub fn new(config: &ProjectConfigFixture) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp dir")?;
        fs::write(dir.path().join("garden.yml"), &config.content).context("Failed to write garden.yml")?;
        Ok(Self {
            dir,
        })
    }

    /// Add a plugin manifest under `plugins/`.
    pub fn with_plugin(self, plugin: &PluginManifestFixture) -> Result<Self> {
        let plugins = self.dir.path().join("plugins");
        fs::create_dir_all(&plugins)?;
        fs::write(plugins.join(format!("{}.yml", plugin.name)), &plugin.content)
            .with_context(|| format!("Failed to write plugin manifest {}", plugin.name))?;
        Ok(self)
    }

    /// Write an arbitrary file relative to the project root.
    pub fn write_file(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
