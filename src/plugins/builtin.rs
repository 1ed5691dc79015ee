//! Built-in plugins.
//!
//! These declare the provider and module-type surface of Garden's bundled
//! providers. Their handlers only describe what they would do; the provider
//! implementations themselves live elsewhere.

use serde_json::{Value, json};

use super::handler::Handler;
use super::loader::PluginSource;
use super::types::{
    GardenPluginSpec, ModuleTypeDefinition, ModuleTypeExtension, PluginCommand, PluginDependency, PluginToolSpec,
};

/// Sources for every built-in plugin, in registration order.
#[must_use]
pub fn builtin_plugin_sources() -> Vec<PluginSource> {
    vec![
        PluginSource::Factory(exec),
        PluginSource::Factory(container),
        PluginSource::Factory(kubernetes),
        PluginSource::Factory(local_kubernetes),
        PluginSource::Factory(jib),
        PluginSource::Factory(terraform),
    ]
}

/// Providers configured when a project doesn't list any.
pub const DEFAULT_PROVIDERS: &[&str] = &["exec", "container"];

fn configure_provider() -> Handler {
    Handler::new(|params| {
        let config = params.args.get("config").cloned().unwrap_or_else(|| json!({}));
        Ok(json!({ "config": config, "moduleConfigs": [] }))
    })
}

fn ready() -> Handler {
    Handler::constant(json!({ "ready": true, "outputs": {} }))
}

fn describe(action: &'static str) -> Handler {
    Handler::new(move |params| {
        let name = params.args.get("name").and_then(Value::as_str).unwrap_or("unnamed");
        Ok(json!({ "action": action, "name": name }))
    })
}

fn tool(name: &str, description: &str, version: &str) -> PluginToolSpec {
    PluginToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        version: Some(version.to_string()),
        url: None,
    }
}

/// Runs arbitrary local commands.
#[must_use]
pub fn exec() -> GardenPluginSpec {
    GardenPluginSpec::new("exec")
        .with_docs("Run local scripts and commands as part of the stack.")
        .with_handler("configureProvider", configure_provider())
        .with_handler("getEnvironmentStatus", ready())
        .create_module_type(
            ModuleTypeDefinition::new("exec", "A general-purpose module for executing local commands.")
                .needs_build(true)
                .with_schema(json!({
                    "type": "object",
                    "properties": { "build": { "type": "object" }, "local": { "type": "boolean" } }
                }))
                .with_handler("configure", describe("configure"))
                .with_handler("build", describe("build"))
                .with_handler("runModule", describe("run"))
                .with_handler("testModule", describe("test")),
        )
}

/// Builds and publishes container images.
#[must_use]
pub fn container() -> GardenPluginSpec {
    GardenPluginSpec::new("container")
        .with_docs("Build and publish container images.")
        .with_handler("getEnvironmentStatus", ready())
        .with_tool(tool("docker", "The Docker CLI.", "24.0.5"))
        .create_module_type(
            ModuleTypeDefinition::new("container", "Specify a container image to build or pull from a remote registry.")
                .needs_build(true)
                .with_schema(json!({
                    "type": "object",
                    "properties": { "image": { "type": "string" }, "dockerfile": { "type": "string" } }
                }))
                .with_handler("configure", describe("configure"))
                .with_handler("getBuildStatus", Handler::constant(json!({ "ready": false })))
                .with_handler("build", describe("build"))
                .with_handler("publish", describe("publish")),
        )
}

/// Deploys to a remote Kubernetes cluster.
#[must_use]
pub fn kubernetes() -> GardenPluginSpec {
    GardenPluginSpec::new("kubernetes")
        .with_docs("Deploy services and run tasks in a Kubernetes cluster.")
        .with_dependency(PluginDependency::required("container"))
        .with_config_schema(json!({
            "type": "object",
            "properties": { "context": { "type": "string" }, "namespace": { "type": "string" } }
        }))
        .with_outputs_schema(json!({
            "type": "object",
            "properties": { "app-namespace": { "type": "string" } }
        }))
        .with_handler("configureProvider", configure_provider())
        .with_handler("getEnvironmentStatus", ready())
        .with_handler("prepareEnvironment", Handler::constant(json!({ "status": { "ready": true } })))
        .with_handler("cleanupEnvironment", Handler::constant(json!({})))
        .with_handler("getSecret", Handler::constant(json!({ "value": null })))
        .with_command(PluginCommand::new(
            "cluster-init",
            "Initialize or update cluster-wide Garden services.",
            Handler::constant(json!({ "result": "initialized" })),
        ))
        .with_command(PluginCommand::new(
            "uninstall-garden-services",
            "Clean up all installed cluster-wide Garden services.",
            Handler::constant(json!({ "result": "uninstalled" })),
        ))
        .with_tool(tool("kubectl", "The Kubernetes command line tool.", "1.29.0"))
        .with_tool(tool("helm", "The Helm package manager for Kubernetes.", "3.14.0"))
        .create_module_type(
            ModuleTypeDefinition::new("helm", "Specify a Helm chart to deploy.")
                .with_schema(json!({ "type": "object", "properties": { "chart": { "type": "string" } } }))
                .with_handler("configure", describe("configure"))
                .with_handler("deployService", describe("deploy"))
                .with_handler("getServiceStatus", Handler::constant(json!({ "state": "unknown" })))
                .with_handler("deleteService", describe("delete")),
        )
        .create_module_type(
            ModuleTypeDefinition::new("kubernetes", "Specify one or more Kubernetes manifests to deploy.")
                .with_handler("configure", describe("configure"))
                .with_handler("deployService", describe("deploy"))
                .with_handler("deleteService", describe("delete")),
        )
        .extend_module_type(
            ModuleTypeExtension::new("container")
                .with_handler("deployService", describe("deploy"))
                .with_handler("getServiceStatus", Handler::constant(json!({ "state": "unknown" })))
                .with_handler("deleteService", describe("delete"))
                .with_handler("execInService", describe("exec")),
        )
}

/// Kubernetes on a local development cluster.
///
/// Overrides a subset of the `kubernetes` handlers and delegates to them.
#[must_use]
pub fn local_kubernetes() -> GardenPluginSpec {
    GardenPluginSpec::new("local-kubernetes")
        .with_base("kubernetes")
        .with_docs("Deploy to a local Kubernetes cluster, such as Docker Desktop, minikube or kind.")
        .with_handler(
            "configureProvider",
            Handler::new(|params| {
                let mut result = match params.base {
                    Some(base) => base.call(params.args)?,
                    None => json!({}),
                };
                if let Some(config) = result.get_mut("config").and_then(Value::as_object_mut) {
                    config.entry("context").or_insert_with(|| json!("docker-desktop"));
                }
                Ok(result)
            }),
        )
        .with_handler("prepareEnvironment", Handler::delegating(json!({ "status": { "ready": true } })))
        .with_command(PluginCommand::new(
            "cluster-init",
            "Initialize or update cluster-wide Garden services on the local cluster.",
            Handler::new(|params| match params.base {
                Some(base) => base.call(params.args),
                None => Ok(json!({ "result": "initialized" })),
            }),
        ))
        .extend_module_type(
            ModuleTypeExtension::new("container")
                .with_handler("deployService", describe("deploy-local"))
                .with_handler("getServiceLogs", describe("logs")),
        )
}

/// Builds JVM container images with Jib.
#[must_use]
pub fn jib() -> GardenPluginSpec {
    GardenPluginSpec::new("jib")
        .with_docs("Build Java container images with Jib.")
        .with_dependency(PluginDependency::required("container"))
        .create_module_type(
            ModuleTypeDefinition::new("jib-container", "Extends the container type to build images with Jib.")
                .with_base("container")
                .needs_build(true)
                .with_handler("configure", Handler::delegating(json!({})))
                .with_handler(
                    "build",
                    Handler::new(|params| {
                        let from_base = params.base.map(|base| base.call(params.args)).transpose()?;
                        Ok(json!({ "action": "jib-build", "container": from_base }))
                    }),
                ),
        )
}

/// Provisions infrastructure with Terraform.
#[must_use]
pub fn terraform() -> GardenPluginSpec {
    GardenPluginSpec::new("terraform")
        .with_docs("Provision infrastructure with Terraform stacks.")
        .with_outputs_schema(json!({ "type": "object", "additionalProperties": true }))
        .with_handler("configureProvider", configure_provider())
        .with_handler("getEnvironmentStatus", ready())
        .with_handler("prepareEnvironment", Handler::constant(json!({ "status": { "ready": true } })))
        .with_handler("cleanupEnvironment", Handler::constant(json!({})))
        .with_tool(tool("terraform", "The Terraform CLI.", "1.7.4"))
        .create_module_type(
            ModuleTypeDefinition::new("terraform", "Resolves a Terraform stack and its outputs.")
                .with_schema(json!({ "type": "object", "properties": { "root": { "type": "string" } } }))
                .with_handler("configure", describe("configure"))
                .with_handler("deployService", describe("apply"))
                .with_handler("getServiceStatus", Handler::constant(json!({ "state": "ready" })))
                .with_handler("deleteService", describe("destroy")),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::resolver::resolve_plugins;
    use crate::plugins::validate::validate_plugin;

    fn all() -> Vec<GardenPluginSpec> {
        vec![exec(), container(), kubernetes(), local_kubernetes(), jib(), terraform()]
    }

    #[test]
    fn test_builtins_are_valid() {
        for plugin in all() {
            validate_plugin(&plugin).unwrap();
        }
    }

    #[test]
    fn test_local_kubernetes_delegates_to_base() {
        let registry = resolve_plugins(all(), &["local-kubernetes".to_string()]).unwrap();
        let plugin = registry.plugin("local-kubernetes").unwrap();

        let configured = plugin.handlers["configureProvider"].call(&json!({ "config": { "name": "local" } })).unwrap();
        assert_eq!(configured["config"]["context"], json!("docker-desktop"));
        assert_eq!(configured["config"]["name"], json!("local"));

        // kubernetes isn't configured, so its module types move to local-kubernetes.
        assert_eq!(registry.module_type("helm").unwrap().plugin_name, "local-kubernetes");
        assert!(plugin.tools.iter().any(|t| t.name == "kubectl"));
        assert!(plugin.config_schema.is_some());
        let cluster_init = plugin.commands.iter().find(|c| c.name == "cluster-init").unwrap();
        assert!(cluster_init.base.is_some());
    }

    #[test]
    fn test_jib_build_calls_through_to_container() {
        let registry = resolve_plugins(all(), &["jib".to_string()]).unwrap();
        let build = &registry.module_type("jib-container").unwrap().definition.handlers["build"];
        let result = build.call(&json!({ "name": "api" })).unwrap();
        assert_eq!(result["container"], json!({ "action": "build", "name": "api" }));
    }

    #[test]
    fn test_default_providers_still_resolve_every_builtin() {
        let defaults: Vec<String> = DEFAULT_PROVIDERS.iter().map(ToString::to_string).collect();
        let registry = resolve_plugins(all(), &defaults).unwrap();

        assert_eq!(registry.len(), 6);
        assert!(!registry.is_configured("kubernetes"));
        // Both kubernetes plugins declare `helm`; the base comes first in dependency order.
        assert_eq!(registry.module_type("helm").unwrap().plugin_name, "kubernetes");
        assert_eq!(registry.module_type("jib-container").unwrap().plugin_name, "jib");
    }
}
