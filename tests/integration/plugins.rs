use garden_core::config::ProjectConfig;
use garden_core::core::ErrorKind;
use garden_core::plugins::{
    FilePluginLoader, GardenPluginSpec, PluginSource, builtin_plugin_sources, load_plugins, resolve_plugins,
};
use garden_core::session::GardenSession;
use garden_core::test_utils::{
    PluginManifestFixture, ProjectConfigFixture, ProjectFixture, inheritance_plugins, init_test_logging,
};
use serde_json::json;

fn configured(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

#[test]
fn test_child_handler_chains_to_base() {
    init_test_logging(None);
    let registry = resolve_plugins(inheritance_plugins(), &configured(&["child"])).unwrap();
    let child = registry.plugin("child").unwrap();

    let prepare = &child.handlers["prepareEnvironment"];
    assert_eq!(prepare.call(&json!({})).unwrap(), json!("child-prepare"));
    assert_eq!(prepare.base().unwrap().call(&json!({})).unwrap(), json!("base-prepare"));

    let chain: Vec<_> = prepare.chain().iter().map(|m| m.plugin_name.clone().unwrap_or_default()).collect();
    assert_eq!(chain, vec!["child", "base"]);

    // Dependencies of the base are inherited.
    assert_eq!(child.dependencies.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(), vec!["shared"]);
    assert_eq!(registry.order(), ["shared", "base", "child"]);
}

#[test]
fn test_configured_base_keeps_its_module_types() {
    let registry = resolve_plugins(inheritance_plugins(), &configured(&["base", "child"])).unwrap();
    assert_eq!(registry.module_type("base-type").unwrap().plugin_name, "base");

    let child_type = registry.module_type("child-type").unwrap();
    assert_eq!(child_type.plugin_name, "child");
    let build = &child_type.definition.handlers["build"];
    assert_eq!(build.base().unwrap().call(&json!({})).unwrap(), json!("base-build"));

    let registry = resolve_plugins(inheritance_plugins(), &configured(&["child"])).unwrap();
    assert_eq!(registry.module_type("base-type").unwrap().plugin_name, "child");
}

#[test]
fn test_plugin_base_cycle() {
    let plugins = vec![GardenPluginSpec::new("a").with_base("b"), GardenPluginSpec::new("b").with_base("a")];
    let err = resolve_plugins(plugins, &configured(&["a"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Plugin);
    let message = err.to_string();
    assert!(message.contains("circular dependency between registered plugins"), "{message}");
    assert!(message.contains("a → b") || message.contains("b → a"), "{message}");
}

#[test]
fn test_resolution_is_repeatable() {
    let first = resolve_plugins(inheritance_plugins(), &configured(&["child"])).unwrap();
    let second = resolve_plugins(inheritance_plugins(), &configured(&["child"])).unwrap();
    assert_eq!(first.summary(), second.summary());
    assert_eq!(
        serde_json::to_value(first.summary()).unwrap(),
        serde_json::to_value(second.summary()).unwrap()
    );
}

#[tokio::test]
async fn test_builtins_with_manifest_plugin() {
    let project = ProjectFixture::new(&ProjectConfigFixture::with_plugins(&["acme", "local-kubernetes"]))
        .unwrap()
        .with_plugin(&PluginManifestFixture::acme())
        .unwrap();

    let session = GardenSession::open(ProjectConfig::load(project.path()).unwrap()).await.unwrap();
    let registry = session.registry();

    let acme_image = registry.module_type("acme-image").unwrap();
    assert_eq!(acme_image.definition.base.as_deref(), Some("container"));
    let build = &acme_image.definition.handlers["build"];
    assert_eq!(build.call(&json!({})).unwrap(), json!({ "buildLog": "built by acme" }));
    assert_eq!(build.base().unwrap().metadata().plugin_name.as_deref(), Some("container"));

    // local-kubernetes pulls up the kubernetes module types.
    assert_eq!(registry.module_type("helm").unwrap().plugin_name, "local-kubernetes");
    let acme = registry.plugin("acme").unwrap();
    let publish = &acme.extend_module_types[0].handlers["publish"];
    assert_eq!(publish.base().unwrap().metadata().module_type.as_deref(), Some("container"));
}

#[tokio::test]
async fn test_duplicate_module_type_in_configured_plugins() {
    let project = ProjectFixture::new(&ProjectConfigFixture::with_plugins(&["container", "other-container"]))
        .unwrap()
        .with_plugin(&PluginManifestFixture::duplicate_container())
        .unwrap();

    let err = GardenSession::open(ProjectConfig::load(project.path()).unwrap()).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Module type 'container' is declared in multiple plugins"), "{message}");
    assert!(message.contains("'other-container'"), "{message}");

    // Registering the duplicate without configuring it is fine.
    let project = ProjectFixture::new(&ProjectConfigFixture::with_plugins(&["container"]))
        .unwrap()
        .with_plugin(&PluginManifestFixture::duplicate_container())
        .unwrap();
    let session = GardenSession::open(ProjectConfig::load(project.path()).unwrap()).await.unwrap();
    assert_eq!(session.registry().module_type("container").unwrap().plugin_name, "container");
    assert!(session.registry().plugin("other-container").is_some());
}

#[tokio::test]
async fn test_unconfigured_manifest_plugins_are_resolved() {
    let project = ProjectFixture::new(&ProjectConfigFixture::with_plugins(&["exec"]))
        .unwrap()
        .with_plugin(&PluginManifestFixture::acme())
        .unwrap();

    let session = GardenSession::open(ProjectConfig::load(project.path()).unwrap()).await.unwrap();
    let registry = session.registry();
    assert!(!registry.is_configured("acme"));
    assert_eq!(registry.module_type("acme-image").unwrap().plugin_name, "acme");

    // A broken plugin fails resolution even when no provider uses it.
    project
        .write_file("plugins/broken.yml", "kind: Plugin\nname: broken\nbase: nowhere\n")
        .unwrap();
    let err = GardenSession::open(ProjectConfig::load(project.path()).unwrap()).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Plugin 'broken' specifies plugin 'nowhere' as a base"), "{message}");
}

#[tokio::test]
async fn test_self_based_manifest_fails_before_ordering() {
    let project = ProjectFixture::new(&ProjectConfigFixture::with_plugins(&["exec"]))
        .unwrap()
        .with_plugin(&PluginManifestFixture::self_based())
        .unwrap();

    let loader = FilePluginLoader::new(project.path());
    let mut sources = builtin_plugin_sources();
    sources.push(PluginSource::Module("plugins/ouroboros.yml".to_string()));

    let err = load_plugins(&sources, &loader, &configured(&["exec"])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Plugin);
    assert!(err.to_string().contains("'ouroboros' references itself as a base plugin"));
}

#[tokio::test]
async fn test_unregistered_provider_suggests_a_name() {
    let loader = FilePluginLoader::new(".");
    let err = load_plugins(&builtin_plugin_sources(), &loader, &configured(&["terraformm"])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("Did you mean 'terraform'?"), "{err}");
}

#[tokio::test]
async fn test_missing_manifest_is_reported() {
    let project = ProjectFixture::new(&ProjectConfigFixture::basic()).unwrap();
    project
        .write_file("garden.yml", "kind: Project\nname: demo\nplugins:\n  - plugins/missing.yml\n")
        .unwrap();

    let err = GardenSession::open(ProjectConfig::load(project.path()).unwrap()).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Failed to resolve plugins for project 'demo'"), "{message}");
    assert!(message.contains("Unable to load plugin 'plugins/missing.yml'"), "{message}");
}
