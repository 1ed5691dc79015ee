use assert_cmd::Command;
use garden_core::test_utils::{PluginManifestFixture, ProjectConfigFixture, ProjectFixture};
use predicates::prelude::*;
use tempfile::TempDir;

/// The `garden` binary run from `dir`, with colors and log overrides off.
fn garden(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("garden").unwrap();
    cmd.current_dir(dir).env("NO_COLOR", "1").env_remove("GARDEN_LOG_LEVEL").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_template_eval_with_variables() {
    let dir = TempDir::new().unwrap();
    garden(dir.path())
        .args(["template", "eval", "${var.image}:${var.tag}", "--var", "image=api", "--var", "tag=v1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"api:v1\""));

    garden(dir.path())
        .args(["template", "eval", "${var.replicas * 2}", "--var", "replicas=3"])
        .assert()
        .success()
        .stdout(predicate::str::diff("6\n"));
}

#[test]
fn test_template_eval_prints_inputs() {
    let dir = TempDir::new().unwrap();
    garden(dir.path())
        .args(["template", "eval", "${var.a}-${var.b}", "--var", "a=1", "--var", "b=2", "--inputs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": \"1-2\""))
        .stdout(predicate::str::contains("\"var.a\""))
        .stdout(predicate::str::contains("\"var.b\""));
}

#[test]
fn test_template_eval_uses_project_context() {
    let project = ProjectFixture::new(&ProjectConfigFixture::basic()).unwrap();
    garden(project.path())
        .args(["template", "eval", "${project.name}-${var.env}"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"demo-dev\""));

    // Overrides win over project variables.
    garden(project.path())
        .args(["template", "eval", "${var.env}", "--var", "env=prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"prod\""));
}

#[test]
fn test_template_resolve_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("service.yml"),
        "image: ${var.name}:latest\nreplicas: ${var.replicas}\nurl: ${runtime.url}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("vars.yml"), "name: api\nreplicas: 2\n").unwrap();

    garden(dir.path())
        .args(["template", "resolve", "service.yml", "--vars", "vars.yml", "--partial"])
        .assert()
        .success()
        .stdout(predicate::str::contains("image: api:latest"))
        .stdout(predicate::str::contains("replicas: 2"))
        .stdout(predicate::str::contains("${runtime.url}"));

    garden(dir.path())
        .args(["template", "resolve", "service.yml", "--vars", "vars.yml"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("Could not find key"));
}

#[test]
fn test_template_error_exits_with_one() {
    let dir = TempDir::new().unwrap();
    garden(dir.path())
        .args(["template", "eval", "${1 + 'x'}"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("+ operator"));
}

#[test]
fn test_plugins_list() {
    let project = ProjectFixture::new(&ProjectConfigFixture::with_plugins(&["acme"]))
        .unwrap()
        .with_plugin(&PluginManifestFixture::acme())
        .unwrap();

    garden(project.path())
        .args(["plugins", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NAME"))
        .stdout(predicate::str::contains("acme"))
        .stdout(predicate::str::contains("container"));

    garden(project.path())
        .args(["plugins", "list", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"acme\""));
}

#[test]
fn test_plugins_module_types_with_project_flag() {
    let project = ProjectFixture::new(&ProjectConfigFixture::with_plugins(&["acme"]))
        .unwrap()
        .with_plugin(&PluginManifestFixture::acme())
        .unwrap();
    let elsewhere = TempDir::new().unwrap();

    garden(elsewhere.path())
        .arg("--project")
        .arg(project.path())
        .args(["plugins", "module-types", "-f", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("acme-image:"))
        .stdout(predicate::str::contains("plugin: acme"));
}

#[test]
fn test_plugins_invalid_format() {
    let project = ProjectFixture::new(&ProjectConfigFixture::basic()).unwrap();
    garden(project.path())
        .args(["plugins", "list", "--format", "xml"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid format 'xml'. Valid formats are: table, json, yaml"));
}

#[test]
fn test_plugins_without_project() {
    let dir = TempDir::new().unwrap();
    garden(dir.path())
        .args(["plugins", "list"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No garden.yml found"));
}

#[test]
fn test_providers_are_resolved() {
    let project = ProjectFixture::new(&ProjectConfigFixture::basic()).unwrap();

    garden(project.path())
        .args(["providers", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"namespace\": \"demo-dev\""))
        .stdout(predicate::str::contains("\"context\": \"docker-desktop\""));

    garden(project.path())
        .args(["providers", "--var", "env=prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local-kubernetes"))
        .stdout(predicate::str::contains("namespace: demo-prod"));
}

#[test]
fn test_unknown_provider_is_reported() {
    let project = ProjectFixture::new(&ProjectConfigFixture::with_plugins(&["kubernetess"])).unwrap();
    garden(project.path())
        .args(["providers"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Did you mean 'kubernetes'?"));
}
