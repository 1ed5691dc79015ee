//! Test utilities for Garden
//!
//! Helpers for unit and integration tests: one-time logging setup, plugin
//! spec builders and on-disk project fixtures.
//!
//! # Example
//!
//! ```rust,no_run
//! use garden_core::test_utils::{ProjectConfigFixture, ProjectFixture, init_test_logging};
//!
//! init_test_logging(None);
//! let project = ProjectFixture::new(&ProjectConfigFixture::basic()).unwrap();
//! assert!(project.path().join("garden.yml").exists());
//! ```

pub mod fixtures;

pub use fixtures::{PluginManifestFixture, ProjectConfigFixture, ProjectFixture};

use serde_json::json;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::plugins::{GardenPluginSpec, Handler, ModuleTypeDefinition, PluginDependency};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=garden_core=trace cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// A handler that returns `label` and records nothing else.
#[must_use]
pub fn labelled_handler(label: &str) -> Handler {
    Handler::constant(json!(label))
}

/// A base plugin, a plugin extending it and an unrelated dependency, for
/// exercising plugin inheritance.
#[must_use]
pub fn inheritance_plugins() -> Vec<GardenPluginSpec> {
    vec![
        GardenPluginSpec::new("base")
            .with_dependency(PluginDependency::required("shared"))
            .with_handler("prepareEnvironment", labelled_handler("base-prepare"))
            .with_handler("getEnvironmentStatus", labelled_handler("base-status"))
            .create_module_type(
                ModuleTypeDefinition::new("base-type", "Declared by the base plugin")
                    .with_handler("build", labelled_handler("base-build")),
            ),
        GardenPluginSpec::new("child")
            .with_base("base")
            .with_handler("prepareEnvironment", labelled_handler("child-prepare"))
            .create_module_type(
                ModuleTypeDefinition::new("child-type", "Inherits from the base type")
                    .with_base("base-type")
                    .with_handler("build", labelled_handler("child-build")),
            ),
        GardenPluginSpec::new("shared"),
    ]
}
