//! Garden's configuration compiler
//!
//! Turns raw, templated, plugin-extensible project configuration into concrete
//! values and a resolved set of providers and module types.
//!
//! # Core Modules
//!
//! - [`template`] - parses `${...}` template strings and evaluates them with
//!   three-valued results (resolved, missing, available later) and provenance
//! - [`plugins`] - merges plugins with their bases, chains handlers and
//!   resolves module types across plugins into a frozen registry
//! - [`graph`] - dependency graph with cycle reporting, used for plugin,
//!   module-type and provider ordering
//!
//! ## Supporting Modules
//!
//! - [`core`] - error taxonomy and CLI error presentation
//! - [`config`] - `garden.yml` project config and CLI runtime config
//! - [`session`] - per-invocation state owning the registry and legacy-ID map
//! - [`cli`] - the `garden` command-line interface
//!
//! # Example
//!
//! ```rust,no_run
//! use garden_core::template::{ContextResolveOpts, GenericContext, resolve_template_string};
//!
//! let context = GenericContext::new().with_value("var", serde_json::json!({"replicas": 3}));
//! let resolved = resolve_template_string(
//!     "${var.replicas > 1 ? 'ha' : 'single'}",
//!     &context,
//!     &ContextResolveOpts::default(),
//! )?;
//! assert_eq!(resolved.value.as_str(), Some("ha"));
//! assert!(resolved.inputs.contains("var.replicas"));
//! # Ok::<(), garden_core::core::GardenError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod graph;
pub mod plugins;
pub mod session;
pub mod template;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
