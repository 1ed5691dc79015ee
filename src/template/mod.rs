//! Template string parsing and evaluation.
//!
//! Garden configuration values may contain template strings such as
//! `${var.image}:${var.tag}` or `${if var.debug}--verbose${endif}`. This module
//! parses them into an [`Expression`] tree and evaluates that tree against a
//! [`ConfigContext`].
//!
//! # Partial resolution
//!
//! Some values are only known after other parts of the project graph have been
//! resolved. With [`ContextResolveOpts::allow_partial`] set, lookups of such
//! values yield [`Evaluation::AvailableLater`] and the whole template string is
//! returned unchanged, ready for a later pass.
//!
//! # Provenance
//!
//! Every resolved value carries the set of context keys it was computed from
//! ([`TemplateResolution::inputs`]). Callers use it to build cache keys that
//! change exactly when a referenced input changes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use garden_core::template::{ContextResolveOpts, GenericContext, resolve_template_string};
//!
//! let context = GenericContext::new().with_value("var", serde_json::json!({"tag": "v1"}));
//! let resolved = resolve_template_string("app:${var.tag}", &context, &ContextResolveOpts::default())?;
//! assert_eq!(resolved.value.as_str(), Some("app:v1"));
//! # Ok::<(), garden_core::core::GardenError>(())
//! ```

pub mod ast;
pub mod context;
pub mod functions;
pub mod parser;
pub mod value;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::core::Result;

pub use ast::{Evaluation, EvaluateArgs, Expression, Inputs, Location, Tracked};
pub use context::{
    ConfigContext, ContextResolveOpts, ContextResolveOutput, ContextResolved, GenericContext, KeySegment,
    render_key_path,
};
pub use functions::{HelperRegistry, TemplateHelper, builtin_helpers};
pub use value::TemplateValue;

/// The outcome of resolving a template string or config tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TemplateResolution {
    pub value: TemplateValue,
    /// Rendered context key paths the value was computed from
    pub inputs: Inputs,
}

/// Parse a raw template string.
pub fn parse_template_string(raw: &str) -> Result<Expression> {
    parser::parse(raw)
}

/// Resolve a single template string against `context`.
///
/// Strings without `${` are returned as-is without parsing. A top-level
/// missing optional value resolves to `undefined`; in partial mode a value that
/// is not available yet leaves the raw string unchanged.
pub fn resolve_template_string(
    raw: &str,
    context: &dyn ConfigContext,
    opts: &ContextResolveOpts,
) -> Result<TemplateResolution> {
    resolve_at(raw, context, opts, &[])
}

fn resolve_at(
    raw: &str,
    context: &dyn ConfigContext,
    opts: &ContextResolveOpts,
    node_path: &[KeySegment],
) -> Result<TemplateResolution> {
    if !raw.contains("${") {
        return Ok(TemplateResolution {
            value: TemplateValue::String(raw.to_string()),
            inputs: Inputs::new(),
        });
    }

    let expression = parse_template_string(raw)?;
    let args = EvaluateArgs::new(context, opts, raw, builtin_helpers()).with_node_path(node_path);

    let resolution = match expression.evaluate(&args)? {
        Evaluation::Resolved(tracked) => TemplateResolution {
            value: tracked.value,
            inputs: tracked.inputs,
        },
        Evaluation::NotFound => TemplateResolution::default(),
        Evaluation::AvailableLater => {
            trace!(template = raw, path = %render_key_path(node_path), "Template deferred to a later pass");
            TemplateResolution {
                value: TemplateValue::String(raw.to_string()),
                inputs: Inputs::new(),
            }
        }
    };
    Ok(resolution)
}

/// Resolve every string leaf of a config tree.
///
/// Maps and arrays keep their shape; provenance is collected across the whole
/// tree. Errors name the failing template; the node path is passed to the
/// context for its own diagnostics.
pub fn resolve_template_strings(
    value: &TemplateValue,
    context: &dyn ConfigContext,
    opts: &ContextResolveOpts,
) -> Result<TemplateResolution> {
    let mut inputs = Inputs::new();
    let mut path = Vec::new();
    let value = resolve_tree(value, context, opts, &mut path, &mut inputs)?;
    Ok(TemplateResolution {
        value,
        inputs,
    })
}

fn resolve_tree(
    value: &TemplateValue,
    context: &dyn ConfigContext,
    opts: &ContextResolveOpts,
    path: &mut Vec<KeySegment>,
    inputs: &mut Inputs,
) -> Result<TemplateValue> {
    match value {
        TemplateValue::String(raw) => {
            let resolution = resolve_at(raw, context, opts, path)?;
            inputs.extend(resolution.inputs);
            Ok(resolution.value)
        }
        TemplateValue::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push(KeySegment::Index(index));
                let item = resolve_tree(item, context, opts, path, inputs);
                path.pop();
                resolved.push(item?);
            }
            Ok(TemplateValue::Array(resolved))
        }
        TemplateValue::Object(map) => {
            let mut resolved = BTreeMap::new();
            for (key, item) in map {
                path.push(KeySegment::Key(key.clone()));
                let item = resolve_tree(item, context, opts, path, inputs);
                path.pop();
                resolved.insert(key.clone(), item?);
            }
            Ok(TemplateValue::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// The statically known key paths a template string looks up.
///
/// Dynamic bracket segments cut a path short, so `${a[var.x].b}` reports `a`.
/// Used to discover dependencies between config entities before any value is
/// resolved.
pub fn context_lookup_references(raw: &str) -> Result<Vec<Vec<KeySegment>>> {
    if !raw.contains("${") {
        return Ok(Vec::new());
    }
    let expression = parse_template_string(raw)?;
    let mut references = Vec::new();
    expression.visit(&mut |node| {
        if let Some(prefix) = node.static_key_prefix() {
            references.push(prefix);
        }
    });
    Ok(references)
}

/// Collect [`context_lookup_references`] for every string leaf of a config tree.
pub fn collect_context_references(value: &TemplateValue) -> Result<Vec<Vec<KeySegment>>> {
    let mut references = Vec::new();
    match value {
        TemplateValue::String(raw) => references.extend(context_lookup_references(raw)?),
        TemplateValue::Array(items) => {
            for item in items {
                references.extend(collect_context_references(item)?);
            }
        }
        TemplateValue::Object(map) => {
            for item in map.values() {
                references.extend(collect_context_references(item)?);
            }
        }
        _ => {}
    }
    Ok(references)
}
