//! Plugin and module-type handlers.
//!
//! A [`Handler`] wraps a callable together with metadata naming where it came
//! from. When a plugin overrides a handler its base plugin defines, or a module
//! type overrides a handler of its base type, the overridden handler is attached
//! as the new handler's `base`. The handler function receives its base on every
//! call and may delegate to it.
//!
//! Handlers are never mutated after construction. Attaching a base always clones
//! both sides, so the same handler value can be reused by several plugins
//! without one chain leaking into another.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Where a handler was declared.
///
/// Fields are filled in during registry resolution, only where still absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandlerMetadata {
    /// The handler name, e.g. `build` or `configureProvider`
    pub handler_type: Option<String>,
    /// The module type the handler belongs to, for module-type handlers
    pub module_type: Option<String>,
    /// The plugin that declared the handler
    pub plugin_name: Option<String>,
}

impl HandlerMetadata {
    #[must_use]
    pub fn new(handler_type: &str, module_type: Option<&str>, plugin_name: &str) -> Self {
        Self {
            handler_type: Some(handler_type.to_string()),
            module_type: module_type.map(str::to_string),
            plugin_name: Some(plugin_name.to_string()),
        }
    }

    /// Fill every absent field from `defaults`.
    #[must_use]
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            handler_type: self.handler_type.or_else(|| defaults.handler_type.clone()),
            module_type: self.module_type.or_else(|| defaults.module_type.clone()),
            plugin_name: self.plugin_name.or_else(|| defaults.plugin_name.clone()),
        }
    }
}

/// What a handler function receives.
#[derive(Debug, Clone, Copy)]
pub struct HandlerParams<'a> {
    pub args: &'a Value,
    /// The handler this one overrides, if any
    pub base: Option<&'a Handler>,
    pub metadata: &'a HandlerMetadata,
}

pub type HandlerFn = Arc<dyn Fn(HandlerParams<'_>) -> anyhow::Result<Value> + Send + Sync>;

/// An immutable handler with an optional chained base.
#[derive(Clone)]
pub struct Handler {
    func: HandlerFn,
    metadata: HandlerMetadata,
    base: Option<Box<Handler>>,
}

impl Handler {
    pub fn new(func: impl Fn(HandlerParams<'_>) -> anyhow::Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
            metadata: HandlerMetadata::default(),
            base: None,
        }
    }

    /// A handler that always returns `value`.
    ///
    /// Used for handlers declared in plugin manifests.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self::new(move |_| Ok(value.clone()))
    }

    /// A handler that returns its base's result, or `fallback` without a base.
    #[must_use]
    pub fn delegating(fallback: Value) -> Self {
        Self::new(move |params| match params.base {
            Some(base) => base.call(params.args),
            None => Ok(fallback.clone()),
        })
    }

    pub fn call(&self, args: &Value) -> anyhow::Result<Value> {
        (self.func)(HandlerParams {
            args,
            base: self.base.as_deref(),
            metadata: &self.metadata,
        })
    }

    #[must_use]
    pub const fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn base(&self) -> Option<&Self> {
        self.base.as_deref()
    }

    /// A copy of this handler with `base` chained underneath.
    #[must_use]
    pub fn with_base(&self, base: &Self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            metadata: self.metadata.clone(),
            base: Some(Box::new(base.clone())),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: HandlerMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Fill absent metadata fields from `defaults`.
    #[must_use]
    pub fn with_metadata_defaults(mut self, defaults: &HandlerMetadata) -> Self {
        self.metadata = self.metadata.or(defaults);
        self
    }

    /// Metadata of this handler and every base below it, nearest first.
    #[must_use]
    pub fn chain(&self) -> Vec<&HandlerMetadata> {
        let mut chain = vec![&self.metadata];
        let mut current = self.base();
        while let Some(handler) = current {
            chain.push(&handler.metadata);
            current = handler.base();
        }
        chain
    }

    /// A serializable view of the handler chain.
    #[must_use]
    pub fn summary(&self) -> HandlerSummary {
        HandlerSummary {
            metadata: self.metadata.clone(),
            base: self.base().map(|base| Box::new(base.summary())),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("metadata", &self.metadata)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// The structure of a handler chain without its functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerSummary {
    #[serde(flatten)]
    pub metadata: HandlerMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<Box<HandlerSummary>>,
}
