//! Context resolution for template lookups.
//!
//! Templates look values up by key path (`${var.foo.bar}`) through the
//! [`ConfigContext`] trait. A context answers with a value, "not found", or
//! "available later" - the latter only when partial resolution is enabled, so
//! that configuration depending on not-yet-resolved parts of the graph can be
//! evaluated in stages.
//!
//! [`GenericContext`] is a tree-backed implementation used by the CLI and tests.
//! How a production context layers project, variable and action-output scopes is
//! up to the caller.

use std::collections::BTreeMap;
use std::fmt;

use super::value::{TemplateValue, format_number};

/// One segment of a context key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Key(String),
    Index(usize),
}

impl KeySegment {
    /// Parse a dotted path such as `var.foo.0` into segments.
    ///
    /// Purely numeric parts become [`KeySegment::Index`].
    #[must_use]
    pub fn parse_path(path: &str) -> Vec<Self> {
        path.split('.')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<usize>().map_or_else(|_| Self::Key(part.to_string()), Self::Index))
            .collect()
    }

    /// Build a segment from a bracket-member value.
    ///
    /// Non-negative integral numbers index arrays; other numbers are used as
    /// string keys the way JavaScript property access would.
    #[must_use]
    pub fn from_number(n: f64) -> Self {
        if n >= 0.0 && n.fract() == 0.0 && n < 9.0e15 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Self::Index(n as usize)
        } else {
            Self::Key(format_number(n))
        }
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Key(value.to_string())
    }
}

impl From<usize> for KeySegment {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

/// Render a key path as `a.b[0].c`.
#[must_use]
pub fn render_key_path(path: &[KeySegment]) -> String {
    let mut rendered = String::new();
    for segment in path {
        match segment {
            KeySegment::Key(key) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(key);
            }
            KeySegment::Index(index) => {
                rendered.push('[');
                rendered.push_str(&index.to_string());
                rendered.push(']');
            }
        }
    }
    rendered
}

/// Options passed through to context resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextResolveOpts {
    /// Return [`ContextResolved::AvailableLater`] for values that are not yet
    /// known instead of treating them as missing.
    pub allow_partial: bool,
}

impl ContextResolveOpts {
    #[must_use]
    pub const fn partial() -> Self {
        Self {
            allow_partial: true,
        }
    }
}

/// The outcome of a context lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextResolved {
    Value(TemplateValue),
    /// The key does not exist and is not expected to appear
    NotFound,
    /// The key may become resolvable after further graph resolution
    AvailableLater,
}

/// Lazily-built explanation of why a lookup failed.
pub type Explanation = Box<dyn FnOnce() -> String + Send>;

/// A lookup result plus an optional explanation for failures.
pub struct ContextResolveOutput {
    pub resolved: ContextResolved,
    pub explanation: Option<Explanation>,
}

impl ContextResolveOutput {
    #[must_use]
    pub fn value(value: TemplateValue) -> Self {
        Self {
            resolved: ContextResolved::Value(value),
            explanation: None,
        }
    }

    #[must_use]
    pub fn not_found(explanation: impl FnOnce() -> String + Send + 'static) -> Self {
        Self {
            resolved: ContextResolved::NotFound,
            explanation: Some(Box::new(explanation)),
        }
    }

    #[must_use]
    pub const fn available_later() -> Self {
        Self {
            resolved: ContextResolved::AvailableLater,
            explanation: None,
        }
    }
}

impl fmt::Debug for ContextResolveOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextResolveOutput")
            .field("resolved", &self.resolved)
            .field("explanation", &self.explanation.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Resolves key paths for template lookups.
///
/// Implementations must not mutate shared state; the evaluator may be invoked
/// concurrently with separate contexts.
pub trait ConfigContext: Send + Sync {
    /// Resolve `key`. `node_path` is the location of the template string within
    /// the config document being resolved, for diagnostics.
    fn resolve(
        &self,
        key: &[KeySegment],
        node_path: &[KeySegment],
        opts: &ContextResolveOpts,
    ) -> ContextResolveOutput;
}

/// A context backed by a value tree, with optional "pending" key prefixes that
/// are not resolvable yet.
#[derive(Debug, Clone, Default)]
pub struct GenericContext {
    root: BTreeMap<String, TemplateValue>,
    pending: Vec<Vec<KeySegment>>,
}

impl GenericContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context whose top-level keys are the entries of `root`.
    #[must_use]
    pub const fn from_map(root: BTreeMap<String, TemplateValue>) -> Self {
        Self {
            root,
            pending: Vec::new(),
        }
    }

    /// Add or replace a top-level key.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.root.insert(key.into(), value.into());
        self
    }

    /// Mark a dotted key prefix as not yet resolvable.
    #[must_use]
    pub fn with_pending(mut self, path: &str) -> Self {
        self.pending.push(KeySegment::parse_path(path));
        self
    }

    fn is_pending(&self, key: &[KeySegment]) -> bool {
        self.pending.iter().any(|prefix| key.starts_with(prefix))
    }
}

impl ConfigContext for GenericContext {
    fn resolve(
        &self,
        key: &[KeySegment],
        _node_path: &[KeySegment],
        opts: &ContextResolveOpts,
    ) -> ContextResolveOutput {
        if self.is_pending(key) {
            if opts.allow_partial {
                return ContextResolveOutput::available_later();
            }
            let rendered = render_key_path(key);
            return ContextResolveOutput::not_found(move || {
                format!("{rendered} is not yet available and can only be resolved at a later stage.")
            });
        }

        let Some((first, rest)) = key.split_first() else {
            return ContextResolveOutput::value(TemplateValue::Object(self.root.clone()));
        };

        let first_key = first.to_string();
        let Some(mut current) = self.root.get(&first_key) else {
            let available: Vec<String> = self.root.keys().cloned().collect();
            return ContextResolveOutput::not_found(move || {
                format!("Could not find key {first_key}. {}", describe_available(&available))
            });
        };

        for (depth, segment) in rest.iter().enumerate() {
            let next = match (current, segment) {
                (TemplateValue::Object(map), segment) => map.get(&segment.to_string()),
                (TemplateValue::Array(items), KeySegment::Index(index)) => items.get(*index),
                (TemplateValue::Array(items), KeySegment::Key(k)) => {
                    k.parse::<usize>().ok().and_then(|index| items.get(index))
                }
                _ => None,
            };

            match next {
                Some(value) => current = value,
                None => {
                    let prefix = render_key_path(&key[..=depth]);
                    let missing = segment.to_string();
                    return match current {
                        TemplateValue::Object(map) => {
                            let available: Vec<String> = map.keys().cloned().collect();
                            ContextResolveOutput::not_found(move || {
                                format!(
                                    "Could not find key {missing} under {prefix}. {}",
                                    describe_available(&available)
                                )
                            })
                        }
                        TemplateValue::Array(items) => {
                            let len = items.len();
                            ContextResolveOutput::not_found(move || {
                                format!("Index {missing} is out of bounds for {prefix}, which has {len} items.")
                            })
                        }
                        other => {
                            let type_name = other.type_name();
                            ContextResolveOutput::not_found(move || {
                                format!(
                                    "Could not find key {missing} under {prefix}: {prefix} is a {type_name}, not an object or array."
                                )
                            })
                        }
                    };
                }
            }
        }

        ContextResolveOutput::value(current.clone())
    }
}

fn describe_available(keys: &[String]) -> String {
    if keys.is_empty() {
        "No keys are available at this level.".to_string()
    } else {
        format!("Available keys: {}.", keys.join(", "))
    }
}
