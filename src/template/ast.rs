//! Template expression tree and its evaluation rules.
//!
//! A parsed template string is a tree of [`Expression`] nodes. Evaluation is a
//! pure recursive descent over the tree against a [`ConfigContext`]: nothing is
//! memoized on the nodes, so the same tree can be evaluated first in partial mode
//! and later in full mode against a different context.
//!
//! # Three-valued results
//!
//! Evaluating a node yields an [`Evaluation`]:
//! - [`Evaluation::Resolved`] - a concrete value plus the context lookups it
//!   was computed from
//! - [`Evaluation::NotFound`] - an optional lookup found nothing
//! - [`Evaluation::AvailableLater`] - a lookup cannot be answered yet (partial
//!   mode only)
//!
//! Any node that sees a symbolic result from a child returns it unchanged,
//! except where short-circuiting means the child is never evaluated.

use std::collections::BTreeSet;
use std::fmt;

use crate::core::{GardenError, Result, closest_match};

use super::context::{ConfigContext, ContextResolveOpts, ContextResolved, KeySegment, render_key_path};
use super::functions::HelperRegistry;
use super::value::TemplateValue;

/// The rendered context key paths a value was computed from.
pub type Inputs = BTreeSet<String>;

/// Position of a node within the raw template string. Used only for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line of `start`
    pub line: usize,
    /// 1-based column of `start`
    pub column: usize,
}

impl Location {
    /// A location covering `self` through `other`.
    #[must_use]
    pub const fn to(self, other: Self) -> Self {
        Self {
            start: self.start,
            end: other.end,
            line: self.line,
            column: self.column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Contains,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl BinaryOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Contains => "contains",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

/// A node of a parsed template string.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A key-path segment or function name
    Identifier { name: String, loc: Location },
    /// A primitive literal
    Literal { value: TemplateValue, loc: Location },
    ArrayLiteral { items: Vec<Expression>, loc: Location },
    Unary { op: UnaryOp, operand: Box<Expression>, loc: Location },
    /// Short-circuiting `&&` / `||`
    Logical { op: LogicalOp, left: Box<Expression>, right: Box<Expression>, loc: Location },
    Binary { op: BinaryOp, left: Box<Expression>, right: Box<Expression>, loc: Location },
    /// A `${...}` block; `optional` is set by a trailing `?`
    FormatString { inner: Box<Expression>, optional: bool, loc: Location },
    IfBlock {
        condition: Box<Expression>,
        if_true: Option<Box<Expression>>,
        if_false: Option<Box<Expression>>,
        loc: Location,
    },
    /// `${else}` marker; only exists while the parser builds conditional blocks
    ElseBlock { loc: Location },
    /// `${endif}` marker; only exists while the parser builds conditional blocks
    EndIfBlock { loc: Location },
    StringConcat { parts: Vec<Expression>, loc: Location },
    /// A bracketed `[expr]` key-path segment
    Member { inner: Box<Expression>, loc: Location },
    /// A key path of [`Expression::Identifier`] / [`Expression::Member`] segments
    ContextLookup { path: Vec<Expression>, loc: Location },
    FunctionCall { name: String, args: Vec<Expression>, loc: Location },
    Ternary {
        condition: Box<Expression>,
        if_true: Box<Expression>,
        if_false: Box<Expression>,
        loc: Location,
    },
}

/// A resolved value and its input provenance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tracked {
    pub value: TemplateValue,
    pub inputs: Inputs,
}

impl Tracked {
    /// A value that depends on no context lookups.
    #[must_use]
    pub fn constant(value: TemplateValue) -> Self {
        Self {
            value,
            inputs: Inputs::new(),
        }
    }

    #[must_use]
    pub const fn with_inputs(value: TemplateValue, inputs: Inputs) -> Self {
        Self {
            value,
            inputs,
        }
    }

    /// Union `inputs` into this value's provenance.
    #[must_use]
    pub fn merged(mut self, inputs: Inputs) -> Self {
        self.inputs.extend(inputs);
        self
    }
}

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Resolved(Tracked),
    NotFound,
    AvailableLater,
}

impl Evaluation {
    #[must_use]
    pub fn value(value: TemplateValue) -> Self {
        Self::Resolved(Tracked::constant(value))
    }

    #[must_use]
    pub const fn as_resolved(&self) -> Option<&Tracked> {
        match self {
            Self::Resolved(tracked) => Some(tracked),
            Self::NotFound | Self::AvailableLater => None,
        }
    }

    /// Add `inputs` to a resolved value; symbols pass through.
    #[must_use]
    fn merged(self, inputs: Inputs) -> Self {
        match self {
            Self::Resolved(tracked) => Self::Resolved(tracked.merged(inputs)),
            symbol => symbol,
        }
    }
}

/// Everything an evaluation needs besides the tree itself.
#[derive(Clone, Copy)]
pub struct EvaluateArgs<'a> {
    pub context: &'a dyn ConfigContext,
    pub opts: &'a ContextResolveOpts,
    /// The raw template string, attached to every error
    pub template: &'a str,
    /// Where the template string sits in the config document
    pub node_path: &'a [KeySegment],
    pub helpers: &'a HelperRegistry,
    /// When `Some(true)`, missing keys yield [`Evaluation::NotFound`] instead of an error
    pub optional: Option<bool>,
}

impl<'a> EvaluateArgs<'a> {
    #[must_use]
    pub fn new(
        context: &'a dyn ConfigContext,
        opts: &'a ContextResolveOpts,
        template: &'a str,
        helpers: &'a HelperRegistry,
    ) -> Self {
        Self {
            context,
            opts,
            template,
            node_path: &[],
            helpers,
            optional: None,
        }
    }

    #[must_use]
    pub const fn with_node_path(mut self, node_path: &'a [KeySegment]) -> Self {
        self.node_path = node_path;
        self
    }

    #[must_use]
    const fn with_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }
}

/// Unwrap a resolved value or return the symbol from the enclosing function.
macro_rules! resolved {
    ($evaluation:expr) => {
        match $evaluation {
            Evaluation::Resolved(tracked) => tracked,
            symbol => return Ok(symbol),
        }
    };
}

impl Expression {
    /// The node's location in the raw template.
    #[must_use]
    pub const fn location(&self) -> Location {
        match self {
            Self::Identifier { loc, .. }
            | Self::Literal { loc, .. }
            | Self::ArrayLiteral { loc, .. }
            | Self::Unary { loc, .. }
            | Self::Logical { loc, .. }
            | Self::Binary { loc, .. }
            | Self::FormatString { loc, .. }
            | Self::IfBlock { loc, .. }
            | Self::ElseBlock { loc }
            | Self::EndIfBlock { loc }
            | Self::StringConcat { loc, .. }
            | Self::Member { loc, .. }
            | Self::ContextLookup { loc, .. }
            | Self::FunctionCall { loc, .. }
            | Self::Ternary { loc, .. } => *loc,
        }
    }

    fn error(&self, args: &EvaluateArgs<'_>, message: impl Into<String>) -> GardenError {
        GardenError::template(message, self.location(), args.template)
    }

    /// Evaluate this expression.
    pub fn evaluate(&self, args: &EvaluateArgs<'_>) -> Result<Evaluation> {
        match self {
            Self::Identifier {
                name,
                ..
            } => Ok(Evaluation::value(TemplateValue::String(name.clone()))),

            Self::Literal {
                value,
                ..
            } => Ok(Evaluation::value(value.clone())),

            Self::ArrayLiteral {
                items,
                ..
            } => {
                let mut values = Vec::with_capacity(items.len());
                let mut inputs = Inputs::new();
                for item in items {
                    let tracked = resolved!(item.evaluate(args)?);
                    inputs.extend(tracked.inputs);
                    values.push(tracked.value);
                }
                Ok(Evaluation::Resolved(Tracked::with_inputs(TemplateValue::Array(values), inputs)))
            }

            Self::Unary {
                op,
                operand,
                ..
            } => {
                let tracked = resolved!(operand.evaluate(args)?);
                let value = match op {
                    UnaryOp::Not => TemplateValue::Bool(!tracked.value.is_truthy()),
                    UnaryOp::Typeof => TemplateValue::from(tracked.value.type_of()),
                };
                Ok(Evaluation::Resolved(Tracked::with_inputs(value, tracked.inputs)))
            }

            Self::Logical {
                op: LogicalOp::Or,
                left,
                right,
                ..
            } => {
                let left_inputs = match left.evaluate(&args.with_optional(true))? {
                    Evaluation::AvailableLater => return Ok(Evaluation::AvailableLater),
                    Evaluation::Resolved(tracked) if tracked.value.is_truthy() => {
                        return Ok(Evaluation::Resolved(tracked));
                    }
                    Evaluation::Resolved(tracked) => tracked.inputs,
                    Evaluation::NotFound => Inputs::new(),
                };
                Ok(right.evaluate(args)?.merged(left_inputs))
            }

            Self::Logical {
                op: LogicalOp::And,
                left,
                right,
                ..
            } => {
                // A missing key on either side yields `false` rather than the
                // missing value itself. Existing configs rely on this.
                let left = match left.evaluate(&args.with_optional(true))? {
                    Evaluation::AvailableLater => return Ok(Evaluation::AvailableLater),
                    Evaluation::NotFound => return Ok(Evaluation::value(TemplateValue::Bool(false))),
                    Evaluation::Resolved(tracked) if !tracked.value.is_truthy() => {
                        return Ok(Evaluation::Resolved(tracked));
                    }
                    Evaluation::Resolved(tracked) => tracked,
                };
                match right.evaluate(&args.with_optional(true))? {
                    Evaluation::AvailableLater => Ok(Evaluation::AvailableLater),
                    Evaluation::NotFound => Ok(Evaluation::Resolved(Tracked::with_inputs(
                        TemplateValue::Bool(false),
                        left.inputs,
                    ))),
                    Evaluation::Resolved(tracked) => Ok(Evaluation::Resolved(tracked.merged(left.inputs))),
                }
            }

            Self::Binary {
                op,
                left,
                right,
                ..
            } => {
                let left = resolved!(left.evaluate(args)?);
                let right = resolved!(right.evaluate(args)?);
                let value = self.apply_binary(*op, &left.value, &right.value, args)?;
                let mut inputs = left.inputs;
                inputs.extend(right.inputs);
                Ok(Evaluation::Resolved(Tracked::with_inputs(value, inputs)))
            }

            Self::FormatString {
                inner,
                optional,
                ..
            } => {
                let effective = args.optional.unwrap_or(*optional);
                let result = inner.evaluate(&args.with_optional(effective))?;
                // Only the node's own `?` turns a missing key into an empty value;
                // an optional flag inherited from the caller must see the symbol.
                if *optional && result == Evaluation::NotFound {
                    return Ok(Evaluation::value(TemplateValue::Undefined));
                }
                Ok(result)
            }

            Self::IfBlock {
                condition,
                if_true,
                if_false,
                ..
            } => {
                let condition = resolved!(condition.evaluate(args)?);
                let branch = if condition.value.is_truthy() { if_true } else { if_false };
                match branch {
                    Some(branch) => Ok(branch.evaluate(args)?.merged(condition.inputs)),
                    None => Ok(Evaluation::Resolved(Tracked::with_inputs(
                        TemplateValue::String(String::new()),
                        condition.inputs,
                    ))),
                }
            }

            Self::ElseBlock {
                ..
            } => Err(GardenError::internal(format!(
                "The else block marker at {} in template '{}' was evaluated directly. \
                 Markers must be folded into conditional blocks when the expression tree is built.",
                self.location(),
                args.template
            ))),

            Self::EndIfBlock {
                ..
            } => Err(GardenError::internal(format!(
                "The endif block marker at {} in template '{}' was evaluated directly. \
                 Markers must be folded into conditional blocks when the expression tree is built.",
                self.location(),
                args.template
            ))),

            Self::StringConcat {
                parts,
                ..
            } => {
                let mut result = String::new();
                let mut inputs = Inputs::new();
                for part in parts {
                    let tracked = resolved!(part.evaluate(args)?);
                    if tracked.value.is_collection() {
                        return Err(part.error(
                            args,
                            format!(
                                "Cannot concatenate a value of type {} into a string; expected a primitive value.",
                                tracked.value.type_name()
                            ),
                        ));
                    }
                    result.push_str(&tracked.value.to_template_string());
                    inputs.extend(tracked.inputs);
                }
                Ok(Evaluation::Resolved(Tracked::with_inputs(TemplateValue::String(result), inputs)))
            }

            Self::Member {
                inner,
                ..
            } => {
                let tracked = resolved!(inner.evaluate(args)?);
                match tracked.value {
                    TemplateValue::String(_) | TemplateValue::Number(_) => Ok(Evaluation::Resolved(tracked)),
                    other => Err(self.error(
                        args,
                        format!(
                            "Expression in brackets must resolve to a string or number (got {}).",
                            other.type_name()
                        ),
                    )),
                }
            }

            Self::ContextLookup {
                path,
                ..
            } => self.evaluate_lookup(path, args),

            Self::FunctionCall {
                name,
                args: call_args,
                ..
            } => self.evaluate_call(name, call_args, args),

            Self::Ternary {
                condition,
                if_true,
                if_false,
                ..
            } => {
                let (truthy, inputs) = match condition.evaluate(&args.with_optional(true))? {
                    Evaluation::AvailableLater => return Ok(Evaluation::AvailableLater),
                    Evaluation::NotFound => (false, Inputs::new()),
                    Evaluation::Resolved(tracked) => (tracked.value.is_truthy(), tracked.inputs),
                };
                let branch = if truthy { if_true } else { if_false };
                Ok(branch.evaluate(args)?.merged(inputs))
            }
        }
    }

    fn apply_binary(
        &self,
        op: BinaryOp,
        left: &TemplateValue,
        right: &TemplateValue,
        args: &EvaluateArgs<'_>,
    ) -> Result<TemplateValue> {
        use TemplateValue::{Array, Bool, Number, String as Str};

        let value = match (op, left, right) {
            (BinaryOp::Equal, l, r) => Bool(l == r),
            (BinaryOp::NotEqual, l, r) => Bool(l != r),

            (BinaryOp::Add, Number(l), Number(r)) => Number(l + r),
            (BinaryOp::Add, Str(l), Str(r)) => Str(format!("{l}{r}")),
            (BinaryOp::Add, Array(l), Array(r)) => Array(l.iter().chain(r.iter()).cloned().collect()),
            (BinaryOp::Add, l, r) => {
                return Err(self.error(
                    args,
                    format!(
                        "Both terms need to be either arrays or strings or numbers for + operator (got {} and {}).",
                        l.type_name(),
                        r.type_name()
                    ),
                ));
            }

            (BinaryOp::Contains, container, item) => return self.apply_contains(container, item, args),

            (_, Number(l), Number(r)) => match op {
                BinaryOp::Subtract => Number(l - r),
                BinaryOp::Multiply => Number(l * r),
                BinaryOp::Divide => Number(l / r),
                BinaryOp::Modulo => Number(l % r),
                BinaryOp::LessThan => Bool(l < r),
                BinaryOp::LessThanOrEqual => Bool(l <= r),
                BinaryOp::GreaterThan => Bool(l > r),
                BinaryOp::GreaterThanOrEqual => Bool(l >= r),
                BinaryOp::Equal | BinaryOp::NotEqual | BinaryOp::Add | BinaryOp::Contains => {
                    return Err(GardenError::internal(format!(
                        "Unhandled numeric operator {}",
                        op.symbol()
                    )));
                }
            },

            (_, l, r) => {
                return Err(self.error(
                    args,
                    format!(
                        "Both terms need to be numbers for {} operator (got {} and {}).",
                        op.symbol(),
                        l.type_name(),
                        r.type_name()
                    ),
                ));
            }
        };

        Ok(value)
    }

    fn apply_contains(
        &self,
        container: &TemplateValue,
        item: &TemplateValue,
        args: &EvaluateArgs<'_>,
    ) -> Result<TemplateValue> {
        if item.is_collection() {
            return Err(self.error(
                args,
                format!(
                    "The right-hand side of a 'contains' operator must be a string, number, boolean or null (got {}).",
                    item.type_name()
                ),
            ));
        }

        let found = match container {
            TemplateValue::String(s) => s.contains(&item.to_template_string()),
            TemplateValue::Array(items) => items.contains(item),
            TemplateValue::Object(map) => map.contains_key(&item.to_template_string()),
            other => {
                return Err(self.error(
                    args,
                    format!(
                        "The left-hand side of a 'contains' operator must be a string, array or object (got {}).",
                        other.type_name()
                    ),
                ));
            }
        };
        Ok(TemplateValue::Bool(found))
    }

    fn evaluate_lookup(&self, path: &[Self], args: &EvaluateArgs<'_>) -> Result<Evaluation> {
        let mut key = Vec::with_capacity(path.len());
        let mut inputs = Inputs::new();

        for segment in path {
            match segment {
                Self::Identifier {
                    name,
                    ..
                } => key.push(KeySegment::Key(name.clone())),
                Self::Member {
                    ..
                } => {
                    let tracked = resolved!(segment.evaluate(args)?);
                    inputs.extend(tracked.inputs);
                    key.push(match tracked.value {
                        TemplateValue::Number(n) => KeySegment::from_number(n),
                        other => KeySegment::Key(other.to_template_string()),
                    });
                }
                other => {
                    return Err(GardenError::internal(format!(
                        "Context lookup segments must be identifiers or member expressions, found {other:?} in template '{}'",
                        args.template
                    )));
                }
            }
        }

        let output = args.context.resolve(&key, args.node_path, args.opts);
        let rendered = render_key_path(&key);

        match output.resolved {
            ContextResolved::Value(value) => {
                inputs.insert(rendered);
                Ok(Evaluation::Resolved(Tracked::with_inputs(value, inputs)))
            }
            ContextResolved::AvailableLater if args.opts.allow_partial => Ok(Evaluation::AvailableLater),
            ContextResolved::AvailableLater => Err(self.error(
                args,
                format!("Could not resolve {rendered}: the value is not available yet."),
            )),
            ContextResolved::NotFound if args.optional == Some(true) => Ok(Evaluation::NotFound),
            ContextResolved::NotFound => {
                let message = output
                    .explanation
                    .map_or_else(|| format!("Could not find key {rendered}."), |explain| explain());
                Err(self.error(args, message))
            }
        }
    }

    fn evaluate_call(&self, name: &str, call_args: &[Self], args: &EvaluateArgs<'_>) -> Result<Evaluation> {
        let mut values = Vec::with_capacity(call_args.len());
        let mut arg_inputs = Vec::with_capacity(call_args.len());
        for arg in call_args {
            let tracked = resolved!(arg.evaluate(args)?);
            values.push(tracked.value);
            arg_inputs.push(tracked.inputs);
        }

        let Some(helper) = args.helpers.get(name) else {
            let available: Vec<&str> = args.helpers.names().collect();
            let mut message = format!(
                "Could not find helper function '{name}'. Available helper functions: {}",
                available.join(", ")
            );
            if let Some(suggestion) = closest_match(name, available.iter().copied()) {
                message.push_str(&format!(". Did you mean '{suggestion}'?"));
            }
            return Err(self.error(args, message));
        };

        helper.validate_arguments(&values).map_err(|message| self.error(args, message))?;

        let result = (helper.func)(&values)
            .map_err(|err| self.error(args, format!("Error from helper function {name}: {err:#}")))?;

        let inputs = if helper.skip_input_tracking_for_collection_values && result.is_collection() {
            values
                .iter()
                .zip(arg_inputs)
                .filter(|(value, _)| value.is_collection())
                .flat_map(|(_, inputs)| inputs)
                .collect()
        } else {
            arg_inputs.into_iter().flatten().collect()
        };

        Ok(Evaluation::Resolved(Tracked::with_inputs(result, inputs)))
    }

    /// Visit this node and all of its descendants, depth-first, parents first.
    pub fn visit<'e>(&'e self, visitor: &mut impl FnMut(&'e Self)) {
        visitor(self);
        match self {
            Self::Identifier { .. }
            | Self::Literal { .. }
            | Self::ElseBlock { .. }
            | Self::EndIfBlock { .. } => {}
            Self::ArrayLiteral { items: children, .. }
            | Self::StringConcat { parts: children, .. }
            | Self::ContextLookup { path: children, .. }
            | Self::FunctionCall { args: children, .. } => {
                for child in children {
                    child.visit(visitor);
                }
            }
            Self::Unary { operand: inner, .. }
            | Self::FormatString { inner, .. }
            | Self::Member { inner, .. } => inner.visit(visitor),
            Self::Logical { left, right, .. } | Self::Binary { left, right, .. } => {
                left.visit(visitor);
                right.visit(visitor);
            }
            Self::IfBlock { condition, if_true, if_false, .. } => {
                condition.visit(visitor);
                for branch in [if_true, if_false].into_iter().flatten() {
                    branch.visit(visitor);
                }
            }
            Self::Ternary { condition, if_true, if_false, .. } => {
                condition.visit(visitor);
                if_true.visit(visitor);
                if_false.visit(visitor);
            }
        }
    }

    /// The statically known prefix of this node's key path, if it is a lookup.
    ///
    /// The prefix stops at the first bracket segment whose value is not a literal.
    #[must_use]
    pub fn static_key_prefix(&self) -> Option<Vec<KeySegment>> {
        let Self::ContextLookup {
            path,
            ..
        } = self
        else {
            return None;
        };

        let mut prefix = Vec::new();
        for segment in path {
            match segment {
                Self::Identifier {
                    name,
                    ..
                } => prefix.push(KeySegment::Key(name.clone())),
                Self::Member {
                    inner,
                    ..
                } => match inner.as_ref() {
                    Self::Literal {
                        value: TemplateValue::String(key),
                        ..
                    } => prefix.push(KeySegment::Key(key.clone())),
                    Self::Literal {
                        value: TemplateValue::Number(n),
                        ..
                    } => prefix.push(KeySegment::from_number(*n)),
                    _ => break,
                },
                _ => break,
            }
        }
        Some(prefix)
    }
}
