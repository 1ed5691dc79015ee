//! Error handling for Garden
//!
//! This module provides the error types shared by the template evaluator and the
//! plugin registry builder, plus user-friendly error reporting for the CLI. The
//! error system follows two principles:
//! 1. **Strongly-typed errors** so callers can tell configuration mistakes apart
//!    from plugin-author mistakes and internal invariant violations
//! 2. **Self-sufficient messages** that name the offending plugin, module type,
//!    dependency or template substring, since they are printed as-is
//!
//! # Error Categories
//!
//! - [`ErrorKind::Configuration`] - user-authored config is invalid: unknown
//!   provider, duplicate module type declarations, bad template expressions
//! - [`ErrorKind::Plugin`] - a plugin's declarations are inconsistent: self
//!   referencing base, missing base plugin, redeclared module type
//! - [`ErrorKind::Internal`] - an invariant the implementation must guarantee
//!   was violated
//!
//! Template-string errors always carry the source [`Location`] and the raw
//! template text so diagnostics can point at the exact substring.
//!
//! # Examples
//!
//! ```rust,no_run
//! use garden_core::core::{GardenError, user_friendly_error};
//!
//! let error = GardenError::configuration("Configured provider 'foo' has not been registered.");
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::template::Location;

/// Maximum number of characters of the raw template shown in an error message.
const MAX_EXCERPT_LENGTH: usize = 120;

/// The broad category of a [`GardenError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// User-authored configuration is invalid.
    Configuration,
    /// A plugin's own declarations are inconsistent.
    Plugin,
    /// An implementation invariant was violated.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Plugin => write!(f, "plugin"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// The main error type for Garden's configuration compiler.
///
/// All failures in the template evaluator and the plugin registry builder are
/// immediate and fatal; nothing is retried or recovered internally.
#[derive(Error, Debug, Clone)]
pub enum GardenError {
    /// User-authored configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description naming the offending entity
        message: String,
    },

    /// A plugin's declarations are internally inconsistent
    #[error("Plugin error: {message}")]
    Plugin {
        /// Description naming the offending plugin or module type
        message: String,
    },

    /// An invariant the implementation must guarantee was violated
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
    },

    /// A template expression could not be parsed or evaluated
    #[error(transparent)]
    TemplateString(Box<TemplateStringError>),
}

impl GardenError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a plugin error.
    pub fn plugin(message: impl Into<String>) -> Self {
        Self::Plugin {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a template-string error pointing at `location` within `template`.
    pub fn template(message: impl Into<String>, location: Location, template: &str) -> Self {
        Self::TemplateString(Box::new(TemplateStringError {
            message: message.into(),
            location,
            template: template.to_string(),
        }))
    }

    /// The category of this error.
    ///
    /// Template-string errors are configuration errors: they are caused by
    /// user-authored template expressions.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration {
                ..
            }
            | Self::TemplateString(_) => ErrorKind::Configuration,
            Self::Plugin {
                ..
            } => ErrorKind::Plugin,
            Self::Internal {
                ..
            } => ErrorKind::Internal,
        }
    }

    /// The template-string error details, if this is one.
    #[must_use]
    pub fn as_template_error(&self) -> Option<&TemplateStringError> {
        match self {
            Self::TemplateString(err) => Some(err),
            _ => None,
        }
    }
}

/// A parse or evaluation failure inside a template string.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateStringError {
    /// What went wrong
    pub message: String,
    /// Location of the offending node within the raw template
    pub location: Location,
    /// The complete raw template string
    pub template: String,
}

impl TemplateStringError {
    /// The substring of the raw template covered by the error location.
    ///
    /// Falls back to the whole template when the location does not fall on
    /// character boundaries.
    #[must_use]
    pub fn excerpt(&self) -> String {
        let excerpt = self
            .template
            .get(self.location.start..self.location.end)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.template);

        if excerpt.chars().count() > MAX_EXCERPT_LENGTH {
            let truncated: String = excerpt.chars().take(MAX_EXCERPT_LENGTH).collect();
            format!("{truncated}...")
        } else {
            excerpt.to_string()
        }
    }
}

impl fmt::Display for TemplateStringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid template string ({}) at line {}, column {}: {}",
            self.excerpt(),
            self.location.line,
            self.location.column,
            self.message
        )
    }
}

impl std::error::Error for TemplateStringError {}

/// Error wrapper that adds user-friendly details and suggestions.
///
/// This is how the CLI presents errors: the error itself in red, details in
/// yellow and an actionable suggestion in green.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error, rendered as a string
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`].
///
/// Recognizes [`GardenError`] anywhere in the error chain and attaches
/// kind-specific guidance; other errors keep their full context chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(garden_error) = error.chain().find_map(|e| e.downcast_ref::<GardenError>()) {
        return create_error_context(&error, garden_error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::NotFound
    {
        return ErrorContext::new(format!("{error:#}"))
            .with_suggestion("Check that the file exists and the path is correct");
    }

    ErrorContext::new(format!("{error:#}"))
}

fn create_error_context(error: &anyhow::Error, garden_error: &GardenError) -> ErrorContext {
    let context = ErrorContext::new(format!("{error:#}"));

    match garden_error.kind() {
        ErrorKind::Configuration if garden_error.as_template_error().is_some() => context
            .with_details("Template strings are evaluated against the project and variable contexts")
            .with_suggestion("Check the referenced keys and operand types in the template expression"),
        ErrorKind::Configuration => context
            .with_suggestion("Check your project configuration (garden.yml) for the entity named above"),
        ErrorKind::Plugin => context
            .with_details("This error is caused by inconsistent plugin declarations, not your project configuration")
            .with_suggestion("Please report an issue with the author of the plugin named above"),
        ErrorKind::Internal => context
            .with_suggestion("This is a bug in Garden. Please report it with the command you ran"),
    }
}

/// Render a list of names as `'a', 'b' and 'c'`.
#[must_use]
pub fn natural_list(names: &[impl AsRef<str>]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n.as_ref())).collect();
    match quoted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}

/// Suggest the closest candidate to `name` by edit distance, if any is close.
#[must_use]
pub fn closest_match<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|c| (c, strsim::levenshtein(name, c)))
        .filter(|(_, distance)| *distance <= 3)
        .min_by_key(|(_, distance)| *distance)
        .map(|(c, _)| c)
}
