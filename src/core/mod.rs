//! Core types shared across Garden's configuration compiler
//!
//! This module holds the error taxonomy used by both the template evaluator and
//! the plugin registry builder, along with CLI-facing error presentation.
//!
//! # Modules
//!
//! ## `error` - Error Handling
//!
//! - [`GardenError`] - every failure mode of the template and plugin subsystems
//! - [`ErrorKind`] - configuration / plugin / internal classification
//! - [`TemplateStringError`] - template failures with source location
//! - [`ErrorContext`] and [`user_friendly_error`] - colored CLI presentation

pub mod error;

pub use error::{
    ErrorContext, ErrorKind, GardenError, TemplateStringError, closest_match, natural_list,
    user_friendly_error,
};

/// A specialized `Result` type for Garden's core operations.
pub type Result<T> = std::result::Result<T, GardenError>;
