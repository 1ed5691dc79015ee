//! Integration test suite for Garden
//!
//! End-to-end tests through the public library API and the `garden` binary.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **templating**: template-string resolution, partial mode and provenance
//! - **plugins**: registry resolution with built-in and manifest plugins
//! - **cli**: the `garden` binary

mod cli;
mod plugins;
mod templating;
