// Lib file to expose modules for testing and external usage.
// This file serves as the root for the library crate.

/// Language analyzers.
/// One variant per supported language, each turning a file into a `Module`.
pub mod analyzers;

/// Run configuration: language, root, exclusions, magic-function policy, workers, deadline.
pub mod config;

/// Normalization of Python docstrings and C# XML doc comments.
pub mod docstring;

/// Error and diagnostic types.
pub mod error;

/// Dependency graph built from resolved imports, with cycle detection.
pub mod graph;

/// Documentation and structural indicators computed over the entity model.
pub mod metrics;

/// The unified entity model shared by every language.
pub mod model;

/// The phase state machine and its query surfaces.
pub mod pipeline;

/// Repository walking and candidate file selection.
pub mod scanner;

/// Module containing utility functions.
/// This includes helper functions used across the application.
pub mod utils;

pub use config::{Config, Exclusion, Language, MagicPolicy};
pub use error::{ConfigError, Diagnostic, Diagnostics, ParseError, QueryError};
pub use pipeline::{Phase, Pipeline};
