//! Language analyzers: one variant per supported language, all producing the
//! same `Module` shape.

pub mod csharp;
pub mod python;

use crate::config::Language;
use crate::error::ParseError;
use crate::model::Module;
use std::sync::Arc;

/// Turns the text of one file into a `Module`.
///
/// Implementations hold no per-file state, so a single instance is shared by every
/// worker of the parse pool.
pub trait LanguageAnalyzer: Send + Sync {
    fn language(&self) -> Language;

    /// `path` is the root-relative module id; it is copied into the module and any error.
    fn parse(&self, path: &str, source: &str) -> Result<Module, ParseError>;
}

/// The analyzer variant for a configured language.
pub fn analyzer_for(language: Language) -> Arc<dyn LanguageAnalyzer> {
    match language {
        Language::Python => Arc::new(python::PythonAnalyzer),
        Language::CSharp => Arc::new(csharp::CSharpAnalyzer),
    }
}
