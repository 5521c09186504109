use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// A directory entry that could not be read while walking the repository.
/// The walk continues past it.
#[derive(Debug, Clone, Error, Serialize)]
#[error("cannot read {}: {message}", .path.display())]
pub struct ScanError {
    /// Path of the entry, or the root when walkdir could not name it.
    pub path: PathBuf,
    /// Underlying I/O or loop-detection message.
    pub message: String,
}

/// A file that could not be turned into a module.
///
/// The module is still registered, flagged as unparsed and with empty content,
/// so that the rest of the run keeps its shape.
#[derive(Debug, Clone, Error, Serialize)]
#[error("cannot parse {}:{line}: {message}", .path.display())]
pub struct ParseError {
    /// Root-relative path of the file.
    pub path: PathBuf,
    /// 1-indexed line where the problem was detected (0 when unknown).
    pub line: usize,
    /// Human-readable cause.
    pub message: String,
}

impl ParseError {
    pub fn new(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// An import that matches no scanned module. It becomes an external dependency.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{module}:{line}: `{reference}` does not resolve to a scanned module")]
pub struct ResolutionWarning {
    /// Id of the importing module.
    pub module: String,
    /// Raw import reference as written in source.
    pub reference: String,
    /// Line of the import statement.
    pub line: usize,
}

/// Invalid run configuration. The only fatal error: raised before scanning starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("repository root {} does not exist", .0.display())]
    MissingRoot(PathBuf),

    #[error("repository root {} is not a directory", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("unsupported language `{0}` (expected `python` or `csharp`)")]
    UnsupportedLanguage(String),

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("cannot start the parse worker pool: {0}")]
    WorkerPool(String),
}

/// Raised by a query surface whose phase has not completed yet.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{0} is not ready: its pipeline phase has not completed")]
    NotReady(&'static str),
}

/// One non-fatal event collected during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    Scan(ScanError),
    Parse(ParseError),
    Resolution(ResolutionWarning),
    /// The run deadline passed before this file's parse result arrived.
    Skipped { path: PathBuf },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Scan(e) => write!(f, "scan: {}", e),
            Diagnostic::Parse(e) => write!(f, "parse: {}", e),
            Diagnostic::Resolution(w) => write!(f, "resolution: {}", w),
            Diagnostic::Skipped { path } => write!(f, "skipped: {} (deadline reached)", path.display()),
        }
    }
}

/// Run-level list of diagnostics, in the order their phases produced them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic {
            // Standard library imports land here too; keep them out of the default output.
            Diagnostic::Resolution(_) => tracing::debug!("{}", diagnostic),
            _ => tracing::warn!("{}", diagnostic),
        }
        self.items.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn parse_errors(&self) -> impl Iterator<Item = &ParseError> {
        self.items.iter().filter_map(|d| match d {
            Diagnostic::Parse(e) => Some(e),
            _ => None,
        })
    }

    pub fn scan_errors(&self) -> impl Iterator<Item = &ScanError> {
        self.items.iter().filter_map(|d| match d {
            Diagnostic::Scan(e) => Some(e),
            _ => None,
        })
    }

    pub fn resolution_warnings(&self) -> impl Iterator<Item = &ResolutionWarning> {
        self.items.iter().filter_map(|d| match d {
            Diagnostic::Resolution(w) => Some(w),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PathBuf> {
        self.items.iter().filter_map(|d| match d {
            Diagnostic::Skipped { path } => Some(path),
            _ => None,
        })
    }
}
