use crate::config::{Config, Exclusion, Language};
use crate::error::ScanError;
use crate::model::ModuleId;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A candidate file found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// Path to read the file from (the root joined with the relative path).
    pub path: PathBuf,
    /// Root-relative, `/`-separated path. Used as the module id.
    pub id: ModuleId,
}

/// Walks a repository root and yields the source files of one language.
pub struct PathScanner {
    root: PathBuf,
    language: Language,
    exclusions: Vec<Exclusion>,
}

impl PathScanner {
    pub fn new(root: impl Into<PathBuf>, language: Language, exclusions: Vec<Exclusion>) -> Self {
        Self {
            root: root.into(),
            language,
            exclusions,
        }
    }

    /// A scanner using the configured root and language, with the default exclusions
    /// added to the user ones.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.root.clone(),
            config.language,
            config.effective_exclusions(),
        )
    }

    /// Lazily walks the tree.
    ///
    /// Entries come sorted by file name within each directory. Excluded directories are
    /// pruned without being read. Symlinks are followed, but only to targets inside the
    /// root whose real path has not been walked yet, so a link cycle ends the branch.
    pub fn scan(&self) -> impl Iterator<Item = Result<SourceFile, ScanError>> + '_ {
        let real_root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let mut visited: HashSet<PathBuf> = HashSet::new();
        visited.insert(real_root.clone());

        WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                if self.is_excluded(entry.path()) {
                    return false;
                }
                let is_dir = entry.file_type().is_dir();
                if !is_dir && !entry.path_is_symlink() {
                    return true;
                }
                match fs::canonicalize(entry.path()) {
                    Ok(real) => real.starts_with(&real_root) && (!is_dir || visited.insert(real)),
                    // Let walkdir report the broken entry.
                    Err(_) => true,
                }
            })
            .filter_map(move |item| match item {
                Ok(entry) => {
                    if !entry.file_type().is_file() || !self.has_extension(entry.path()) {
                        return None;
                    }
                    let relative = entry.path().strip_prefix(&self.root).ok()?;
                    Some(Ok(SourceFile {
                        path: entry.path().to_path_buf(),
                        id: module_id(relative),
                    }))
                }
                Err(err) if err.loop_ancestor().is_some() => {
                    tracing::debug!("not following symlink loop: {}", err);
                    None
                }
                Err(err) => Some(Err(ScanError {
                    path: err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone()),
                    message: err
                        .io_error()
                        .map_or_else(|| err.to_string(), |io| io.to_string()),
                })),
            })
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.exclusions.iter().any(|e| e.matches(relative))
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .map_or(false, |ext| self.language.extensions().iter().any(|e| ext == *e))
    }
}

/// Module id of a root-relative path.
pub fn module_id(relative: &Path) -> ModuleId {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
