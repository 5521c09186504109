use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Directories that are never worth analyzing: VCS metadata, caches, virtualenvs
/// and build output. Always applied on top of user exclusions.
pub const DEFAULT_EXCLUDED: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    ".ruff_cache",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".eggs",
    "__pycache__",
    "build",
    "dist",
    "site-packages",
    "node_modules",
    "venv",
    ".venv",
    "env",
    ".env",
    "bin",
    "obj",
    "Debug",
    "Release",
    ".vs",
];

/// The languages an analyzer variant exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    #[serde(alias = "c#", alias = "cs")]
    CSharp,
}

impl Language {
    /// File extensions (without the dot) scanned for this language.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::CSharp => &["cs", "csx"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::CSharp => "csharp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "csharp" | "c#" | "cs" => Ok(Language::CSharp),
            other => Err(ConfigError::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// One entry of the exclusion set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Exclusion {
    /// Any path component with exactly this name (e.g. `vendor`).
    Name(String),
    /// A root-relative path prefix (e.g. `src/generated`).
    Path(PathBuf),
    /// A file extension without the dot (e.g. `pyi`).
    Extension(String),
}

impl Exclusion {
    /// Reads the textual form used on the command line.
    ///
    /// `*.ext` is an extension, anything containing `/` is a root-relative path,
    /// everything else is a component name.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(ext) = raw.strip_prefix("*.") {
            return Some(Exclusion::Extension(ext.to_string()));
        }
        if raw.contains('/') || raw.contains('\\') {
            let normalized = raw.replace('\\', "/");
            return Some(Exclusion::Path(PathBuf::from(
                normalized.trim_start_matches("./").trim_end_matches('/'),
            )));
        }
        Some(Exclusion::Name(raw.to_string()))
    }

    /// Whether a root-relative path is covered by this exclusion.
    pub fn matches(&self, relative: &Path) -> bool {
        match self {
            Exclusion::Name(name) => relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy() == name.as_str()),
            Exclusion::Path(prefix) => relative.starts_with(prefix),
            Exclusion::Extension(ext) => relative
                .extension()
                .map_or(false, |e| e.to_string_lossy().eq_ignore_ascii_case(ext)),
        }
    }
}

/// Naming heuristic behind the "magic function" flag.
///
/// A name is split into tokens on `_` and case changes. It is descriptive when at least
/// one token is `min_token_len` characters or longer and is not listed in
/// `generic_tokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagicPolicy {
    pub min_token_len: usize,
    pub generic_tokens: Vec<String>,
}

impl Default for MagicPolicy {
    fn default() -> Self {
        Self {
            min_token_len: 3,
            generic_tokens: [
                "foo", "bar", "baz", "qux", "tmp", "temp", "func", "fun", "fn", "test", "run",
                "main", "call", "exec", "execute", "handle", "handler", "process", "helper",
                "util", "utils", "stuff", "thing", "data", "obj", "var", "val", "value", "new",
                "init", "get", "set", "str", "repr", "doit", "aux", "misc",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Immutable configuration of one run, handed to `Pipeline::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub language: Language,
    pub root: PathBuf,
    /// Where a driver may write its artifacts. The core never writes files.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    #[serde(default)]
    pub magic: MagicPolicy,
    /// Size of the parse worker pool. `None` uses one worker per CPU.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Stop waiting for parse results after this long.
    #[serde(default, with = "duration_option")]
    pub deadline: Option<Duration>,
}

impl Config {
    pub fn new(language: Language, root: impl Into<PathBuf>) -> Self {
        Self {
            language,
            root: root.into(),
            output: None,
            exclusions: Vec::new(),
            magic: MagicPolicy::default(),
            workers: None,
            deadline: None,
        }
    }

    pub fn with_exclusions(mut self, exclusions: Vec<Exclusion>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_magic_policy(mut self, magic: MagicPolicy) -> Self {
        self.magic = magic;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// User exclusions followed by `DEFAULT_EXCLUDED`.
    pub fn effective_exclusions(&self) -> Vec<Exclusion> {
        let mut all = self.exclusions.clone();
        all.extend(
            DEFAULT_EXCLUDED
                .iter()
                .map(|name| Exclusion::Name(name.to_string())),
        );
        all
    }

    /// Checks everything that must hold before scanning can start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root.exists() {
            return Err(ConfigError::MissingRoot(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(ConfigError::RootNotDirectory(self.root.clone()));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}

// Durations travel as whole seconds.
mod duration_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => d.as_secs().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
