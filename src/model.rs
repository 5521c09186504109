use crate::config::{Exclusion, Language};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Identifier of a module: its root-relative path with `/` separators.
pub type ModuleId = String;

/// Kind of a class-like declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Enum,
}

/// Kind of a function-like declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallableKind {
    /// Free function owned by the module.
    Function,
    /// Function owned by a type (constructors included).
    Method,
    /// Accessor exposed as an attribute.
    Property,
}

/// An import-like statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Reference as written (`pkg.mod.name`, `.sibling`, `System.Text`).
    pub raw: String,
    /// Line of the statement.
    pub line: usize,
    /// Local alias, kept for display only.
    pub alias: Option<String>,
    /// Internal modules the reference resolved to, the importing module excluded.
    #[serde(default)]
    pub targets: Vec<ModuleId>,
    /// Matched a scanned module, even when that module is the importer itself.
    #[serde(default)]
    pub resolved: bool,
}

impl Import {
    pub fn new(raw: impl Into<String>, line: usize, alias: Option<String>) -> Self {
        Self {
            raw: raw.into(),
            line,
            alias,
            targets: Vec::new(),
            resolved: false,
        }
    }

    /// Matched no scanned module.
    pub fn is_external(&self) -> bool {
        !self.resolved
    }
}

/// A function, method or property.
///
/// Serialized with a derived `documented` flag next to the docstring.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Callable {
    pub name: String,
    pub kind: CallableKind,
    pub line: usize,
    /// Decorators or attributes in source order, without the `@` / brackets.
    pub decorators: Vec<String>,
    pub docstring: Option<String>,
    /// Declared parameters, receiver (`self`/`cls`) excluded.
    pub params: usize,
}

impl Callable {
    pub fn new(name: impl Into<String>, kind: CallableKind, line: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            line,
            decorators: Vec::new(),
            docstring: None,
            params: 0,
        }
    }

    /// True when a docstring is attached, even an empty one.
    pub fn documented(&self) -> bool {
        self.docstring.is_some()
    }
}

impl Serialize for Callable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Callable", 7)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("line", &self.line)?;
        state.serialize_field("decorators", &self.decorators)?;
        state.serialize_field("docstring", &self.docstring)?;
        state.serialize_field("documented", &self.documented())?;
        state.serialize_field("params", &self.params)?;
        state.end()
    }
}

/// A class attribute (Python) or field (C#).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub line: usize,
    pub docstring: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            line,
            docstring: None,
        }
    }

    pub fn documented(&self) -> bool {
        self.docstring.is_some()
    }
}

/// A class-like declaration and everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub line: usize,
    pub decorators: Vec<String>,
    pub docstring: Option<String>,
    pub callables: Vec<Callable>,
    #[serde(default)]
    pub fields: Vec<Field>,
    pub types: Vec<TypeDecl>,
}

impl TypeDecl {
    pub fn new(name: impl Into<String>, kind: TypeKind, line: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            line,
            decorators: Vec::new(),
            docstring: None,
            callables: Vec::new(),
            fields: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn documented(&self) -> bool {
        self.docstring.is_some()
    }

    /// This type and its nested types, depth-first in declaration order.
    pub fn walk(&self) -> Vec<&TypeDecl> {
        let mut out = vec![self];
        for nested in &self.types {
            out.extend(nested.walk());
        }
        out
    }
}

/// One source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub path: ModuleId,
    pub language: Language,
    /// False when the analyzer rejected the file; everything below is then empty.
    pub parsed: bool,
    pub docstring: Option<String>,
    pub imports: Vec<Import>,
    pub types: Vec<TypeDecl>,
    /// Free functions.
    pub callables: Vec<Callable>,
    /// Namespaces the file declares (C# only).
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Physical lines.
    pub loc: usize,
    /// Non-blank, non-comment lines.
    pub sloc: usize,
}

impl Module {
    pub fn new(path: impl Into<ModuleId>, language: Language) -> Self {
        Self {
            path: path.into(),
            language,
            parsed: true,
            docstring: None,
            imports: Vec::new(),
            types: Vec::new(),
            callables: Vec::new(),
            namespaces: Vec::new(),
            loc: 0,
            sloc: 0,
        }
    }

    /// The placeholder registered for a file whose parse failed.
    pub fn unparsed(path: impl Into<ModuleId>, language: Language) -> Self {
        Self {
            parsed: false,
            ..Self::new(path, language)
        }
    }

    /// Every type in the module, nested ones included.
    pub fn all_types(&self) -> Vec<&TypeDecl> {
        self.types.iter().flat_map(|t| t.walk()).collect()
    }

    /// Free functions followed by every type's members.
    pub fn all_callables(&self) -> Vec<&Callable> {
        let mut out: Vec<&Callable> = self.callables.iter().collect();
        for t in self.all_types() {
            out.extend(t.callables.iter());
        }
        out
    }
}

/// The immutable result of the parse phase: every module of the repository,
/// sorted by path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityModel {
    pub root: PathBuf,
    pub language: Language,
    pub exclusions: Vec<Exclusion>,
    pub modules: Vec<Module>,
}

impl EntityModel {
    pub fn new(
        root: PathBuf,
        language: Language,
        exclusions: Vec<Exclusion>,
        mut modules: Vec<Module>,
    ) -> Self {
        modules.sort_by(|a, b| a.path.cmp(&b.path));
        modules.dedup_by(|a, b| a.path == b.path);
        Self {
            root,
            language,
            exclusions,
            modules,
        }
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules
            .binary_search_by(|m| m.path.as_str().cmp(id))
            .ok()
            .map(|idx| &self.modules[idx])
    }

    /// Module id to position in `modules`.
    pub fn index(&self) -> BTreeMap<&str, usize> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.path.as_str(), i))
            .collect()
    }
}
