use super::LanguageAnalyzer;
use crate::config::Language;
use crate::docstring::{normalize_python, python_string_literal};
use crate::error::ParseError;
use crate::model::{Callable, CallableKind, Field, Import, Module, TypeDecl, TypeKind};
use crate::utils::{count_sloc, split_at_close, split_top_level, LineIndex};
use regex::Regex;
use rustpython_parser::{lexer::lex, Mode};

lazy_static::lazy_static! {
    static ref DEF_RE: Regex =
        Regex::new(r"(?s)^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*\((.*)$").unwrap();
    static ref CLASS_RE: Regex = Regex::new(r"(?s)^class\s+([A-Za-z_]\w*)(.*)$").unwrap();
    static ref DECORATOR_RE: Regex = Regex::new(r"(?s)^@\s*(.+)$").unwrap();
    static ref IMPORT_RE: Regex = Regex::new(r"(?s)^import\s+(.+)$").unwrap();
    static ref FROM_RE: Regex = Regex::new(r"(?s)^from\s+(\.*[\w.]*)\s+import\s+(.+)$").unwrap();
    static ref ALIAS_RE: Regex = Regex::new(r"^([\w.]+|\*)(?:\s+as\s+(\w+))?$").unwrap();
    static ref ANNOTATED_RE: Regex = Regex::new(r"^([A-Za-z_]\w*)\s*:").unwrap();
    static ref TARGET_RE: Regex = Regex::new(r"^([A-Za-z_]\w*)\s*=").unwrap();
}

/// Compound statement keywords that look like `name:` at the start of a line.
const BLOCK_KEYWORDS: &[&str] = &["else", "try", "finally", "except", "match", "case"];

/// Decorators that turn a method into a property.
const PROPERTY_DECORATORS: &[&str] = &[
    "property",
    "cached_property",
    "functools.cached_property",
    "abc.abstractproperty",
    "abstractproperty",
];

/// Python analyzer variant.
pub struct PythonAnalyzer;

impl LanguageAnalyzer for PythonAnalyzer {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, path: &str, source: &str) -> Result<Module, ParseError> {
        check_tokens(path, source)?;
        let lines = logical_lines(source).map_err(|(line, msg)| ParseError::new(path, line, msg))?;

        let mut visitor = PythonVisitor::new(path);
        for line in &lines {
            visitor.visit_line(line);
        }

        let mut module = visitor.finish();
        module.loc = source.lines().count();
        module.sloc = count_sloc(source, &["#"]);
        Ok(module)
    }
}

/// Runs the Python tokenizer over the whole file.
///
/// Unterminated strings, bad dedents and stray characters are reported here,
/// before any structure is extracted.
fn check_tokens(path: &str, source: &str) -> Result<(), ParseError> {
    let line_index = LineIndex::new(source);
    for token in lex(source, Mode::Module) {
        if let Err(err) = token {
            return Err(ParseError::new(
                path,
                line_index.line_index(err.location),
                err.error.to_string(),
            ));
        }
    }
    Ok(())
}

/// One logical line: a statement with its continuation lines joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Physical line the statement starts on.
    pub line: usize,
    /// Indentation width, tabs expanded to multiples of 8.
    pub indent: usize,
    /// Statement text with comments removed. String literals are kept verbatim.
    pub text: String,
}

/// Splits Python source into logical lines.
///
/// Brackets and backslashes join physical lines; comments and blank lines disappear.
/// Fails with `(line, message)` on a string or bracket left open at end of file.
pub fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, (usize, String)> {
    let chars: Vec<char> = source.chars().collect();
    let n = chars.len();
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut line = 1;
    let mut start_line = 1;
    let mut indent = 0;
    let mut depth: i32 = 0;
    let mut fresh = true;
    // (quote char, triple-quoted, line where it opened)
    let mut string: Option<(char, bool, usize)> = None;
    let mut i = 0;

    while i < n {
        let c = chars[i];

        if let Some((quote, triple, opened)) = string {
            if c == '\\' {
                current.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    current.push(next);
                    if next == '\n' {
                        line += 1;
                    }
                }
                i += 2;
                continue;
            }
            if c == '\n' {
                if !triple {
                    return Err((opened, "unterminated string literal".to_string()));
                }
                line += 1;
            }
            let closes = c == quote
                && (!triple
                    || (chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote)));
            if closes {
                let width = if triple { 3 } else { 1 };
                current.extend(std::iter::repeat(quote).take(width));
                i += width;
                string = None;
                continue;
            }
            current.push(c);
            i += 1;
            continue;
        }

        if fresh {
            match c {
                ' ' => indent += 1,
                '\t' => indent = (indent / 8 + 1) * 8,
                '\r' | '\x0c' => {}
                '\n' => {
                    indent = 0;
                    line += 1;
                }
                '#' => {
                    while i < n && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                _ => {
                    fresh = false;
                    start_line = line;
                    continue;
                }
            }
            i += 1;
            continue;
        }

        match c {
            '#' => {
                while i < n && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '\\' if matches!(chars.get(i + 1), Some('\n') | Some('\r')) => {
                current.push(' ');
                i += 1;
                if chars.get(i) == Some(&'\r') {
                    i += 1;
                }
                if chars.get(i) == Some(&'\n') {
                    i += 1;
                    line += 1;
                }
                continue;
            }
            '\n' => {
                line += 1;
                if depth > 0 {
                    current.push(' ');
                } else {
                    let text = current.trim().to_string();
                    if !text.is_empty() {
                        lines.push(LogicalLine {
                            line: start_line,
                            indent,
                            text,
                        });
                    }
                    current.clear();
                    indent = 0;
                    fresh = true;
                }
            }
            '\r' => {}
            '"' | '\'' => {
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                let width = if triple { 3 } else { 1 };
                current.extend(std::iter::repeat(c).take(width));
                string = Some((c, triple, line));
                i += width;
                continue;
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err((line, format!("unmatched '{}'", c)));
                }
                current.push(c);
            }
            _ => current.push(c),
        }
        i += 1;
    }

    if let Some((_, _, opened)) = string {
        return Err((opened, "unterminated string literal at end of file".to_string()));
    }
    if depth > 0 {
        return Err((line, "unexpected end of file inside brackets".to_string()));
    }
    let text = current.trim().to_string();
    if !text.is_empty() {
        lines.push(LogicalLine {
            line: start_line,
            indent,
            text,
        });
    }
    Ok(lines)
}

/// An entity whose body is still being read.
enum Frame {
    Type { indent: usize, decl: TypeDecl },
    Function { indent: usize, callable: Callable },
}

impl Frame {
    fn indent(&self) -> usize {
        match self {
            Frame::Type { indent, .. } | Frame::Function { indent, .. } => *indent,
        }
    }

    fn set_docstring(&mut self, doc: String) {
        match self {
            Frame::Type { decl, .. } => decl.docstring = Some(doc),
            Frame::Function { callable, .. } => callable.docstring = Some(doc),
        }
    }
}

/// Builds a `Module` from logical lines, using indentation to track ownership.
pub struct PythonVisitor {
    module: Module,
    stack: Vec<Frame>,
    /// Decorators waiting for their `def` or `class`.
    decorators: Vec<String>,
    /// Stack depth of the frame whose first body statement may be its docstring.
    expect_doc: Option<usize>,
    /// Stack depth and count of the class attributes a following string literal documents.
    field_doc: Option<(usize, usize)>,
    seen_statement: bool,
}

impl PythonVisitor {
    pub fn new(path: &str) -> Self {
        Self {
            module: Module::new(path, Language::Python),
            stack: Vec::new(),
            decorators: Vec::new(),
            expect_doc: None,
            field_doc: None,
            seen_statement: false,
        }
    }

    pub fn visit_line(&mut self, line: &LogicalLine) {
        while self
            .stack
            .last()
            .map_or(false, |frame| frame.indent() >= line.indent)
        {
            self.close_frame();
        }

        if let Some(depth) = self.expect_doc.take() {
            if depth == self.stack.len() {
                if let Some(doc) = python_string_literal(&line.text) {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.set_docstring(normalize_python(&doc));
                    }
                    return;
                }
            }
        }

        if let Some((depth, count)) = self.field_doc.take() {
            if depth == self.stack.len() {
                if let (Some(doc), Some(Frame::Type { decl, .. })) =
                    (python_string_literal(&line.text), self.stack.last_mut())
                {
                    let start = decl.fields.len().saturating_sub(count);
                    let doc = normalize_python(&doc);
                    for field in &mut decl.fields[start..] {
                        field.docstring = Some(doc.clone());
                    }
                    return;
                }
            }
        }

        if !self.seen_statement {
            self.seen_statement = true;
            if line.indent == 0 {
                if let Some(doc) = python_string_literal(&line.text) {
                    self.module.docstring = Some(normalize_python(&doc));
                    return;
                }
            }
        }

        // Inside a function body only imports matter.
        if matches!(self.stack.last(), Some(Frame::Function { .. })) {
            self.decorators.clear();
            self.visit_imports(line);
            return;
        }

        if let Some(caps) = DECORATOR_RE.captures(&line.text) {
            self.decorators.push(caps[1].trim().to_string());
            return;
        }

        if let Some(caps) = DEF_RE.captures(&line.text) {
            let name = caps[1].to_string();
            let rest = caps.get(2).map_or("", |m| m.as_str()).to_string();
            self.visit_def(name, &rest, line);
            return;
        }

        if let Some(caps) = CLASS_RE.captures(&line.text) {
            let name = caps[1].to_string();
            let rest = caps.get(2).map_or("", |m| m.as_str()).to_string();
            self.visit_class(name, &rest, line);
            return;
        }

        self.decorators.clear();
        if matches!(self.stack.last(), Some(Frame::Type { .. })) {
            self.visit_fields(line);
        }
        self.visit_imports(line);
    }

    /// Records `name = ...` and `name: annotation` statements of a class body.
    fn visit_fields(&mut self, line: &LogicalLine) {
        let mut names = Vec::new();
        for statement in split_top_level(&line.text, ';', false) {
            names.extend(assignment_targets(&statement));
        }
        if names.is_empty() {
            return;
        }
        self.field_doc = Some((self.stack.len(), names.len()));
        if let Some(Frame::Type { decl, .. }) = self.stack.last_mut() {
            for name in names {
                decl.fields.push(Field::new(name, line.line));
            }
        }
    }

    fn visit_def(&mut self, name: String, rest: &str, line: &LogicalLine) {
        let decorators = std::mem::take(&mut self.decorators);
        let in_type = matches!(self.stack.last(), Some(Frame::Type { .. }));

        let kind = if !in_type {
            CallableKind::Function
        } else if decorators.iter().any(|d| is_property_decorator(d)) {
            CallableKind::Property
        } else {
            CallableKind::Method
        };

        let (params, after) = match split_at_close(rest, ')') {
            Some((params, after)) => (params, after),
            None => (rest, ""),
        };

        let mut callable = Callable::new(name, kind, line.line);
        callable.decorators = decorators;
        callable.params = count_params(params, in_type);

        let body = inline_body(after);
        self.open_frame(
            Frame::Function {
                indent: line.indent,
                callable,
            },
            body,
        );
    }

    fn visit_class(&mut self, name: String, rest: &str, line: &LogicalLine) {
        let mut decl = TypeDecl::new(name, TypeKind::Class, line.line);
        decl.decorators = std::mem::take(&mut self.decorators);
        let body = inline_body(rest);
        self.open_frame(
            Frame::Type {
                indent: line.indent,
                decl,
            },
            body,
        );
    }

    /// Pushes a frame. A body on the same line as the signature can only hold a
    /// docstring there; otherwise the next statement is checked.
    fn open_frame(&mut self, mut frame: Frame, inline: Option<String>) {
        match inline {
            Some(body) => {
                if let Some(doc) = python_string_literal(&body) {
                    frame.set_docstring(normalize_python(&doc));
                }
                self.stack.push(frame);
            }
            None => {
                self.stack.push(frame);
                self.expect_doc = Some(self.stack.len());
            }
        }
    }

    fn close_frame(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        match (frame, self.stack.last_mut()) {
            (Frame::Type { decl, .. }, Some(Frame::Type { decl: parent, .. })) => {
                parent.types.push(decl)
            }
            (Frame::Function { callable, .. }, Some(Frame::Type { decl: parent, .. })) => {
                parent.callables.push(callable)
            }
            (Frame::Type { decl, .. }, None) => self.module.types.push(decl),
            (Frame::Function { callable, .. }, None) => self.module.callables.push(callable),
            // Nothing is opened inside a function body.
            (_, Some(Frame::Function { .. })) => {}
        }
    }

    fn visit_imports(&mut self, line: &LogicalLine) {
        for statement in split_top_level(&line.text, ';', false) {
            if let Some(caps) = FROM_RE.captures(&statement) {
                let base = caps[1].to_string();
                // `from __future__ import ...` is a compiler directive, not a dependency.
                if base == "__future__" {
                    continue;
                }
                let names = caps[2].trim().trim_start_matches('(').trim_end_matches(')');
                for item in split_top_level(names, ',', false) {
                    let Some(alias) = ALIAS_RE.captures(&item) else {
                        continue;
                    };
                    let name = &alias[1];
                    let raw = if name == "*" {
                        base.clone()
                    } else if base.chars().all(|c| c == '.') {
                        format!("{}{}", base, name)
                    } else {
                        format!("{}.{}", base, name)
                    };
                    let alias = alias.get(2).map(|m| m.as_str().to_string());
                    self.module.imports.push(Import::new(raw, line.line, alias));
                }
            } else if let Some(caps) = IMPORT_RE.captures(&statement) {
                for item in split_top_level(&caps[1], ',', false) {
                    if let Some(alias) = ALIAS_RE.captures(&item) {
                        let raw = alias[1].to_string();
                        let alias = alias.get(2).map(|m| m.as_str().to_string());
                        self.module.imports.push(Import::new(raw, line.line, alias));
                    }
                }
            }
        }
    }

    pub fn finish(mut self) -> Module {
        while !self.stack.is_empty() {
            self.close_frame();
        }
        self.module
    }
}

/// Plain names bound by an assignment statement: every target of `a = b = 1`, the
/// target of `x: int = 0`. Attribute, subscript and tuple targets are not names.
fn assignment_targets(statement: &str) -> Vec<String> {
    let statement = statement.trim();
    if let Some(caps) = ANNOTATED_RE.captures(statement) {
        let name = &caps[1];
        if BLOCK_KEYWORDS.contains(&name) || statement[caps[0].len()..].starts_with('=') {
            return Vec::new();
        }
        return vec![name.to_string()];
    }

    let mut targets = Vec::new();
    let mut rest = statement;
    while let Some(caps) = TARGET_RE.captures(rest) {
        let after = &rest[caps[0].len()..];
        // `==` is a comparison.
        if after.starts_with('=') {
            break;
        }
        targets.push(caps[1].to_string());
        rest = after.trim_start();
    }
    targets
}

fn is_property_decorator(decorator: &str) -> bool {
    PROPERTY_DECORATORS.contains(&decorator)
        || decorator.ends_with(".setter")
        || decorator.ends_with(".getter")
        || decorator.ends_with(".deleter")
}

/// Counts declared parameters, skipping the receiver and the bare `*` / `/` markers.
fn count_params(params: &str, in_type: bool) -> usize {
    split_top_level(params, ',', false)
        .iter()
        .map(|p| {
            p.split(|c| c == ':' || c == '=')
                .next()
                .unwrap_or("")
                .trim()
                .to_string()
        })
        .filter(|name| name != "*" && name != "/" && !name.is_empty())
        .filter(|name| !(in_type && (name == "self" || name == "cls")))
        .count()
}

/// The statement following the header's colon, when it is on the same line.
fn inline_body(after_signature: &str) -> Option<String> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in after_signature.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth == 0 => {
                let body = after_signature[i + 1..].trim();
                return if body.is_empty() {
                    None
                } else {
                    Some(body.to_string())
                };
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_targets() {
        assert_eq!(assignment_targets("a = b = 1"), vec!["a", "b"]);
        assert_eq!(assignment_targets("limit: int = 10"), vec!["limit"]);
        assert_eq!(assignment_targets("name: str"), vec!["name"]);
        assert!(assignment_targets("x == 1").is_empty());
        assert!(assignment_targets("x += 1").is_empty());
        assert!(assignment_targets("self.x = 1").is_empty());
        assert!(assignment_targets("a, b = 1, 2").is_empty());
        assert!(assignment_targets("else:").is_empty());
    }

    #[test]
    fn test_logical_lines_join_brackets_and_drop_comments() {
        let source = "# header\nx = (1,\n     2)  # trailing\n\nif x:\n    y = 'a#b'\n";
        let lines = logical_lines(source).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line, 2);
        assert_eq!(lines[0].text, "x = (1,      2)");
        assert_eq!(lines[1].text, "if x:");
        assert_eq!(lines[2].indent, 4);
        assert_eq!(lines[2].text, "y = 'a#b'");
    }

    #[test]
    fn test_logical_lines_keep_triple_quoted_blocks() {
        let source = "def f():\n    \"\"\"Line one.\n\n    Line two.\n    \"\"\"\n    return 1\n";
        let lines = logical_lines(source).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].line, 2);
        assert!(lines[1].text.starts_with("\"\"\"Line one."));
        assert_eq!(lines[2].line, 6);
    }

    #[test]
    fn test_logical_lines_report_unclosed_bracket() {
        let err = logical_lines("call(1,\n").unwrap_err();
        assert!(err.1.contains("brackets"));
    }

    #[test]
    fn test_count_params() {
        assert_eq!(count_params("self, a, b=2, *args, **kwargs", true), 4);
        assert_eq!(count_params("a, /, b, *, c", false), 3);
        assert_eq!(count_params("", false), 0);
        assert_eq!(count_params("cls", true), 0);
        assert_eq!(count_params("x: Dict[str, int] = {}", false), 1);
    }

    #[test]
    fn test_inline_body() {
        assert_eq!(inline_body(" -> int: return 1"), Some("return 1".to_string()));
        assert_eq!(inline_body(" -> Dict[str, int]:"), None);
        assert_eq!(inline_body("(Base):"), None);
    }
}
