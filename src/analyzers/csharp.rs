use super::LanguageAnalyzer;
use crate::config::Language;
use crate::docstring::clean_csharp;
use crate::error::ParseError;
use crate::model::{Callable, CallableKind, Field, Import, Module, TypeDecl, TypeKind};
use crate::utils::{count_sloc, split_at_close, split_top_level};
use regex::Regex;

const MODIFIERS: &str = r"(?:(?:public|private|protected|internal|static|virtual|override|abstract|async|sealed|partial|extern|new|unsafe|readonly|required|volatile|file|ref)\s+)*";

lazy_static::lazy_static! {
    static ref USING_RE: Regex = Regex::new(
        r"^(?:global\s+)?using\s+(?:static\s+)?(?:([A-Za-z_]\w*)\s*=\s*)?([A-Za-z_][\w.]*(?:<[^;]*>)?)\s*;"
    ).unwrap();
    static ref NAMESPACE_RE: Regex = Regex::new(r"^namespace\s+([A-Za-z_][\w.]*)\s*(;)?").unwrap();
    static ref TYPE_RE: Regex = Regex::new(&format!(
        r"^{}(class|interface|struct|enum|record(?:\s+class|\s+struct)?)\s+([A-Za-z_]\w*)",
        MODIFIERS
    )).unwrap();
    static ref CTOR_RE: Regex = Regex::new(&format!(r"^{}([A-Za-z_]\w*)\s*\(", MODIFIERS)).unwrap();
    static ref METHOD_RE: Regex = Regex::new(&format!(
        r"^{}[\w<>\[\],.?() ]+?\s+(?:[\w.]+\.)?([A-Za-z_]\w*)\s*(?:<[^()]*>)?\s*\(",
        MODIFIERS
    )).unwrap();
    static ref PROPERTY_RE: Regex = Regex::new(&format!(
        r"^{}[\w<>\[\],.?() ]+?\s+(?:[\w.]+\.)?([A-Za-z_]\w*)\s*(\{{|=>|$)",
        MODIFIERS
    )).unwrap();
    static ref FIELD_RE: Regex = Regex::new(&format!(
        r"^{}(?:const\s+)?[\w<>\[\],.?() ]+?\s+([A-Za-z_]\w*)\s*[=;,]",
        MODIFIERS
    )).unwrap();
    static ref SKIP_RE: Regex =
        Regex::new(&format!(r"^{}(?:delegate|event)\b|\boperator\b", MODIFIERS)).unwrap();
}

/// C# analyzer variant.
///
/// Comments and literals are blanked out first, so every brace and parenthesis left
/// in the text is structural. Declarations are then matched line by line while the
/// brace depth tells which type or namespace owns them.
pub struct CSharpAnalyzer;

impl LanguageAnalyzer for CSharpAnalyzer {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn parse(&self, path: &str, source: &str) -> Result<Module, ParseError> {
        let masked = mask(source).map_err(|(line, msg)| ParseError::new(path, line, msg))?;

        let mut walker = CSharpWalker::new(path);
        for (idx, (original, code)) in source.lines().zip(masked.lines()).enumerate() {
            walker
                .visit_line(idx + 1, original, code)
                .map_err(|(line, msg)| ParseError::new(path, line, msg))?;
        }

        let mut module = walker
            .finish(source.lines().count())
            .map_err(|(line, msg)| ParseError::new(path, line, msg))?;
        module.loc = source.lines().count();
        module.sloc = count_sloc(source, &["//", "/*", "*"]);
        Ok(module)
    }
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    }
}

/// Replaces comments and string/char literals with spaces.
///
/// Newlines and byte offsets are preserved, so a position in the masked text is the
/// same position in the source. Fails with `(line, message)` on an unterminated
/// comment or literal.
pub fn mask(source: &str) -> Result<String, (usize, String)> {
    let chars: Vec<char> = source.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(source.len());
    let mut line = 1;
    let mut i = 0;

    while i < n {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '/' && next == Some('/') {
            while i < n && chars[i] != '\n' {
                blank(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }

        if c == '/' && next == Some('*') {
            let opened = line;
            out.push_str("  ");
            i += 2;
            loop {
                if i >= n {
                    return Err((opened, "unterminated block comment".to_string()));
                }
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    out.push_str("  ");
                    i += 2;
                    break;
                }
                if chars[i] == '\n' {
                    line += 1;
                }
                blank(&mut out, chars[i]);
                i += 1;
            }
            continue;
        }

        if c == '\'' {
            let opened = line;
            out.push(' ');
            i += 1;
            loop {
                match chars.get(i) {
                    None | Some('\n') => {
                        return Err((opened, "unterminated character literal".to_string()))
                    }
                    Some('\'') => {
                        out.push(' ');
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        out.push(' ');
                        i += 1;
                        if let Some(&escaped) = chars.get(i) {
                            blank(&mut out, escaped);
                            i += 1;
                        }
                    }
                    Some(&other) => {
                        blank(&mut out, other);
                        i += 1;
                    }
                }
            }
            continue;
        }

        // String literal, possibly prefixed with `@` and/or `$`.
        let mut j = i;
        while j < n && (chars[j] == '@' || chars[j] == '$') {
            j += 1;
        }
        if j < n && chars[j] == '"' {
            let verbatim = chars[i..j].contains(&'@');
            let interpolated = chars[i..j].contains(&'$');
            for _ in i..j {
                out.push(' ');
            }
            i = j;
            line = mask_string(&chars, &mut i, &mut out, line, verbatim, interpolated)?;
            continue;
        }

        if c == '\n' {
            line += 1;
        }
        out.push(c);
        i += 1;
    }

    Ok(out)
}

/// Blanks one string literal starting at the opening quote `chars[*i]`.
/// Returns the line number after the literal.
fn mask_string(
    chars: &[char],
    i: &mut usize,
    out: &mut String,
    mut line: usize,
    verbatim: bool,
    interpolated: bool,
) -> Result<usize, (usize, String)> {
    let n = chars.len();
    let opened = line;

    let mut quotes = 0;
    while *i + quotes < n && chars[*i + quotes] == '"' {
        quotes += 1;
    }

    // Raw string: closed by the same run of quotes, no escapes.
    if quotes >= 3 {
        for _ in 0..quotes {
            out.push(' ');
        }
        *i += quotes;
        loop {
            if *i >= n {
                return Err((opened, "unterminated raw string literal".to_string()));
            }
            if chars[*i..].iter().take(quotes).filter(|&&c| c == '"').count() == quotes {
                for _ in 0..quotes {
                    out.push(' ');
                }
                *i += quotes;
                return Ok(line);
            }
            if chars[*i] == '\n' {
                line += 1;
            }
            blank(out, chars[*i]);
            *i += 1;
        }
    }

    // `""`: the empty string.
    if quotes == 2 {
        out.push_str("  ");
        *i += 2;
        return Ok(line);
    }

    out.push(' ');
    *i += 1;
    let mut holes = 0;
    loop {
        let Some(&c) = chars.get(*i) else {
            return Err((opened, "unterminated string literal".to_string()));
        };
        let next = chars.get(*i + 1).copied();

        match c {
            '\\' if !verbatim => {
                out.push(' ');
                *i += 1;
                if let Some(&escaped) = chars.get(*i) {
                    blank(out, escaped);
                    *i += 1;
                }
                continue;
            }
            '\n' if !verbatim && holes == 0 => {
                return Err((opened, "newline in string literal".to_string()));
            }
            '{' if interpolated => {
                if holes == 0 && next == Some('{') {
                    out.push_str("  ");
                    *i += 2;
                    continue;
                }
                holes += 1;
            }
            '}' if interpolated => {
                if holes > 0 {
                    holes -= 1;
                } else if next == Some('}') {
                    out.push_str("  ");
                    *i += 2;
                    continue;
                }
            }
            '"' if holes > 0 => {
                // A literal nested in an interpolation hole.
                out.push(' ');
                *i += 1;
                while let Some(&inner) = chars.get(*i) {
                    blank(out, inner);
                    *i += 1;
                    if inner == '"' || inner == '\n' {
                        break;
                    }
                }
                continue;
            }
            '"' => {
                if verbatim && next == Some('"') {
                    out.push_str("  ");
                    *i += 2;
                    continue;
                }
                out.push(' ');
                *i += 1;
                return Ok(line);
            }
            _ => {}
        }

        if c == '\n' {
            line += 1;
        }
        blank(out, c);
        *i += 1;
    }
}

/// A scope whose opening brace has been seen.
enum Container {
    Namespace { body_depth: i32, name: String },
    Type { body_depth: i32, decl: TypeDecl },
}

impl Container {
    fn body_depth(&self) -> i32 {
        match self {
            Container::Namespace { body_depth, .. } | Container::Type { body_depth, .. } => {
                *body_depth
            }
        }
    }
}

/// A declaration waiting for its opening brace.
enum Pending {
    Namespace(String),
    Type(TypeDecl),
}

struct CSharpWalker {
    module: Module,
    containers: Vec<Container>,
    pending: Option<Pending>,
    depth: i32,
    /// Lines of the current `///` block.
    docs: Vec<String>,
    /// Attributes waiting for their declaration.
    attrs: Vec<String>,
    /// A member signature split over several lines, with its first line.
    signature: Option<(String, usize)>,
    /// `Type Name` on its own line; a property if the next line opens a body.
    property: Option<Callable>,
    seen_code: bool,
}

impl CSharpWalker {
    fn new(path: &str) -> Self {
        Self {
            module: Module::new(path, Language::CSharp),
            containers: Vec::new(),
            pending: None,
            depth: 0,
            docs: Vec::new(),
            attrs: Vec::new(),
            signature: None,
            property: None,
            seen_code: false,
        }
    }

    fn container_depth(&self) -> i32 {
        self.containers.last().map_or(0, Container::body_depth)
    }

    fn current_type(&mut self) -> Option<&mut TypeDecl> {
        match self.containers.last_mut() {
            Some(Container::Type { decl, .. }) => Some(decl),
            _ => None,
        }
    }

    fn visit_line(&mut self, number: usize, original: &str, code: &str) -> Result<(), (usize, String)> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            if let Some(doc) = original.trim_start().strip_prefix("///") {
                self.docs.push(doc.strip_prefix(' ').unwrap_or(doc).to_string());
            }
            return Ok(());
        }
        if trimmed.starts_with('#') {
            return Ok(());
        }

        if self.depth == self.container_depth() {
            let offset = code.len() - code.trim_start().len();
            let end = offset + trimmed.len();
            let source_span = original.get(offset..end).unwrap_or(trimmed);
            self.classify(number, trimmed, source_span);
        } else {
            self.forget();
        }
        self.scan_braces(number, code)
    }

    fn forget(&mut self) {
        self.docs.clear();
        self.attrs.clear();
        self.property = None;
    }

    fn take_docstring(&mut self) -> Option<String> {
        if self.docs.is_empty() {
            None
        } else {
            let doc = clean_csharp(&self.docs);
            self.docs.clear();
            Some(doc)
        }
    }

    /// Handles a line that starts at the body level of the innermost container.
    /// `code` is the masked text, `original` the same span of source.
    fn classify(&mut self, number: usize, code: &str, original: &str) {
        if let Some((mut text, first)) = self.signature.take() {
            text.push(' ');
            text.push_str(code);
            if paren_balance(&text) > 0 {
                self.signature = Some((text, first));
            } else {
                self.declare_member(first, &text);
            }
            return;
        }

        if let Some(property) = self.property.take() {
            if code.starts_with('{') || code.starts_with("=>") {
                if let Some(decl) = self.current_type() {
                    decl.callables.push(property);
                }
                return;
            }
        }
        if code.starts_with('{') {
            return;
        }

        let (code, _) = self.collect_attributes(code, original);
        if code.is_empty() {
            return;
        }

        if !self.seen_code {
            self.seen_code = true;
            if USING_RE.is_match(code) || NAMESPACE_RE.is_match(code) {
                self.module.docstring = self.take_docstring();
            }
        }

        if self.current_type().is_none() {
            if let Some(caps) = USING_RE.captures(code) {
                let alias = caps.get(1).map(|m| m.as_str().to_string());
                self.module.imports.push(Import::new(&caps[2], number, alias));
                self.forget();
                return;
            }
            if let Some(caps) = NAMESPACE_RE.captures(code) {
                let name = self.qualify(&caps[1]);
                self.module.namespaces.push(name.clone());
                if caps.get(2).is_none() {
                    self.pending = Some(Pending::Namespace(name));
                }
                self.forget();
                return;
            }
        }

        if let Some(caps) = TYPE_RE.captures(code) {
            let kind = match &caps[1] {
                "interface" => TypeKind::Interface,
                "enum" => TypeKind::Enum,
                k if k.ends_with("struct") => TypeKind::Struct,
                _ => TypeKind::Class,
            };
            let mut decl = TypeDecl::new(&caps[2], kind, number);
            decl.docstring = self.take_docstring();
            decl.decorators = std::mem::take(&mut self.attrs);
            self.property = None;
            self.pending = Some(Pending::Type(decl));
            return;
        }

        if self.current_type().is_some() {
            if paren_balance(code) > 0 {
                self.signature = Some((code.to_string(), number));
            } else {
                self.declare_member(number, code);
            }
            return;
        }

        self.forget();
    }

    /// Strips leading `[...]` groups, recording each attribute from the source text.
    fn collect_attributes<'a>(&mut self, mut code: &'a str, mut original: &'a str) -> (&'a str, &'a str) {
        while code.starts_with('[') {
            let Some((inner, _)) = split_at_close(&code[1..], ']') else {
                break;
            };
            let close = 1 + inner.len();
            for attr in split_top_level(&original[1..close], ',', true) {
                self.attrs.push(attr);
            }
            let rest = &code[close + 1..];
            let skipped = close + 1 + (rest.len() - rest.trim_start().len());
            code = &code[skipped..];
            original = &original[skipped..];
        }
        (code, original)
    }

    fn declare_member(&mut self, number: usize, text: &str) {
        if SKIP_RE.is_match(text) {
            self.forget();
            return;
        }
        let type_name = match self.current_type() {
            Some(decl) => decl.name.clone(),
            None => return,
        };

        let ctor = CTOR_RE.captures(text).filter(|caps| caps[1] == type_name);
        let (name, kind, params_at) = if let Some(caps) = ctor {
            (caps[1].to_string(), CallableKind::Method, caps.get(0).map(|m| m.end()))
        } else if let Some(caps) = METHOD_RE.captures(text) {
            (caps[1].to_string(), CallableKind::Method, caps.get(0).map(|m| m.end()))
        } else if let Some(caps) = PROPERTY_RE.captures(text) {
            let mut property = Callable::new(&caps[1], CallableKind::Property, number);
            property.docstring = self.take_docstring();
            property.decorators = std::mem::take(&mut self.attrs);
            if caps[2].is_empty() {
                self.property = Some(property);
            } else if let Some(decl) = self.current_type() {
                decl.callables.push(property);
            }
            return;
        } else if let Some(caps) = FIELD_RE.captures(text) {
            let mut field = Field::new(&caps[1], number);
            field.docstring = self.take_docstring();
            self.attrs.clear();
            self.property = None;
            if let Some(decl) = self.current_type() {
                decl.fields.push(field);
            }
            return;
        } else {
            self.forget();
            return;
        };

        let mut callable = Callable::new(name, kind, number);
        callable.docstring = self.take_docstring();
        callable.decorators = std::mem::take(&mut self.attrs);
        if let Some(at) = params_at {
            if let Some((params, _)) = split_at_close(&text[at..], ')') {
                callable.params = split_top_level(params, ',', true).len();
            }
        }
        if let Some(decl) = self.current_type() {
            decl.callables.push(callable);
        }
    }

    /// Prefixes a namespace name with the enclosing block namespaces.
    fn qualify(&self, name: &str) -> String {
        let outer: Vec<&str> = self
            .containers
            .iter()
            .filter_map(|c| match c {
                Container::Namespace { name, .. } => Some(name.as_str()),
                Container::Type { .. } => None,
            })
            .collect();
        match outer.last() {
            Some(parent) => format!("{}.{}", parent, name),
            None => name.to_string(),
        }
    }

    fn scan_braces(&mut self, number: usize, code: &str) -> Result<(), (usize, String)> {
        for c in code.chars() {
            match c {
                '{' => {
                    self.depth += 1;
                    if let Some(pending) = self.pending.take() {
                        let body_depth = self.depth;
                        self.containers.push(match pending {
                            Pending::Namespace(name) => Container::Namespace { body_depth, name },
                            Pending::Type(decl) => Container::Type { body_depth, decl },
                        });
                    }
                }
                '}' => {
                    self.depth -= 1;
                    if self.depth < 0 {
                        return Err((number, "unexpected '}'".to_string()));
                    }
                    while self
                        .containers
                        .last()
                        .map_or(false, |c| c.body_depth() > self.depth)
                    {
                        self.close_container();
                    }
                }
                // A declaration without a body, such as `record Point(int X, int Y);`.
                ';' if matches!(self.pending, Some(Pending::Type(_))) => {
                    if let Some(Pending::Type(decl)) = self.pending.take() {
                        self.attach_type(decl);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn close_container(&mut self) {
        if let Some(Container::Type { decl, .. }) = self.containers.pop() {
            self.attach_type(decl);
        }
    }

    fn attach_type(&mut self, decl: TypeDecl) {
        match self.current_type() {
            Some(parent) => parent.types.push(decl),
            None => self.module.types.push(decl),
        }
    }

    fn finish(mut self, last_line: usize) -> Result<Module, (usize, String)> {
        if self.depth > 0 {
            return Err((
                last_line,
                format!("unexpected end of file: {} unclosed '{{'", self.depth),
            ));
        }
        if let Some(Pending::Type(decl)) = self.pending.take() {
            self.attach_type(decl);
        }
        while !self.containers.is_empty() {
            self.close_container();
        }
        Ok(self.module)
    }
}

fn paren_balance(text: &str) -> i32 {
    text.chars().fold(0, |acc, c| match c {
        '(' => acc + 1,
        ')' => acc - 1,
        _ => acc,
    })
}
