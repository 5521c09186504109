use rustpython_ast::TextSize;

/// A utility struct to convert byte offsets to line numbers.
///
/// The Python tokenizer reports error locations as byte offsets and the C# matcher
/// works on byte offsets into the masked source; both report 1-indexed lines.
pub struct LineIndex {
    /// Stores the byte index of the start of each line.
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Creates a new `LineIndex` by scanning the source code for newlines.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Converts a `TextSize` (byte offset) to a 1-indexed line number.
    pub fn line_index(&self, offset: TextSize) -> usize {
        self.line_of(offset.to_usize())
    }

    /// Converts a plain byte offset to a 1-indexed line number.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(line) => line,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Counts lines that are neither blank nor a whole-line comment.
pub fn count_sloc(source: &str, comment_prefixes: &[&str]) -> usize {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !comment_prefixes.iter().any(|p| line.starts_with(p)))
        .count()
}

/// Splits `text` on `sep` where no bracket is open.
///
/// Angle brackets only nest when `angles` is set (C# generics); in Python they are
/// comparison operators inside default values.
pub fn split_top_level(text: &str, sep: char, angles: bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            '<' if angles => {
                depth += 1;
                current.push(ch);
            }
            '>' if angles => {
                depth -= 1;
                current.push(ch);
            }
            c if c == sep && depth <= 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts.retain(|p| !p.is_empty());
    parts
}

/// Splits `text` after the bracket that closes an already-open one.
pub fn split_at_close(text: &str, close: char) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth > 0 => depth -= 1,
            c if c == close && depth == 0 => return Some((&text[..i], &text[i + c.len_utf8()..])),
            _ => {}
        }
    }
    None
}

/// Breaks an identifier into lowercase word tokens on `_` and case changes.
///
/// `parseHTTPResponse` gives `parse`, `http`, `response`; `__do_it__` gives `do`, `it`.
pub fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for chunk in name.split(|c: char| c == '_' || c.is_ascii_digit()) {
        if chunk.is_empty() {
            continue;
        }
        let chars: Vec<char> = chunk.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0
                && c.is_uppercase()
                && (chars[i - 1].is_lowercase()
                    || chars.get(i + 1).map_or(false, |n| n.is_lowercase())
                        && chars[i - 1].is_uppercase());
            if boundary && !current.is_empty() {
                tokens.push(current.to_lowercase());
                current.clear();
            }
            current.push(c);
        }
        if !current.is_empty() {
            tokens.push(current.to_lowercase());
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("a\nbc\n\nd");
        assert_eq!(index.line_of(0), 1);
        assert_eq!(index.line_of(2), 2);
        assert_eq!(index.line_of(3), 2);
        assert_eq!(index.line_of(5), 3);
        assert_eq!(index.line_of(6), 4);
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn test_count_sloc() {
        let source = "# header\n\nimport os\n  # note\nx = 1\n";
        assert_eq!(count_sloc(source, &["#"]), 2);
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("a, b=(1, 2), c: Dict[str, int]", ',', false),
            vec!["a", "b=(1, 2)", "c: Dict[str, int]"]
        );
        assert_eq!(
            split_top_level("Dictionary<string, int> map, int n", ',', true),
            vec!["Dictionary<string, int> map", "int n"]
        );
        assert_eq!(split_top_level("x=',', y", ',', false), vec!["x=','", "y"]);
        assert!(split_top_level("  ", ',', false).is_empty());
    }

    #[test]
    fn test_split_at_close() {
        assert_eq!(split_at_close("a, (b)) -> x", ')'), Some(("a, (b)", " -> x")));
        assert_eq!(split_at_close("s=')') rest", ')'), Some(("s=')'", " rest")));
        assert_eq!(split_at_close("never closed", ')'), None);
    }

    #[test]
    fn test_name_tokens() {
        assert_eq!(name_tokens("load_config"), vec!["load", "config"]);
        assert_eq!(name_tokens("parseHTTPResponse"), vec!["parse", "http", "response"]);
        assert_eq!(name_tokens("__do_it__"), vec!["do", "it"]);
        assert_eq!(name_tokens("GetValue2"), vec!["get", "value"]);
        assert!(name_tokens("_").is_empty());
    }
}
