//! Normalization of raw documentation blocks into the text stored on entities.

use regex::Regex;

lazy_static::lazy_static! {
    static ref STRING_PREFIX: Regex = Regex::new(r"^[rRuUbBfF]{0,2}").unwrap();
    static ref XML_SUMMARY: Regex = Regex::new(r"(?s)<summary>(.*?)</summary>").unwrap();
    static ref XML_PARAM: Regex =
        Regex::new(r#"(?s)<param\s+name\s*=\s*"([^"]*)"\s*>(.*?)</param>"#).unwrap();
    static ref XML_RETURNS: Regex = Regex::new(r"(?s)<returns>(.*?)</returns>").unwrap();
    static ref XML_EXCEPTION: Regex =
        Regex::new(r#"(?s)<exception\s+cref\s*=\s*"([^"]*)"\s*>(.*?)</exception>"#).unwrap();
    static ref XML_SEE: Regex =
        Regex::new(r#"<(?:see|seealso)\s+(?:cref|langword)\s*=\s*"(?:[A-Z]:)?([^"]*)"\s*/>"#).unwrap();
    static ref XML_PARAMREF: Regex =
        Regex::new(r#"<(?:paramref|typeparamref)\s+name\s*=\s*"([^"]*)"\s*/>"#).unwrap();
    static ref XML_TAG: Regex = Regex::new(r"</?[A-Za-z][^>]*>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// If `text` is exactly one Python string literal, returns its body.
///
/// Handles the `r`/`u`/`b`/`f` prefixes and both quote styles, triple-quoted or not.
/// Escape sequences are left as written.
pub fn python_string_literal(text: &str) -> Option<String> {
    let text = text.trim();
    let prefix_len = STRING_PREFIX.find(text).map_or(0, |m| m.end());
    let rest = &text[prefix_len..];

    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(body) = rest.strip_prefix(quote) {
            let end = find_closing(body, quote)?;
            // Anything after the closing quote means this is an expression, not a literal.
            if !body[end + quote.len()..].trim().is_empty() {
                return None;
            }
            return Some(body[..end].to_string());
        }
    }
    None
}

fn find_closing(body: &str, quote: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(quote.as_bytes()) {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Python's `inspect.cleandoc`: trims blank edges, strips the first line and removes
/// the common indentation of the remaining lines.
pub fn clean_python(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    // Margins are counted in characters: indentation may be any Unicode whitespace.
    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_width(l))
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    out.push(lines[0].trim().to_string());
    for line in &lines[1..] {
        let skip = margin.min(indent_width(line));
        let cut = line.char_indices().nth(skip).map_or(line.len(), |(i, _)| i);
        out.push(line[cut..].trim_end().to_string());
    }

    while out.first().map_or(false, |l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().map_or(false, |l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Section headers of Google and NumPy style docstrings, with the label they are
/// rendered under.
const PYTHON_SECTIONS: &[(&str, &str)] = &[
    ("Args:", "*Args:*"),
    ("Arguments:", "*Args:*"),
    ("Parameters:", "*Args:*"),
    ("Returns:", "*Returns:*"),
    ("Return:", "*Returns:*"),
    ("Raises:", "*Raises:*"),
    ("Raise:", "*Raises:*"),
    ("Exceptions:", "*Raises:*"),
    ("Exception:", "*Raises:*"),
];

/// The docstring stored on Python entities: [`clean_python`] followed by section
/// formatting.
///
/// `Args:`, `Returns:` and `Raises:` blocks (and their aliases) become `*Args:*`,
/// `*Returns:*` and `*Raises:*` lists of `- name: description` bullets, the same
/// shape [`clean_csharp`] gives XML docs. A description continued on deeper
/// indented lines is joined into one bullet.
pub fn normalize_python(raw: &str) -> String {
    let cleaned = clean_python(raw);
    let lines: Vec<&str> = cleaned.lines().collect();

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut idx = 0;
    while idx < lines.len() {
        let header = lines[idx].trim();
        match PYTHON_SECTIONS.iter().find(|(name, _)| *name == header) {
            Some((_, label)) => {
                out.push(label.to_string());
                idx = section_items(&lines, idx + 1, &mut out);
                out.push(String::new());
            }
            None => {
                out.push(lines[idx].to_string());
                idx += 1;
            }
        }
    }

    while out.last().map_or(false, |l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Reads the indented block of a section starting at `start`. Returns the index of
/// the first line after it.
fn section_items(lines: &[&str], start: usize, out: &mut Vec<String>) -> usize {
    let mut idx = start;
    while idx < lines.len() {
        let line = lines[idx];
        if line.trim().is_empty() {
            idx += 1;
            continue;
        }
        let indent = indent_width(line);
        if indent == 0 {
            break;
        }

        let item = line.trim();
        idx += 1;
        let mut continued: Vec<&str> = Vec::new();
        while idx < lines.len() {
            let next = lines[idx];
            if next.trim().is_empty() {
                idx += 1;
                continue;
            }
            if indent_width(next) <= indent {
                break;
            }
            continued.push(next.trim());
            idx += 1;
        }

        let bullet = match item.split_once(':') {
            Some((name, desc)) => {
                let mut desc = desc.trim().to_string();
                for extra in continued {
                    if !desc.is_empty() {
                        desc.push(' ');
                    }
                    desc.push_str(extra);
                }
                format!("- {}: {}", name.trim(), desc)
            }
            None => {
                let mut text = item.to_string();
                for extra in continued {
                    text.push(' ');
                    text.push_str(extra);
                }
                format!("- {}", text)
            }
        };
        out.push(bullet.trim_end().to_string());
    }
    idx
}

/// Turns the body of a `///` block into readable text.
///
/// Blocks using the standard XML tags become a summary paragraph followed by
/// `*Params:*`, `*Returns:*` and `*Exceptions:*` lists. Anything else is returned as is.
pub fn clean_csharp(lines: &[String]) -> String {
    let raw = lines.join("\n");
    let recognized = ["<summary", "<param", "<returns", "<exception"];
    if !recognized.iter().any(|tag| raw.contains(tag)) {
        return raw.trim().to_string();
    }

    let mut parts: Vec<String> = Vec::new();

    if let Some(caps) = XML_SUMMARY.captures(&raw) {
        let summary = xml_text(&caps[1]);
        if !summary.is_empty() {
            parts.push(summary);
            parts.push(String::new());
        }
    }

    let params: Vec<_> = XML_PARAM.captures_iter(&raw).collect();
    if !params.is_empty() {
        parts.push("*Params:*".to_string());
        for caps in params {
            parts.push(format!("- {}: {}", caps[1].trim(), xml_text(&caps[2])));
        }
        parts.push(String::new());
    }

    if let Some(caps) = XML_RETURNS.captures(&raw) {
        let returns = xml_text(&caps[1]);
        if !returns.is_empty() {
            parts.push("*Returns:*".to_string());
            parts.push(format!("- {}", returns));
            parts.push(String::new());
        }
    }

    let exceptions: Vec<_> = XML_EXCEPTION.captures_iter(&raw).collect();
    if !exceptions.is_empty() {
        parts.push("*Exceptions:*".to_string());
        for caps in exceptions {
            let cref = caps[1].trim();
            let cref = cref.strip_prefix("T:").unwrap_or(cref);
            parts.push(format!("- {}: {}", cref, xml_text(&caps[2])));
        }
        parts.push(String::new());
    }

    while parts.last().map_or(false, |p| p.is_empty()) {
        parts.pop();
    }
    parts.join("\n")
}

// Inline references keep their target name; any other markup is dropped.
fn xml_text(fragment: &str) -> String {
    let text = XML_SEE.replace_all(fragment, "$1");
    let text = XML_PARAMREF.replace_all(&text, "$1");
    let text = XML_TAG.replace_all(&text, " ");
    WHITESPACE.replace_all(text.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_literal_forms() {
        assert_eq!(python_string_literal(r#""""Doc.""""#), Some("Doc.".to_string()));
        assert_eq!(python_string_literal("r'raw'"), Some("raw".to_string()));
        assert_eq!(python_string_literal(r#""""""#), Some(String::new()));
        assert_eq!(python_string_literal(r#""a" + b"#), None);
        assert_eq!(python_string_literal("x = 'a'"), None);
        assert_eq!(python_string_literal(r#""esc \" quote""#), Some(r#"esc \" quote"#.to_string()));
    }

    #[test]
    fn test_clean_python_dedents() {
        let raw = "Summary line.\n\n        Args:\n            x: value\n        ";
        assert_eq!(clean_python(raw), "Summary line.\n\nArgs:\n    x: value");
    }

    #[test]
    fn test_clean_python_unicode_indentation() {
        assert_eq!(clean_python(" x\n\u{a0}y\n\u{3000}\u{3000}z"), "x\ny\n\u{3000}z");
    }

    #[test]
    fn test_normalize_python_sections() {
        let raw = "Fetch rows.

        Args:
            session (Session): Open session.
            query: SQL text,
                possibly long.

        Returns:
            list: The rows.

        Raises:
            TimeoutError
        ";
        assert_eq!(
            normalize_python(raw),
            "Fetch rows.\n\n*Args:*\n- session (Session): Open session.\n- query: SQL text, possibly long.\n\n*Returns:*\n- list: The rows.\n\n*Raises:*\n- TimeoutError"
        );
    }

    #[test]
    fn test_normalize_python_without_sections() {
        assert_eq!(normalize_python("Just text.\n\n    indented"), "Just text.\n\nindented");
        assert_eq!(normalize_python(""), "");
    }

    #[test]
    fn test_clean_csharp_sections() {
        let lines: Vec<String> = [
            "<summary>Adds <paramref name=\"a\"/> to a <see cref=\"T:System.Int32\"/>.</summary>",
            "<param name=\"a\">First operand.</param>",
            "<returns>The sum.</returns>",
            "<exception cref=\"T:OverflowException\">On overflow.</exception>",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let text = clean_csharp(&lines);
        assert_eq!(
            text,
            "Adds a to a System.Int32.\n\n*Params:*\n- a: First operand.\n\n*Returns:*\n- The sum.\n\n*Exceptions:*\n- OverflowException: On overflow."
        );
    }

    #[test]
    fn test_clean_csharp_plain_text() {
        let lines = vec!["Just a note.".to_string()];
        assert_eq!(clean_csharp(&lines), "Just a note.");
    }
}
