//! String utility functions.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_ONLY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]+$").unwrap());

static LINE_INDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([ \t]*)[^ \t\n]").unwrap());

/// Remove the common leading whitespace shared by every non-blank line.
///
/// Only spaces and tabs count as indentation, and line endings
/// (including `\r\n`) are kept as they are. Relative indentation inside
/// the block is preserved. Lines made only of spaces and tabs do not
/// take part in the common prefix and come out empty. Single-line or
/// already-flush text is returned unchanged.
pub fn dedent(code: &str) -> String {
    let text = WHITESPACE_ONLY_LINE.replace_all(code, "");

    let mut margin: Option<&str> = None;
    for caps in LINE_INDENT.captures_iter(&text) {
        let indent = caps.get(1).map_or("", |m| m.as_str());
        margin = Some(match margin {
            None => indent,
            Some(current) => common_prefix(current, indent),
        });
    }

    match margin {
        Some(margin) if !margin.is_empty() => text
            .split_inclusive('\n')
            .map(|line| line.strip_prefix(margin).unwrap_or(line))
            .collect(),
        _ => text.into_owned(),
    }
}

/// Longest shared prefix of two runs of spaces and tabs.
fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}
