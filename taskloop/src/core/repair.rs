//! Deterministic clean-up of oracle text before it is decoded.
//!
//! Two heuristics run before any extra oracle call is spent:
//!
//! 1. [`strip_corruption`] cuts the JSON candidate out of surrounding prose or
//!    code fences, then removes tabs, line breaks and runs of four spaces.
//! 2. [`close_truncated`] finishes a document that was cut off mid-way by
//!    closing the open string and every open object/array.

use std::sync::LazyLock;

use regex::Regex;

static SPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {4}").expect("space run regex should be valid"));

/// Remove known corruption patterns from raw oracle output.
pub fn strip_corruption(raw: &str) -> String {
    let candidate = extract_candidate(raw);
    let flattened: String = candidate
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();
    SPACE_RUN_RE
        .replace_all(&flattened, "")
        .trim()
        .to_string()
}

/// Close a truncated document.
///
/// Returns `None` when the text already ends balanced (nothing to close) or
/// contains no opening delimiter at all.
pub fn close_truncated(text: &str) -> Option<String> {
    let scan = scan(text);
    if scan.open.is_empty() && scan.in_string.is_none() {
        return None;
    }

    let mut closed = text.to_string();
    if let Some(quote) = scan.in_string {
        if scan.escaped {
            closed.pop();
        }
        closed.push(quote);
    } else {
        let trimmed_len = closed.trim_end().len();
        closed.truncate(trimmed_len);
        if closed.ends_with(',') {
            closed.pop();
        } else if closed.ends_with(':') {
            closed.push_str("null");
        }
    }

    for delim in scan.open.iter().rev() {
        closed.push(match delim {
            '[' => ']',
            _ => '}',
        });
    }
    Some(closed)
}

/// Delimiter state at the end of a text.
#[derive(Debug, Default)]
struct Scan {
    /// Open `{`/`[` outside strings, innermost last.
    open: Vec<char>,
    /// Quote character of a string left open at the end of the text.
    in_string: Option<char>,
    /// The text ends on an unfinished escape inside a string.
    escaped: bool,
}

fn scan(text: &str) -> Scan {
    let mut state = Scan::default();
    for ch in text.chars() {
        if let Some(quote) = state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if ch == '\\' {
                state.escaped = true;
            } else if ch == quote {
                state.in_string = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => state.in_string = Some(ch),
            '{' | '[' => state.open.push(ch),
            '}' | ']' => {
                state.open.pop();
            }
            _ => {}
        }
    }
    state
}

/// Cut the JSON candidate out of the response.
///
/// Prefers a fenced block; otherwise starts at the first `{` and stops right
/// after its matching `}` (or keeps the tail when the object never closes).
fn extract_candidate(raw: &str) -> &str {
    let text = raw.trim();
    if let Some(start) = text.find("```") {
        let after_marker = &text[start + 3..];
        let body = after_marker.strip_prefix("json").unwrap_or(after_marker);
        let body = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        if body.contains('{') {
            return extract_object(body.trim());
        }
    }
    extract_object(text)
}

fn extract_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[start..start + i + 1];
                }
            }
            _ => {}
        }
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn decode(text: &str) -> Value {
        serde_json::from_str(text).expect("valid json")
    }

    #[test]
    fn strip_removes_tabs_newlines_and_space_runs() {
        let raw = "{\n\t\"current_tasks\": [\n        \"a\",\n        \"b\"\n    ]\n}";
        assert_eq!(strip_corruption(raw), r#"{"current_tasks": ["a","b"]}"#);
    }

    #[test]
    fn strip_extracts_object_from_prose_and_fences() {
        let raw = "Sure! Here is the plan:\n```json\n{\"current_tasks\": [\"a\"]}\n```\nGood luck.";
        assert_eq!(strip_corruption(raw), r#"{"current_tasks": ["a"]}"#);

        let raw = r#"Result: {"thoughts": "done {really}"} trailing words"#;
        assert_eq!(strip_corruption(raw), r#"{"thoughts": "done {really}"}"#);
    }

    #[test]
    fn strip_keeps_unclosed_tail() {
        let raw = r#"plan: {"current_tasks": ["a","b""#;
        assert_eq!(strip_corruption(raw), r#"{"current_tasks": ["a","b""#);
    }

    #[test]
    fn close_recovers_truncated_array_inside_object() {
        let closed = close_truncated(r#"{"current_tasks": ["a","b""#).expect("closed");
        assert_eq!(decode(&closed), json!({"current_tasks": ["a", "b"]}));
    }

    #[test]
    fn close_finishes_open_string_with_its_quote() {
        let closed = close_truncated(r#"{"thoughts": "still thinking"#).expect("closed");
        assert_eq!(decode(&closed), json!({"thoughts": "still thinking"}));
    }

    #[test]
    fn close_drops_dangling_comma_and_completes_dangling_colon() {
        let closed = close_truncated(r#"{"current_tasks": ["a"], "#).expect("closed");
        assert_eq!(decode(&closed), json!({"current_tasks": ["a"]}));

        let closed = close_truncated(r#"{"stored_info": {"k": "v"}, "final_result":"#)
            .expect("closed");
        assert_eq!(
            decode(&closed),
            json!({"stored_info": {"k": "v"}, "final_result": null})
        );
    }

    #[test]
    fn close_drops_unfinished_escape() {
        let closed = close_truncated(r#"{"thoughts": "quote \"#).expect("closed");
        assert_eq!(decode(&closed), json!({"thoughts": "quote "}));
    }

    #[test]
    fn close_ignores_delimiters_inside_strings() {
        let closed = close_truncated(r#"{"thoughts": "use [brackets] and {braces}", "a": [1"#)
            .expect("closed");
        assert_eq!(
            decode(&closed),
            json!({"thoughts": "use [brackets] and {braces}", "a": [1]})
        );
    }

    #[test]
    fn close_returns_none_for_balanced_text() {
        assert_eq!(close_truncated(r#"{"a": 1}"#), None);
        assert_eq!(close_truncated("no json here"), None);
    }
}
