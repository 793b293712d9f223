//! JSON Repair - Recovers a JSON object from raw LLM output
//!
//! Completions wrap JSON in markdown fences, surround it with prose, leave
//! trailing commas or comments behind, or get cut off mid-object. `extract`
//! tries progressively looser strategies and stops at the first one that
//! yields an object.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Number of characters of the offending fragment kept in a `ParseError`
const FRAGMENT_PREVIEW_CHARS: usize = 200;

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("code fence pattern");
}

/// Which strategy produced the object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionConfidence {
    /// The whole text was a JSON object
    Direct,
    /// Content of a fenced code block parsed as-is
    Fenced,
    /// First balanced `{...}` span parsed as-is
    Balanced,
    /// Balanced span parsed after comment/comma/control-char repair
    Repaired,
    /// Braces never balanced; span from the first `{` to the last `}`
    Unbalanced,
}

impl ExtractionConfidence {
    /// Unbalanced recoveries can silently drop structure from truncated
    /// output and should be re-validated by the consumer.
    pub fn is_lower_confidence(&self) -> bool {
        matches!(self, ExtractionConfidence::Unbalanced)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Always a JSON object
    pub value: Value,
    pub confidence: ExtractionConfidence,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Failed to parse JSON from LLM output ({reason}): {fragment}")]
pub struct ParseError {
    pub reason: String,
    /// First 200 characters of the fragment that failed to parse
    pub fragment: String,
}

impl ParseError {
    fn new(reason: &str, fragment: &str) -> Self {
        Self {
            reason: reason.to_string(),
            fragment: fragment.chars().take(FRAGMENT_PREVIEW_CHARS).collect(),
        }
    }
}

/// Extract the first JSON object from `text`.
pub fn extract(text: &str) -> Result<Extraction, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::new("empty input", ""));
    }

    if let Some(value) = parse_object(trimmed) {
        return Ok(Extraction {
            value,
            confidence: ExtractionConfidence::Direct,
        });
    }

    let mut source = trimmed;
    if let Some(inner) = fenced_block(trimmed) {
        if let Some(value) = parse_object(inner) {
            return Ok(Extraction {
                value,
                confidence: ExtractionConfidence::Fenced,
            });
        }
        source = inner;
    }

    match locate_object(source) {
        None => Err(ParseError::new("no JSON object found", source)),
        Some(ObjectSpan::Balanced(fragment)) => {
            if let Some(value) = parse_object(fragment) {
                return Ok(Extraction {
                    value,
                    confidence: ExtractionConfidence::Balanced,
                });
            }
            parse_object(&repair(fragment))
                .map(|value| Extraction {
                    value,
                    confidence: ExtractionConfidence::Repaired,
                })
                .ok_or_else(|| ParseError::new("unparsable after repair", fragment))
        }
        Some(ObjectSpan::Unbalanced { span, tail }) => parse_object(&repair(span))
            .or_else(|| parse_object(&close_truncated(tail)))
            .map(|value| Extraction {
                value,
                confidence: ExtractionConfidence::Unbalanced,
            })
            .ok_or_else(|| ParseError::new("unbalanced braces", span)),
    }
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|inner| !inner.is_empty())
}

enum ObjectSpan<'a> {
    Balanced(&'a str),
    /// `span` runs from the first `{` to the last `}` (or to the end when no
    /// `}` follows); `tail` is everything from the first `{` on.
    Unbalanced { span: &'a str, tail: &'a str },
}

/// Find the first `{` and scan to its matching `}`.
///
/// String literals and comments are skipped so braces inside them do not
/// count.
fn locate_object(text: &str) -> Option<ObjectSpan<'_>> {
    let start = text.find('{')?;
    let tail = &text[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = tail.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(ObjectSpan::Balanced(&tail[..=i]));
                }
            }
            '/' => match chars.peek() {
                Some((_, '/')) => {
                    for (_, next) in chars.by_ref() {
                        if next == '\n' {
                            break;
                        }
                    }
                }
                Some((_, '*')) => {
                    chars.next();
                    let mut prev = '\0';
                    for (_, next) in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            break;
                        }
                        prev = next;
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    let span = match tail.rfind('}') {
        Some(end) => &tail[..=end],
        None => tail,
    };
    Some(ObjectSpan::Unbalanced { span, tail })
}

fn repair(fragment: &str) -> String {
    strip_trailing_commas(&strip_comments(&drop_non_printable(fragment)))
}

fn drop_non_printable(text: &str) -> String {
    text.chars().filter(|c| !is_non_printable(*c)).collect()
}

fn is_non_printable(c: char) -> bool {
    (c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        || matches!(c, '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}')
}

/// Close whatever a truncated completion left open: an unterminated string,
/// a dangling `,` or `:`, and every unclosed `[` / `{`.
fn close_truncated(tail: &str) -> String {
    let text = strip_comments(&drop_non_printable(tail));

    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.last() == Some(&c) {
                    open.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = text;
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    loop {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if out.ends_with(',') {
            out.pop();
        } else if out.ends_with(':') {
            out.push_str(" null");
        } else {
            break;
        }
    }
    while let Some(closer) = open.pop() {
        out.push(closer);
    }

    strip_trailing_commas(&out)
}

fn strip_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match (c, chars.get(i + 1)) {
            ('"', _) => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_object() {
        let extraction = extract(r#"  {"chart_type": "bar"}  "#).unwrap();
        assert_eq!(extraction.value, json!({"chart_type": "bar"}));
        assert_eq!(extraction.confidence, ExtractionConfidence::Direct);
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here is the chart:\n```json\n{\"chart_type\": \"line\", \"x_axis\": \"month\"}\n```\nLet me know!";
        let extraction = extract(text).unwrap();
        assert_eq!(extraction.value, json!({"chart_type": "line", "x_axis": "month"}));
        assert_eq!(extraction.confidence, ExtractionConfidence::Fenced);
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let text = r#"Sure! Based on the data {"insights": ["Sales grew"], "nested": {"a": [1, 2]}} hope this helps"#;
        let extraction = extract(text).unwrap();
        assert_eq!(
            extraction.value,
            json!({"insights": ["Sales grew"], "nested": {"a": [1, 2]}})
        );
        assert_eq!(extraction.confidence, ExtractionConfidence::Balanced);
    }

    #[test]
    fn test_trailing_commas_and_comments() {
        let text = r#"{
            "chart_type": "bar", // picked for categories
            /* axes */
            "series": [1, 2, 3,],
            "url": "http://example.com/a//b",
        }"#;
        let extraction = extract(text).unwrap();
        assert_eq!(
            extraction.value,
            json!({"chart_type": "bar", "series": [1, 2, 3], "url": "http://example.com/a//b"})
        );
        assert_eq!(extraction.confidence, ExtractionConfidence::Repaired);
    }

    #[test]
    fn test_non_printable_characters_dropped() {
        let text = "\u{feff}{\"title\": \"Revenue\",\u{0007} \"value\": 10}";
        let extraction = extract(text).unwrap();
        assert_eq!(extraction.value, json!({"title": "Revenue", "value": 10}));
    }

    #[test]
    fn test_braces_inside_strings_do_not_count() {
        let text = r#"Result: {"description": "use {braces} carefully", "n": 1} and {"other": 2}"#;
        let extraction = extract(text).unwrap();
        assert_eq!(
            extraction.value,
            json!({"description": "use {braces} carefully", "n": 1})
        );
    }

    #[test]
    fn test_only_first_balanced_object_is_used() {
        let text = r#"first {"a": 1} second {"b": 2}"#;
        assert_eq!(extract(text).unwrap().value, json!({"a": 1}));
    }

    #[test]
    fn test_truncated_output_is_closed_with_lower_confidence() {
        let text = r#"Here you go: {"chart_config": {"chart_type": "bar"}, "insights": ["Sales grew", "Costs fell"#;
        let extraction = extract(text).unwrap();
        assert_eq!(
            extraction.value,
            json!({"chart_config": {"chart_type": "bar"}, "insights": ["Sales grew", "Costs fell"]})
        );
        assert_eq!(extraction.confidence, ExtractionConfidence::Unbalanced);
        assert!(extraction.confidence.is_lower_confidence());
    }

    #[test]
    fn test_truncated_after_comma_and_colon() {
        let extraction = extract(r#"{"a": [1, 2,"#).unwrap();
        assert_eq!(extraction.value, json!({"a": [1, 2]}));

        let extraction = extract(r#"{"a": 1, "summary":"#).unwrap();
        assert_eq!(extraction.value, json!({"a": 1, "summary": null}));
    }

    #[test]
    fn test_truncated_inside_key_is_parse_error() {
        let err = extract(r#"{"chart_type": "bar", "tit"#).unwrap_err();
        assert_eq!(err.reason, "unbalanced braces");
        assert!(err.fragment.starts_with("{\"chart_type\""));
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        assert!(extract("").is_err());
        assert!(extract("   \n\t ").is_err());
    }

    #[test]
    fn test_parse_error_fragment_is_truncated() {
        let text = format!("{{ \"broken\": {} ", "x".repeat(500));
        let err = extract(&format!("{}}}", text)).unwrap_err();
        assert!(err.fragment.chars().count() <= 200);
    }

    #[test]
    fn test_no_object_is_parse_error() {
        let err = extract("I could not produce a chart for this data.").unwrap_err();
        assert_eq!(err.reason, "no JSON object found");
    }
}
