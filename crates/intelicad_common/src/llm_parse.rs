//! Tolerant extraction of a JSON object from free-form model output.
//!
//! Replies routinely wrap the payload in reasoning blocks, markdown fences,
//! prose, comments or trailing commas. [`extract_structured`] peels those
//! layers off in a fixed order and either returns the parsed value or a
//! [`ParseDiagnostic`] describing where it gave up. It never panics.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How much of the raw reply is kept in a diagnostic.
pub const RAW_EXCERPT_CHARS: usize = 1500;

const REASONING_TAGS: &[&str] = &["think", "thinking", "reasoning"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailure {
    NoJsonFound,
    IncompleteJson,
    InvalidJson,
    Transport,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseFailure::NoJsonFound => "no_json_found",
            ParseFailure::IncompleteJson => "incomplete_json",
            ParseFailure::InvalidJson => "invalid_json",
            ParseFailure::Transport => "transport",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub kind: ParseFailure,
    pub error: String,
    pub raw_excerpt: String,
}

impl ParseDiagnostic {
    pub fn new(kind: ParseFailure, error: impl Into<String>, raw: &str) -> Self {
        Self {
            kind,
            error: error.into(),
            raw_excerpt: raw.chars().take(RAW_EXCERPT_CHARS).collect(),
        }
    }

    /// Audit payload stored in place of a plan that could not be read.
    pub fn to_audit_value(&self) -> Value {
        json!({
            "operations": [],
            "parse_error": format!("{}: {}", self.kind, self.error),
            "raw_response": self.raw_excerpt,
        })
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Value),
    Degraded(ParseDiagnostic),
}

impl ParseOutcome {
    pub fn transport(error: impl fmt::Display) -> Self {
        ParseOutcome::Degraded(ParseDiagnostic::new(
            ParseFailure::Transport,
            error.to_string(),
            "",
        ))
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseOutcome::Parsed(_))
    }

    pub fn diagnostic(&self) -> Option<&ParseDiagnostic> {
        match self {
            ParseOutcome::Degraded(d) => Some(d),
            ParseOutcome::Parsed(_) => None,
        }
    }

    /// The parsed value, or the audit payload for a degraded reply.
    pub fn into_value(self) -> Value {
        match self {
            ParseOutcome::Parsed(value) => value,
            ParseOutcome::Degraded(diagnostic) => diagnostic.to_audit_value(),
        }
    }
}

/// Extract the first JSON object from a model reply.
pub fn extract_structured(raw: &str) -> ParseOutcome {
    let cleaned = strip_reasoning_blocks(raw);
    let body = first_fenced_block(&cleaned).unwrap_or(&cleaned);

    let candidate = match balanced_object(body) {
        Ok(candidate) => candidate,
        Err(kind) => {
            let error = match kind {
                ParseFailure::NoJsonFound => "no '{' in response",
                _ => "unbalanced braces",
            };
            return ParseOutcome::Degraded(ParseDiagnostic::new(kind, error, raw));
        }
    };

    let sanitized = strip_comments_and_trailing_commas(candidate);
    match serde_json::from_str::<Value>(&sanitized) {
        Ok(value) => ParseOutcome::Parsed(value),
        Err(strict) => match serde_json::from_str::<Value>(&quote_bare_keys(&sanitized)) {
            Ok(value) => ParseOutcome::Parsed(value),
            Err(_) => ParseOutcome::Degraded(ParseDiagnostic::new(
                ParseFailure::InvalidJson,
                strict.to_string(),
                raw,
            )),
        },
    }
}

/// Remove `<think>`-style blocks. An unclosed block runs to the end.
pub fn strip_reasoning_blocks(text: &str) -> String {
    let mut out = text.to_string();
    for tag in REASONING_TAGS {
        let open = format!("<{}>", tag);
        let close = format!("</{}>", tag);
        loop {
            // ASCII lowercasing keeps byte offsets aligned with `out`.
            let lower = out.to_ascii_lowercase();
            let Some(start) = lower.find(&open) else {
                break;
            };
            match lower[start..].find(&close) {
                Some(rel) => out.replace_range(start..start + rel + close.len(), ""),
                None => out.truncate(start),
            }
        }
    }
    out
}

/// Content of the first ``` fence, language tag dropped.
fn first_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let tag_len = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
        .unwrap_or(after.len());
    let rest = &after[tag_len..];
    // Inline fences keep their body on the opening line.
    let body = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().is_empty() => &rest[nl + 1..],
        _ => rest,
    };
    Some(match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    })
}

/// Slice from the first `{` to its matching `}`, skipping string literals.
fn balanced_object(text: &str) -> Result<&str, ParseFailure> {
    let start = text.find('{').ok_or(ParseFailure::NoJsonFound)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    Err(ParseFailure::IncompleteJson)
}

fn strip_comments_and_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
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
            ('}', _) | (']', _) => {
                let trimmed_len = out.iter().rposition(|ch| !ch.is_whitespace()).map(|p| p + 1);
                if let Some(len) = trimmed_len {
                    if out[len - 1] == ',' {
                        out.remove(len - 1);
                    }
                }
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.into_iter().collect()
}

fn quote_bare_keys(text: &str) -> String {
    static BARE_KEY: OnceLock<Option<Regex>> = OnceLock::new();
    let re = BARE_KEY.get_or_init(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").ok());
    match re {
        Some(re) => re.replace_all(text, r#"$1"$2":"#).into_owned(),
        None => text.to_string(),
    }
}
