//! JSON recovery helpers for model output.
//!
//! Local models wrap JSON in prose and code fences, emit JavaScript-flavoured
//! JSON (comments, single quotes, bare keys, trailing commas), and get cut off
//! mid-structure when they hit `max_tokens`. These helpers locate candidate
//! JSON and repair it. Every function is total: bad input yields `None` or
//! the input unchanged, never a panic.

use serde_json::Value;

/// Upper bound on cut-back attempts while repairing truncated JSON.
const MAX_TRUNCATION_ATTEMPTS: usize = 256;

// ─── Locating JSON ──────────────────────────────────────────────────────────

/// Contents of ``` fenced blocks, in order. A language tag on the opening
/// fence (`json`, `JSON`, `jsonc`) is skipped. An unclosed final fence yields
/// everything after it.
pub fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the info string up to the end of the line
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
        let info = after_fence[..body_start].trim();
        let body = if info.starts_with('{') || info.starts_with('[') {
            after_fence
        } else {
            &after_fence[body_start..]
        };

        match body.find("```") {
            Some(close) => {
                blocks.push(body[..close].trim());
                rest = &body[close + 3..];
            }
            None => {
                blocks.push(body.trim());
                break;
            }
        }
    }

    blocks.retain(|b| !b.is_empty());
    blocks
}

/// Top-level `open`…`close` spans in `text`, in order of appearance.
///
/// Delimiters inside quoted strings are ignored, so a value like
/// `"note": "use {tempo}"` does not end the span early.
pub fn balanced_spans(text: &str, open: char, close: char) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut search_from = 0;

    while let Some(rel) = text[search_from..].find(open) {
        let start = search_from + rel;
        match find_matching_delimiter(text, start, open, close) {
            Some(end) => {
                spans.push(&text[start..=end]);
                search_from = end + close.len_utf8();
            }
            None => break,
        }
    }
    spans
}

/// Find the byte index of the delimiter closing the one at `start`.
fn find_matching_delimiter(text: &str, start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut string_char: Option<char> = None;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if let Some(quote) = string_char {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                string_char = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => string_char = Some(ch),
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

// ─── Normalization ──────────────────────────────────────────────────────────

/// Rewrite JavaScript-flavoured JSON into strict JSON.
///
/// Applied in order: strip comments, single → double quotes, quote bare
/// keys, drop trailing commas, collapse doubled opening quotes, drop control
/// characters. Valid JSON passes through unchanged.
pub fn normalize_json(input: &str) -> String {
    let s = strip_comments(input);
    let s = convert_single_quotes(&s);
    let s = quote_bare_keys(&s);
    let s = remove_trailing_commas(&s);
    let s = collapse_double_quotes(&s);
    strip_control_characters(&s)
}

/// Remove `// …` and `/* … */` comments outside string literals.
fn strip_comments(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if ch == '"' {
            in_string = true;
            out.push(ch);
            i += 1;
        } else if ch == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if ch == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
        } else {
            out.push(ch);
            i += 1;
        }
    }
    out
}

/// Turn `'single quoted'` strings into `"double quoted"` ones. Apostrophes
/// inside double-quoted strings are left alone; double quotes inside a
/// single-quoted string are escaped.
fn convert_single_quotes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut string_char: Option<char> = None;
    let mut escaped = false;

    for ch in input.chars() {
        match string_char {
            Some(quote) => {
                if escaped {
                    escaped = false;
                    out.push(ch);
                } else if ch == '\\' {
                    escaped = true;
                    out.push(ch);
                } else if ch == quote {
                    string_char = None;
                    out.push('"');
                } else if quote == '\'' && ch == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(ch);
                }
            }
            None => {
                if ch == '"' || ch == '\'' {
                    string_char = Some(ch);
                    out.push('"');
                } else {
                    out.push(ch);
                }
            }
        }
    }
    out
}

/// Quote identifiers used as object keys: `{name: "x"}` → `{"name": "x"}`.
fn quote_bare_keys(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if ch == '"' {
            in_string = true;
            out.push(ch);
            i += 1;
            continue;
        }

        let after_separator = matches!(out.trim_end().chars().last(), Some('{') | Some(','));
        if (ch.is_ascii_alphabetic() || ch == '_') && after_separator {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if chars.get(j) == Some(&':') {
                out.push('"');
                out.push_str(&ident);
                out.push('"');
            } else {
                out.push_str(&ident);
            }
            continue;
        }

        out.push(ch);
        i += 1;
    }
    out
}

/// Remove commas that directly precede `}` or `]` (ignoring whitespace),
/// outside string literals.
fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Collapse `:""value` into `:"value"`. An empty string (`:""` followed by
/// `,`, `}` or whitespace) is kept.
fn collapse_double_quotes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if i + 3 < bytes.len()
            && bytes[i] == b':'
            && bytes[i + 1] == b'"'
            && bytes[i + 2] == b'"'
            && !matches!(bytes[i + 3], b',' | b'}' | b']' | b' ' | b'\n' | b'\r' | b'\t')
        {
            out.extend_from_slice(b":\"");
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

/// Drop control characters other than `\n`, `\r` and `\t`.
fn strip_control_characters(input: &str) -> String {
    input
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\r' || c == '\t')
        .collect()
}

// ─── Truncation Repair ──────────────────────────────────────────────────────

/// Close a JSON document that was cut off mid-structure.
///
/// Closes an unterminated string, drops a dangling `,`, fills a dangling `:`
/// with `null`, then appends closers for every bracket still open. Brackets
/// inside string literals are not counted.
pub fn close_truncated_json(input: &str) -> String {
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in input.chars() {
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
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.last() == Some(&ch) {
                    closers.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = input.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str(" null");
    }

    out.extend(closers.iter().rev());
    out
}

/// Repair truncated JSON into a parseable value.
///
/// Tries [`close_truncated_json`] first; if the result still does not parse
/// (a half-written key or literal), cuts back to the previous structural
/// boundary and tries again. Any input starting with `{` or `[` eventually
/// reduces to an empty container, so this succeeds for every such prefix.
pub fn repair_truncated_json(input: &str) -> Option<Value> {
    let mut candidate = input.trim_end();

    for _ in 0..MAX_TRUNCATION_ATTEMPTS {
        let closed = close_truncated_json(candidate);
        if let Ok(value) = serde_json::from_str::<Value>(&closed) {
            return Some(value);
        }
        let cut = previous_boundary(candidate)?;
        candidate = candidate[..cut].trim_end();
    }
    None
}

/// Byte length of the longest strictly shorter prefix ending at a structural
/// boundary: just before a `,`, or just after a `{` / `[`. Only positions
/// outside string literals count.
fn previous_boundary(input: &str) -> Option<usize> {
    let mut cuts: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
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
            ',' => cuts.push(i),
            '{' | '[' => cuts.push(i + 1),
            _ => {}
        }
    }

    let current = input.trim_end().len();
    cuts.into_iter().rev().find(|&cut| cut < current)
}

// ─── Sequential Repair ──────────────────────────────────────────────────────

/// Parse JSON, applying progressively heavier repairs until one parses.
///
/// Used for tool-call arguments where the whole string is meant to be a
/// single JSON value.
pub fn repair_malformed_json(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Some(v);
    }

    let normalized = normalize_json(raw);
    if let Ok(v) = serde_json::from_str::<Value>(&normalized) {
        return Some(v);
    }

    let trimmed = normalized.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return repair_truncated_json(trimmed);
    }
    None
}

// ─── Tests ──────────────────────────────────────────────────────────────────
