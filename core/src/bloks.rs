//! Best-effort scraping of bloks action payloads.
//!
//! Bloks replies embed small action programs as strings, often inside JSON
//! strings inside JSON, e.g.
//!
//! ```text
//! (bk.action.core.TakeLast, ..., "server_params", (bk.action.map.Make,
//!     (bk.action.array.Make, "reg_info", "flow_info"),
//!     (bk.action.array.Make, "{...}", "{...}")))
//! ```
//!
//! There is no schema for these programs and their shape changes with server
//! releases, so the interpreter only promises two narrow operations: find the
//! expressions that follow a marker, and decode a key/value map found after an
//! anchor. Callers must treat an empty result as "not found", not as an error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Contract the flow coordinator relies on.
pub trait BloksInterpreter: Send + Sync {
    /// Raw fragments: for each occurrence of `marker`, the marker followed by
    /// the next balanced expression.
    fn parse(&self, body: &str, marker: &str) -> Vec<String>;

    /// Key/value map found after `anchor` inside `fragment`; empty when none
    /// can be decoded.
    fn extract_map(&self, fragment: &str, anchor: &str) -> Map<String, Value>;
}

static LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)"|(-?\d+(?:\.\d+)?)|\b(true|false|null)\b"#)
        .unwrap_or_else(|e| panic!("bloks literal pattern is invalid: {e}"))
});

const MAP_MAKE: &str = "bk.action.map.Make";
const ARRAY_MAKE: &str = "bk.action.array.Make";
const MAX_LAYERS: usize = 4;

/// Regex and bracket-matching implementation of [`BloksInterpreter`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BloksScraper;

impl BloksInterpreter for BloksScraper {
    fn parse(&self, body: &str, marker: &str) -> Vec<String> {
        candidate_texts(body)
            .iter()
            .map(|text| fragments_in(text, marker))
            .find(|fragments| !fragments.is_empty())
            .unwrap_or_default()
    }

    fn extract_map(&self, fragment: &str, anchor: &str) -> Map<String, Value> {
        candidate_texts(fragment)
            .iter()
            .find_map(|text| {
                let pos = text.find(anchor)?;
                let rest = &text[pos + anchor.len()..];
                decode_map_make(rest)
                    .or_else(|| decode_json_object(rest))
                    .filter(|map| !map.is_empty())
            })
            .unwrap_or_default()
    }
}

fn fragments_in(text: &str, marker: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find(marker) {
        let start = from + offset;
        let after = start + marker.len();
        if let Some(end) = balanced_after(text, after) {
            fragments.push(text[start..end].to_string());
        }
        from = after;
    }
    fragments
}

/// Texts to search, most decoded first: the string leaves of any JSON
/// layers, then those leaves with one escape layer peeled, then the input.
fn candidate_texts(text: &str) -> Vec<String> {
    let mut leaves = Vec::new();
    collect_leaves(text, 0, &mut leaves);
    let peeled: Vec<String> = leaves
        .iter()
        .filter(|leaf| leaf.contains("\\\""))
        .map(|leaf| unescape_once(leaf))
        .collect();
    let mut candidates = leaves;
    candidates.extend(peeled);
    if !candidates.iter().any(|c| c == text) {
        candidates.push(text.to_string());
    }
    candidates
}

fn collect_leaves(text: &str, depth: usize, out: &mut Vec<String>) {
    let trimmed = text.trim_start();
    if depth < MAX_LAYERS && (trimmed.starts_with('{') || trimmed.starts_with('[')) {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            let mut strings = Vec::new();
            string_leaves(&value, &mut strings);
            for leaf in strings {
                collect_leaves(leaf, depth + 1, out);
            }
            return;
        }
    }
    out.push(text.to_string());
}

fn string_leaves<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| string_leaves(v, out)),
        Value::Object(map) => map.values().for_each(|v| string_leaves(v, out)),
        _ => {}
    }
}

fn unescape_once(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// End index (exclusive) of the first balanced `(...)`, `{...}` or `[...]`
/// starting at or after `from`. Quoted strings are skipped.
fn balanced_after(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let start = from + text[from..].find(['(', '{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'(' | b'{' | b'[' => depth += 1,
            b')' | b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode `(bk.action.map.Make, (bk.action.array.Make, k...), (bk.action.array.Make, v...))`.
fn decode_map_make(text: &str) -> Option<Map<String, Value>> {
    let start = text.find(MAP_MAKE)?;
    // Only accept a map that belongs to this anchor, not one further along.
    if text[..start].contains(ARRAY_MAKE) {
        return None;
    }
    let body = &text[start + MAP_MAKE.len()..];

    let keys_at = body.find(ARRAY_MAKE)?;
    let keys_end = keys_at + ARRAY_MAKE.len() + balanced_tail(&body[keys_at + ARRAY_MAKE.len()..])?;
    let keys = literals(&body[keys_at + ARRAY_MAKE.len()..keys_end]);

    let rest = &body[keys_end..];
    let values_at = rest.find(ARRAY_MAKE)?;
    let values_end = values_at + ARRAY_MAKE.len() + balanced_tail(&rest[values_at + ARRAY_MAKE.len()..])?;
    let values = literals(&rest[values_at + ARRAY_MAKE.len()..values_end]);

    if keys.is_empty() || keys.len() != values.len() {
        return None;
    }
    Some(
        keys.into_iter()
            .zip(values)
            .filter_map(|(k, v)| match k {
                Value::String(k) => Some((k, v)),
                _ => None,
            })
            .collect(),
    )
}

/// Length up to the `)` closing an already-opened group.
fn balanced_tail(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn literals(list: &str) -> Vec<Value> {
    LITERAL
        .captures_iter(list)
        .filter_map(|caps| {
            if let Some(s) = caps.get(1) {
                let unescaped = unescape_once(s.as_str());
                // String values that hold JSON documents are decoded in place.
                let trimmed = unescaped.trim_start();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    if let Ok(v) = serde_json::from_str::<Value>(&unescaped) {
                        return Some(v);
                    }
                }
                return Some(Value::String(unescaped));
            }
            if let Some(n) = caps.get(2) {
                return serde_json::from_str(n.as_str()).ok();
            }
            caps.get(3).and_then(|lit| serde_json::from_str(lit.as_str()).ok())
        })
        .collect()
}

fn decode_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = balanced_after(text, start)?;
    match serde_json::from_str::<Value>(&text[start..end]).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
