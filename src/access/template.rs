//! `{{token}}` substitution over JSON trees.
//!
//! Tokens are replaced in every string of the tree: plain values, array
//! items and object keys. Unknown tokens are left in place and reported so
//! the caller can decide whether they are fatal yet.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Key of the dictionary object inside an access document; never rendered.
pub const PROPERTIES_KEY: &str = "properties";

/// Tokens that are filled in during reconciliation and may stay unresolved
/// until then.
pub const DEFERRED_TOKENS: &[&str] = &[crate::domain::APPLICATION_ID_PROPERTY];

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("token regex compilation failed")
});

pub fn is_deferred(token: &str) -> bool {
    DEFERRED_TOKENS.contains(&token)
}

/// Token names referenced by `input`, in order of appearance.
pub fn find_tokens(input: &str) -> Vec<String> {
    TOKEN_PATTERN.captures_iter(input).map(|c| c[1].to_string()).collect()
}

/// Substitute tokens in one string.
pub fn render_str(
    input: &str,
    properties: &BTreeMap<String, String>,
    unresolved: &mut BTreeSet<String>,
) -> String {
    TOKEN_PATTERN
        .replace_all(input, |caps: &Captures<'_>| match properties.get(&caps[1]) {
            Some(value) => value.clone(),
            None => {
                unresolved.insert(caps[1].to_string());
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Substitute tokens throughout `value`.
pub fn render_value(
    value: &Value,
    properties: &BTreeMap<String, String>,
    unresolved: &mut BTreeSet<String>,
) -> Value {
    match value {
        Value::String(s) => Value::String(render_str(s, properties, unresolved)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| render_value(item, properties, unresolved)).collect())
        }
        Value::Object(map) => Value::Object(render_map(map, properties, unresolved, false)),
        other => other.clone(),
    }
}

fn render_map(
    map: &Map<String, Value>,
    properties: &BTreeMap<String, String>,
    unresolved: &mut BTreeSet<String>,
    skip_properties: bool,
) -> Map<String, Value> {
    let mut rendered = Map::with_capacity(map.len());
    for (key, value) in map {
        if skip_properties && key == PROPERTIES_KEY {
            rendered.insert(key.clone(), value.clone());
            continue;
        }
        let key = render_str(key, properties, unresolved);
        rendered.insert(key, render_value(value, properties, unresolved));
    }
    rendered
}

/// Render a whole access document. The top-level `properties` object is the
/// dictionary itself and is copied unchanged.
pub fn render_document(
    raw: &Value,
    properties: &BTreeMap<String, String>,
) -> (Value, BTreeSet<String>) {
    let mut unresolved = BTreeSet::new();
    let rendered = match raw {
        Value::Object(map) => Value::Object(render_map(map, properties, &mut unresolved, true)),
        other => render_value(other, properties, &mut unresolved),
    };
    (rendered, unresolved)
}
