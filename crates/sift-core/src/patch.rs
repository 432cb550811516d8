//! Path-addressed patches over JSON documents
//!
//! A path is a dot-separated list of object keys with bracketed array
//! indexes: `merchant.aliases[2].name`, `rows[0][1]`, or `[3].amount` for a
//! document whose root is an array.
//!
//! Setting a path creates missing intermediate objects (a `null` in the way
//! is replaced by an object) but never grows arrays: an index past the end
//! is an error, as is stepping by key into a non-object or by index into a
//! non-array.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ai::clean_markdown_wrapper;
use crate::error::{Error, Result};

/// One field replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub path: String,
    pub value: Value,
}

impl Patch {
    pub fn new(path: &str, value: Value) -> Self {
        Self {
            path: path.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Split a path into key and index segments
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let invalid = |reason: &str| Error::Patch(format!("invalid path '{}': {}", path, reason));

    if path.trim().is_empty() {
        return Err(invalid("empty path"));
    }
    if path.ends_with('.') {
        return Err(invalid("trailing '.'"));
    }

    let mut segments = Vec::new();
    let mut key = String::new();
    let mut after_index = false;
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if key.is_empty() && !after_index {
                    return Err(invalid("empty key"));
                }
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                after_index = false;
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) => digits.push(d),
                        None => return Err(invalid("unclosed '['")),
                    }
                }
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid(&format!("bad index '{}'", digits)))?;
                segments.push(PathSegment::Index(index));
                after_index = true;
            }
            ']' => return Err(invalid("unexpected ']'")),
            _ => {
                if after_index {
                    return Err(invalid("expected '.' or '[' after index"));
                }
                key.push(c);
            }
        }
    }

    if !key.is_empty() {
        segments.push(PathSegment::Key(key));
    }

    Ok(segments)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Move one segment down, creating an object for a missing key
fn step<'a>(node: &'a mut Value, segment: &PathSegment, path: &str) -> Result<&'a mut Value> {
    match segment {
        PathSegment::Key(key) => {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(map) => Ok(map.entry(key.clone()).or_insert(Value::Null)),
                other => Err(Error::Patch(format!(
                    "cannot set key '{}' on {} at '{}'",
                    key,
                    kind(other),
                    path
                ))),
            }
        }
        PathSegment::Index(index) => match node {
            Value::Array(items) => {
                let len = items.len();
                items.get_mut(*index).ok_or_else(|| {
                    Error::Patch(format!(
                        "index {} out of range (length {}) at '{}'",
                        index, len, path
                    ))
                })
            }
            other => Err(Error::Patch(format!(
                "cannot index {} with [{}] at '{}'",
                kind(other),
                index,
                path
            ))),
        },
    }
}

/// Set `value` at `path` inside `document`
pub fn set_path(document: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments = parse_path(path)?;
    let mut node = document;
    for segment in &segments {
        node = step(node, segment, path)?;
    }
    *node = value;
    Ok(())
}

/// Read the value at `path`, if present
pub fn get_path<'a>(document: &'a Value, path: &str) -> Result<Option<&'a Value>> {
    let mut node = document;
    for segment in parse_path(path)? {
        let next = match (&segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key),
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        };
        match next {
            Some(value) => node = value,
            None => return Ok(None),
        }
    }
    Ok(Some(node))
}

/// Apply patches in order, re-serializing the document after each one
///
/// Fails on the first patch that cannot be applied; the input text is left
/// as it was.
pub fn apply_patches(document: &str, patches: &[Patch]) -> Result<String> {
    let mut text = document.to_string();
    for patch in patches {
        let mut value: Value = serde_json::from_str(&text)?;
        set_path(&mut value, &patch.path, patch.value.clone())?;
        text = serde_json::to_string(&value)?;
    }
    Ok(text)
}

/// Parse a provider's patch list
///
/// Accepts `[{"path", "value"}, ...]`, a single patch object, or
/// `{"patches": [...]}`.
pub fn parse_patch_list(response: &str) -> Result<Vec<Patch>> {
    let payload = clean_markdown_wrapper(response);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| Error::Parse(format!("Invalid patch JSON from AI: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("patches") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(Error::Parse("'patches' is not a list".into())),
            None => vec![Value::Object(map)],
        },
        other => {
            return Err(Error::Parse(format!(
                "expected a patch list, got {}",
                kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<Patch>(item)
                .map_err(|e| Error::Parse(format!("Invalid patch from AI: {}", e)))
        })
        .collect()
}
