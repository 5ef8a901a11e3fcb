//! Path-addressed access into YAML value trees.
//!
//! Paths are dot-separated segments, each an identifier optionally followed
//! by one bracketed index: `spec.containers[0].name`. Every transform in the
//! engine is expressed as get/set over such a path, so all the edge cases
//! (missing metadata, scalar where a mapping was expected) live here.

use core::fmt::Write as _;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Sequence, Value};

use crate::error::{Error, Result};
use crate::manifest::Str;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'p> {
    Key(&'p str),
    Index(&'p str, usize),
}

fn parse_path(path: &str) -> Vec<Segment<'_>> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(parse_segment)
        .collect()
}

fn parse_segment(part: &str) -> Segment<'_> {
    if let Some(open) = part.rfind('[') {
        if open > 0 && part.ends_with(']') {
            let digits = &part[open + 1..part.len() - 1];
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(index) = digits.parse() {
                    return Segment::Index(&part[..open], index);
                }
            }
        }
    }
    Segment::Key(part)
}

fn join_prefix(segments: &[Segment<'_>]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        match segment {
            Segment::Key(key) => out.push_str(key),
            Segment::Index(key, index) => {
                let _ = write!(out, "{key}[{index}]");
            }
        }
    }
    out
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Conversion from a tree node into a typed view, used by [`get`].
pub trait FromValue<'a>: Sized {
    const EXPECTED: &'static str;

    fn from_value(value: &'a Value) -> Option<Self>;

    fn from_root(_root: &'a Mapping) -> Option<Self> {
        None
    }
}

impl<'a> FromValue<'a> for &'a str {
    const EXPECTED: &'static str = "a string";

    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_str()
    }
}

impl<'a> FromValue<'a> for String {
    const EXPECTED: &'static str = "a string";

    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl<'a> FromValue<'a> for Str {
    const EXPECTED: &'static str = "a string";

    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_str().map(Str::from)
    }
}

impl<'a> FromValue<'a> for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_bool()
    }
}

impl<'a> FromValue<'a> for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_i64()
    }
}

impl<'a> FromValue<'a> for f64 {
    const EXPECTED: &'static str = "a number";

    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_f64()
    }
}

impl<'a> FromValue<'a> for &'a Mapping {
    const EXPECTED: &'static str = "a mapping";

    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_mapping()
    }

    fn from_root(root: &'a Mapping) -> Option<Self> {
        Some(root)
    }
}

impl<'a> FromValue<'a> for &'a Sequence {
    const EXPECTED: &'static str = "a sequence";

    fn from_value(value: &'a Value) -> Option<Self> {
        value.as_sequence()
    }
}

impl<'a> FromValue<'a> for &'a Value {
    const EXPECTED: &'static str = "a value";

    fn from_value(value: &'a Value) -> Option<Self> {
        Some(value)
    }
}

/// Walks `path` and returns the final value as `T`. The empty path denotes
/// the tree root.
pub fn get<'a, T: FromValue<'a>>(root: &'a Mapping, path: &str) -> Result<T> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return T::from_root(root).ok_or_else(|| Error::TypeMismatch {
            path: path.to_string(),
            expected: T::EXPECTED,
            found: "a mapping",
        });
    }
    let value = walk(root, &segments)?;
    T::from_value(value).ok_or_else(|| Error::TypeMismatch {
        path: path.to_string(),
        expected: T::EXPECTED,
        found: type_name(value),
    })
}

/// Untyped walk to a non-root node.
pub fn get_value<'a>(root: &'a Mapping, path: &str) -> Result<&'a Value> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return Err(Error::Invalid("empty path".to_string()));
    }
    walk(root, &segments)
}

pub fn has(root: &Mapping, path: &str) -> bool {
    let segments = parse_path(path);
    segments.is_empty() || walk(root, &segments).is_ok()
}

/// Sets the value at `path`, creating intermediate mappings where absent.
/// Sequence indices along the path must already exist; sequences are never
/// created or extended.
pub fn set(root: &mut Mapping, path: &str, value: impl Into<Value>) -> Result<()> {
    let value = value.into();
    let segments = parse_path(path);
    let Some((last, init)) = segments.split_last() else {
        return Err(Error::Invalid("empty path".to_string()));
    };

    let mut current = root;
    for depth in 0..init.len() {
        current = descend(current, &segments, depth)?;
    }

    match *last {
        Segment::Key(key) => {
            current.insert(Value::from(key), value);
        }
        Segment::Index(key, index) => {
            let container = current.get_mut(key).ok_or_else(|| Error::NotFound {
                path: join_prefix(&segments),
                key: key.to_string(),
            })?;
            let found = type_name(container);
            let sequence = match container {
                Value::Sequence(sequence) => sequence,
                _ => {
                    return Err(Error::TypeMismatch {
                        path: join_prefix(&segments),
                        expected: "a sequence",
                        found,
                    })
                }
            };
            let len = sequence.len();
            match sequence.get_mut(index) {
                Some(slot) => *slot = value,
                None => {
                    return Err(Error::OutOfRange {
                        path: join_prefix(&segments),
                        index,
                        len,
                    })
                }
            }
        }
    }
    Ok(())
}

/// Removes the final key from its parent mapping. An absent final key is a
/// silent no-op; a parent that cannot be walked is an error.
pub fn delete(root: &mut Mapping, path: &str) -> Result<()> {
    let segments = parse_path(path);
    let Some((last, init)) = segments.split_last() else {
        return Err(Error::Invalid("empty path".to_string()));
    };
    let Segment::Key(key) = *last else {
        return Err(Error::Invalid(format!(
            "cannot delete sequence element at path `{path}`"
        )));
    };

    if init.is_empty() {
        root.remove(key);
        return Ok(());
    }

    let parent = walk_mut(root, init)?;
    let found = type_name(parent);
    match parent {
        Value::Mapping(mapping) => {
            mapping.remove(key);
            Ok(())
        }
        _ => Err(Error::TypeMismatch {
            path: join_prefix(init),
            expected: "a mapping",
            found,
        }),
    }
}

/// Idempotently creates nested mappings along `path`.
pub fn ensure_path(root: &mut Mapping, path: &str) -> Result<()> {
    let segments = parse_path(path);
    let mut current = root;
    for depth in 0..segments.len() {
        if !matches!(segments[depth], Segment::Key(_)) {
            return Err(Error::Invalid(format!(
                "cannot create sequence elements along path `{path}`"
            )));
        }
        current = descend(current, &segments, depth)?;
    }
    Ok(())
}

/// Ensures `path` exists as a mapping and inserts every pair from `values`,
/// overwriting keys already present.
pub fn merge_string_map(
    root: &mut Mapping,
    path: &str,
    values: &IndexMap<Str, Str>,
) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }

    let segments = parse_path(path);
    if segments.is_empty() {
        for (key, value) in values {
            root.insert(Value::from(key.as_str()), Value::from(value.as_str()));
        }
        return Ok(());
    }

    ensure_path(root, path)?;
    let target = walk_mut(root, &segments)?;
    let found = type_name(target);
    let Value::Mapping(target) = target else {
        return Err(Error::TypeMismatch {
            path: path.to_string(),
            expected: "a mapping",
            found,
        });
    };
    for (key, value) in values {
        target.insert(Value::from(key.as_str()), Value::from(value.as_str()));
    }
    Ok(())
}

/// Reads the mapping at `path` as a string-to-string map. The empty path
/// reads the root.
pub fn get_string_map(root: &Mapping, path: &str) -> Result<IndexMap<Str, Str>> {
    let segments = parse_path(path);
    let mapping = if segments.is_empty() {
        root
    } else {
        let value = walk(root, &segments)?;
        value.as_mapping().ok_or_else(|| Error::TypeMismatch {
            path: path.to_string(),
            expected: "a mapping",
            found: type_name(value),
        })?
    };

    let mut result = IndexMap::with_capacity(mapping.len());
    for (key, value) in mapping {
        let (Some(key), Some(value)) = (key.as_str(), value.as_str()) else {
            return Err(Error::TypeMismatch {
                path: path.to_string(),
                expected: "a string-to-string mapping",
                found: "a mapping with non-string entries",
            });
        };
        result.insert(Str::from(key), Str::from(value));
    }
    Ok(result)
}

fn walk<'a>(root: &'a Mapping, segments: &[Segment<'_>]) -> Result<&'a Value> {
    let mut current = step(root, segments, 0)?;
    for depth in 1..segments.len() {
        let mapping = current.as_mapping().ok_or_else(|| Error::TypeMismatch {
            path: join_prefix(&segments[..depth]),
            expected: "a mapping",
            found: type_name(current),
        })?;
        current = step(mapping, segments, depth)?;
    }
    Ok(current)
}

fn step<'a>(mapping: &'a Mapping, segments: &[Segment<'_>], depth: usize) -> Result<&'a Value> {
    match segments[depth] {
        Segment::Key(key) => mapping.get(key).ok_or_else(|| Error::NotFound {
            path: join_prefix(&segments[..=depth]),
            key: key.to_string(),
        }),
        Segment::Index(key, index) => {
            let value = mapping.get(key).ok_or_else(|| Error::NotFound {
                path: join_prefix(&segments[..=depth]),
                key: key.to_string(),
            })?;
            let sequence = value.as_sequence().ok_or_else(|| Error::TypeMismatch {
                path: join_prefix(&segments[..=depth]),
                expected: "a sequence",
                found: type_name(value),
            })?;
            sequence.get(index).ok_or_else(|| Error::OutOfRange {
                path: join_prefix(&segments[..=depth]),
                index,
                len: sequence.len(),
            })
        }
    }
}

fn walk_mut<'a>(root: &'a mut Mapping, segments: &[Segment<'_>]) -> Result<&'a mut Value> {
    let mut current = step_mut(root, segments, 0)?;
    for depth in 1..segments.len() {
        let mapping = require_mapping_mut(current, &segments[..depth])?;
        current = step_mut(mapping, segments, depth)?;
    }
    Ok(current)
}

fn step_mut<'a>(
    mapping: &'a mut Mapping,
    segments: &[Segment<'_>],
    depth: usize,
) -> Result<&'a mut Value> {
    match segments[depth] {
        Segment::Key(key) => mapping.get_mut(key).ok_or_else(|| Error::NotFound {
            path: join_prefix(&segments[..=depth]),
            key: key.to_string(),
        }),
        Segment::Index(key, index) => {
            let value = mapping.get_mut(key).ok_or_else(|| Error::NotFound {
                path: join_prefix(&segments[..=depth]),
                key: key.to_string(),
            })?;
            let found = type_name(value);
            let sequence = match value {
                Value::Sequence(sequence) => sequence,
                _ => {
                    return Err(Error::TypeMismatch {
                        path: join_prefix(&segments[..=depth]),
                        expected: "a sequence",
                        found,
                    })
                }
            };
            let len = sequence.len();
            sequence.get_mut(index).ok_or_else(|| Error::OutOfRange {
                path: join_prefix(&segments[..=depth]),
                index,
                len,
            })
        }
    }
}

fn require_mapping_mut<'a>(
    value: &'a mut Value,
    prefix: &[Segment<'_>],
) -> Result<&'a mut Mapping> {
    let found = type_name(value);
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(Error::TypeMismatch {
            path: join_prefix(prefix),
            expected: "a mapping",
            found,
        }),
    }
}

fn descend<'a>(
    mapping: &'a mut Mapping,
    segments: &[Segment<'_>],
    depth: usize,
) -> Result<&'a mut Mapping> {
    match segments[depth] {
        Segment::Key(key) => {
            if !mapping.contains_key(key) {
                mapping.insert(Value::from(key), Value::Mapping(Mapping::new()));
            }
            let value = mapping.get_mut(key).ok_or_else(|| Error::NotFound {
                path: join_prefix(&segments[..=depth]),
                key: key.to_string(),
            })?;
            require_mapping_mut(value, &segments[..=depth])
        }
        Segment::Index(key, index) => {
            let value = mapping.get_mut(key).ok_or_else(|| Error::NotFound {
                path: join_prefix(&segments[..=depth]),
                key: key.to_string(),
            })?;
            let found = type_name(value);
            let sequence = match value {
                Value::Sequence(sequence) => sequence,
                _ => {
                    return Err(Error::TypeMismatch {
                        path: join_prefix(&segments[..=depth]),
                        expected: "a sequence",
                        found,
                    })
                }
            };
            let len = sequence.len();
            let element = sequence.get_mut(index).ok_or_else(|| Error::OutOfRange {
                path: join_prefix(&segments[..=depth]),
                index,
                len,
            })?;
            require_mapping_mut(element, &segments[..=depth])
        }
    }
}
