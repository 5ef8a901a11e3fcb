//! RFC 6902 patch operations over YAML value trees, addressed by RFC 6901
//! pointers.

use core::fmt;
use std::str::FromStr;

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// An RFC 6901 pointer: `/`-separated tokens with `~1` escaping `/` and
/// `~0` escaping `~`. The empty pointer addresses the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    tokens: Vec<String>,
}

impl Pointer {
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Pointer { tokens: Vec::new() });
        }
        let Some(rest) = text.strip_prefix('/') else {
            return Err(Error::Patch(format!(
                "json pointer `{text}` must start with `/`"
            )));
        };
        let tokens = rest
            .split('/')
            .map(|token| token.replace("~1", "/").replace("~0", "~"))
            .collect();
        Ok(Pointer { tokens })
    }

    fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True when `self` addresses `other` or an ancestor of it.
    fn contains(&self, other: &Pointer) -> bool {
        other.tokens.len() >= self.tokens.len()
            && self.tokens.iter().zip(&other.tokens).all(|(a, b)| a == b)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", token.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

impl FromStr for Pointer {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Pointer::parse(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

impl OpKind {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "add" => Some(OpKind::Add),
            "remove" => Some(OpKind::Remove),
            "replace" => Some(OpKind::Replace),
            "move" => Some(OpKind::Move),
            "copy" => Some(OpKind::Copy),
            "test" => Some(OpKind::Test),
            _ => None,
        }
    }
}

/// One validated patch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOp {
    op: OpKind,
    path: Pointer,
    from: Option<Pointer>,
    value: Option<Value>,
}

impl PatchOp {
    /// Validates one element of a patch document. Requires string `op` and
    /// `path`; `from` for move/copy; `value` for add/replace/test.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mapping = value
            .as_mapping()
            .ok_or_else(|| Error::Patch("json patch operation is not a mapping".to_string()))?;

        let op = required_str(mapping, "op")?;
        let op = OpKind::parse(op)
            .ok_or_else(|| Error::Patch(format!("unknown json patch op `{op}`")))?;
        let path = Pointer::parse(required_str(mapping, "path")?)?;

        let from = match op {
            OpKind::Move | OpKind::Copy => Some(Pointer::parse(required_str(mapping, "from")?)?),
            _ => None,
        };
        let value = match op {
            OpKind::Add | OpKind::Replace | OpKind::Test => Some(
                mapping
                    .get("value")
                    .ok_or_else(|| {
                        Error::Patch(format!("json patch op `{op:?}` requires a value"))
                    })?
                    .clone(),
            ),
            _ => None,
        };

        Ok(PatchOp {
            op,
            path,
            from,
            value,
        })
    }

    pub fn apply(&self, doc: &mut Value) -> Result<()> {
        match self.op {
            OpKind::Add => add(doc, &self.path, self.required_value()?),
            OpKind::Remove => remove(doc, &self.path).map(drop),
            OpKind::Replace => replace(doc, &self.path, self.required_value()?),
            OpKind::Move => {
                let from = self.required_from()?;
                if from.contains(&self.path) && *from != self.path {
                    return Err(Error::Patch(format!(
                        "cannot move `{from}` into its own child `{}`",
                        self.path
                    )));
                }
                let value = remove(doc, from)?;
                add(doc, &self.path, value)
            }
            OpKind::Copy => {
                let value = resolve(doc, self.required_from()?)?.clone();
                add(doc, &self.path, value)
            }
            OpKind::Test => {
                let actual = resolve(doc, &self.path)?;
                let expected = self.required_value()?;
                if *actual != expected {
                    return Err(Error::Patch(format!("test failed at `{}`", self.path)));
                }
                Ok(())
            }
        }
    }

    fn required_value(&self) -> Result<Value> {
        self.value
            .clone()
            .ok_or_else(|| Error::Patch(format!("json patch op `{:?}` requires a value", self.op)))
    }

    fn required_from(&self) -> Result<&Pointer> {
        self.from
            .as_ref()
            .ok_or_else(|| Error::Patch(format!("json patch op `{:?}` requires `from`", self.op)))
    }
}

/// Applies operations in order; the first failure aborts the rest.
pub fn apply_all(ops: &[PatchOp], doc: &mut Value) -> Result<()> {
    for op in ops {
        op.apply(doc)?;
    }
    Ok(())
}

fn required_str<'a>(mapping: &'a Mapping, key: &str) -> Result<&'a str> {
    mapping
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Patch(format!("json patch operation requires string `{key}`")))
}

fn resolve<'a>(doc: &'a Value, pointer: &Pointer) -> Result<&'a Value> {
    let mut current = doc;
    for (depth, token) in pointer.tokens.iter().enumerate() {
        current = match current {
            Value::Mapping(mapping) => mapping.get(token.as_str()).ok_or_else(|| {
                Error::Patch(format!("key `{token}` not found at `{}`", prefix(pointer, depth)))
            })?,
            Value::Sequence(sequence) => {
                let index = sequence_index(token, sequence.len(), false, pointer)?;
                &sequence[index]
            }
            _ => {
                return Err(Error::Patch(format!(
                    "`{}` is not a container",
                    prefix(pointer, depth)
                )))
            }
        };
    }
    Ok(current)
}

fn resolve_mut<'a>(doc: &'a mut Value, tokens: &[String], pointer: &Pointer) -> Result<&'a mut Value> {
    let mut current = doc;
    for (depth, token) in tokens.iter().enumerate() {
        current = match current {
            Value::Mapping(mapping) => mapping.get_mut(token.as_str()).ok_or_else(|| {
                Error::Patch(format!("key `{token}` not found at `{}`", prefix(pointer, depth)))
            })?,
            Value::Sequence(sequence) => {
                let index = sequence_index(token, sequence.len(), false, pointer)?;
                &mut sequence[index]
            }
            _ => {
                return Err(Error::Patch(format!(
                    "`{}` is not a container",
                    prefix(pointer, depth)
                )))
            }
        };
    }
    Ok(current)
}

fn prefix(pointer: &Pointer, depth: usize) -> String {
    Pointer {
        tokens: pointer.tokens[..=depth].to_vec(),
    }
    .to_string()
}

fn sequence_index(token: &str, len: usize, allow_end: bool, pointer: &Pointer) -> Result<usize> {
    let index: usize = token.parse().map_err(|_| {
        Error::Patch(format!("`{token}` is not a sequence index in `{pointer}`"))
    })?;
    let limit = if allow_end { len } else { len.saturating_sub(1) };
    if len == 0 && !allow_end || index > limit {
        return Err(Error::Patch(format!(
            "index {index} out of range in `{pointer}` (length {len})"
        )));
    }
    Ok(index)
}

fn add(doc: &mut Value, pointer: &Pointer, value: Value) -> Result<()> {
    let Some((last, parents)) = pointer.tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = resolve_mut(doc, parents, pointer)?;
    match parent {
        Value::Mapping(mapping) => {
            mapping.insert(Value::from(last.as_str()), value);
            Ok(())
        }
        Value::Sequence(sequence) => {
            if last == "-" {
                sequence.push(value);
            } else {
                let index = sequence_index(last, sequence.len(), true, pointer)?;
                sequence.insert(index, value);
            }
            Ok(())
        }
        _ => Err(Error::Patch(format!(
            "cannot add at `{pointer}`: parent is not a container"
        ))),
    }
}

fn remove(doc: &mut Value, pointer: &Pointer) -> Result<Value> {
    let Some((last, parents)) = pointer.tokens.split_last() else {
        return Err(Error::Patch(
            "cannot remove the document root".to_string(),
        ));
    };
    let parent = resolve_mut(doc, parents, pointer)?;
    match parent {
        Value::Mapping(mapping) => mapping.remove(last.as_str()).ok_or_else(|| {
            Error::Patch(format!("cannot remove `{pointer}`: key `{last}` not found"))
        }),
        Value::Sequence(sequence) => {
            let index = sequence_index(last, sequence.len(), false, pointer)?;
            Ok(sequence.remove(index))
        }
        _ => Err(Error::Patch(format!(
            "cannot remove at `{pointer}`: parent is not a container"
        ))),
    }
}

fn replace(doc: &mut Value, pointer: &Pointer, value: Value) -> Result<()> {
    if pointer.is_root() {
        *doc = value;
        return Ok(());
    }
    let target = resolve_mut(doc, &pointer.tokens, pointer)?;
    *target = value;
    Ok(())
}
