use std::borrow::Borrow;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::value::{Value, ValueTree};

pub const SEPARATOR: char = '.';

/// Identifies one form control. Dots denote nesting (`address.city`).
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldName(String);

impl FieldName {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> Vec<&str> {
        split(&self.0)
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FieldName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&FieldName> for FieldName {
    fn from(value: &FieldName) -> Self {
        value.clone()
    }
}

impl Borrow<str> for FieldName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("cannot set `{path}`: `{segment}` already holds a value, not a group")]
    ScalarCollision { path: String, segment: String },
    #[error("`{path}` names a group of fields and cannot also hold a value")]
    ContainerCollision { path: String },
}

/// Splits on `.` with no escaping. An empty name yields one empty segment.
pub fn split(name: &str) -> Vec<&str> {
    name.split(SEPARATOR).collect()
}

/// Walks `name` through `tree`. Missing keys and scalar intermediates yield `None`.
pub fn get<'a>(tree: &'a ValueTree, name: &str) -> Option<&'a Value> {
    let mut segments = name.split(SEPARATOR);
    let mut current = tree.slot(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Tree(child) => child.slot(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

pub(crate) fn get_mut<'a>(tree: &'a mut ValueTree, name: &str) -> Option<&'a mut Value> {
    let mut segments = name.split(SEPARATOR);
    let mut current = tree.slot_mut(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Tree(child) => child.slot_mut(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Creates intermediate groups as needed and assigns the leaf.
///
/// Descending through a key that holds a scalar fails with
/// [`PathError::ScalarCollision`] and leaves `tree` untouched.
pub fn set(tree: &mut ValueTree, name: &str, value: Value) -> Result<(), PathError> {
    let segments = split(name);
    let Some((leaf, parents)) = segments.split_last() else {
        return Ok(());
    };

    let mut probe = Some(&*tree);
    for segment in parents {
        let Some(node) = probe else {
            break;
        };
        probe = match node.slot(segment) {
            None => None,
            Some(Value::Tree(child)) => Some(child),
            Some(_) => {
                return Err(PathError::ScalarCollision {
                    path: name.to_string(),
                    segment: (*segment).to_string(),
                });
            }
        };
    }

    let mut current = tree;
    for segment in parents {
        let slot = current
            .entries_mut()
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Tree(ValueTree::new()));
        current = match slot {
            Value::Tree(child) => child,
            _ => {
                return Err(PathError::ScalarCollision {
                    path: name.to_string(),
                    segment: (*segment).to_string(),
                });
            }
        };
    }
    current.entries_mut().insert((*leaf).to_string(), value);
    Ok(())
}
