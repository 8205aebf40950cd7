use std::collections::BTreeMap;

use super::path::FieldName;
use crate::id::error_node_id;

/// Error-display collaborator. Calls are idempotent per field.
pub trait ErrorDisplay: Send + Sync + 'static {
    /// Shows `message` next to `field`, or hides it for `None`.
    /// Returns whether a node exists to carry the message.
    fn render(&mut self, field: &FieldName, message: Option<&str>) -> bool;

    fn clear_all(&mut self);
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorNode {
    pub id: String,
    pub message: Option<String>,
    pub declared: bool,
}

impl ErrorNode {
    pub fn is_visible(&self) -> bool {
        self.message.is_some()
    }
}

/// In-memory error nodes, creating one on demand for undeclared fields.
#[derive(Clone, Debug)]
pub struct ErrorNodes {
    prefix: String,
    manual_only: bool,
    nodes: BTreeMap<FieldName, ErrorNode>,
}

impl Default for ErrorNodes {
    fn default() -> Self {
        Self::new("calmform-error")
    }
}

impl ErrorNodes {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            manual_only: false,
            nodes: BTreeMap::new(),
        }
    }

    /// Only declared nodes render; errors for other fields stay in the error map.
    pub fn manual_only(mut self, value: bool) -> Self {
        self.manual_only = value;
        self
    }

    pub fn declare(mut self, field: impl Into<FieldName>, id: impl Into<String>) -> Self {
        self.nodes.insert(
            field.into(),
            ErrorNode {
                id: id.into(),
                message: None,
                declared: true,
            },
        );
        self
    }

    pub fn node(&self, field: &str) -> Option<&ErrorNode> {
        self.nodes.get(field)
    }

    pub fn message(&self, field: &str) -> Option<&str> {
        self.node(field)?.message.as_deref()
    }

    pub fn visible(&self) -> impl Iterator<Item = (&FieldName, &str)> {
        self.nodes
            .iter()
            .filter_map(|(field, node)| Some((field, node.message.as_deref()?)))
    }
}

impl ErrorDisplay for ErrorNodes {
    fn render(&mut self, field: &FieldName, message: Option<&str>) -> bool {
        if let Some(node) = self.nodes.get_mut(field) {
            node.message = message.map(str::to_string);
            return true;
        }
        let Some(message) = message else {
            return false;
        };
        if self.manual_only {
            return false;
        }
        self.nodes.insert(
            field.clone(),
            ErrorNode {
                id: error_node_id(&self.prefix, field.as_str()),
                message: Some(message.to_string()),
                declared: false,
            },
        );
        true
    }

    fn clear_all(&mut self) {
        for node in self.nodes.values_mut() {
            node.message = None;
        }
    }
}
