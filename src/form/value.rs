use std::collections::BTreeMap;
use std::fmt::{self, Formatter};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Unexpected, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::equality;
use super::path::{self, PathError};

/// Opaque file reference. Treated as a leaf everywhere.
#[derive(Clone, Debug)]
pub struct Blob {
    name: String,
    content_type: String,
    bytes: Arc<[u8]>,
}

impl Blob {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn same_file(&self, other: &Blob) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
            || (self.name == other.name
                && self.content_type == other.content_type
                && self.bytes == other.bytes)
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Text(String),
    Bool(bool),
    Blob(Blob),
    List(Vec<Value>),
    Tree(ValueTree),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&ValueTree> {
        match self {
            Value::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(text) => text.is_empty(),
            Value::Bool(_) | Value::Blob(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Tree(tree) => tree.is_empty(),
        }
    }

    /// Scalar text form used when writing into a text control.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Text(text) => Some(text.clone()),
            Value::Bool(value) => Some(value.to_string()),
            Value::Blob(blob) => Some(blob.name.clone()),
            Value::List(_) | Value::Tree(_) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equality::deep_equal(self, other)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Blob> for Value {
    fn from(value: Blob) -> Self {
        Value::Blob(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<ValueTree> for Value {
    fn from(value: ValueTree) -> Self {
        Value::Tree(value)
    }
}

/// Nested key/value structure keyed by path segment.
#[derive(Clone, Debug, Default)]
pub struct ValueTree {
    entries: BTreeMap<String, Value>,
}

impl ValueTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from `(name, value)` pairs in document order.
    ///
    /// A name seen twice turns its slot into a list; later occurrences append.
    pub fn from_entries<I, N>(entries: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = (N, Value)>,
        N: AsRef<str>,
    {
        let mut tree = Self::new();
        for (name, value) in entries {
            tree.append(name.as_ref(), value)?;
        }
        Ok(tree)
    }

    pub fn append(&mut self, name: &str, value: Value) -> Result<(), PathError> {
        match path::get_mut(self, name) {
            Some(Value::List(items)) => {
                items.push(value);
                Ok(())
            }
            Some(Value::Tree(_)) => Err(PathError::ContainerCollision {
                path: name.to_string(),
            }),
            Some(slot) => {
                let first = std::mem::replace(slot, Value::List(Vec::new()));
                *slot = Value::List(vec![first, value]);
                Ok(())
            }
            None => path::set(self, name, value),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        path::get(self, name)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), PathError> {
        path::set(self, name, value)
    }

    /// Inserts a top-level key without path splitting.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn slot(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub(crate) fn slot_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Dotted name to leaf. Lists and blobs are leaves; groups are walked.
    pub fn flatten(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        flatten_into(self, None, &mut out);
        out
    }
}

fn flatten_into(tree: &ValueTree, prefix: Option<&str>, out: &mut BTreeMap<String, Value>) {
    for (key, value) in &tree.entries {
        let name = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Tree(child) => flatten_into(child, Some(&name), out),
            leaf => {
                out.insert(name, leaf.clone());
            }
        }
    }
}

impl PartialEq for ValueTree {
    fn eq(&self, other: &Self) -> bool {
        equality::trees_equal(self, other)
    }
}

/// Conversion into a single form value. `None` leaves the field out.
pub trait ToFormValue {
    fn to_form_value(&self) -> Option<Value>;
}

/// Conversion of a whole model into a value tree; derived by `#[derive(FormValues)]`.
pub trait ToValueTree {
    fn to_value_tree(&self) -> ValueTree;
}

impl ToValueTree for ValueTree {
    fn to_value_tree(&self) -> ValueTree {
        self.clone()
    }
}

impl ToFormValue for str {
    fn to_form_value(&self) -> Option<Value> {
        Some(Value::Text(self.to_string()))
    }
}

impl ToFormValue for String {
    fn to_form_value(&self) -> Option<Value> {
        Some(Value::Text(self.clone()))
    }
}

impl ToFormValue for bool {
    fn to_form_value(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }
}

impl ToFormValue for Decimal {
    fn to_form_value(&self) -> Option<Value> {
        Some(Value::Text(self.normalize().to_string()))
    }
}

macro_rules! impl_to_form_value_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToFormValue for $ty {
                fn to_form_value(&self) -> Option<Value> {
                    Some(Value::Text(self.to_string()))
                }
            }
        )*
    };
}

impl_to_form_value_display!(i32, i64, u8, u16, u32, u64, usize, f64);

impl ToFormValue for Blob {
    fn to_form_value(&self) -> Option<Value> {
        Some(Value::Blob(self.clone()))
    }
}

impl ToFormValue for Value {
    fn to_form_value(&self) -> Option<Value> {
        Some(self.clone())
    }
}

impl ToFormValue for ValueTree {
    fn to_form_value(&self) -> Option<Value> {
        Some(Value::Tree(self.clone()))
    }
}

impl<T: ToFormValue> ToFormValue for Option<T> {
    fn to_form_value(&self) -> Option<Value> {
        self.as_ref().and_then(ToFormValue::to_form_value)
    }
}

impl<T: ToFormValue> ToFormValue for Vec<T> {
    fn to_form_value(&self) -> Option<Value> {
        Some(Value::List(
            self.iter().filter_map(ToFormValue::to_form_value).collect(),
        ))
    }
}

impl<T: ToFormValue + ?Sized> ToFormValue for &T {
    fn to_form_value(&self) -> Option<Value> {
        (**self).to_form_value()
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("type", &self.content_type)?;
        map.serialize_entry("size", &self.bytes.len())?;
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Text(text) => serializer.serialize_str(text),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Blob(blob) => blob.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Tree(tree) => tree.serialize(serializer),
        }
    }
}

impl Serialize for ValueTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a string, boolean, number, sequence or map")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Value, E> {
        Ok(Value::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Value, E> {
        Ok(Value::Text(value.to_string()))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Value, E> {
        Ok(Value::Text(value.to_string()))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Value, E> {
        Ok(Value::Text(value.to_string()))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Value, E> {
        Ok(Value::Text(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Value, E> {
        Ok(Value::Text(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Err(E::invalid_type(Unexpected::Unit, &self))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Option<Value>>()? {
            items.extend(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Value, A::Error> {
        TreeVisitor.visit_map(map).map(Value::Tree)
    }
}

struct TreeVisitor;

impl<'de> Visitor<'de> for TreeVisitor {
    type Value = ValueTree;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a map of form values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ValueTree, A::Error> {
        let mut tree = ValueTree::new();
        while let Some((key, value)) = map.next_entry::<String, Option<Value>>()? {
            if let Some(value) = value {
                tree.insert(key, value);
            }
        }
        Ok(tree)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for ValueTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TreeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_names_become_list_in_first_seen_order() {
        let tree = ValueTree::from_entries([
            ("tags", Value::from("a")),
            ("tags", Value::from("b")),
            ("tags", Value::from("c")),
        ])
        .expect("build tree");

        assert_eq!(
            tree.get("tags"),
            Some(&Value::List(vec!["a".into(), "b".into(), "c".into()]))
        );
    }

    #[test]
    fn single_occurrence_stays_scalar() {
        let tree = ValueTree::from_entries([("email", Value::from("a@b.c"))]).expect("build");
        assert_eq!(tree.get("email"), Some(&Value::from("a@b.c")));
    }

    #[test]
    fn leaf_after_group_is_a_container_collision() {
        let error = ValueTree::from_entries([
            ("a.b", Value::from("x")),
            ("a", Value::from("y")),
        ])
        .expect_err("collision");
        assert_eq!(
            error,
            PathError::ContainerCollision {
                path: "a".to_string()
            }
        );
    }

    #[test]
    fn blobs_are_opaque_leaves() {
        let blob = Blob::new("cv.pdf", "application/pdf", vec![1_u8, 2, 3]);
        let tree = ValueTree::from_entries([
            ("upload.file", Value::Blob(blob.clone())),
            ("upload.note", Value::from("resume")),
        ])
        .expect("build");

        let flat = tree.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat.get("upload.file"), Some(&Value::Blob(blob)));
    }

    #[test]
    fn flatten_stops_at_lists() {
        let mut tree = ValueTree::new();
        tree.set("profile.tags", vec![Value::from("x"), Value::from("y")].into())
            .expect("set list");
        tree.set("profile.name", "Ada".into()).expect("set name");
        tree.set("consent", true.into()).expect("set bool");

        let flat = tree.flatten();
        assert_eq!(
            flat.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["consent", "profile.name", "profile.tags"]
        );
        assert_eq!(
            flat.get("profile.tags").and_then(Value::as_list).map(<[Value]>::len),
            Some(2)
        );
    }

    #[test]
    fn json_roundtrip_keeps_shape_and_drops_nulls() {
        let tree: ValueTree = serde_json::from_str(
            r#"{"address":{"city":"Seattle","zip":98101},"tags":["a",null,"b"],"gone":null,"ok":true}"#,
        )
        .expect("parse json");

        assert_eq!(tree.get("address.city"), Some(&Value::from("Seattle")));
        assert_eq!(tree.get("address.zip"), Some(&Value::from("98101")));
        assert_eq!(
            tree.get("tags"),
            Some(&Value::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(tree.get("gone"), None);
        assert_eq!(tree.get("ok"), Some(&Value::Bool(true)));

        let encoded = serde_json::to_string(&tree).expect("encode");
        assert_eq!(
            encoded,
            r#"{"address":{"city":"Seattle","zip":"98101"},"ok":true,"tags":["a","b"]}"#
        );
    }

    #[test]
    fn option_and_vec_conversions() {
        assert_eq!(None::<String>.to_form_value(), None);
        assert_eq!(
            vec![Some("a"), None, Some("b")].to_form_value(),
            Some(Value::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            Decimal::new(1250, 2).to_form_value(),
            Some(Value::from("12.5"))
        );
    }
}
