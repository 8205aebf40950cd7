use super::value::{Value, ValueTree};

/// Structural equality over form values. No coercion between kinds:
/// `Text("true")` and `Bool(true)` differ, as do a scalar and a group.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    match (a, b) {
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Blob(a), Value::Blob(b)) => a.same_file(b),
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Tree(a), Value::Tree(b)) => trees_equal(a, b),
        _ => false,
    }
}

/// Absent on exactly one side is unequal.
pub fn deep_equal_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => deep_equal(a, b),
        _ => false,
    }
}

pub fn trees_equal(a: &ValueTree, b: &ValueTree) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.slot(key).is_some_and(|other| deep_equal(value, other)))
}
