use serde_json::{Map, Value};

/// Returns the value at `path`, if every key along it exists.
pub(crate) fn get_at_path<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = doc;
    for key in path {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// `get_cconfig_path_depth()` returns the greatest depth in `[min_depth, path.len()]` at which
/// the prefix of `path` exists in `doc`, or `None` if there is no such depth. An absent path is
/// not an error.
pub fn get_cconfig_path_depth(doc: &Value, path: &[String], min_depth: usize) -> Option<usize> {
    if min_depth > path.len() {
        return None;
    }

    let mut depth = 0;
    let mut current = doc;
    for key in path {
        match current.as_object().and_then(|obj| obj.get(key)) {
            Some(next) => {
                current = next;
                depth += 1;
            }
            None => break,
        }
    }

    if depth >= min_depth {
        Some(depth)
    } else {
        None
    }
}

/// Sets `value` at `path`, creating missing maps on the way. Non-map values along the path are
/// replaced by maps.
pub(crate) fn set_at_path(doc: &mut Value, path: &[String], value: Value) {
    let mut current = doc;
    for key in path {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(obj) => obj.entry(key.clone()).or_insert(Value::Null),
            _ => unreachable!("replaced by an object above"),
        };
    }
    *current = value;
}
